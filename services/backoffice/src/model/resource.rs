//! Protected API endpoint records.
use artweb_authz::ResourceRule;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct Resource {
    pub id: u32,
    pub url: String,
    pub method: String,
    pub label: String,
    pub descr: String,
}

impl Resource {
    pub fn rule(&self) -> ResourceRule {
        ResourceRule {
            id: self.id,
            url: self.url.clone(),
            method: self.method.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct ResourceInput {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub descr: String,
}

impl ResourceInput {
    /// Trim the url and upper-case the method so `(url, method)` uniqueness
    /// and rule matching see one canonical spelling.
    pub fn normalized(mut self) -> Self {
        self.url = self.url.trim().to_string();
        self.method = self.method.trim().to_ascii_uppercase();
        self
    }
}
