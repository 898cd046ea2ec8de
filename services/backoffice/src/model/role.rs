use artweb_authz::RoleBinding;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: u32,
    pub name: String,
    pub descr: String,
    pub resource_ids: Vec<u32>,
    pub menu_ids: Vec<u32>,
    pub button_ids: Vec<u32>,
}

impl Role {
    pub fn binding(&self) -> RoleBinding {
        RoleBinding {
            id: self.id,
            resource_ids: self.resource_ids.clone(),
            menu_ids: self.menu_ids.clone(),
            button_ids: self.button_ids.clone(),
        }
    }
}

/// Association lists left as `None` keep their stored value on update.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct RoleInput {
    pub name: String,
    #[serde(default)]
    pub descr: String,
    #[serde(default)]
    pub resource_ids: Option<Vec<u32>>,
    #[serde(default)]
    pub menu_ids: Option<Vec<u32>>,
    #[serde(default)]
    pub button_ids: Option<Vec<u32>>,
}
