//! Navigation menu records.
use artweb_authz::MenuBinding;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default, PartialEq, Eq)]
pub struct MenuMeta {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct Menu {
    pub id: u32,
    pub path: String,
    pub component: String,
    pub name: String,
    pub meta: MenuMeta,
    pub sort: i32,
    pub is_active: bool,
    pub descr: String,
    pub parent_id: Option<u32>,
    pub resource_ids: Vec<u32>,
}

impl Menu {
    pub fn binding(&self) -> MenuBinding {
        MenuBinding {
            id: self.id,
            parent_id: self.parent_id,
            resource_ids: self.resource_ids.clone(),
        }
    }
}

/// Create/update payload. `resource_ids: None` keeps the stored set on update.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct MenuInput {
    pub path: String,
    #[serde(default)]
    pub component: String,
    pub name: String,
    #[serde(default)]
    pub meta: MenuMeta,
    #[serde(default)]
    pub sort: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub descr: String,
    #[serde(default)]
    pub parent_id: Option<u32>,
    #[serde(default)]
    pub resource_ids: Option<Vec<u32>>,
}

impl MenuInput {
    /// Treat `parent_id: 0` as a root menu.
    pub fn normalized(mut self) -> Self {
        self.parent_id = self.parent_id.filter(|id| *id != 0);
        self.path = self.path.trim().to_string();
        self.name = self.name.trim().to_string();
        self
    }
}

pub(crate) fn default_active() -> bool {
    true
}
