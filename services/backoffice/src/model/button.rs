//! UI button records; each button belongs to exactly one menu.
use crate::model::menu::default_active;
use artweb_authz::ButtonBinding;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct Button {
    pub id: u32,
    pub name: String,
    pub sort: i32,
    pub is_active: bool,
    pub descr: String,
    pub menu_id: u32,
    pub resource_ids: Vec<u32>,
}

impl Button {
    pub fn binding(&self) -> ButtonBinding {
        ButtonBinding {
            id: self.id,
            menu_id: self.menu_id,
            resource_ids: self.resource_ids.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct ButtonInput {
    pub name: String,
    #[serde(default)]
    pub sort: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub descr: String,
    pub menu_id: u32,
    #[serde(default)]
    pub resource_ids: Option<Vec<u32>>,
}
