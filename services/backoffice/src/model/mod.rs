//! Admin data model.
//!
//! # Purpose
//! Re-exports the resource/menu/button/role/user records, their create/update
//! payloads, the projections handed to the policy binder, and login audit rows.
mod button;
mod login_record;
mod menu;
mod resource;
mod role;
mod user;

pub use button::{Button, ButtonInput};
pub use login_record::{LoginRecord, NewLoginRecord};
pub use menu::{Menu, MenuInput, MenuMeta};
pub use resource::{Resource, ResourceInput};
pub use role::{Role, RoleInput};
pub use user::{NewUser, User, UserAccount, UserCreateRequest, UserPatch, UserUpdateRequest};
