//! OpenAPI document for the backoffice API.
//!
//! # Purpose
//! Aggregates every route and schema type served under `/v1/openapi.json`,
//! plus the bearer scheme the guarded routes declare.
use crate::api::{
    buttons, me, menus, policies, resources, roles, system, users,
    types::{
        ButtonListResponse, EdgeResponse, ErrorResponse, FeatureFlags, HealthStatus,
        LoginFailureResponse, LoginRecordListResponse, LoginRequest, LoginResponse,
        MenuDeleteResponse, MenuListResponse, PasswordChangeRequest, PasswordResetRequest,
        PolicyDumpResponse, RefreshRequest, ResourceListResponse, RoleListResponse, RuleResponse,
        SystemInfo, UserListResponse,
    },
};
use crate::auth::login;
use crate::auth::rbac::bootstrap::ReconcileReport;
use crate::model::{
    Button, ButtonInput, LoginRecord, Menu, MenuInput, MenuMeta, Resource, ResourceInput, Role,
    RoleInput, User, UserCreateRequest, UserUpdateRequest,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

pub struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "artweb-backoffice",
        version = "v1",
        description = "artweb admin backend HTTP API"
    ),
    modifiers(&BearerAuth),
    paths(
        system::system_info,
        system::system_health,
        login::login,
        login::refresh,
        me::change_password,
        me::my_login_records,
        resources::list_resources,
        resources::create_resource,
        resources::get_resource,
        resources::update_resource,
        resources::delete_resource,
        menus::list_menus,
        menus::create_menu,
        menus::get_menu,
        menus::update_menu,
        menus::delete_menu,
        buttons::list_buttons,
        buttons::create_button,
        buttons::get_button,
        buttons::update_button,
        buttons::delete_button,
        roles::list_roles,
        roles::create_role,
        roles::get_role,
        roles::update_role,
        roles::delete_role,
        users::list_users,
        users::create_user,
        users::get_user,
        users::update_user,
        users::delete_user,
        users::reset_password,
        users::list_login_records,
        policies::list_policies,
        policies::reconcile_policies
    ),
    components(schemas(
        FeatureFlags,
        SystemInfo,
        HealthStatus,
        ErrorResponse,
        LoginRequest,
        LoginResponse,
        LoginFailureResponse,
        RefreshRequest,
        PasswordResetRequest,
        PasswordChangeRequest,
        LoginRecord,
        LoginRecordListResponse,
        Resource,
        ResourceInput,
        ResourceListResponse,
        Menu,
        MenuMeta,
        MenuInput,
        MenuListResponse,
        MenuDeleteResponse,
        Button,
        ButtonInput,
        ButtonListResponse,
        Role,
        RoleInput,
        RoleListResponse,
        User,
        UserCreateRequest,
        UserUpdateRequest,
        UserListResponse,
        RuleResponse,
        EdgeResponse,
        PolicyDumpResponse,
        ReconcileReport
    )),
    tags(
        (name = "system", description = "System and discovery endpoints"),
        (name = "auth", description = "Login and token refresh"),
        (name = "me", description = "The caller's own account"),
        (name = "resources", description = "API resource management"),
        (name = "menus", description = "Menu tree management"),
        (name = "buttons", description = "Menu button management"),
        (name = "roles", description = "Role management"),
        (name = "users", description = "User management"),
        (name = "policies", description = "Policy graph inspection and repair")
    )
)]
pub struct ApiDoc;
