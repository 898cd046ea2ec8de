//! Backoffice HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, attaches the authorization and trace layers, and
//! assembles the shared state handlers read from.
//!
//! # Notes
//! `build_state` also seeds the configured administrator and rebuilds the
//! policy graph from storage, so a returned state is ready to serve.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::api::types::FeatureFlags;
use crate::auth;
use crate::auth::rbac::bootstrap::{BootstrapReconciler, seed_admin};
use crate::auth::rbac::sync::{SyncContext, SyncCoordinator};
use crate::auth::throttle::{InMemoryThrottle, LoginThrottle};
use crate::auth::token::TokenIssuer;
use crate::config::{BackofficeConfig, SecurityConfig, StorageBackend};
use crate::observability;
use crate::store::{AdminStore, memory::InMemoryStore, postgres::PostgresStore};
use anyhow::Context;
use artweb_authz::PolicyStore;
use axum::Router;
use axum::routing::{get, patch, post};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::OpenApi;

pub const API_VERSION: &str = "v1";

#[derive(Clone)]
pub struct AppState {
    pub api_version: String,
    pub features: FeatureFlags,
    pub store: Arc<dyn AdminStore>,
    pub policies: PolicyStore,
    pub sync: SyncCoordinator,
    pub reconciler: BootstrapReconciler,
    pub tokens: TokenIssuer,
    pub throttle: Arc<dyn LoginThrottle>,
    pub security: SecurityConfig,
    pub request_timeout: Duration,
}

impl AppState {
    pub async fn new(
        store: Arc<dyn AdminStore>,
        security: SecurityConfig,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let policies = PolicyStore::new()
            .await
            .context("failed to build policy engine")?;
        let tokens = TokenIssuer::from_config(&security).context("invalid token settings")?;
        let sync = SyncCoordinator::new(store.clone(), policies.clone());
        Ok(AppState {
            api_version: API_VERSION.to_string(),
            features: FeatureFlags {
                durable_storage: store.is_durable(),
                persistent_policies: false,
                login_throttle: true,
            },
            reconciler: BootstrapReconciler::new(sync.clone()),
            sync,
            store,
            policies,
            tokens,
            throttle: Arc::new(InMemoryThrottle::new()),
            security,
            request_timeout,
        })
    }
}

pub async fn build_state(config: &BackofficeConfig) -> anyhow::Result<AppState> {
    let store: Arc<dyn AdminStore> = match config.storage {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .context("postgres configuration missing")?;
            Arc::new(PostgresStore::connect(pg).await?)
        }
    };
    let state = AppState::new(store, config.security.clone(), config.request_timeout()).await?;

    let ctx = SyncContext::background();
    if let Some(seed) = &config.admin {
        if let Some(user) = seed_admin(&ctx, &state.sync, seed).await? {
            tracing::info!(user_id = user.id, username = %user.username, "seeded administrator");
        }
    }
    let report = state.reconciler.reconcile(&ctx).await?;
    tracing::info!(
        rules = report.rules,
        edges = report.edges,
        skipped_links = report.skipped_links,
        skipped_rules = report.skipped_rules,
        "policy graph rebuilt from storage"
    );
    Ok(state)
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    Router::new()
        .route("/v1/system/info", get(api::system::system_info))
        .route("/v1/system/health", get(api::system::system_health))
        .route(auth::middleware::LOGIN_PATH, post(auth::login::login))
        .route(auth::middleware::REFRESH_PATH, post(auth::login::refresh))
        .route("/api/v1/me/password", patch(api::me::change_password))
        .route("/api/v1/me/records/login", get(api::me::my_login_records))
        .route(
            "/api/v1/customer/resources",
            get(api::resources::list_resources).post(api::resources::create_resource),
        )
        .route(
            "/api/v1/customer/resources/:id",
            get(api::resources::get_resource)
                .put(api::resources::update_resource)
                .delete(api::resources::delete_resource),
        )
        .route(
            "/api/v1/customer/menus",
            get(api::menus::list_menus).post(api::menus::create_menu),
        )
        .route(
            "/api/v1/customer/menus/:id",
            get(api::menus::get_menu)
                .put(api::menus::update_menu)
                .delete(api::menus::delete_menu),
        )
        .route(
            "/api/v1/customer/buttons",
            get(api::buttons::list_buttons).post(api::buttons::create_button),
        )
        .route(
            "/api/v1/customer/buttons/:id",
            get(api::buttons::get_button)
                .put(api::buttons::update_button)
                .delete(api::buttons::delete_button),
        )
        .route(
            "/api/v1/customer/roles",
            get(api::roles::list_roles).post(api::roles::create_role),
        )
        .route(
            "/api/v1/customer/roles/:id",
            get(api::roles::get_role)
                .put(api::roles::update_role)
                .delete(api::roles::delete_role),
        )
        .route(
            "/api/v1/customer/users",
            get(api::users::list_users).post(api::users::create_user),
        )
        .route(
            "/api/v1/customer/users/:id",
            get(api::users::get_user)
                .put(api::users::update_user)
                .delete(api::users::delete_user),
        )
        .route(
            "/api/v1/customer/users/:id/password",
            patch(api::users::reset_password),
        )
        .route(
            "/api/v1/customer/users/records/login",
            get(api::users::list_login_records),
        )
        .route(
            "/api/v1/customer/policies",
            get(api::policies::list_policies),
        )
        .route(
            "/api/v1/customer/policies/reconcile",
            post(api::policies::reconcile_policies),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::authorize,
        ))
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs").url("/v1/openapi.json", ApiDoc::openapi()),
        )
        .layer(trace_layer)
        .with_state(state)
}
