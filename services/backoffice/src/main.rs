//! artweb backoffice HTTP service entry point.
//!
//! # Purpose
//! Loads configuration, builds storage and the policy graph, then serves the
//! admin API and the Prometheus endpoint until shutdown.
use backoffice::app::{build_router, build_state};
use backoffice::config::BackofficeConfig;
use backoffice::{api, observability};
use std::future::Future;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BackofficeConfig::from_env_or_yaml()?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: BackofficeConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability(api::system::SERVICE_NAME);
    let state = build_state(&config).await?;
    let (stop_metrics, metrics_stopped) = tokio::sync::oneshot::channel::<()>();
    let metrics_addr = config.metrics_bind;
    let metrics_task = tokio::spawn(async move {
        let result = observability::serve_metrics(metrics_handle, metrics_addr, async {
            let _ = metrics_stopped.await;
        })
        .await;
        if let Err(err) = result {
            tracing::warn!(error = %err, %metrics_addr, "metrics listener stopped");
        }
    });

    let app = build_router(state.clone());
    let addr = config.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        backend = state.store.backend_name(),
        "backoffice listening"
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(shutdown)
        .await?;

    let _ = stop_metrics.send(());
    let _ = metrics_task.await;
    tracing::info!("backoffice stopped");
    Ok(())
}
