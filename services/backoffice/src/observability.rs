//! Tracing, trace propagation and Prometheus wiring for the backoffice.
//!
//! # Notes
//! Initialization is `OnceLock`-guarded so tests and `main` may call it more
//! than once. Spans are exported over OTLP only when
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set; logs always go to stdout, as JSON
//! when `ARTWEB_LOG_FORMAT=json`.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static SUBSCRIBER: OnceLock<()> = OnceLock::new();
static PROPAGATOR: OnceLock<()> = OnceLock::new();

const DEFAULT_FILTER: &str = "info,sqlx=warn";
const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const LOG_FORMAT_ENV: &str = "ARTWEB_LOG_FORMAT";

/// Resource attributes copied verbatim from the environment when present.
const RESOURCE_ENV: &[(&str, &str)] = &[
    ("K8S_NAMESPACE_NAME", "k8s.namespace.name"),
    ("K8S_POD_NAME", "k8s.pod.name"),
    ("DEPLOYMENT_ENVIRONMENT", "deployment.environment"),
];

/// Install the subscriber, propagator and metrics recorder; returns the
/// handle `serve_metrics` renders from.
pub fn init_observability(service_name: &str) -> PrometheusHandle {
    SUBSCRIBER.get_or_init(|| {
        install_propagator();
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let fmt_layer = if json_logs() {
            tracing_subscriber::fmt::layer().json().boxed()
        } else {
            tracing_subscriber::fmt::layer().with_target(true).boxed()
        };
        let otel_layer = tracer_provider(service_name).map(|provider| {
            let tracer = provider.tracer(service_name.to_string());
            global::set_tracer_provider(provider);
            tracing_opentelemetry::layer().with_tracer(tracer)
        });
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .with(otel_layer)
            .try_init();
    });

    let handle = install_metrics_recorder();
    describe_metrics();
    handle
}

fn json_logs() -> bool {
    std::env::var(LOG_FORMAT_ENV)
        .map(|value| value.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn install_propagator() {
    PROPAGATOR.get_or_init(|| {
        global::set_text_map_propagator(TraceContextPropagator::new());
    });
}

fn tracer_provider(service_name: &str) -> Option<SdkTracerProvider> {
    std::env::var(OTLP_ENDPOINT_ENV).ok()?;
    let exporter = match opentelemetry_otlp::SpanExporter::builder().with_tonic().build() {
        Ok(exporter) => exporter,
        Err(err) => {
            eprintln!("otlp exporter disabled: {err}");
            return None;
        }
    };
    let resource = Resource::builder_empty()
        .with_attributes(resource_attributes(service_name))
        .build();
    Some(
        SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build(),
    )
}

fn resource_attributes(service_name: &str) -> Vec<KeyValue> {
    let instance = std::env::var("ARTWEB_SERVICE_INSTANCE_ID")
        .or_else(|_| std::env::var("HOSTNAME"))
        .ok();
    std::iter::once(KeyValue::new("service.name", service_name.to_string()))
        .chain(instance.map(|id| KeyValue::new("service.instance.id", id)))
        .chain(RESOURCE_ENV.iter().filter_map(|(env_key, attr_key)| {
            std::env::var(env_key)
                .ok()
                .map(|value| KeyValue::new(*attr_key, value))
        }))
        .collect()
}

fn describe_metrics() {
    metrics::describe_counter!(
        "artweb_policy_sync_total",
        "Policy synchronization attempts by entity kind, operation and outcome"
    );
    metrics::describe_counter!(
        "artweb_authz_decisions_total",
        "Authorization decisions taken by the request middleware"
    );
    metrics::describe_counter!("artweb_login_total", "Login attempts by outcome");
    metrics::describe_gauge!(
        "artweb_policy_rules",
        "Permission rules held by the engine after the last reconcile"
    );
    for (name, kind) in [
        ("artweb_resources_total", "resources"),
        ("artweb_menus_total", "menus"),
        ("artweb_buttons_total", "buttons"),
        ("artweb_roles_total", "roles"),
    ] {
        metrics::describe_gauge!(name, format!("Stored {kind} in the in-memory backend"));
    }
}

/// W3C trace context carried by inbound request headers, if any.
pub fn trace_context_from_headers(headers: &axum::http::HeaderMap) -> opentelemetry::Context {
    install_propagator();
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

struct HeaderExtractor<'a>(&'a axum::http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.to_str().ok()
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(axum::http::HeaderName::as_str).collect()
    }
}

fn metrics_router(handle: PrometheusHandle) -> axum::Router {
    axum::Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let body = handle.render();
            async move { body }
        }),
    )
}

/// Serve `/metrics` on `addr` until `shutdown` resolves.
pub async fn serve_metrics<F>(
    handle: PrometheusHandle,
    addr: SocketAddr,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metrics listening");
    axum::serve(listener, metrics_router(handle))
        .with_graceful_shutdown(shutdown)
        .await
}

fn install_metrics_recorder() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if metrics::set_global_recorder(recorder).is_err() {
                tracing::warn!("a global metrics recorder was already installed");
            }
            handle
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{TraceContextExt, TraceId};
    use serial_test::serial;
    use tower::ServiceExt;

    /// Run `body` with the given variables set (`Some`) or removed (`None`),
    /// restoring the previous values afterwards.
    fn with_env<R>(vars: &[(&str, Option<&str>)], body: impl FnOnce() -> R) -> R {
        let saved: Vec<(String, Option<String>)> = vars
            .iter()
            .map(|(key, _)| (key.to_string(), std::env::var(key).ok()))
            .collect();
        for (key, value) in vars {
            // SAFETY: env-mutating tests are #[serial].
            unsafe {
                match value {
                    Some(value) => std::env::set_var(key, value),
                    None => std::env::remove_var(key),
                }
            }
        }
        let result = body();
        for (key, value) in saved {
            unsafe {
                match value {
                    Some(value) => std::env::set_var(&key, value),
                    None => std::env::remove_var(&key),
                }
            }
        }
        result
    }

    fn attribute(attrs: &[KeyValue], key: &str) -> Option<String> {
        attrs
            .iter()
            .find(|attr| attr.key.as_str() == key)
            .map(|attr| attr.value.to_string())
    }

    #[test]
    #[serial]
    fn instance_id_wins_over_hostname() {
        let attrs = with_env(
            &[
                ("ARTWEB_SERVICE_INSTANCE_ID", Some("backoffice-1")),
                ("HOSTNAME", Some("host-1")),
                ("DEPLOYMENT_ENVIRONMENT", Some("staging")),
            ],
            || resource_attributes("backoffice"),
        );
        assert_eq!(attribute(&attrs, "service.name").as_deref(), Some("backoffice"));
        assert_eq!(
            attribute(&attrs, "service.instance.id").as_deref(),
            Some("backoffice-1")
        );
        assert_eq!(
            attribute(&attrs, "deployment.environment").as_deref(),
            Some("staging")
        );
    }

    #[test]
    #[serial]
    fn hostname_is_the_instance_fallback() {
        let attrs = with_env(
            &[
                ("ARTWEB_SERVICE_INSTANCE_ID", None),
                ("HOSTNAME", Some("host-2")),
                ("K8S_POD_NAME", None),
            ],
            || resource_attributes("backoffice"),
        );
        assert_eq!(
            attribute(&attrs, "service.instance.id").as_deref(),
            Some("host-2")
        );
        assert!(attribute(&attrs, "k8s.pod.name").is_none());
    }

    #[test]
    #[serial]
    fn no_endpoint_means_no_exporter() {
        let provider = with_env(&[(OTLP_ENDPOINT_ENV, None)], || tracer_provider("backoffice"));
        assert!(provider.is_none());
    }

    #[test]
    #[serial]
    fn log_format_is_case_insensitive() {
        assert!(with_env(&[(LOG_FORMAT_ENV, Some("JSON"))], json_logs));
        assert!(!with_env(&[(LOG_FORMAT_ENV, None)], json_logs));
    }

    #[test]
    fn non_utf8_header_values_are_skipped() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("tracestate", "vendor=abc".parse().unwrap());
        headers.insert(
            "traceparent",
            axum::http::HeaderValue::from_bytes(b"\xFF").unwrap(),
        );
        let extractor = HeaderExtractor(&headers);
        assert_eq!(extractor.get("tracestate"), Some("vendor=abc"));
        assert!(extractor.get("traceparent").is_none());
        assert_eq!(extractor.keys().len(), 2);
    }

    #[test]
    fn traceparent_yields_remote_span_context() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
                .parse()
                .unwrap(),
        );
        let context = trace_context_from_headers(&headers);
        let span = context.span();
        let span_ctx = span.span_context();
        assert!(span_ctx.is_remote());
        assert_eq!(
            span_ctx.trace_id(),
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap()
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    #[serial]
    async fn repeated_init_shares_one_recorder() {
        let first = init_observability("backoffice-test");
        let second = init_observability("backoffice-test");
        metrics::counter!("artweb_login_total", "outcome" => "init-test").increment(1);
        assert!(second.render().contains("init-test"));
        assert!(first.render().contains("init-test"));
    }

    #[tokio::test]
    #[serial]
    async fn metrics_route_renders_exposition() {
        let handle = install_metrics_recorder();
        metrics::counter!("artweb_login_total", "outcome" => "route-test").increment(1);
        let response = metrics_router(handle)
            .oneshot(
                axum::http::Request::builder()
                    .uri("/metrics")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&body).contains("artweb_login_total"));
    }
}
