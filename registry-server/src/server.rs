use std::{
    net::{IpAddr, SocketAddr},
    sync::{Arc, OnceLock},
    time::Duration,
};

use axum::{
    Extension, Router,
    http::{HeaderValue, Method, StatusCode, header},
    response::IntoResponse,
    routing::get,
    serve,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use shared::config::server::{Config, LogFormat};
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    app_state::AppState,
    middleware::{
        http_metrics,
        request_context::{self, RequestIdState},
    },
    routes::{self, openapi::openapi_routes},
    services::UserRegistry,
    tracer,
};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Returns the process-wide Prometheus handle, installing the recorder on
/// first use.
pub fn metrics_handle() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if metrics::set_global_recorder(recorder).is_err() {
                warn!("a global metrics recorder is already installed");
            }
            describe_metrics();
            handle
        })
        .clone()
}

fn describe_metrics() {
    metrics::describe_counter!(
        "registry_operations_total",
        "User registry operations by outcome"
    );
    metrics::describe_gauge!("registry_users", "Users currently stored");
    metrics::describe_counter!("health_checks_total", "Health probe invocations");
    metrics::describe_counter!("http_requests_total", "HTTP requests by route and status");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        metrics::Unit::Seconds,
        "HTTP request latency"
    );
}

async fn metrics_endpoint(Extension(handle): Extension<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        handle.render(),
    )
}

/// Initializes the tracing subscriber for logging using the provided configuration.
///
/// A subscriber that is already installed is left in place.
pub fn initialize_tracing(config: &Config) -> String {
    let env_filter = build_env_filter(config);

    let fmt_builder = fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    let installed = if matches!(config.logging.format, LogFormat::Json) {
        fmt_builder.json().with_ansi(false).try_init()
    } else {
        fmt_builder.with_ansi(true).try_init()
    };
    if installed.is_err() {
        warn!("tracing subscriber already initialized");
    }

    config.logging.level.clone()
}

fn build_env_filter(config: &Config) -> EnvFilter {
    let default_level = config
        .logging
        .level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    })
}

/// Creates the application state with an empty registry.
pub fn create_app_state(config: &Config) -> Arc<AppState> {
    Arc::new(AppState::new(UserRegistry::new(&config.registry)))
}

/// Creates the CORS layer for the application.
///
/// With no configured origins, or a lone `"*"`, any origin is allowed and
/// credentials are never advertised.
pub fn create_cors_layer(config: &Config) -> CorsLayer {
    let cors_config = &config.server.cors;
    let methods = vec![
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let cors = CorsLayer::new()
        .allow_methods(AllowMethods::list(methods))
        .max_age(Duration::from_secs(cors_config.max_age_seconds));

    if cors_config.allows_any_origin() {
        return cors
            .allow_origin(AllowOrigin::any())
            .allow_headers(AllowHeaders::any());
    }

    let origins = cors_config
        .allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    cors.allow_origin(AllowOrigin::list(origins))
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(cors_config.allow_credentials)
}

/// Creates the API router with the user registry routes.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new().merge(routes::users::create_router_users())
}

/// Creates the main application router with all middleware and routes.
///
/// # Arguments
/// * `state` - Application state to share across handlers.
/// * `config` - Shared application configuration.
/// * `metrics_handle` - Prometheus handle rendered by `/metrics`.
pub fn create_app_router(
    state: Arc<AppState>,
    config: &Config,
    metrics_handle: PrometheusHandle,
) -> Router {
    let request_id_state = RequestIdState::from_config(config);

    Router::new()
        .merge(create_api_router())
        .merge(routes::health::create_health_router())
        .route("/metrics", get(metrics_endpoint))
        .merge(openapi_routes())
        .route_layer(axum::middleware::from_fn(http_metrics::track_http_metrics))
        .layer(Extension(metrics_handle))
        .layer(create_cors_layer(config))
        .layer(tracer::create_trace_layer())
        .layer(axum::middleware::from_fn_with_state(
            request_id_state,
            request_context::assign_request_id,
        ))
        .with_state(state)
}

/// Creates the graceful shutdown signal handler.
///
/// Resolves when Ctrl-C is received, or immediately if the handler cannot be
/// installed.
pub async fn create_shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
    }
    info!("Shutting down...");
}

/// Resolves the configured bind address.
///
/// # Errors
/// Returns an error if the host is not an IP address.
pub fn bind_address(config: &Config) -> Result<SocketAddr, std::net::AddrParseError> {
    let host = config.server.host.parse::<IpAddr>()?;
    Ok(SocketAddr::new(host, config.server.port))
}

/// Starts the server and binds it to the configured address.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    initialize_tracing(&config);
    info!(
        profile = ?config.profile,
        id_strategy = %config.registry.id_strategy,
        unique_email_on_update = config.registry.unique_email_on_update,
        "Starting server..."
    );

    let metrics_handle = metrics_handle();
    let state = create_app_state(&config);
    let app = create_app_router(state, &config, metrics_handle);

    let addr = bind_address(&config)?;
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    serve(listener, app)
        .with_graceful_shutdown(create_shutdown_signal())
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use shared::config::server::{Config, LogFormat, Profile};
    use std::{
        io::{self, Write},
        sync::{Arc, Mutex},
    };
    use tracing::{Subscriber, info};
    use tracing_subscriber::fmt::{self, MakeWriter};

    #[derive(Clone)]
    struct BufferMakeWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl BufferMakeWriter {
        fn new(buffer: Arc<Mutex<Vec<u8>>>) -> Self {
            Self { buffer }
        }
    }

    struct BufferWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl<'a> MakeWriter<'a> for BufferMakeWriter {
        type Writer = BufferWriter;

        fn make_writer(&'a self) -> Self::Writer {
            BufferWriter {
                buffer: Arc::clone(&self.buffer),
            }
        }
    }

    impl Write for BufferWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buffer.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn subscriber_with_writer<W>(config: &Config, writer: W) -> Box<dyn Subscriber + Send + Sync>
    where
        W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
    {
        let env_filter = super::build_env_filter(config);
        let builder = fmt::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(writer);

        if matches!(config.logging.format, LogFormat::Json) {
            Box::new(builder.json().with_ansi(false).finish())
        } else {
            Box::new(builder.with_ansi(false).finish())
        }
    }

    fn captured_line(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
        let contents = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        contents
            .lines()
            .find(|line| !line.trim().is_empty())
            .unwrap()
            .to_string()
    }

    #[test]
    fn initialize_tracing_returns_configured_level() {
        let config = Config::default_for_profile(Profile::Dev);
        assert_eq!(initialize_tracing(&config), config.logging.level);
        // A second call must not panic.
        assert_eq!(initialize_tracing(&config), config.logging.level);
    }

    #[test]
    fn json_log_format_produces_json_output() {
        let mut config = Config::default_for_profile(Profile::Dev);
        config.logging.format = LogFormat::Json;

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let subscriber = subscriber_with_writer(&config, BufferMakeWriter::new(buffer.clone()));
        let dispatch = tracing::dispatcher::Dispatch::new(subscriber);

        tracing::dispatcher::with_default(&dispatch, || {
            info!(event = "json_test", "log entry");
        });

        let value: Value = serde_json::from_str(&captured_line(&buffer)).unwrap();
        assert_eq!(value["fields"]["message"], "log entry");
        assert_eq!(value["fields"]["event"], "json_test");
    }

    #[test]
    fn text_log_format_emits_plain_events() {
        let mut config = Config::default_for_profile(Profile::Dev);
        config.logging.format = LogFormat::Text;

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let subscriber = subscriber_with_writer(&config, BufferMakeWriter::new(buffer.clone()));
        let dispatch = tracing::dispatcher::Dispatch::new(subscriber);

        tracing::dispatcher::with_default(&dispatch, || {
            info!(event = "text_test", "log entry");
        });

        let line = captured_line(&buffer);
        assert!(
            serde_json::from_str::<Value>(&line).is_err(),
            "expected plain text log line"
        );
        assert!(line.contains("log entry"));
    }

    #[test]
    fn bind_address_uses_host_and_port() {
        let mut config = Config::default_for_profile(Profile::Test);
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 9100;

        let addr = bind_address(&config).unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:9100");

        config.server.host = "localhost".to_string();
        assert!(bind_address(&config).is_err());
    }

    #[test]
    fn create_app_state_honours_id_strategy() {
        let mut config = Config::default_for_profile(Profile::Test);
        config.registry.id_strategy = shared::config::server::IdStrategy::LiveCount;

        let state = create_app_state(&config);
        assert_eq!(
            state.registry.id_strategy(),
            shared::config::server::IdStrategy::LiveCount
        );
    }

    #[test]
    fn cors_layer_accepts_credentials_with_explicit_origins() {
        let mut config = Config::default_for_profile(Profile::Test);
        config.server.cors.allowed_origins = vec!["http://localhost:3000".to_string()];
        config.server.cors.allow_credentials = true;

        // Building the layer validates the origin/credential combination.
        let _layer = create_cors_layer(&config);
    }

    #[tokio::test]
    async fn wildcard_origin_builds_an_any_origin_layer() {
        use axum::{
            body::Body,
            http::{Request, StatusCode},
        };
        use tower::ServiceExt;

        let mut config = Config::default_for_profile(Profile::Test);
        config.server.cors.allowed_origins = vec!["*".to_string()];
        config.server.cors.allow_credentials = true;

        let app = create_app_router(Arc::new(AppState::default()), &config, metrics_handle());
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/users/")
                    .header("origin", "http://example.com")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
        assert!(
            response
                .headers()
                .get("access-control-allow-credentials")
                .is_none()
        );
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_payload() {
        use axum::{
            body::{Body, to_bytes},
            http::{Request, StatusCode, header},
        };
        use tower::ServiceExt;

        let handle = super::metrics_handle();
        let config = Config::default_for_profile(Profile::Test);
        let app = super::create_app_router(Arc::new(AppState::default()), &config, handle);

        let health = app
            .clone()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
        assert_eq!(content_type, "text/plain; version=0.0.4");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(
            body.contains("health_checks_total"),
            "expected prometheus exposition format body"
        );
    }
}
