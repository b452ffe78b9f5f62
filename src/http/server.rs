//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the gateway handlers
//! - Wire up middleware (tracing, timeout, inbound rate limit)
//! - Bind server to listener and shut down gracefully
//! - Forward proxy requests through the policy executor
//! - Sweep expired rate-limit windows in the background

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::EngineConfig;
use crate::http::response::outcome_response;
use crate::http::upstream::{fetch, upstream_table, Upstream};
use crate::resilience::executor::PolicyExecutor;
use crate::resilience::partition::CallContext;
use crate::resilience::registry::PolicyRegistry;
use crate::security::rate_limit::{caller_identity, rate_limit_middleware, InboundLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub executor: PolicyExecutor,
    pub upstreams: Arc<HashMap<String, Upstream>>,
    pub client: reqwest::Client,
}

/// HTTP gateway guarding the configured upstreams.
pub struct HttpServer {
    router: Router,
    config: EngineConfig,
    registry: Arc<PolicyRegistry>,
}

impl HttpServer {
    /// Create a new server with the given configuration, on the system clock.
    pub fn new(config: EngineConfig) -> Self {
        let registry = Arc::new(PolicyRegistry::from_config(&config));
        Self::with_registry(config, registry)
    }

    /// Create a server around an existing registry.
    pub fn with_registry(config: EngineConfig, registry: Arc<PolicyRegistry>) -> Self {
        Self::from_parts(config, registry, reqwest::Client::new())
    }

    /// Create a server around an existing registry and outbound client.
    pub fn from_parts(config: EngineConfig, registry: Arc<PolicyRegistry>, client: reqwest::Client) -> Self {
        let state = AppState {
            executor: PolicyExecutor::new(Arc::clone(&registry)),
            upstreams: Arc::new(upstream_table(&config.upstreams)),
            client,
        };

        let router = Self::build_router(&config, state, &registry);
        Self {
            router,
            config,
            registry,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &EngineConfig, state: AppState, registry: &Arc<PolicyRegistry>) -> Router {
        let mut router = Router::new()
            .route("/proxy/{upstream}/{*path}", get(proxy_handler))
            .route("/health", get(health_handler))
            .route("/admin/breakers", get(breakers_handler))
            .with_state(state);

        if config.inbound_rate_limit.enabled {
            let inbound = Arc::new(InboundLimiter::new(&config.inbound_rate_limit, Arc::clone(registry.clock())));
            router = router.layer(middleware::from_fn_with_state(inbound, rate_limit_middleware));
        }

        router
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(config.server.request_timeout_secs),
            ))
            .layer(TraceLayer::new_for_http())
    }

    pub fn registry(&self) -> &Arc<PolicyRegistry> {
        &self.registry
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the server on `listener` until `shutdown` completes.
    pub async fn run<S>(self, listener: TcpListener, shutdown: S) -> Result<(), std::io::Error>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstreams = self.config.upstreams.len(),
            "HTTP server starting"
        );

        let sweeper = match self.config.server.sweep_interval_secs {
            0 => None,
            secs => Some(tokio::spawn(sweep_loop(
                Arc::clone(&self.registry),
                Duration::from_secs(secs),
            ))),
        };

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;

        if let Some(handle) = sweeper {
            handle.abort();
        }
        tracing::info!("HTTP server stopped");
        result
    }
}

async fn sweep_loop(registry: Arc<PolicyRegistry>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;
    loop {
        interval.tick().await;
        registry.sweep();
    }
}

/// Forward a GET to an upstream under its policy.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    Path((name, path)): Path<(String, String)>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let Some(upstream) = state.upstreams.get(&name) else {
        tracing::warn!(upstream = %name, "Unknown upstream");
        return (StatusCode::NOT_FOUND, format!("Unknown upstream `{name}`")).into_response();
    };

    let policy = state.executor.registry().policy(&name);
    let partition = policy.partition.derive(&CallContext {
        caller: caller_identity(&headers),
        client_ip: Some(client.ip()),
        host: upstream.host(),
        policy: &policy.policy_name,
    });

    let url = upstream.url_for(&path, uri.query());
    tracing::debug!(upstream = %name, url = %url, partition = %partition, "Proxying request");

    let client = &state.client;
    let url = &url;
    let result = state
        .executor
        .run(&name, &partition, || async move { fetch(client, url).await })
        .await;

    if let Err(e) = &result {
        tracing::warn!(upstream = %name, outcome = e.kind(), error = %e, "Guarded call failed");
    }
    outcome_response(result)
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Current breaker state for every target seen so far.
async fn breakers_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.executor.registry().snapshot())
}

/// Wait for shutdown signal (Ctrl+C).
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
