//! HTTP front for the disease prediction models.

pub mod cors;
pub mod error;
pub mod metrics;
pub mod routes;

use anyhow::{Context, Result};
use axum::http::{header, StatusCode};
use axum::middleware;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use predictor_core::{init_tracing, ModelRegistry, PredictionService, ServiceConfig};
use std::any::Any;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::cors::{cors_layer, resolve_origins, OriginPolicy};
use crate::error::detail_response;
use crate::metrics::GatewayMetrics;

pub const SERVICE_NAME: &str = "inference-gateway";

#[derive(Clone)]
pub struct AppState {
    pub service: PredictionService,
    pub metrics: GatewayMetrics,
}

impl AppState {
    pub fn new(registry: ModelRegistry) -> Result<Self> {
        let metrics = GatewayMetrics::new().context("registering metrics")?;
        metrics.models_loaded.set(registry.len() as i64);
        Ok(Self { service: PredictionService::new(Arc::new(registry)), metrics })
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let reason = err.downcast_ref::<String>().map(String::as_str).or_else(|| err.downcast_ref::<&str>().copied()).unwrap_or("unknown");
    error!(%reason, "handler panicked");
    detail_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

/// Method mismatches on known paths get the same `{detail}` body as every other error.
async fn method_not_allowed_json(response: Response) -> Response {
    if response.status() != StatusCode::METHOD_NOT_ALLOWED { return response; }
    let allow = response.headers().get(header::ALLOW).cloned();
    let mut json = detail_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    if let Some(allow) = allow { json.headers_mut().insert(header::ALLOW, allow); }
    json
}

pub fn create_router(state: AppState, origins: &OriginPolicy) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/schema/:disease", get(routes::schema))
        .route("/predict/:disease", post(routes::predict))
        .route("/metrics", get(routes::metrics))
        .fallback(routes::not_found)
        .layer(middleware::map_response(method_not_allowed_json))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors_layer(origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await { warn!(error=%e, "ctrl-c handler unavailable"); std::future::pending::<()>().await; }
    info!("shutdown requested");
}

pub async fn run() -> Result<()> {
    let cfg = ServiceConfig::load(SERVICE_NAME)?;
    init_tracing(&cfg.service_name, &cfg.log_level)?;
    let registry = ModelRegistry::load(&cfg.models_dir);
    if registry.is_empty() { warn!(dir=%cfg.models_dir.display(), "no models loaded"); }
    info!(models=?registry.identifiers(), "registry ready");

    let origins = resolve_origins(cfg.frontend_origins.as_deref());
    info!(?origins, "cors policy");
    let app = create_router(AppState::new(registry)?, &origins);
    let listener = TcpListener::bind(&cfg.bind_addr).await.with_context(|| format!("binding {}", cfg.bind_addr))?;
    info!(addr=%cfg.bind_addr, "listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    info!("server stopped");
    Ok(())
}
