//! Core shared by the predictor services: pipelines, model registry, prediction path,
//! training and process setup (tracing, config).

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

pub mod config;
pub mod error;
pub mod model_registry;
pub mod pipeline;
pub mod prediction;
pub mod training;

pub use config::{ServiceConfig, TrainerConfig};
pub use error::{ArtifactError, DatasetError, PipelineError, PredictError};
pub use model_registry::{FeatureMetadata, ModelEntry, ModelRegistry};
pub use pipeline::{Classifier, Pipeline};
pub use prediction::{FeaturePayload, ModelSchema, PredictionOutcome, PredictionService, PREDICTION_NOTE};

fn env_flag(name: &str) -> bool {
    std::env::var(name).ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// Installs the global subscriber once. `RUST_LOG` wins over `default_level`;
/// `PREDICTOR_JSON_LOG=1` switches to flattened JSON lines.
pub fn init_tracing(service: &str, default_level: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let registry = tracing_subscriber::registry().with(env_filter);
        if env_flag("PREDICTOR_JSON_LOG") {
            registry.with(fmt::layer().json().flatten_event(true).with_current_span(true).with_span_list(false)).try_init()?;
        } else {
            registry.with(fmt::layer().with_target(true).with_thread_ids(false).with_line_number(true)).try_init()?;
        }
        Ok(())
    })?;
    info!(service, "tracing initialized");
    Ok(())
}
