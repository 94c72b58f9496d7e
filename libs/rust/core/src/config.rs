//! Layered settings: defaults, then an optional file named by `PREDICTOR_CONFIG_FILE`,
//! then `PREDICTOR_*` environment variables (`__` separates nested keys).

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_ENV: &str = "PREDICTOR_CONFIG_FILE";
pub const ENV_PREFIX: &str = "PREDICTOR";

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub service_name: String,
    pub bind_addr: String,
    pub models_dir: PathBuf,
    pub log_level: String,
    /// Comma separated CORS allow-list.
    pub frontend_origins: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrainerConfig {
    pub data_dir: PathBuf,
    pub models_dir: PathBuf,
    pub n_trees: usize,
    pub seed: u64,
    pub test_size: f64,
    pub top_importances: usize,
    pub log_level: String,
}

fn builder(file: Option<&Path>) -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
    let mut builder = config::Config::builder()
        .set_default("models_dir", "models")?
        .set_default("log_level", "info")?;
    if let Some(f) = file {
        builder = builder.add_source(config::File::from(f).required(false));
    }
    Ok(builder)
}

fn env_file() -> Option<PathBuf> { std::env::var(CONFIG_FILE_ENV).ok().filter(|v| !v.is_empty()).map(PathBuf::from) }

impl ServiceConfig {
    pub fn load(service: &str) -> Result<Self> { Self::load_from(service, env_file().as_deref()) }

    pub fn load_from(service: &str, file: Option<&Path>) -> Result<Self> {
        let cfg = builder(file)?
            .set_default("service_name", service)?
            .set_default("bind_addr", "0.0.0.0:8000")?
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}

impl TrainerConfig {
    pub fn load() -> Result<Self> { Self::load_from(env_file().as_deref()) }

    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let cfg = builder(file)?
            .set_default("data_dir", "data")?
            .set_default("n_trees", 200)?
            .set_default("seed", 42)?
            .set_default("test_size", 0.2)?
            .set_default("top_importances", 10)?
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn service_defaults() {
        let cfg = ServiceConfig::load_from("inference-gateway", None).unwrap();
        assert_eq!(cfg.service_name, "inference-gateway");
        assert_eq!(cfg.models_dir, PathBuf::from("models"));
        assert_eq!(cfg.bind_addr, "0.0.0.0:8000");
    }

    #[test]
    fn file_overrides_defaults() {
        let mut f = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(f, "models_dir: /srv/models\nfrontend_origins: \"https://a.example,https://b.example\"").unwrap();
        let cfg = ServiceConfig::load_from("svc", Some(f.path())).unwrap();
        assert_eq!(cfg.models_dir, PathBuf::from("/srv/models"));
        assert_eq!(cfg.frontend_origins.as_deref(), Some("https://a.example,https://b.example"));
    }

    #[test]
    fn trainer_defaults() {
        let cfg = TrainerConfig::load_from(None).unwrap();
        assert_eq!(cfg.n_trees, 200);
        assert_eq!(cfg.seed, 42);
        assert!((cfg.test_size - 0.2).abs() < 1e-12);
        assert_eq!(cfg.top_importances, 10);
    }
}
