//! Trains one pipeline per bundled dataset and writes the artifacts the gateway serves.

use anyhow::{bail, Result};
use predictor_core::training::{default_datasets, train_and_save, TrainOptions};
use predictor_core::{init_tracing, TrainerConfig};
use tracing::{error, info};

fn main() -> Result<()> {
    let cfg = TrainerConfig::load()?;
    init_tracing("model-trainer", &cfg.log_level)?;
    let opts = TrainOptions::from(&cfg);
    info!(data_dir=%cfg.data_dir.display(), models_dir=%cfg.models_dir.display(), n_trees=opts.n_trees, seed=opts.seed, "training started");

    let datasets = default_datasets();
    let mut trained = 0usize;
    for spec in &datasets {
        match train_and_save(&cfg.data_dir, &cfg.models_dir, spec, &opts) {
            Ok(saved) => { trained += 1; info!(dataset=%saved.name, accuracy=saved.report.accuracy, "model written"); }
            Err(e) => error!(dataset=%spec.name, error=%format!("{e:#}"), "training failed"),
        }
    }
    info!(trained, total=datasets.len(), "training finished");
    if trained == 0 { bail!("no dataset could be trained from {}", cfg.data_dir.display()); }
    Ok(())
}
