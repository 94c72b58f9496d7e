//! Offline training: CSV dataset -> median imputer -> standard scaler -> random forest.
//!
//! Produces the two artifacts the registry consumes, `<name>_pipeline.json` and
//! `<name>_meta.json`.

pub mod dataset;
pub mod evaluation;
pub mod forest;
pub mod preprocess;

use anyhow::{Context, Result};
use ndarray::Array1;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::TrainerConfig;
use crate::error::DatasetError;
use crate::model_registry::{FeatureMetadata, META_SUFFIX, PIPELINE_SUFFIX};
use crate::pipeline::{Classifier, Estimator, ImputeStrategy, Pipeline};

pub use dataset::{stratified_split, Dataset};
pub use evaluation::{evaluate, roc_auc, ClassReport, EvaluationReport};
pub use forest::{fit_forest, ForestParams, FittedForest};

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSpec { pub file: String, pub target: String, pub name: String }

impl DatasetSpec {
    pub fn new(file: &str, target: &str, name: &str) -> Self {
        Self { file: file.into(), target: target.into(), name: name.into() }
    }
}

pub fn default_datasets() -> Vec<DatasetSpec> {
    vec![
        DatasetSpec::new("diabetes.csv", "Outcome", "diabetes"),
        DatasetSpec::new("heart.csv", "target", "heart"),
        DatasetSpec::new("breast_cancer.csv", "target", "breast_cancer"),
    ]
}

#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub n_trees: usize,
    pub seed: u64,
    pub test_size: f64,
    pub top_importances: usize,
}

impl Default for TrainOptions {
    fn default() -> Self { Self { n_trees: 200, seed: 42, test_size: 0.2, top_importances: 10 } }
}

impl From<&TrainerConfig> for TrainOptions {
    fn from(c: &TrainerConfig) -> Self {
        Self { n_trees: c.n_trees, seed: c.seed, test_size: c.test_size, top_importances: c.top_importances }
    }
}

#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub pipeline: Pipeline,
    pub metadata: FeatureMetadata,
    pub report: EvaluationReport,
}

pub fn train(ds: &Dataset, opts: &TrainOptions) -> Result<TrainedModel, DatasetError> {
    let n_features = ds.features.len();
    let (train_idx, test_idx) = stratified_split(&ds.labels, opts.test_size, opts.seed)?;
    let (x_train, y_train) = ds.subset(&train_idx);
    let (x_test, y_test) = ds.subset(&test_idx);

    let mut x_train = preprocess::to_matrix(&x_train, n_features)?;
    let y_train = Array1::from(y_train);
    let imputer = preprocess::fit_impute(&mut x_train, ImputeStrategy::Median);
    let (scaler, x_train) = preprocess::fit_scaler(x_train, &y_train, &ds.features)?;

    let params = ForestParams { n_trees: opts.n_trees, seed: opts.seed, ..Default::default() };
    let fitted = fit_forest(&x_train, &y_train, ds.classes, &params)?;
    let pipeline = Pipeline::new(n_features, vec![imputer, scaler], Estimator::RandomForest(fitted.forest));
    pipeline.validate().map_err(|e| DatasetError::Fit(e.to_string()))?;

    let mut y_pred = Vec::with_capacity(x_test.len());
    let mut scores = Vec::with_capacity(x_test.len());
    for row in &x_test {
        let p = pipeline.predict_proba(row)?;
        y_pred.push(usize::from(p[1] > p[0]));
        scores.push(p[1]);
    }
    let report = evaluate(&y_test, &y_pred, &scores, ds.classes)?;

    let mut ranked: Vec<(String, f64)> = ds.features.iter().cloned().zip(fitted.importances).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(opts.top_importances);
    let metadata = FeatureMetadata { features: ds.features.clone(), feature_importances: ranked };
    Ok(TrainedModel { pipeline, metadata, report })
}

#[derive(Debug, Clone)]
pub struct SavedModel { pub name: String, pub pipeline_path: PathBuf, pub meta_path: PathBuf, pub report: EvaluationReport }

pub fn train_and_save(data_dir: &Path, models_dir: &Path, spec: &DatasetSpec, opts: &TrainOptions) -> Result<SavedModel> {
    let ds = Dataset::from_csv(&data_dir.join(&spec.file), &spec.target).with_context(|| format!("loading {}", spec.file))?;
    info!(dataset=%spec.name, rows=ds.len(), features=ds.features.len(), "training");
    let trained = train(&ds, opts).with_context(|| format!("training {}", spec.name))?;
    log_report(&spec.name, &trained.report);

    std::fs::create_dir_all(models_dir).with_context(|| format!("creating {}", models_dir.display()))?;
    let pipeline_path = models_dir.join(format!("{}{PIPELINE_SUFFIX}", spec.name));
    trained.pipeline.save(&pipeline_path)?;
    info!(path=%pipeline_path.display(), "saved pipeline");
    let meta_path = models_dir.join(format!("{}{META_SUFFIX}", spec.name));
    trained.metadata.save(&meta_path)?;
    info!(path=%meta_path.display(), "saved metadata");
    Ok(SavedModel { name: spec.name.clone(), pipeline_path, meta_path, report: trained.report })
}

fn log_report(name: &str, r: &EvaluationReport) {
    for c in &r.per_class {
        info!(dataset=name, class=c.class, precision=c.precision, recall=c.recall, f1=c.f1, support=c.support, "class report");
    }
    info!(dataset=name, accuracy=r.accuracy, roc_auc=?r.roc_auc, "evaluation");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic() -> Dataset {
        let rows: Vec<Vec<f64>> = (0..80).map(|i| {
            let glucose = if i % 10 == 3 { f64::NAN } else { 80.0 + i as f64 };
            vec![20.0 + (i % 17) as f64, glucose]
        }).collect();
        let labels = (0..80).map(|i| usize::from(i >= 40)).collect();
        Dataset { features: vec!["age".into(), "glucose".into()], rows, labels, classes: [0, 1] }
    }

    #[test]
    fn trained_pipeline_round_trips_through_registry_format() {
        let opts = TrainOptions { n_trees: 15, ..Default::default() };
        let trained = train(&synthetic(), &opts).unwrap();
        assert_eq!(trained.pipeline.n_features, 2);
        assert!(trained.pipeline.validate().is_ok());
        assert_eq!(trained.metadata.features, vec!["age", "glucose"]);
        assert_eq!(trained.metadata.feature_importances[0].0, "glucose");
        assert!(trained.report.accuracy >= 0.75);
        assert!(trained.report.roc_auc.is_some());
    }

    #[test]
    fn importances_are_truncated() {
        let opts = TrainOptions { n_trees: 5, top_importances: 1, ..Default::default() };
        let trained = train(&synthetic(), &opts).unwrap();
        assert_eq!(trained.metadata.feature_importances.len(), 1);
    }

    #[test]
    fn overflowing_features_fail_instead_of_crashing() {
        let mut ds = synthetic();
        for (i, row) in ds.rows.iter_mut().enumerate() { row[0] = if i % 2 == 0 { 1.7e308 } else { -1.7e308 }; }
        assert!(matches!(train(&ds, &TrainOptions { n_trees: 3, ..Default::default() }), Err(DatasetError::Overflow(_))));
    }
}
