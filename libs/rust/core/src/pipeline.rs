//! Serialized classification pipelines: transform steps followed by a binary estimator.
//!
//! Artifacts are the JSON form of [`Pipeline`]. A pipeline is validated once when it is
//! read from disk, after which evaluation can only fail on caller-supplied rows
//! (wrong width, values that overflow during scaling).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ArtifactError, PipelineError};

pub const FORMAT_VERSION: u32 = 1;
/// Served labels are always 0 ("not likely") or 1 ("likely").
pub const BINARY_CLASSES: [i64; 2] = [0, 1];

/// Anything the registry can serve. `Pipeline` is the production implementation.
pub trait Classifier: Send + Sync {
    fn n_features(&self) -> usize;
    fn predict(&self, row: &[f64]) -> Result<i64, PipelineError>;
    /// `[p(classes[0]), p(classes[1])]`.
    fn predict_proba(&self, row: &[f64]) -> Result<[f64; 2], PipelineError>;
    fn supports_proba(&self) -> bool;
}

/// Statistic the imputer was fitted with; `statistics` already holds its per-column value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy { Median, Mean }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    /// Replaces NaN in column `i` with `statistics[i]`.
    SimpleImputer { strategy: ImputeStrategy, statistics: Vec<f64> },
    StandardScaler { mean: Vec<f64>, scale: Vec<f64> },
}

impl Transform {
    fn width(&self) -> usize {
        match self {
            Transform::SimpleImputer { statistics, .. } => statistics.len(),
            Transform::StandardScaler { mean, .. } => mean.len(),
        }
    }

    fn check(&self, n_features: usize) -> Result<(), ArtifactError> {
        if self.width() != n_features {
            return Err(ArtifactError::Invalid(format!("transform width {} != n_features {n_features}", self.width())));
        }
        match self {
            Transform::SimpleImputer { statistics, .. } => {
                if statistics.iter().any(|v| !v.is_finite()) { return Err(ArtifactError::Invalid("imputer statistic is not finite".into())); }
            }
            Transform::StandardScaler { mean, scale } => {
                if scale.len() != mean.len() { return Err(ArtifactError::Invalid("scaler mean/scale length mismatch".into())); }
                if mean.iter().any(|v| !v.is_finite()) || scale.iter().any(|v| !v.is_finite() || *v == 0.0) {
                    return Err(ArtifactError::Invalid("scaler parameters must be finite with non-zero scale".into()));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn apply(&self, row: &mut [f64]) {
        match self {
            Transform::SimpleImputer { statistics, .. } => {
                for (x, fill) in row.iter_mut().zip(statistics) { if x.is_nan() { *x = *fill; } }
            }
            Transform::StandardScaler { mean, scale } => {
                for ((x, m), s) in row.iter_mut().zip(mean).zip(scale) { *x = (*x - m) / s; }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// Rows with `row[feature] <= threshold` descend left.
    Split { feature: usize, threshold: f64, left: usize, right: usize },
    /// Class weight (or fraction) observed at the leaf, per class index.
    Leaf { value: [f64; 2] },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DecisionTree { pub nodes: Vec<TreeNode> }

impl DecisionTree {
    /// Children must sit after their parent, which rules out cycles.
    fn check(&self, tree: usize, n_features: usize) -> Result<(), ArtifactError> {
        if self.nodes.is_empty() { return Err(ArtifactError::Invalid(format!("tree {tree} has no nodes"))); }
        for (idx, node) in self.nodes.iter().enumerate() {
            let ok = match node {
                TreeNode::Split { feature, threshold, left, right } => {
                    *feature < n_features && threshold.is_finite()
                        && *left > idx && *right > idx && *left < self.nodes.len() && *right < self.nodes.len()
                }
                TreeNode::Leaf { value } => value.iter().all(|v| v.is_finite() && *v >= 0.0) && value.iter().sum::<f64>() > 0.0,
            };
            if !ok { return Err(ArtifactError::Invalid(PipelineError::MalformedTree { tree, node: idx }.to_string())); }
        }
        Ok(())
    }

    /// Normalized class distribution of the leaf `row` falls into.
    pub fn leaf_distribution(&self, tree: usize, row: &[f64]) -> Result<[f64; 2], PipelineError> {
        let mut idx = 0usize;
        // bounded walk; validated trees always terminate well before this
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(idx) {
                Some(TreeNode::Split { feature, threshold, left, right }) => {
                    let x = row.get(*feature).ok_or(PipelineError::MalformedTree { tree, node: idx })?;
                    idx = if *x <= *threshold { *left } else { *right };
                }
                Some(TreeNode::Leaf { value }) => {
                    let total = value[0] + value[1];
                    if total <= 0.0 { return Err(PipelineError::MalformedTree { tree, node: idx }); }
                    return Ok([value[0] / total, value[1] / total]);
                }
                None => return Err(PipelineError::MalformedTree { tree, node: idx }),
            }
        }
        Err(PipelineError::MalformedTree { tree, node: idx })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomForest {
    pub classes: [i64; 2],
    pub trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn predict_proba(&self, row: &[f64]) -> Result<[f64; 2], PipelineError> {
        let mut acc = [0.0f64; 2];
        for (i, tree) in self.trees.iter().enumerate() {
            let d = tree.leaf_distribution(i, row)?;
            acc[0] += d[0];
            acc[1] += d[1];
        }
        let n = self.trees.len() as f64;
        Ok([acc[0] / n, acc[1] / n])
    }
}

/// Linear max-margin classifier; exposes no probability estimates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinearSvc {
    pub classes: [i64; 2],
    pub coef: Vec<f64>,
    pub intercept: f64,
}

impl LinearSvc {
    pub fn decision(&self, row: &[f64]) -> f64 {
        self.coef.iter().zip(row).map(|(w, x)| w * x).sum::<f64>() + self.intercept
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Estimator {
    RandomForest(RandomForest),
    LinearSvc(LinearSvc),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pipeline {
    pub format_version: u32,
    pub n_features: usize,
    #[serde(default)]
    pub steps: Vec<Transform>,
    pub classifier: Estimator,
}

impl Pipeline {
    pub fn new(n_features: usize, steps: Vec<Transform>, classifier: Estimator) -> Self {
        Self { format_version: FORMAT_VERSION, n_features, steps, classifier }
    }

    pub fn from_path(path: &Path) -> Result<Self, ArtifactError> {
        let bytes = std::fs::read(path).map_err(|source| ArtifactError::Io { path: path.to_path_buf(), source })?;
        Self::from_slice(&bytes, path)
    }

    pub fn from_slice(bytes: &[u8], path: &Path) -> Result<Self, ArtifactError> {
        let pipeline: Pipeline = serde_json::from_slice(bytes).map_err(|source| ArtifactError::Json { path: path.to_path_buf(), source })?;
        pipeline.validate()?;
        Ok(pipeline)
    }

    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        let file = std::fs::File::create(path).map_err(|source| ArtifactError::Io { path: path.to_path_buf(), source })?;
        serde_json::to_writer(std::io::BufWriter::new(file), self).map_err(|source| ArtifactError::Json { path: path.to_path_buf(), source })
    }

    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.format_version != FORMAT_VERSION {
            return Err(ArtifactError::Invalid(format!("unsupported format_version {}", self.format_version)));
        }
        if self.n_features == 0 { return Err(ArtifactError::Invalid("pipeline expects zero features".into())); }
        for step in &self.steps { step.check(self.n_features)?; }
        if self.classes() != BINARY_CLASSES {
            return Err(ArtifactError::Invalid(format!("classes must be {BINARY_CLASSES:?}, found {:?}", self.classes())));
        }
        match &self.classifier {
            Estimator::RandomForest(f) => {
                if f.trees.is_empty() { return Err(ArtifactError::Invalid("random forest has no trees".into())); }
                for (i, t) in f.trees.iter().enumerate() { t.check(i, self.n_features)?; }
            }
            Estimator::LinearSvc(svc) => {
                if svc.coef.len() != self.n_features {
                    return Err(ArtifactError::Invalid(format!("svc has {} coefficients for {} features", svc.coef.len(), self.n_features)));
                }
                if svc.coef.iter().any(|w| !w.is_finite()) || !svc.intercept.is_finite() {
                    return Err(ArtifactError::Invalid("svc parameters must be finite".into()));
                }
            }
        }
        Ok(())
    }

    pub fn classes(&self) -> [i64; 2] {
        match &self.classifier { Estimator::RandomForest(f) => f.classes, Estimator::LinearSvc(s) => s.classes }
    }

    fn transform(&self, row: &[f64]) -> Result<Vec<f64>, PipelineError> {
        if row.len() != self.n_features {
            return Err(PipelineError::DimensionMismatch { expected: self.n_features, got: row.len() });
        }
        let mut out = row.to_vec();
        for step in &self.steps { step.apply(&mut out); }
        if let Some(i) = out.iter().position(|v| !v.is_finite()) { return Err(PipelineError::NonFinite(i)); }
        Ok(out)
    }
}

impl Classifier for Pipeline {
    fn n_features(&self) -> usize { self.n_features }

    fn predict(&self, row: &[f64]) -> Result<i64, PipelineError> {
        let x = self.transform(row)?;
        match &self.classifier {
            Estimator::RandomForest(f) => {
                let p = f.predict_proba(&x)?;
                // ties go to the first class
                Ok(if p[1] > p[0] { f.classes[1] } else { f.classes[0] })
            }
            Estimator::LinearSvc(svc) => Ok(if svc.decision(&x) > 0.0 { svc.classes[1] } else { svc.classes[0] }),
        }
    }

    fn predict_proba(&self, row: &[f64]) -> Result<[f64; 2], PipelineError> {
        match &self.classifier {
            Estimator::RandomForest(f) => f.predict_proba(&self.transform(row)?),
            Estimator::LinearSvc(_) => Err(PipelineError::ProbabilityUnsupported),
        }
    }

    fn supports_proba(&self) -> bool { matches!(self.classifier, Estimator::RandomForest(_)) }
}
