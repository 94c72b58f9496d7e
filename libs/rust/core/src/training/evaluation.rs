//! Held-out evaluation: per-class precision/recall/F1, accuracy and ROC AUC.
//!
//! Accuracy and AUC come from `linfa::metrics`; the per-class rows are counted directly so each
//! row is tied to its class index regardless of how the confusion matrix orders its members.

use linfa::dataset::Pr;
use linfa::metrics::{BinaryClassification, ToConfusionMatrix};
use ndarray::Array1;
use serde::Serialize;

use crate::error::DatasetError;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClassReport {
    pub class: i64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EvaluationReport {
    pub per_class: Vec<ClassReport>,
    pub accuracy: f64,
    /// `None` when the held-out split holds a single class.
    pub roc_auc: Option<f64>,
}

fn ratio(num: usize, den: usize) -> f64 { if den == 0 { 0.0 } else { num as f64 / den as f64 } }

/// `y_true`/`y_pred` hold class indices; `scores` is the positive-class probability.
pub fn evaluate(y_true: &[usize], y_pred: &[usize], scores: &[f64], classes: [i64; 2]) -> Result<EvaluationReport, DatasetError> {
    if y_true.is_empty() || y_true.len() != y_pred.len() {
        return Err(DatasetError::Fit(format!("{} predictions for {} held-out rows", y_pred.len(), y_true.len())));
    }
    let truth = Array1::from(y_true.to_vec());
    let cm = Array1::from(y_pred.to_vec()).confusion_matrix(truth.view()).map_err(|e| DatasetError::Fit(e.to_string()))?;

    let per_class = (0..2).map(|c| {
        let tp = y_true.iter().zip(y_pred).filter(|(t, p)| **t == c && **p == c).count();
        let predicted = y_pred.iter().filter(|p| **p == c).count();
        let support = y_true.iter().filter(|t| **t == c).count();
        let (precision, recall) = (ratio(tp, predicted), ratio(tp, support));
        let f1 = if precision + recall > 0.0 { 2.0 * precision * recall / (precision + recall) } else { 0.0 };
        ClassReport { class: classes[c], precision, recall, f1, support }
    }).collect();
    Ok(EvaluationReport { per_class, accuracy: f64::from(cm.accuracy()), roc_auc: roc_auc(y_true, scores) })
}

/// Area under the ROC curve of the positive class. Needs both classes present.
pub fn roc_auc(y_true: &[usize], scores: &[f64]) -> Option<f64> {
    let n_pos = y_true.iter().filter(|&&y| y == 1).count();
    if n_pos == 0 || n_pos == y_true.len() || scores.len() != y_true.len() { return None; }
    let probs: Vec<Pr> = scores.iter().map(|&s| Pr::new(s.clamp(0.0, 1.0) as f32)).collect();
    let truth: Vec<bool> = y_true.iter().map(|&y| y == 1).collect();
    let roc = probs.as_slice().roc(truth.as_slice()).ok()?;
    Some(f64::from(roc.area_under_curve()))
}
