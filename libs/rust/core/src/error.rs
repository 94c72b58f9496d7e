//! Error taxonomy shared by the registry, the prediction path and the trainer.

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised while evaluating a pipeline on one row.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("expected {expected} features, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("classifier does not support probability estimates")]
    ProbabilityUnsupported,
    #[error("tree {tree} is malformed at node {node}")]
    MalformedTree { tree: usize, node: usize },
    #[error("non-finite value produced for feature {0}")]
    NonFinite(usize),
}

/// Failures raised while reading or validating an artifact from disk.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("io error on {}: {source}", .path.display())]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("json error in {}: {source}", .path.display())]
    Json { path: PathBuf, #[source] source: serde_json::Error },
    #[error("invalid artifact: {0}")]
    Invalid(String),
    #[error("digest mismatch expected={expected} got={got}")]
    DigestMismatch { expected: String, got: String },
}

/// Request-level outcome of the prediction service.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Disease model not found")]
    NotFound(String),
    #[error("Missing values: {}", python_list(.0))]
    MissingValues(Vec<String>),
    #[error("Invalid JSON payload: {0}")]
    InvalidPayload(String),
    #[error("Model prediction failed")]
    Inference { disease: String, #[source] source: PipelineError },
}

impl PredictError {
    pub fn is_not_found(&self) -> bool { matches!(self, Self::NotFound(_)) }
    pub fn is_invalid_input(&self) -> bool { matches!(self, Self::MissingValues(_) | Self::InvalidPayload(_)) }
    pub fn is_internal(&self) -> bool { matches!(self, Self::Inference { .. }) }
}

/// Failures raised while reading or fitting a training dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("target column '{0}' not found")]
    MissingTarget(String),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid target value '{value}' on line {line}")]
    BadTarget { line: usize, value: String },
    #[error("expected exactly 2 target classes, found {0}")]
    ClassCount(usize),
    #[error("target classes must be 0 and 1, found {0} and {1}")]
    UnsupportedClasses(i64, i64),
    #[error("non-finite value '{value}' in column '{column}' on line {line}")]
    NonFinite { line: usize, column: String, value: String },
    #[error("features overflow after scaling: {0}")]
    Overflow(String),
    #[error("model fitting failed: {0}")]
    Fit(String),
    #[error("evaluation failed: {0}")]
    Evaluation(#[from] PipelineError),
    #[error("no numeric feature columns")]
    NoFeatures,
    #[error("too few rows per class to split ({0})")]
    TooSmall(usize),
}

/// Quotes like Python's `repr(str)`: single quotes unless the text holds `'` and no `"`.
fn python_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => { out.push('\\'); out.push(c); }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Renders names the way the frontend has always displayed them: `['a', 'b']`.
pub fn python_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| python_repr(s)).collect();
    format!("[{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_values_message_lists_names() {
        let e = PredictError::MissingValues(vec!["glucose".into(), "bmi".into()]);
        assert_eq!(e.to_string(), "Missing values: ['glucose', 'bmi']");
        assert!(e.is_invalid_input());
    }

    #[test]
    fn inference_error_hides_cause_in_display() {
        let e = PredictError::Inference { disease: "heart".into(), source: PipelineError::DimensionMismatch { expected: 3, got: 1 } };
        assert_eq!(e.to_string(), "Model prediction failed");
        assert!(e.is_internal());
    }

    #[test]
    fn empty_list_renders_brackets() { assert_eq!(python_list(&[]), "[]"); }

    #[test]
    fn quotes_follow_python_repr() {
        assert_eq!(python_list(&["a'b".into()]), r#"["a'b"]"#);
        assert_eq!(python_list(&[r#"a'b"c"#.into()]), r#"['a\'b"c']"#);
        assert_eq!(python_list(&[r"x\y".into()]), r"['x\\y']");
    }
}
