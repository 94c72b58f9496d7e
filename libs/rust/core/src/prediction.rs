//! Request-to-prediction path: align a caller's feature map to the registered column
//! order, reject incomplete rows, then run the pipeline.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{PipelineError, PredictError};
use crate::model_registry::ModelRegistry;

pub const PREDICTION_NOTE: &str = "1 = disease likely, 0 = not likely";

/// Feature values in the order the caller sent them; `None` marks an explicit null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeaturePayload { values: Vec<(String, Option<f64>)> }

impl FeaturePayload {
    pub fn new() -> Self { Self::default() }

    /// Later duplicates replace earlier ones in place.
    pub fn insert(&mut self, name: impl Into<String>, value: Option<f64>) {
        let name = name.into();
        match self.values.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<Option<f64>> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Accepts an object of numbers, numeric strings or nulls.
    pub fn from_json(value: &Value) -> Result<Self, PredictError> {
        let obj = value.as_object().ok_or_else(|| PredictError::InvalidPayload("expected a JSON object of feature values".into()))?;
        let mut payload = Self::new();
        for (name, v) in obj {
            let parsed = match v {
                Value::Null => None,
                Value::Number(n) => Some(n.as_f64().ok_or_else(|| PredictError::InvalidPayload(format!("feature '{name}' is out of range")))?),
                Value::String(s) => Some(s.trim().parse::<f64>().ok().filter(|f| f.is_finite())
                    .ok_or_else(|| PredictError::InvalidPayload(format!("feature '{name}' is not a valid number")))?),
                _ => return Err(PredictError::InvalidPayload(format!("feature '{name}' is not a valid number"))),
            };
            payload.insert(name.clone(), parsed);
        }
        Ok(payload)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, PredictError> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| PredictError::InvalidPayload(e.to_string()))?;
        Self::from_json(&value)
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for FeaturePayload {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut p = Self::new();
        for (k, v) in iter { p.insert(k, Some(v)); }
        p
    }
}

/// Single row laid out in the column order the pipeline will see.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRow { pub columns: Vec<String>, pub values: Vec<Option<f64>> }

impl AlignedRow {
    pub fn missing(&self) -> Vec<String> {
        self.columns.iter().zip(&self.values).filter(|(_, v)| v.is_none()).map(|(c, _)| c.clone()).collect()
    }

    pub fn into_complete(self) -> Result<Vec<f64>, PredictError> {
        let missing = self.missing();
        if !missing.is_empty() { return Err(PredictError::MissingValues(missing)); }
        Ok(self.values.into_iter().flatten().collect())
    }
}

/// Reindexes `payload` to `features`. An empty feature list passes the payload through.
pub fn align_features(features: &[String], payload: &FeaturePayload) -> AlignedRow {
    if features.is_empty() {
        let (columns, values) = payload.values.iter().cloned().unzip();
        return AlignedRow { columns, values };
    }
    AlignedRow {
        columns: features.to_vec(),
        values: features.iter().map(|f| payload.get(f).flatten()).collect(),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelSchema {
    pub disease: String,
    pub features: Vec<String>,
    pub feature_importances: Vec<(String, f64)>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PredictionOutcome {
    pub disease: String,
    pub prediction: i64,
    pub probability: Option<f64>,
    pub note: &'static str,
}

#[derive(Debug, Clone)]
pub struct PredictionService { registry: Arc<ModelRegistry> }

impl PredictionService {
    pub fn new(registry: Arc<ModelRegistry>) -> Self { Self { registry } }
    pub fn registry(&self) -> &ModelRegistry { &self.registry }

    pub fn schema(&self, disease: &str) -> Result<ModelSchema, PredictError> {
        let entry = self.registry.get(disease).ok_or_else(|| PredictError::NotFound(disease.to_string()))?;
        Ok(ModelSchema {
            disease: disease.to_string(),
            features: entry.metadata.features.clone(),
            feature_importances: entry.metadata.feature_importances.clone(),
        })
    }

    pub fn predict(&self, disease: &str, payload: &FeaturePayload) -> Result<PredictionOutcome, PredictError> {
        let entry = self.registry.get(disease).ok_or_else(|| PredictError::NotFound(disease.to_string()))?;
        let row = align_features(&entry.metadata.features, payload).into_complete()?;
        debug!(disease, width=row.len(), "running inference");

        let fail = |source: PipelineError| {
            error!(disease, payload=?payload, error=%source, "prediction failed");
            PredictError::Inference { disease: disease.to_string(), source }
        };
        let probability = if entry.supports_probability {
            let p = entry.classifier.predict_proba(&row).map_err(fail)?[1];
            if !p.is_finite() { return Err(fail(PipelineError::NonFinite(1))); }
            Some(p.clamp(0.0, 1.0))
        } else {
            None
        };
        let prediction = entry.classifier.predict(&row).map_err(fail)?;
        Ok(PredictionOutcome { disease: disease.to_string(), prediction, probability, note: PREDICTION_NOTE })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_registry::FeatureMetadata;
    use crate::pipeline::tests::stump_pipeline;
    use crate::pipeline::Classifier;

    struct Exploding;
    impl Classifier for Exploding {
        fn n_features(&self) -> usize { 1 }
        fn predict(&self, _: &[f64]) -> Result<i64, PipelineError> { Err(PipelineError::NonFinite(0)) }
        fn predict_proba(&self, _: &[f64]) -> Result<[f64; 2], PipelineError> { Err(PipelineError::NonFinite(0)) }
        fn supports_proba(&self) -> bool { false }
    }

    fn service() -> PredictionService {
        let mut reg = ModelRegistry::new();
        reg.insert("diabetes", Arc::new(stump_pipeline()), FeatureMetadata {
            features: vec!["age".into(), "glucose".into()],
            feature_importances: vec![("glucose".into(), 0.8), ("age".into(), 0.2)],
        });
        reg.insert("raw", Arc::new(stump_pipeline()), FeatureMetadata::default());
        reg.insert("broken", Arc::new(Exploding), FeatureMetadata::default());
        PredictionService::new(Arc::new(reg))
    }

    #[test]
    fn aligns_to_metadata_order_and_drops_extras() {
        let payload: FeaturePayload = [("glucose", 120.0), ("zzz", 1.0), ("age", 45.0)].into_iter().collect();
        let row = align_features(&["age".to_string(), "glucose".to_string()], &payload);
        assert_eq!(row.values, vec![Some(45.0), Some(120.0)]);
        assert!(row.missing().is_empty());
    }

    #[test]
    fn missing_feature_is_reported_by_name() {
        let payload: FeaturePayload = [("age", 45.0)].into_iter().collect();
        let err = service().predict("diabetes", &payload).unwrap_err();
        assert!(err.is_invalid_input());
        assert_eq!(err.to_string(), "Missing values: ['glucose']");
    }

    #[test]
    fn explicit_null_counts_as_missing() {
        let payload = FeaturePayload::from_json(&serde_json::json!({"age": null, "glucose": 120})).unwrap();
        let err = service().predict("diabetes", &payload).unwrap_err();
        assert_eq!(err.to_string(), "Missing values: ['age']");
    }

    #[test]
    fn complete_payload_predicts_with_probability() {
        let payload: FeaturePayload = [("age", 45.0), ("glucose", 150.0)].into_iter().collect();
        let out = service().predict("diabetes", &payload).unwrap();
        assert_eq!(out.prediction, 1);
        assert_eq!(out.probability, Some(1.0));
        assert_eq!(out.note, PREDICTION_NOTE);
        assert_eq!(service().predict("diabetes", &payload).unwrap(), out);
    }

    #[test]
    fn empty_feature_list_passes_payload_through() {
        let payload: FeaturePayload = [("b", 45.0), ("a", 80.0)].into_iter().collect();
        let out = service().predict("raw", &payload).unwrap();
        assert_eq!(out.prediction, 0);
        // wrong width reaches the pipeline and fails there
        let short: FeaturePayload = [("b", 45.0)].into_iter().collect();
        assert!(service().predict("raw", &short).unwrap_err().is_internal());
    }

    #[test]
    fn unknown_disease_is_not_found() {
        let svc = service();
        assert!(svc.schema("unknown_disease").unwrap_err().is_not_found());
        assert!(svc.predict("unknown_disease", &FeaturePayload::new()).unwrap_err().is_not_found());
    }

    #[test]
    fn pipeline_failure_is_internal() {
        let payload: FeaturePayload = [("x", 1.0)].into_iter().collect();
        let err = service().predict("broken", &payload).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn schema_echoes_metadata() {
        let s = service().schema("diabetes").unwrap();
        assert_eq!(s.features, vec!["age", "glucose"]);
        assert_eq!(s.feature_importances[0].0, "glucose");
    }

    #[test]
    fn payload_rejects_non_numeric_values() {
        assert!(FeaturePayload::from_json(&serde_json::json!([1, 2])).is_err());
        assert!(FeaturePayload::from_json(&serde_json::json!({"age": "old"})).is_err());
        assert!(FeaturePayload::from_json(&serde_json::json!({"age": true})).is_err());
        let p = FeaturePayload::from_json(&serde_json::json!({"age": "45"})).unwrap();
        assert_eq!(p.get("age"), Some(Some(45.0)));
        assert!(FeaturePayload::from_slice(b"{not json").is_err());
    }
}
