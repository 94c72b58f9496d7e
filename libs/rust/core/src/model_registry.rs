//! Model registry: every servable pipeline plus its sidecar metadata, keyed by disease.
//!
//! Built once at startup from a models directory and read-only afterwards. A file named
//! `<id>_pipeline.json` registers `<id>`; `<id>_meta.json` next to it is optional.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::ArtifactError;
use crate::pipeline::{Classifier, Pipeline};

pub const PIPELINE_SUFFIX: &str = "_pipeline.json";
pub const META_SUFFIX: &str = "_meta.json";

/// Sidecar written by the trainer. Both keys may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureMetadata {
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub feature_importances: Vec<(String, f64)>,
}

impl FeatureMetadata {
    pub fn from_path(path: &Path) -> Result<Self, ArtifactError> {
        let bytes = std::fs::read(path).map_err(|source| ArtifactError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Json { path: path.to_path_buf(), source })
    }

    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        let file = std::fs::File::create(path).map_err(|source| ArtifactError::Io { path: path.to_path_buf(), source })?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self).map_err(|source| ArtifactError::Json { path: path.to_path_buf(), source })
    }
}

#[derive(Clone)]
pub struct ModelEntry {
    pub classifier: Arc<dyn Classifier>,
    pub metadata: FeatureMetadata,
    /// Resolved at registration so requests never ask the classifier for it.
    pub supports_probability: bool,
    /// Hex sha256 of the artifact bytes, when loaded from disk.
    pub digest: Option<String>,
}

impl std::fmt::Debug for ModelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelEntry")
            .field("n_features", &self.classifier.n_features())
            .field("metadata", &self.metadata)
            .field("supports_probability", &self.supports_probability)
            .field("digest", &self.digest)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry { models: BTreeMap<String, ModelEntry> }

impl ModelRegistry {
    pub fn new() -> Self { Self::default() }

    /// Loads every `*_pipeline.json` under `dir`. Never fails: unreadable directories and
    /// broken artifacts are logged and leave the affected identifiers unregistered.
    pub fn load(dir: &Path) -> Self {
        let mut registry = Self::new();
        let read = match std::fs::read_dir(dir) {
            Ok(r) => r,
            Err(e) => { warn!(dir=%dir.display(), error=%e, "models directory unavailable"); return registry; }
        };
        let mut artifacts: Vec<(String, PathBuf)> = read
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let id = name.strip_suffix(PIPELINE_SUFFIX)?.to_string();
                if id.is_empty() { return None; }
                Some((id, entry.path()))
            })
            .collect();
        artifacts.sort();
        for (id, path) in artifacts {
            match load_entry(dir, &id, &path) {
                Ok(entry) => {
                    info!(disease=%id, path=%path.display(), features=entry.metadata.features.len(), digest=?entry.digest, "loaded model");
                    registry.models.insert(id, entry);
                }
                Err(e) => error!(disease=%id, path=%path.display(), error=%e, "failed to load model"),
            }
        }
        info!(count=registry.len(), dir=%dir.display(), "model registry ready");
        registry
    }

    pub fn insert(&mut self, id: impl Into<String>, classifier: Arc<dyn Classifier>, metadata: FeatureMetadata) {
        let supports_probability = classifier.supports_proba();
        self.models.insert(id.into(), ModelEntry { classifier, metadata, supports_probability, digest: None });
    }

    pub fn get(&self, id: &str) -> Option<&ModelEntry> { self.models.get(id) }
    pub fn contains(&self, id: &str) -> bool { self.models.contains_key(id) }
    /// Sorted.
    pub fn identifiers(&self) -> Vec<String> { self.models.keys().cloned().collect() }
    pub fn len(&self) -> usize { self.models.len() }
    pub fn is_empty(&self) -> bool { self.models.is_empty() }
}

fn pinned_digest(id: &str) -> Option<String> {
    std::env::var(format!("PREDICTOR_PIPELINE_SHA256_{}", id.to_ascii_uppercase())).ok().filter(|v| !v.is_empty())
}

fn load_entry(dir: &Path, id: &str, path: &Path) -> Result<ModelEntry, ArtifactError> {
    let bytes = std::fs::read(path).map_err(|source| ArtifactError::Io { path: path.to_path_buf(), source })?;
    let digest = hex::encode(Sha256::digest(&bytes));
    if let Some(expected) = pinned_digest(id) {
        if !expected.eq_ignore_ascii_case(&digest) { return Err(ArtifactError::DigestMismatch { expected, got: digest }); }
    }
    let pipeline = Pipeline::from_slice(&bytes, path)?;
    let meta_path = dir.join(format!("{id}{META_SUFFIX}"));
    let metadata = if meta_path.exists() { FeatureMetadata::from_path(&meta_path)? } else { FeatureMetadata::default() };
    if !metadata.features.is_empty() && metadata.features.len() != pipeline.n_features {
        return Err(ArtifactError::Invalid(format!(
            "metadata lists {} features but pipeline expects {}", metadata.features.len(), pipeline.n_features
        )));
    }
    let supports_probability = pipeline.supports_proba();
    Ok(ModelEntry { classifier: Arc::new(pipeline), metadata, supports_probability, digest: Some(digest) })
}
