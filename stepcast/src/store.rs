//! Model stores hand raw artifacts to the service by name

use crate::artifact::{validate_artifact_from, ArtifactValue, ModelArtifact};
use crate::error::{ForecastError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Source of model artifacts
pub trait ModelStore: Send + Sync {
    /// Raw artifact stored under `name`
    fn load(&self, name: &str) -> Result<ArtifactValue>;

    /// Names of the stored artifacts, sorted
    fn list(&self) -> Result<Vec<String>>;

    /// Load and validate in one go
    fn load_artifact(&self, name: &str) -> Result<ModelArtifact> {
        let raw = self.load(name)?;
        validate_artifact_from(&raw, Some(name))
    }
}

/// Artifacts kept in memory
#[derive(Debug, Default)]
pub struct InMemoryModelStore {
    models: RwLock<BTreeMap<String, ArtifactValue>>,
}

impl InMemoryModelStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an artifact
    pub fn insert(&self, name: impl Into<String>, artifact: ArtifactValue) {
        self.models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), artifact);
    }
}

impl ModelStore for InMemoryModelStore {
    fn load(&self, name: &str) -> Result<ArtifactValue> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ForecastError::DataError(format!("Model '{}' not found", name)))
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }
}

/// JSON manifests (`*.json`) in a directory
#[derive(Debug, Clone)]
pub struct DirectoryModelStore {
    dir: PathBuf,
}

impl DirectoryModelStore {
    /// Serve the manifests in `dir`; the directory is read on each call
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Directory being served
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn manifest_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(ForecastError::InvalidParameter(format!(
                "Invalid model name '{}'",
                name
            )));
        }

        let file = if name.ends_with(".json") {
            name.to_string()
        } else {
            format!("{}.json", name)
        };
        Ok(self.dir.join(file))
    }
}

impl ModelStore for DirectoryModelStore {
    fn load(&self, name: &str) -> Result<ArtifactValue> {
        let path = self.manifest_path(name)?;
        if !path.is_file() {
            return Err(ForecastError::DataError(format!(
                "Model '{}' not found in {}",
                name,
                self.dir.display()
            )));
        }

        debug!("Reading model manifest {}", path.display());
        let text = std::fs::read_to_string(&path)?;
        ArtifactValue::from_manifest_str(&text)
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().map_or(false, |e| e == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
