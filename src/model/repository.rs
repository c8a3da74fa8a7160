// Model repository: builds unloaded models for a key

use super::ModelHandle;
use crate::config::RepositoryConfig;
use crate::error::{GatewayError, LoadFailure, Result};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// What a repository knows about a model it is asked to build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// Model name
    pub name: String,
    /// Model version
    pub version: Option<String>,
    /// Directory holding the model's artifact
    pub model_dir: PathBuf,
}

/// Source of new, unloaded model instances.
///
/// The data plane's `load` asks the repository for a fresh instance, loads it, and
/// registers it only if loading succeeded.
pub trait ModelRepository: Send + Sync {
    fn build(&self, name: &str, version: Option<&str>) -> Result<ModelHandle>;
}

type Factory = dyn Fn(ModelSpec) -> Result<ModelHandle> + Send + Sync;

/// Repository laid out as `<root>/<name>` or `<root>/<name>/<version>`.
pub struct DirectoryRepository {
    root: PathBuf,
    factory: Box<Factory>,
}

impl DirectoryRepository {
    /// Creates a repository whose models are constructed by `factory`.
    pub fn new<F>(root: impl Into<PathBuf>, factory: F) -> Self
    where
        F: Fn(ModelSpec) -> Result<ModelHandle> + Send + Sync + 'static,
    {
        Self {
            root: root.into(),
            factory: Box::new(factory),
        }
    }

    /// Creates a repository rooted at the configured `model_dir`.
    pub fn from_config<F>(config: &RepositoryConfig, factory: F) -> Self
    where
        F: Fn(ModelSpec) -> Result<ModelHandle> + Send + Sync + 'static,
    {
        Self::new(config.model_dir.clone(), factory)
    }

    /// Repository root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a model key.
    pub fn model_dir(&self, name: &str, version: Option<&str>) -> PathBuf {
        let dir = self.root.join(name);
        match version.filter(|v| !v.is_empty()) {
            Some(version) => dir.join(version),
            None => dir,
        }
    }
}

/// Names and versions must be single normal path components.
fn check_component(field: &str, value: &str) -> Result<()> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(GatewayError::InvalidModel(format!(
            "{} {:?} is not a valid repository path component",
            field, value
        ))),
    }
}

impl ModelRepository for DirectoryRepository {
    fn build(&self, name: &str, version: Option<&str>) -> Result<ModelHandle> {
        check_component("model name", name)?;
        if let Some(version) = version.filter(|v| !v.is_empty()) {
            check_component("model version", version)?;
        }

        let spec = ModelSpec {
            name: name.to_string(),
            version: version.filter(|v| !v.is_empty()).map(str::to_string),
            model_dir: self.model_dir(name, version),
        };
        debug!(model = name, dir = %spec.model_dir.display(), "Building model from repository");

        (self.factory)(spec)
    }
}

/// Finds the single model artifact in `dir` with one of `extensions`.
///
/// Only regular files directly under `dir` are considered.
pub fn locate_artifact(
    dir: &Path,
    extensions: &[&str],
) -> std::result::Result<PathBuf, LoadFailure> {
    let entries =
        std::fs::read_dir(dir).map_err(|_| LoadFailure::MissingArtifact(dir.to_path_buf()))?;

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.contains(&ext))
        })
        .collect();
    found.sort();

    match found.len() {
        0 => Err(LoadFailure::MissingArtifact(dir.to_path_buf())),
        1 => Ok(found.remove(0)),
        _ => Err(LoadFailure::AmbiguousArtifact(found)),
    }
}
