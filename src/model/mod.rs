// Model capability contract, registry and repository

pub mod registry;
pub mod repository;

pub use registry::{ModelKey, ModelRegistry, RegistryStats};
pub use repository::{locate_artifact, DirectoryRepository, ModelRepository, ModelSpec};

use crate::error::{GatewayError, Result};
use crate::inference::{InferenceRequest, InferenceResponse};
use crate::tensor::Datatype;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tensor description in model metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorMetadata {
    /// Tensor name
    pub name: String,
    /// Element datatype
    pub datatype: Datatype,
    /// Shape, with -1 for variable dimensions
    pub shape: Vec<i64>,
}

impl TensorMetadata {
    pub fn new(name: impl Into<String>, datatype: Datatype, shape: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            datatype,
            shape,
        }
    }
}

/// Model metadata served by the metadata endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,
    /// Served versions
    #[serde(default)]
    pub versions: Vec<String>,
    /// Serving platform (e.g. "sklearn", "xgboost")
    pub platform: String,
    /// Input tensors
    #[serde(default)]
    pub inputs: Vec<TensorMetadata>,
    /// Output tensors
    #[serde(default)]
    pub outputs: Vec<TensorMetadata>,
}

/// Identity and lifecycle shared by every model.
///
/// A model is constructed unready. [`Model::load`] prepares it (typically by reading
/// its artifact) and leaves it ready on success. Implementations keep `ready` in
/// interior-mutable state since models are shared across in-flight requests.
pub trait Model: Send + Sync {
    /// Model name, unique within a version scope.
    fn name(&self) -> &str;

    /// Model version, if the model is served under one.
    fn version(&self) -> Option<&str> {
        None
    }

    /// Serving platform reported in metadata.
    fn platform(&self) -> &str {
        ""
    }

    /// Whether the model can serve requests.
    fn ready(&self) -> bool;

    /// Loads the model, returning the resulting readiness.
    fn load(&self) -> Result<bool>;

    /// Metadata served by the metadata endpoints.
    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            name: self.name().to_string(),
            versions: self.version().map(|v| vec![v.to_string()]).unwrap_or_default(),
            platform: self.platform().to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

/// A model whose predictions run to completion on the calling thread.
pub trait Predictor: Model {
    fn predict(&self, request: InferenceRequest) -> Result<InferenceResponse>;

    /// Explains a prediction. Models without an explainer keep the default.
    fn explain(&self, _request: InferenceRequest) -> Result<InferenceResponse> {
        Err(GatewayError::ExplainUnsupported {
            name: self.name().to_string(),
        })
    }
}

/// A model whose predictions suspend, e.g. because they call a remote predictor.
#[async_trait]
pub trait AsyncPredictor: Model {
    async fn predict(&self, request: InferenceRequest) -> Result<InferenceResponse>;

    async fn explain(&self, _request: InferenceRequest) -> Result<InferenceResponse> {
        Err(GatewayError::ExplainUnsupported {
            name: self.name().to_string(),
        })
    }
}

/// A registered model, with its dispatch contract fixed at construction.
#[derive(Clone)]
pub enum ModelHandle {
    /// Invoked without suspension.
    Sync(Arc<dyn Predictor>),
    /// Awaited.
    Async(Arc<dyn AsyncPredictor>),
}

impl ModelHandle {
    /// Wraps a synchronous model.
    pub fn sync(model: impl Predictor + 'static) -> Self {
        ModelHandle::Sync(Arc::new(model))
    }

    /// Wraps a suspending model.
    pub fn suspending(model: impl AsyncPredictor + 'static) -> Self {
        ModelHandle::Async(Arc::new(model))
    }

    pub fn name(&self) -> &str {
        match self {
            ModelHandle::Sync(m) => m.name(),
            ModelHandle::Async(m) => m.name(),
        }
    }

    pub fn version(&self) -> Option<&str> {
        match self {
            ModelHandle::Sync(m) => m.version(),
            ModelHandle::Async(m) => m.version(),
        }
    }

    pub fn ready(&self) -> bool {
        match self {
            ModelHandle::Sync(m) => m.ready(),
            ModelHandle::Async(m) => m.ready(),
        }
    }

    pub fn load(&self) -> Result<bool> {
        match self {
            ModelHandle::Sync(m) => m.load(),
            ModelHandle::Async(m) => m.load(),
        }
    }

    pub fn metadata(&self) -> ModelMetadata {
        match self {
            ModelHandle::Sync(m) => m.metadata(),
            ModelHandle::Async(m) => m.metadata(),
        }
    }

    /// Registry key of this model.
    pub fn key(&self) -> ModelKey {
        ModelKey::new(self.name(), self.version())
    }

    /// Whether both handles point at the same model instance.
    pub fn same_instance(&self, other: &ModelHandle) -> bool {
        self.instance_ptr() == other.instance_ptr()
    }

    fn instance_ptr(&self) -> *const () {
        match self {
            ModelHandle::Sync(m) => Arc::as_ptr(m) as *const (),
            ModelHandle::Async(m) => Arc::as_ptr(m) as *const (),
        }
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            ModelHandle::Sync(_) => "sync",
            ModelHandle::Async(_) => "async",
        };
        f.debug_struct("ModelHandle")
            .field("name", &self.name())
            .field("version", &self.version())
            .field("kind", &kind)
            .field("ready", &self.ready())
            .finish()
    }
}
