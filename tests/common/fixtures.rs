//! Test fixtures: stub models and model directories.

use async_trait::async_trait;
use infergate::model::{
    locate_artifact, DirectoryRepository, ModelMetadata, ModelSpec, TensorMetadata,
};
use infergate::{
    AsyncPredictor, Datatype, GatewayError, InferenceRequest, InferenceResponse, Model, ModelHandle,
    Predictor, Result, Tensor, TensorData,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Artifact extensions the file-backed model accepts
pub const ARTIFACT_EXTENSIONS: &[&str] = &["joblib", "pkl", "pickle"];

/// Classifier stub that predicts class 1 for every row it receives.
pub struct IrisModel {
    name: String,
    version: Option<String>,
    ready: AtomicBool,
    /// Rows seen by each predict call
    pub received: Mutex<Vec<Vec<Value>>>,
}

impl IrisModel {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            version: None,
            ready: AtomicBool::new(true),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn versioned(name: &str, version: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            version: Some(version.to_string()),
            ready: AtomicBool::new(true),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn unready(name: &str) -> Arc<Self> {
        let model = Self::new(name);
        model.ready.store(false, Ordering::SeqCst);
        model
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn handle(self: &Arc<Self>) -> ModelHandle {
        ModelHandle::Sync(self.clone())
    }
}

impl Model for IrisModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn platform(&self) -> &str {
        "sklearn"
    }

    fn ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn load(&self) -> Result<bool> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(true)
    }

    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            name: self.name.clone(),
            versions: self.version.iter().cloned().collect(),
            platform: "sklearn".to_string(),
            inputs: vec![TensorMetadata::new("input-0", Datatype::Fp32, vec![-1, 4])],
            outputs: vec![TensorMetadata::new("predict", Datatype::Int64, vec![-1])],
        }
    }
}

impl Predictor for IrisModel {
    fn predict(&self, request: InferenceRequest) -> Result<InferenceResponse> {
        let rows = request.instances()?;
        let classes = vec![1i64; rows.len()];
        self.received.lock().push(rows);

        let output = Tensor::int64("predict", vec![classes.len() as u64], classes)?;
        Ok(InferenceResponse::for_request(&request, vec![output]))
    }
}

/// Suspending model that answers with its own tag after a delay.
pub struct TaggedModel {
    name: String,
    tag: String,
    delay: Duration,
    /// Predictions started
    pub started: AtomicUsize,
}

impl TaggedModel {
    pub fn new(name: &str, tag: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            tag: tag.to_string(),
            delay,
            started: AtomicUsize::new(0),
        })
    }

    pub fn handle(self: &Arc<Self>) -> ModelHandle {
        ModelHandle::Async(self.clone())
    }
}

impl Model for TaggedModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn ready(&self) -> bool {
        true
    }

    fn load(&self) -> Result<bool> {
        Ok(true)
    }
}

#[async_trait]
impl AsyncPredictor for TaggedModel {
    async fn predict(&self, request: InferenceRequest) -> Result<InferenceResponse> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let output = Tensor::bytes("tag", vec![1], vec![self.tag.as_bytes().to_vec()])?;
        Ok(InferenceResponse::for_request(&request, vec![output]))
    }

    async fn explain(&self, request: InferenceRequest) -> Result<InferenceResponse> {
        let output = Tensor::bytes("explanation", vec![1], vec![b"because".to_vec()])?;
        Ok(InferenceResponse::for_request(&request, vec![output]))
    }
}

/// Model that faults on every prediction.
pub struct FaultyModel;

impl Model for FaultyModel {
    fn name(&self) -> &str {
        "faulty"
    }

    fn ready(&self) -> bool {
        true
    }

    fn load(&self) -> Result<bool> {
        Ok(true)
    }
}

impl Predictor for FaultyModel {
    fn predict(&self, _request: InferenceRequest) -> Result<InferenceResponse> {
        Err(GatewayError::Internal("division by zero".to_string()))
    }
}

/// Model whose output declares INT64 but carries floats.
pub struct MistypedOutputModel;

impl Model for MistypedOutputModel {
    fn name(&self) -> &str {
        "mistyped"
    }

    fn ready(&self) -> bool {
        true
    }

    fn load(&self) -> Result<bool> {
        Ok(true)
    }
}

impl Predictor for MistypedOutputModel {
    fn predict(&self, request: InferenceRequest) -> Result<InferenceResponse> {
        let mut output = Tensor::int64("predict", vec![2], vec![1, 1])?;
        output.data = TensorData::Fp32(vec![0.5, 0.5]);
        Ok(InferenceResponse::for_request(&request, vec![output]))
    }
}

/// Model backed by a single artifact file in its model directory.
pub struct ArtifactModel {
    spec: ModelSpec,
    ready: AtomicBool,
    artifact: Mutex<Option<PathBuf>>,
}

impl ArtifactModel {
    pub fn new(spec: ModelSpec) -> Self {
        Self {
            spec,
            ready: AtomicBool::new(false),
            artifact: Mutex::new(None),
        }
    }
}

impl Model for ArtifactModel {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn version(&self) -> Option<&str> {
        self.spec.version.as_deref()
    }

    fn ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn load(&self) -> Result<bool> {
        let artifact = locate_artifact(&self.spec.model_dir, ARTIFACT_EXTENSIONS).map_err(|reason| {
            GatewayError::LoadFailed {
                name: self.spec.name.clone(),
                reason,
            }
        })?;
        *self.artifact.lock() = Some(artifact);
        self.ready.store(true, Ordering::SeqCst);
        Ok(true)
    }
}

impl Predictor for ArtifactModel {
    fn predict(&self, request: InferenceRequest) -> Result<InferenceResponse> {
        let rows = request.instances()?;
        let output = Tensor::int64("predict", vec![rows.len() as u64], vec![0; rows.len()])?;
        Ok(InferenceResponse::for_request(&request, vec![output]))
    }
}

/// A temporary model repository root.
pub struct ModelDir {
    pub temp_dir: TempDir,
}

impl ModelDir {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Creates `<root>/<model>/<file>` for each file.
    pub fn add(&self, model: &str, files: &[&str]) -> PathBuf {
        let dir = self.root().join(model);
        std::fs::create_dir_all(&dir).expect("Failed to create model dir");
        for file in files {
            std::fs::write(dir.join(file), b"artifact").expect("Failed to write artifact");
        }
        dir
    }

    /// Repository building [`ArtifactModel`]s under this root.
    pub fn repository(&self) -> Arc<DirectoryRepository> {
        Arc::new(DirectoryRepository::new(self.root(), |spec| {
            Ok(ModelHandle::sync(ArtifactModel::new(spec)))
        }))
    }
}

impl Default for ModelDir {
    fn default() -> Self {
        Self::new()
    }
}

/// The v2 REST body for the two-row iris request.
pub fn iris_v2_body() -> Value {
    json!({
        "id": "iris-1",
        "inputs": [{
            "name": "input-0",
            "shape": [2, 4],
            "datatype": "FP32",
            "data": [6.8, 2.8, 4.8, 1.4, 6.0, 3.4, 4.5, 1.6]
        }]
    })
}
