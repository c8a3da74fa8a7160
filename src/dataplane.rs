//! Protocol-neutral orchestration over the model registry.
//!
//! The [`DataPlane`] is shared by every adapter. It holds no per-request state:
//! each operation resolves the model it needs from the registry, invokes it, and
//! returns either a canonical value or a [`GatewayError`] for the adapter to map.
//!
//! Synchronous models run inline on the request task unless a blocking worker
//! pool is configured, in which case they run on tokio's blocking threads with
//! at most `blocking_workers` in flight. Suspending models are awaited.

use crate::config::{DispatchConfig, GatewayConfig, ServerInfo};
use crate::error::{GatewayError, Result};
use crate::inference::{InferenceRequest, InferenceResponse};
use crate::model::{ModelHandle, ModelKey, ModelMetadata, ModelRegistry, ModelRepository, Predictor};
use crate::observability;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Protocol extensions this gateway implements.
pub const EXTENSIONS: &[&str] = &["model_repository_extension"];

/// Server metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMetadata {
    pub name: String,
    pub version: String,
    pub extensions: Vec<String>,
}

/// Data plane statistics
#[derive(Debug, Default)]
pub struct DataPlaneStats {
    /// Predictions requested
    pub infer_requests: AtomicU64,
    /// Explanations requested
    pub explain_requests: AtomicU64,
    /// Predictions or explanations that faulted
    pub failures: AtomicU64,
    /// Successful loads
    pub loads: AtomicU64,
    /// Failed loads
    pub load_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Predict,
    Explain,
}

impl Operation {
    fn as_str(&self) -> &'static str {
        match self {
            Operation::Predict => "predict",
            Operation::Explain => "explain",
        }
    }
}

/// Data plane over one registry
pub struct DataPlane {
    registry: Arc<ModelRegistry>,
    repository: Option<Arc<dyn ModelRepository>>,
    /// Bounds synchronous model calls on the blocking pool, if configured
    blocking: Option<Arc<Semaphore>>,
    server: ServerInfo,
    stats: DataPlaneStats,
}

impl DataPlane {
    /// Creates a data plane with an empty registry and no repository
    pub fn new(server: ServerInfo, dispatch: &DispatchConfig) -> Self {
        Self {
            registry: Arc::new(ModelRegistry::new()),
            repository: None,
            blocking: dispatch
                .blocking_workers
                .map(|workers| Arc::new(Semaphore::new(workers))),
            server,
            stats: DataPlaneStats::default(),
        }
    }

    /// Creates a data plane from gateway configuration
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.server.clone(), &config.dispatch)
    }

    /// Sets the repository that `load` builds models from
    pub fn with_repository(mut self, repository: Arc<dyn ModelRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// The registry this data plane serves
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Gets statistics
    pub fn stats(&self) -> &DataPlaneStats {
        &self.stats
    }

    /// Liveness. The process answering is the whole check.
    pub fn live(&self) -> bool {
        true
    }

    /// Readiness: every registered model is ready.
    pub fn ready(&self) -> bool {
        self.registry.readiness_all()
    }

    /// Registered keys
    pub fn list(&self) -> Vec<ModelKey> {
        self.registry.all()
    }

    pub fn model_ready(&self, name: &str, version: Option<&str>) -> Result<bool> {
        Ok(self.registry.lookup(name, version)?.ready())
    }

    pub fn metadata(&self, name: &str, version: Option<&str>) -> Result<ModelMetadata> {
        Ok(self.registry.lookup(name, version)?.metadata())
    }

    pub fn server_metadata(&self) -> ServerMetadata {
        ServerMetadata {
            name: self.server.name.clone(),
            version: self.server.version.clone(),
            extensions: EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Installs an already-built model.
    pub fn register(&self, handle: ModelHandle) -> Result<()> {
        self.registry.register(handle)?;
        observability::record_model_event("registered");
        Ok(())
    }

    /// Runs a prediction on the model the request names.
    pub async fn infer(&self, request: InferenceRequest) -> Result<InferenceResponse> {
        self.stats.infer_requests.fetch_add(1, Ordering::Relaxed);
        self.dispatch(Operation::Predict, request).await
    }

    /// Runs an explanation on the model the request names.
    pub async fn explain(&self, request: InferenceRequest) -> Result<InferenceResponse> {
        self.stats.explain_requests.fetch_add(1, Ordering::Relaxed);
        self.dispatch(Operation::Explain, request).await
    }

    async fn dispatch(
        &self,
        op: Operation,
        request: InferenceRequest,
    ) -> Result<InferenceResponse> {
        let handle = self
            .registry
            .lookup(&request.model_name, request.model_version.as_deref())?;

        let request = if request.id.is_some() {
            request
        } else {
            request.with_id(Some(uuid::Uuid::new_v4().to_string()))
        };

        let name = request.model_name.clone();
        debug!(
            model = %name,
            id = request.id.as_deref().unwrap_or_default(),
            operation = op.as_str(),
            "Dispatching to model"
        );

        let result = self.invoke(handle, op, request).await;
        result.map_err(|e| {
            self.stats.failures.fetch_add(1, Ordering::Relaxed);
            let e = match e {
                GatewayError::ExplainUnsupported { .. } | GatewayError::InferenceFailed { .. } => {
                    e
                }
                other => GatewayError::inference(&name, other),
            };
            warn!(model = %name, operation = op.as_str(), error = %e, "Model invocation failed");
            e
        })
    }

    async fn invoke(
        &self,
        handle: ModelHandle,
        op: Operation,
        request: InferenceRequest,
    ) -> Result<InferenceResponse> {
        match handle {
            ModelHandle::Async(model) => match op {
                Operation::Predict => model.predict(request).await,
                Operation::Explain => model.explain(request).await,
            },
            ModelHandle::Sync(model) => match &self.blocking {
                None => run_sync(model.as_ref(), op, request),
                Some(pool) => {
                    let permit = pool
                        .clone()
                        .acquire_owned()
                        .await
                        .map_err(|_| GatewayError::Internal("Blocking pool closed".to_string()))?;
                    let name = request.model_name.clone();
                    tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        run_sync(model.as_ref(), op, request)
                    })
                    .await
                    .map_err(|e| {
                        GatewayError::inference(name, format!("worker task failed: {}", e))
                    })?
                }
            },
        }
    }

    /// Builds (or reuses) a model, loads it, and registers it if loading succeeded.
    ///
    /// With a repository a fresh instance is built for the key. Without one, an
    /// already registered model is loaded again in place.
    pub async fn load(&self, name: &str, version: Option<&str>) -> Result<bool> {
        let handle = match &self.repository {
            Some(repository) => repository.build(name, version)?,
            None => self.registry.get(name, version).ok_or_else(|| {
                GatewayError::load_failed(
                    name,
                    "model is not registered and no repository is configured",
                )
            })?,
        };

        let loader = handle.clone();
        let loaded = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| GatewayError::load_failed(name, format!("load task failed: {}", e)))
            .and_then(|result| {
                result.map_err(|e| match e {
                    GatewayError::LoadFailed { .. } => e,
                    other => GatewayError::load_failed(name, other.to_string()),
                })
            })
            .and_then(|ready| {
                if ready {
                    Ok(())
                } else {
                    Err(GatewayError::load_failed(name, "model is not ready after load"))
                }
            });

        if let Err(e) = loaded {
            self.stats.load_failures.fetch_add(1, Ordering::Relaxed);
            observability::record_model_event("load_failed");
            warn!(model = name, version = ?version, error = %e, "Model load failed");
            return Err(e);
        }

        self.registry.register(handle)?;
        self.stats.loads.fetch_add(1, Ordering::Relaxed);
        observability::record_model_event("loaded");
        info!(model = name, version = ?version, "Model loaded");
        Ok(true)
    }

    /// Removes a model from future requests. Unloading an absent model is not an error.
    ///
    /// Requests that already resolved the model finish on the instance they hold.
    pub fn unload(&self, name: &str, version: Option<&str>) -> bool {
        let removed = self.registry.unregister(name, version) > 0;
        if removed {
            observability::record_model_event("unloaded");
        }
        removed
    }
}

fn run_sync(
    model: &dyn Predictor,
    op: Operation,
    request: InferenceRequest,
) -> Result<InferenceResponse> {
    match op {
        Operation::Predict => model.predict(request),
        Operation::Explain => model.explain(request),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadFailure;
    use crate::model::{AsyncPredictor, Model};
    use crate::tensor::Tensor;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    struct Doubler {
        ready: AtomicBool,
        fail: bool,
    }

    impl Model for Doubler {
        fn name(&self) -> &str {
            "doubler"
        }

        fn ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        fn load(&self) -> Result<bool> {
            self.ready.store(true, Ordering::SeqCst);
            Ok(true)
        }
    }

    impl Predictor for Doubler {
        fn predict(&self, request: InferenceRequest) -> Result<InferenceResponse> {
            if self.fail {
                return Err(GatewayError::Internal("numerical fault".to_string()));
            }
            let outputs = request
                .inputs
                .iter()
                .map(|t| match &t.data {
                    crate::tensor::TensorData::Int64(v) => {
                        let doubled = v.iter().map(|x| x * 2).collect();
                        Tensor::int64(t.name.clone(), t.shape.clone(), doubled)
                    }
                    _ => Err(GatewayError::InvalidRequestBody("expected INT64".to_string())),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(InferenceResponse::for_request(&request, outputs))
        }
    }

    struct Remote;

    impl Model for Remote {
        fn name(&self) -> &str {
            "remote"
        }

        fn ready(&self) -> bool {
            true
        }

        fn load(&self) -> Result<bool> {
            Ok(true)
        }
    }

    #[async_trait]
    impl AsyncPredictor for Remote {
        async fn predict(&self, request: InferenceRequest) -> Result<InferenceResponse> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(InferenceResponse::for_request(&request, request.inputs.clone()))
        }

        async fn explain(&self, request: InferenceRequest) -> Result<InferenceResponse> {
            Ok(InferenceResponse::for_request(&request, Vec::new()))
        }
    }

    fn doubler(fail: bool) -> ModelHandle {
        ModelHandle::sync(Doubler {
            ready: AtomicBool::new(true),
            fail,
        })
    }

    fn plane(workers: Option<usize>) -> DataPlane {
        DataPlane::new(
            ServerInfo::default(),
            &DispatchConfig {
                blocking_workers: workers,
            },
        )
    }

    fn request(model: &str) -> InferenceRequest {
        InferenceRequest::new(model, vec![Tensor::int64("x", vec![2], vec![1, 2]).unwrap()])
    }

    #[tokio::test]
    async fn test_infer_sync_inline_and_pooled() {
        for workers in [None, Some(2)] {
            let plane = plane(workers);
            plane.register(doubler(false)).unwrap();

            let response = plane.infer(request("doubler")).await.unwrap();
            assert_eq!(response.outputs[0], Tensor::int64("x", vec![2], vec![2, 4]).unwrap());
            assert!(!response.id.is_empty());
        }
    }

    #[tokio::test]
    async fn test_infer_async_model_keeps_id() {
        let plane = plane(None);
        plane.register(ModelHandle::suspending(Remote)).unwrap();

        let response = plane
            .infer(request("remote").with_id(Some("abc".to_string())))
            .await
            .unwrap();
        assert_eq!(response.id, "abc");
        assert_eq!(response.outputs.len(), 1);
    }

    #[tokio::test]
    async fn test_infer_faults() {
        let plane = plane(None);
        assert!(matches!(
            plane.infer(request("missing")).await,
            Err(GatewayError::ModelNotFound { .. })
        ));

        plane.register(doubler(true)).unwrap();
        let err = plane.infer(request("doubler")).await.unwrap_err();
        assert!(matches!(err, GatewayError::InferenceFailed { ref name, .. } if name == "doubler"));
        assert_eq!(plane.stats().failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_explain() {
        let plane = plane(None);
        plane.register(doubler(false)).unwrap();
        plane.register(ModelHandle::suspending(Remote)).unwrap();

        assert!(matches!(
            plane.explain(request("doubler")).await,
            Err(GatewayError::ExplainUnsupported { .. })
        ));
        assert!(plane.explain(request("remote")).await.is_ok());
    }

    #[tokio::test]
    async fn test_readiness_and_metadata() {
        let plane = plane(None);
        assert!(plane.live());
        assert!(plane.ready());

        plane
            .register(ModelHandle::sync(Doubler {
                ready: AtomicBool::new(false),
                fail: false,
            }))
            .unwrap();
        assert!(!plane.ready());
        assert!(!plane.model_ready("doubler", None).unwrap());
        assert_eq!(plane.metadata("doubler", None).unwrap().name, "doubler");
        assert!(matches!(
            plane.model_ready("other", None),
            Err(GatewayError::ModelNotFound { .. })
        ));

        // Reload in place without a repository
        assert!(plane.load("doubler", None).await.unwrap());
        assert!(plane.ready());

        let metadata = plane.server_metadata();
        assert_eq!(metadata.extensions, vec!["model_repository_extension".to_string()]);
    }

    #[tokio::test]
    async fn test_load_without_repository_or_model() {
        let plane = plane(None);
        let err = plane.load("ghost", None).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::LoadFailed {
                reason: LoadFailure::Other(_),
                ..
            }
        ));
        assert!(plane.list().is_empty());
    }

    #[tokio::test]
    async fn test_unload_idempotent() {
        let plane = plane(None);
        plane.register(doubler(false)).unwrap();
        assert!(plane.unload("doubler", None));
        assert!(!plane.unload("doubler", None));
        assert!(plane.list().is_empty());
    }
}
