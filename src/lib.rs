//! Infergate - a multi-protocol model inference gateway.
//!
//! Infergate accepts prediction requests over three independent wire dialects,
//! converts each into one canonical request, dispatches it against a registry of
//! loaded models that can change while requests are in flight, and converts the
//! canonical response back into the dialect the caller used.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Server Shells:  HTTP (legacy + v2 REST)  |  RPC (v2 gRPC)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Protocol Adapters:  legacy  |  v2 REST  |  v2 RPC           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Data Plane:  live | ready | metadata | infer | load | ...   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Model Registry  |  Model Repository  |  Tensor Codec        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use infergate::config::GatewayConfig;
//!
//! #[tokio::main]
//! async fn main() -> infergate::Result<()> {
//!     let config = GatewayConfig::development();
//!
//!     // Serve until SIGINT/SIGTERM, with no repository and no preloaded models
//!     infergate::run(config, None, Vec::new()).await
//! }
//! ```

pub mod config;
pub mod dataplane;
pub mod error;
pub mod inference;
pub mod model;
pub mod observability;
pub mod protocol;
pub mod server;
pub mod shutdown;
pub mod tensor;

/// Generated v2 RPC schema.
pub mod proto {
    tonic::include_proto!("inference");
}

// Re-exports
pub use dataplane::DataPlane;
pub use error::{GatewayError, LoadFailure, Result};
pub use inference::{InferenceRequest, InferenceResponse};
pub use model::{AsyncPredictor, Model, ModelHandle, ModelRepository, Predictor};
pub use tensor::{Datatype, Tensor, TensorData};

use config::GatewayConfig;
use server::{GrpcServer, HttpServer};
use shutdown::{ServiceHandle, ShutdownCoordinator, ShutdownManager, SignalHandler};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Addresses the listeners are bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundAddrs {
    pub http: Option<SocketAddr>,
    pub grpc: Option<SocketAddr>,
}

/// The data plane plus both server shells.
pub struct Gateway {
    config: GatewayConfig,
    plane: Arc<DataPlane>,
    http: Option<HttpServer>,
    grpc: Option<GrpcServer>,
}

impl Gateway {
    /// Builds a gateway whose `load` can only reload already registered models.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Builds a gateway whose `load` constructs models from `repository`.
    pub fn with_repository(
        config: GatewayConfig,
        repository: Arc<dyn ModelRepository>,
    ) -> Result<Self> {
        Self::build(config, Some(repository))
    }

    fn build(config: GatewayConfig, repository: Option<Arc<dyn ModelRepository>>) -> Result<Self> {
        config.validate()?;

        let mut plane = DataPlane::from_config(&config);
        if let Some(repository) = repository {
            plane = plane.with_repository(repository);
        }
        let plane = Arc::new(plane);

        let metrics = if config.observability.metrics_enabled {
            Some(observability::install_metrics()?)
        } else {
            None
        };

        let http = config.http.enabled.then(|| {
            let server = HttpServer::new(Arc::clone(&plane), config.http.clone());
            match metrics {
                Some(handle) => server.with_metrics(handle),
                None => server,
            }
        });
        let grpc = config
            .grpc
            .enabled
            .then(|| GrpcServer::new(Arc::clone(&plane), config.grpc.clone()));

        Ok(Self {
            config,
            plane,
            http,
            grpc,
        })
    }

    /// Installs an already-built model.
    pub fn register(&self, model: ModelHandle) -> Result<()> {
        self.plane.register(model)
    }

    pub fn data_plane(&self) -> &Arc<DataPlane> {
        &self.plane
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Starts HTTP, then RPC. If RPC fails to start, HTTP is stopped again.
    pub async fn start(&self) -> Result<BoundAddrs> {
        let mut addrs = BoundAddrs::default();

        if let Some(http) = &self.http {
            addrs.http = Some(http.start().await?);
        }

        if let Some(grpc) = &self.grpc {
            match grpc.start().await {
                Ok(addr) => addrs.grpc = Some(addr),
                Err(e) => {
                    error!(error = %e, "RPC listener failed to start, stopping HTTP listener");
                    if let Some(http) = &self.http {
                        http.stop(self.config.shutdown_grace).await;
                    }
                    return Err(e);
                }
            }
        }

        info!(
            http = ?addrs.http,
            grpc = ?addrs.grpc,
            models = self.plane.registry().len(),
            "Gateway started"
        );
        Ok(addrs)
    }

    /// Stops both listeners concurrently, each bounded by the shutdown grace.
    pub async fn stop(&self) {
        let grace = self.config.shutdown_grace;
        let http = async {
            if let Some(http) = &self.http {
                http.stop(grace).await;
            }
        };
        let grpc = async {
            if let Some(grpc) = &self.grpc {
                grpc.stop(grace).await;
            }
        };
        tokio::join!(http, grpc);
        info!("Gateway stopped");
    }
}

/// Run a gateway until SIGINT, SIGTERM or SIGQUIT.
pub async fn run(
    config: GatewayConfig,
    repository: Option<Arc<dyn ModelRepository>>,
    models: Vec<ModelHandle>,
) -> Result<()> {
    observability::init(&config.observability)?;
    info!(name = %config.server.name, version = %config.server.version, "Starting gateway");

    let grace = config.shutdown_grace;
    let gateway = Arc::new(match repository {
        Some(repository) => Gateway::with_repository(config, repository)?,
        None => Gateway::new(config)?,
    });

    for model in models {
        gateway.register(model)?;
    }

    gateway.start().await?;

    // Both listeners drain concurrently, so one grace period plus slack bounds the whole stop
    let coordinator = ShutdownCoordinator::with_timeout(grace + Duration::from_secs(1));
    let mut shutdown_manager = ShutdownManager::new(coordinator.clone());

    let stopping = Arc::clone(&gateway);
    shutdown_manager.register(ServiceHandle::new("gateway", async move {
        stopping.stop().await;
    }));

    tokio::spawn(SignalHandler::new(coordinator).run());

    shutdown_manager.run().await;

    info!("Gateway shutdown complete");
    Ok(())
}
