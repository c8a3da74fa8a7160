//! RPC listener for the v2 binary dialect.

use super::{shutdown_signal, ListenerTask};
use crate::config::GrpcConfig;
use crate::dataplane::DataPlane;
use crate::error::{GatewayError, Result};
use crate::proto::grpc_inference_service_server::GrpcInferenceServiceServer;
use crate::protocol::grpc::InferenceServicer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{error, info};

/// RPC listener
pub struct GrpcServer {
    plane: Arc<DataPlane>,
    config: GrpcConfig,
    running: Mutex<Option<ListenerTask>>,
}

impl GrpcServer {
    pub fn new(plane: Arc<DataPlane>, config: GrpcConfig) -> Self {
        Self {
            plane,
            config,
            running: Mutex::new(None),
        }
    }

    /// Binds and starts serving. Returns the bound address; starting twice is a no-op.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if let Some(task) = running.as_ref() {
            return Ok(task.addr);
        }

        let listener = TcpListener::bind(self.config.bind_addr).await.map_err(|e| {
            GatewayError::Network(format!(
                "Failed to bind RPC listener on {}: {}",
                self.config.bind_addr, e
            ))
        })?;
        let addr = listener.local_addr()?;

        let servicer = InferenceServicer::new(Arc::clone(&self.plane));
        let service = GrpcInferenceServiceServer::new(servicer)
            .max_decoding_message_size(self.config.max_message_size)
            .max_encoding_message_size(self.config.max_message_size);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let incoming = TcpListenerStream::new(listener);
        let task = tokio::spawn(async move {
            if let Err(e) = Server::builder()
                .add_service(service)
                .serve_with_incoming_shutdown(incoming, shutdown_signal(shutdown_rx))
                .await
            {
                error!(error = %e, "RPC listener failed");
            }
        });

        info!(addr = %addr, "RPC listener started");
        *running = Some(ListenerTask::new(addr, shutdown_tx, task));
        Ok(addr)
    }

    /// Stops accepting and drains for at most `grace`.
    pub async fn stop(&self, grace: Duration) {
        let task = self.running.lock().await.take();
        if let Some(task) = task {
            task.stop("grpc", grace).await;
        }
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|task| task.addr)
    }
}
