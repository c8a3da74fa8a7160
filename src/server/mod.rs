//! Listener shells.
//!
//! [`HttpServer`] serves both REST dialects and [`GrpcServer`] the RPC dialect.
//! Each is started and stopped independently; stopping signals the server to stop
//! accepting, waits up to the grace period for in-flight requests, then aborts.

pub mod grpc;
pub mod http;

pub use grpc::GrpcServer;
pub use http::HttpServer;

use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A bound listener running on its own task.
pub(crate) struct ListenerTask {
    pub(crate) addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ListenerTask {
    pub(crate) fn new(
        addr: SocketAddr,
        shutdown_tx: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            addr,
            shutdown_tx,
            task,
        }
    }

    /// Signals shutdown and waits up to `grace` for the serve task to drain.
    pub(crate) async fn stop(self, listener: &'static str, grace: Duration) {
        let _ = self.shutdown_tx.send(());
        let mut task = self.task;

        match tokio::time::timeout(grace, &mut task).await {
            Ok(_) => info!(listener, addr = %self.addr, "Listener stopped"),
            Err(_) => {
                warn!(
                    listener,
                    addr = %self.addr,
                    grace = ?grace,
                    "Listener did not drain in time, aborting"
                );
                task.abort();
            }
        }
    }
}

/// Waits for the shutdown signal. A dropped sender counts as a signal.
pub(crate) async fn shutdown_signal(rx: oneshot::Receiver<()>) {
    let _ = rx.await;
}
