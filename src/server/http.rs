//! HTTP listener for the legacy and v2 REST dialects.

use super::{shutdown_signal, ListenerTask};
use crate::config::HttpConfig;
use crate::dataplane::DataPlane;
use crate::error::{GatewayError, Result};
use crate::observability;
use crate::protocol::{self, routes, RestResponse};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

#[derive(Clone)]
struct AppState {
    plane: Arc<DataPlane>,
    metrics: Option<PrometheusHandle>,
}

/// REST listener
pub struct HttpServer {
    plane: Arc<DataPlane>,
    config: HttpConfig,
    metrics: Option<PrometheusHandle>,
    running: Mutex<Option<ListenerTask>>,
}

impl HttpServer {
    pub fn new(plane: Arc<DataPlane>, config: HttpConfig) -> Self {
        Self {
            plane,
            config,
            metrics: None,
            running: Mutex::new(None),
        }
    }

    /// Serves the Prometheus rendering at `GET /metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Builds the router. Every path other than `/metrics` goes through the route table.
    pub fn router(&self) -> Router {
        let state = AppState {
            plane: Arc::clone(&self.plane),
            metrics: self.metrics.clone(),
        };

        let mut router = Router::new();
        if state.metrics.is_some() {
            router = router.route("/metrics", get(render_metrics));
        }

        router
            .fallback(dispatch)
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .with_state(state)
    }

    /// Binds and starts serving. Returns the bound address; starting twice is a no-op.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if let Some(task) = running.as_ref() {
            return Ok(task.addr);
        }

        let listener = TcpListener::bind(self.config.bind_addr).await.map_err(|e| {
            GatewayError::Network(format!(
                "Failed to bind HTTP listener on {}: {}",
                self.config.bind_addr, e
            ))
        })?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let app = self.router();
        let upkeep = self.metrics.clone();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal(shutdown_rx))
                .into_future();
            let outcome = match upkeep {
                Some(handle) => tokio::select! {
                    outcome = serve => outcome,
                    _ = observability::run_upkeep(handle, observability::UPKEEP_PERIOD) => Ok(()),
                },
                None => serve.await,
            };
            if let Err(e) = outcome {
                error!(error = %e, "HTTP listener failed");
            }
        });

        info!(addr = %addr, "HTTP listener started");
        *running = Some(ListenerTask::new(addr, shutdown_tx, task));
        Ok(addr)
    }

    /// Stops accepting and drains for at most `grace`.
    pub async fn stop(&self, grace: Duration) {
        let task = self.running.lock().await.take();
        if let Some(task) = task {
            task.stop("http", grace).await;
        }
    }

    /// Bound address while running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|task| task.addr)
    }
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let started = Instant::now();

    let (dialect, operation, reply) = match routes::resolve(method.as_str(), uri.path()) {
        Ok(route) => {
            let reply = match protocol::handle(&state.plane, &route, &body).await {
                Ok(reply) => reply,
                Err(e) => {
                    let path = uri.path();
                    if e.is_client_error() {
                        debug!(method = %method, path, error = %e, "Request rejected");
                    } else {
                        warn!(method = %method, path, error = %e, "Request failed");
                    }
                    RestResponse::from_error(&e)
                }
            };
            (route.dialect.as_str(), route.action.as_str(), reply)
        }
        Err(e) => {
            debug!(method = %method, path = %uri.path(), error = %e, "No route");
            ("http", "route", RestResponse::from_error(&e))
        }
    };

    let code = reply.status.to_string();
    observability::record_request(dialect, operation, &code, started.elapsed());

    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply.body)).into_response()
}
