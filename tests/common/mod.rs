//! Common test utilities for integration tests.

pub mod fixtures;

use infergate::config::GatewayConfig;
use infergate::proto::grpc_inference_service_client::GrpcInferenceServiceClient;
use infergate::{BoundAddrs, Gateway, ModelHandle, ModelRepository};
use std::net::SocketAddr;
use std::sync::Arc;

pub use fixtures::*;

pub type RpcClient = GrpcInferenceServiceClient<tonic::transport::Channel>;

/// A started gateway and the addresses it is serving on.
pub struct TestGateway {
    pub gateway: Gateway,
    pub addrs: BoundAddrs,
    pub client: reqwest::Client,
}

impl TestGateway {
    /// Starts a gateway on ephemeral loopback ports with `models` registered.
    pub async fn start(models: Vec<ModelHandle>) -> Self {
        Self::start_with(GatewayConfig::development(), None, models).await
    }

    /// Starts a gateway whose `load` builds models from `repository`.
    pub async fn with_repository(repository: Arc<dyn ModelRepository>) -> Self {
        Self::start_with(GatewayConfig::development(), Some(repository), Vec::new()).await
    }

    pub async fn start_with(
        config: GatewayConfig,
        repository: Option<Arc<dyn ModelRepository>>,
        models: Vec<ModelHandle>,
    ) -> Self {
        let gateway = match repository {
            Some(repository) => Gateway::with_repository(config, repository),
            None => Gateway::new(config),
        }
        .expect("Failed to build gateway");

        for model in models {
            gateway.register(model).expect("Failed to register model");
        }

        let addrs = gateway.start().await.expect("Failed to start gateway");
        Self {
            gateway,
            addrs,
            client: reqwest::Client::new(),
        }
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.addrs.http.expect("HTTP listener is not running")
    }

    pub fn grpc_endpoint(&self) -> String {
        format!("http://{}", self.addrs.grpc.expect("RPC listener is not running"))
    }

    /// Full URL for `path` on the HTTP listener.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.http_addr(), path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET failed")
    }

    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("POST failed")
    }

    pub async fn post_raw(&self, path: &str, body: &'static str) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .expect("POST failed")
    }

    pub async fn grpc_client(&self) -> RpcClient {
        GrpcInferenceServiceClient::connect(self.grpc_endpoint())
            .await
            .expect("Failed to connect RPC client")
    }

    pub async fn stop(self) {
        self.gateway.stop().await;
    }
}
