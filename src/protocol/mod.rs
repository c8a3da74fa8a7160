//! Protocol adapters.
//!
//! Each adapter translates one wire dialect to the canonical envelope, calls the
//! [`DataPlane`], and renders the result back:
//!
//! - [`legacy`]: JSON REST with `instances`/`inputs` bodies and `predictions` replies
//! - [`v2`]: JSON REST with typed tensors under `/v2`
//! - [`grpc`]: the v2 RPC service
//!
//! Both REST dialects share [`routes`] and the non-inference handlers below.

pub mod grpc;
pub mod legacy;
pub mod routes;
pub mod v2;

use crate::dataplane::DataPlane;
use crate::error::{GatewayError, Result};
use routes::{Action, Dialect, RouteMatch};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// A REST reply before it is written to the socket.
#[derive(Debug, Clone, PartialEq)]
pub struct RestResponse {
    pub status: u16,
    pub body: Value,
}

impl RestResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    /// Serializes `body` with a 200 status.
    pub fn json<T: Serialize>(body: &T) -> Result<Self> {
        serde_json::to_value(body)
            .map(Self::ok)
            .map_err(|e| GatewayError::Internal(format!("Failed to encode response: {}", e)))
    }

    /// The `{"error": ...}` reply for a fault.
    pub fn from_error(error: &GatewayError) -> Self {
        Self {
            status: error.http_status(),
            body: json!({ "error": error.to_string() }),
        }
    }
}

/// Runs a resolved REST route.
pub async fn handle(plane: &DataPlane, route: &RouteMatch, body: &[u8]) -> Result<RestResponse> {
    match (route.action, route.dialect) {
        (Action::Infer | Action::Explain, Dialect::Legacy) => {
            legacy::infer(plane, route, body).await
        }
        (Action::Infer | Action::Explain, Dialect::V2) => v2::infer(plane, route, body).await,
        _ => handle_common(plane, route).await,
    }
}

/// Handlers whose wire form is the same in both REST dialects.
async fn handle_common(plane: &DataPlane, route: &RouteMatch) -> Result<RestResponse> {
    let version = route.version.as_deref();
    match route.action {
        Action::ServerMetadata => RestResponse::json(&plane.server_metadata()),
        Action::ListModels => {
            let names: BTreeSet<String> = plane.list().into_iter().map(|key| key.name).collect();
            Ok(RestResponse::ok(json!({ "models": names })))
        }
        Action::Live => Ok(RestResponse::ok(Value::Bool(plane.live()))),
        Action::Ready => {
            let ready = plane.ready();
            Ok(RestResponse {
                status: if ready { 200 } else { 503 },
                body: Value::Bool(ready),
            })
        }
        Action::ModelMetadata => RestResponse::json(&plane.metadata(route.model()?, version)?),
        Action::ModelReady => Ok(RestResponse::ok(Value::Bool(
            plane.model_ready(route.model()?, version)?,
        ))),
        Action::Load => {
            let name = route.model()?;
            let loaded = plane.load(name, version).await?;
            Ok(RestResponse::ok(json!({ "name": name, "load": loaded })))
        }
        Action::Unload => {
            let name = route.model()?;
            plane.unload(name, version);
            Ok(RestResponse::ok(json!({ "name": name, "unload": true })))
        }
        Action::Infer | Action::Explain => Err(GatewayError::Internal(
            "inference routes are handled by the dialect adapters".to_string(),
        )),
    }
}

/// Parses a JSON request body, mapping any failure to `InvalidRequestBody`.
pub(crate) fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T> {
    if body.is_empty() {
        return Err(GatewayError::InvalidRequestBody("Request body is empty".to_string()));
    }
    Ok(serde_json::from_slice(body)?)
}
