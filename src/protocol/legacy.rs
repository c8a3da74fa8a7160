//! Legacy REST dialect.
//!
//! Infer and explain bodies are JSON objects carrying `instances` (row-major rows)
//! or `inputs`. The adapter does not reshape anything: the whole object is handed
//! to the model as request parameters, and the model reads it through
//! [`InferenceRequest::instances`]. Replies carry the first output tensor nested
//! to its shape under `predictions` or `explanations`.

use super::routes::{Action, RouteMatch};
use super::{parse_body, RestResponse};
use crate::dataplane::DataPlane;
use crate::error::{GatewayError, Result};
use crate::inference::{InferenceRequest, InferenceResponse};
use serde_json::{Map, Value};

/// Builds the canonical request from a legacy body.
pub fn decode_request(route: &RouteMatch, body: &[u8]) -> Result<InferenceRequest> {
    let payload: Value = parse_body(body)?;
    let payload = match payload {
        Value::Object(map) => map,
        _ => {
            return Err(GatewayError::InvalidRequestBody(
                "Expected a JSON object".to_string(),
            ))
        }
    };
    check_payload(&payload)?;

    let id = payload.get("id").and_then(Value::as_str).map(str::to_string);

    Ok(InferenceRequest::new(route.model()?, Vec::new())
        .with_version(route.version.clone())
        .with_id(id)
        .with_parameters(payload))
}

fn check_payload(payload: &Map<String, Value>) -> Result<()> {
    let rows = payload.get("instances").or_else(|| payload.get("inputs"));
    match rows {
        Some(Value::Array(_)) => Ok(()),
        Some(_) => Err(GatewayError::InvalidRequestBody(
            "Expected \"instances\" or \"inputs\" to be a list".to_string(),
        )),
        None => Err(GatewayError::InvalidRequestBody(
            "Expected \"instances\" or \"inputs\" in request body".to_string(),
        )),
    }
}

/// Renders the canonical response under `key`.
pub fn encode_response(key: &str, response: &InferenceResponse) -> Result<Value> {
    let rendered = match response.first_output() {
        Some(tensor) => {
            tensor.check_output()?;
            tensor.to_nested_json()
        }
        None => Value::Array(Vec::new()),
    };
    let mut body = Map::new();
    body.insert(key.to_string(), rendered);
    Ok(Value::Object(body))
}

pub(super) async fn infer(
    plane: &DataPlane,
    route: &RouteMatch,
    body: &[u8],
) -> Result<RestResponse> {
    let request = decode_request(route, body)?;
    let (response, key) = match route.action {
        Action::Explain => (plane.explain(request).await?, "explanations"),
        _ => (plane.infer(request).await?, "predictions"),
    };
    Ok(RestResponse::ok(encode_response(key, &response)?))
}
