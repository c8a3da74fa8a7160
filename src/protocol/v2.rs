//! v2 REST dialect.
//!
//! ```json
//! POST /v2/models/iris/infer
//! {"id": "r1",
//!  "inputs": [{"name": "input-0", "shape": [2, 4], "datatype": "FP32", "data": [...]}]}
//!
//! {"model_name": "iris", "id": "r1",
//!  "outputs": [{"name": "predict", "shape": [2], "datatype": "INT64", "data": [1, 1]}]}
//! ```

use super::routes::{Action, RouteMatch};
use super::{parse_body, RestResponse};
use crate::dataplane::DataPlane;
use crate::error::Result;
use crate::inference::{InferenceRequest, InferenceResponse};
use crate::tensor::{JsonCodec, JsonTensor, TensorCodec};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// v2 infer request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferRequestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub inputs: Vec<JsonTensor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
    /// Outputs the caller wants back; all outputs when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<RequestedOutput>>,
}

/// A requested output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedOutput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
}

/// v2 infer response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferResponseBody {
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    pub id: String,
    pub outputs: Vec<JsonTensor>,
}

/// Decodes a v2 body into the canonical request.
pub fn decode_request(route: &RouteMatch, body: InferRequestBody) -> Result<InferenceRequest> {
    let inputs = body
        .inputs
        .into_iter()
        .map(JsonCodec::decode)
        .collect::<Result<Vec<_>>>()?;

    Ok(InferenceRequest::new(route.model()?, inputs)
        .with_version(route.version.clone())
        .with_id(body.id)
        .with_parameters(body.parameters.unwrap_or_default()))
}

/// Encodes the canonical response, keeping only `requested` outputs when given.
pub fn encode_response(
    response: &InferenceResponse,
    requested: Option<&[RequestedOutput]>,
) -> Result<InferResponseBody> {
    let wanted = |name: &str| match requested {
        Some(outputs) if !outputs.is_empty() => outputs.iter().any(|o| o.name == name),
        _ => true,
    };

    let outputs = response
        .outputs
        .iter()
        .filter(|tensor| wanted(&tensor.name))
        .map(JsonCodec::encode)
        .collect::<Result<Vec<_>>>()?;

    Ok(InferResponseBody {
        model_name: response.model_name.clone(),
        model_version: response.model_version.clone(),
        id: response.id.clone(),
        outputs,
    })
}

pub(super) async fn infer(
    plane: &DataPlane,
    route: &RouteMatch,
    body: &[u8],
) -> Result<RestResponse> {
    let mut body: InferRequestBody = parse_body(body)?;
    let requested = body.outputs.take();
    let request = decode_request(route, body)?;

    let response = match route.action {
        Action::Explain => plane.explain(request).await?,
        _ => plane.infer(request).await?,
    };
    RestResponse::json(&encode_response(&response, requested.as_deref())?)
}
