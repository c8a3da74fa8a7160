//! Protocol-neutral inference envelope.
//!
//! Every adapter turns its wire request into an [`InferenceRequest`] and renders an
//! [`InferenceResponse`] back. Both are plain values; adapters and the data plane
//! never mutate them after construction.

use crate::error::{GatewayError, Result};
use crate::tensor::Tensor;
use serde_json::{Map, Value};

/// Inference request
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    /// Model name
    pub model_name: String,
    /// Model version (None for the unversioned or latest model)
    pub model_version: Option<String>,
    /// Request ID; assigned by the data plane when absent
    pub id: Option<String>,
    /// Input tensors, in wire order
    pub inputs: Vec<Tensor>,
    /// Opaque request parameters
    pub parameters: Map<String, Value>,
}

impl InferenceRequest {
    /// Creates a new request
    pub fn new(model_name: impl Into<String>, inputs: Vec<Tensor>) -> Self {
        Self {
            model_name: model_name.into(),
            model_version: None,
            id: None,
            inputs,
            parameters: Map::new(),
        }
    }

    /// Sets version
    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.model_version = version.filter(|v| !v.is_empty());
        self
    }

    /// Sets request ID
    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id.filter(|v| !v.is_empty());
        self
    }

    /// Sets parameters
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Input tensor by name
    pub fn input(&self, name: &str) -> Option<&Tensor> {
        self.inputs.iter().find(|t| t.name == name)
    }

    /// Per-instance rows, whichever dialect the request came from.
    ///
    /// Raw `instances` (or `inputs`) forwarded in the parameters win. Otherwise the
    /// first input tensor is split into `shape[0]` rows, or passed flat when unshaped.
    pub fn instances(&self) -> Result<Vec<Value>> {
        for key in ["instances", "inputs"] {
            match self.parameters.get(key) {
                Some(Value::Array(rows)) => return Ok(rows.clone()),
                Some(_) => {
                    return Err(GatewayError::InvalidRequestBody(format!(
                        "Expected \"{}\" to be a list",
                        key
                    )))
                }
                None => {}
            }
        }

        match self.inputs.first() {
            Some(tensor) => tensor.rows(),
            None => Err(GatewayError::InvalidRequestBody(
                "Request carries neither instances nor inputs".to_string(),
            )),
        }
    }
}

/// Inference response
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResponse {
    /// Model name
    pub model_name: String,
    /// Model version
    pub model_version: Option<String>,
    /// Request ID echoed from the request
    pub id: String,
    /// Output tensors
    pub outputs: Vec<Tensor>,
}

impl InferenceResponse {
    /// Response to `request` carrying `outputs`.
    pub fn for_request(request: &InferenceRequest, outputs: Vec<Tensor>) -> Self {
        Self {
            model_name: request.model_name.clone(),
            model_version: request.model_version.clone(),
            id: request.id.clone().unwrap_or_default(),
            outputs,
        }
    }

    /// First output tensor
    pub fn first_output(&self) -> Option<&Tensor> {
        self.outputs.first()
    }
}
