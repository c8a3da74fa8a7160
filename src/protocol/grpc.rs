//! v2 RPC dialect.
//!
//! Implements the generated `GRPCInferenceService` over the shared data plane.
//! `ModelInfer` decodes each tensor's single populated content bucket, exposes the
//! first input to the model as per-instance rows under the `instances` parameter,
//! and encodes outputs into the bucket keyed by their datatype.

use crate::dataplane::DataPlane;
use crate::error::{GatewayError, Result};
use crate::inference::{InferenceRequest, InferenceResponse};
use crate::model::ModelMetadata;
use crate::observability;
use crate::proto::grpc_inference_service_server::GrpcInferenceService;
use crate::proto::infer_parameter::ParameterChoice;
use crate::proto::model_metadata_response::TensorMetadata as ProtoTensorMetadata;
use crate::proto::*;
use crate::tensor::{ProtoCodec, TensorCodec};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tonic::{Request, Response, Status};
use tracing::debug;

/// RPC servicer
#[derive(Clone)]
pub struct InferenceServicer {
    plane: Arc<DataPlane>,
}

impl InferenceServicer {
    pub fn new(plane: Arc<DataPlane>) -> Self {
        Self { plane }
    }
}

fn observe<T>(
    operation: &'static str,
    started: Instant,
    result: Result<T>,
) -> std::result::Result<Response<T>, Status> {
    let status = match &result {
        Ok(_) => tonic::Code::Ok,
        Err(e) => e.grpc_code(),
    };
    let code = format!("{:?}", status);
    observability::record_request("grpc", operation, &code, started.elapsed());
    if let Err(e) = &result {
        debug!(operation, error = %e, "RPC failed");
    }
    result.map(Response::new).map_err(Status::from)
}

fn optional(value: String) -> Option<String> {
    Some(value).filter(|v| !v.is_empty())
}

fn parameter_to_json(parameter: &InferParameter) -> Value {
    match &parameter.parameter_choice {
        Some(ParameterChoice::BoolParam(b)) => Value::Bool(*b),
        Some(ParameterChoice::Int64Param(i)) => Value::from(*i),
        Some(ParameterChoice::StringParam(s)) => Value::String(s.clone()),
        None => Value::Null,
    }
}

/// Builds the canonical request from a `ModelInferRequest`.
pub fn decode_request(wire: ModelInferRequest) -> Result<InferenceRequest> {
    let inputs = wire
        .inputs
        .into_iter()
        .map(ProtoCodec::decode)
        .collect::<Result<Vec<_>>>()?;

    let mut parameters: Map<String, Value> = wire
        .parameters
        .iter()
        .map(|(key, p)| (key.clone(), parameter_to_json(p)))
        .collect();

    if !parameters.contains_key("instances") {
        if let Some(first) = inputs.first() {
            parameters.insert("instances".to_string(), Value::Array(first.rows()?));
        }
    }

    Ok(InferenceRequest::new(wire.model_name, inputs)
        .with_version(optional(wire.model_version))
        .with_id(optional(wire.id))
        .with_parameters(parameters))
}

/// Encodes the canonical response as a `ModelInferResponse`, keeping only the
/// `requested` output names unless that list is empty.
pub fn encode_response(
    response: &InferenceResponse,
    requested: &[String],
) -> Result<ModelInferResponse> {
    let outputs = response
        .outputs
        .iter()
        .filter(|tensor| requested.is_empty() || requested.contains(&tensor.name))
        .map(ProtoCodec::encode)
        .collect::<Result<Vec<_>>>()?;

    Ok(ModelInferResponse {
        model_name: response.model_name.clone(),
        model_version: response.model_version.clone().unwrap_or_default(),
        id: response.id.clone(),
        parameters: HashMap::new(),
        outputs,
    })
}

fn encode_metadata(metadata: ModelMetadata) -> ModelMetadataResponse {
    let tensors = |list: Vec<crate::model::TensorMetadata>| -> Vec<ProtoTensorMetadata> {
        list.into_iter()
            .map(|t| ProtoTensorMetadata {
                name: t.name,
                datatype: t.datatype.as_str().to_string(),
                shape: t.shape,
            })
            .collect()
    };

    ModelMetadataResponse {
        name: metadata.name,
        versions: metadata.versions,
        platform: metadata.platform,
        inputs: tensors(metadata.inputs),
        outputs: tensors(metadata.outputs),
    }
}

#[tonic::async_trait]
impl GrpcInferenceService for InferenceServicer {
    async fn server_live(
        &self,
        _request: Request<ServerLiveRequest>,
    ) -> std::result::Result<Response<ServerLiveResponse>, Status> {
        let started = Instant::now();
        observe("live", started, Ok(ServerLiveResponse { live: self.plane.live() }))
    }

    async fn server_ready(
        &self,
        _request: Request<ServerReadyRequest>,
    ) -> std::result::Result<Response<ServerReadyResponse>, Status> {
        let started = Instant::now();
        observe("ready", started, Ok(ServerReadyResponse { ready: self.plane.ready() }))
    }

    async fn model_ready(
        &self,
        request: Request<ModelReadyRequest>,
    ) -> std::result::Result<Response<ModelReadyResponse>, Status> {
        let started = Instant::now();
        let req = request.into_inner();
        let version = optional(req.version);
        let result = self
            .plane
            .model_ready(&req.name, version.as_deref())
            .map(|ready| ModelReadyResponse { ready });
        observe("model_ready", started, result)
    }

    async fn server_metadata(
        &self,
        _request: Request<ServerMetadataRequest>,
    ) -> std::result::Result<Response<ServerMetadataResponse>, Status> {
        let started = Instant::now();
        let metadata = self.plane.server_metadata();
        observe(
            "server_metadata",
            started,
            Ok(ServerMetadataResponse {
                name: metadata.name,
                version: metadata.version,
                extensions: metadata.extensions,
            }),
        )
    }

    async fn model_metadata(
        &self,
        request: Request<ModelMetadataRequest>,
    ) -> std::result::Result<Response<ModelMetadataResponse>, Status> {
        let started = Instant::now();
        let req = request.into_inner();
        let version = optional(req.version);
        let result = self
            .plane
            .metadata(&req.name, version.as_deref())
            .map(encode_metadata);
        observe("model_metadata", started, result)
    }

    async fn model_infer(
        &self,
        request: Request<ModelInferRequest>,
    ) -> std::result::Result<Response<ModelInferResponse>, Status> {
        let started = Instant::now();
        let result = async move {
            let wire = request.into_inner();
            let requested: Vec<String> = wire.outputs.iter().map(|o| o.name.clone()).collect();
            let response = self.plane.infer(decode_request(wire)?).await?;
            encode_response(&response, &requested)
        }
        .await;
        observe("infer", started, result)
    }

    async fn repository_model_load(
        &self,
        request: Request<RepositoryModelLoadRequest>,
    ) -> std::result::Result<Response<RepositoryModelLoadResponse>, Status> {
        let started = Instant::now();
        let req = request.into_inner();
        let version = optional(req.model_version);
        let result = self
            .plane
            .load(&req.model_name, version.as_deref())
            .await
            .map(|is_loaded| RepositoryModelLoadResponse {
                model_name: req.model_name.clone(),
                is_loaded,
            });
        observe("load", started, result)
    }

    async fn repository_model_unload(
        &self,
        request: Request<RepositoryModelUnloadRequest>,
    ) -> std::result::Result<Response<RepositoryModelUnloadResponse>, Status> {
        let started = Instant::now();
        let req = request.into_inner();
        let version = optional(req.model_version);
        self.plane.unload(&req.model_name, version.as_deref());
        observe(
            "unload",
            started,
            Ok::<_, GatewayError>(RepositoryModelUnloadResponse {
                model_name: req.model_name,
                is_unloaded: true,
            }),
        )
    }
}
