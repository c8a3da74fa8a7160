//! Error types for the infergate inference gateway.
//!
//! This module provides a unified error type [`GatewayError`] for all gateway operations,
//! along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Registry**: Unknown models or versions, invalid registrations
//! - **Repository**: Model artifacts that are missing or ambiguous on load
//! - **Tensor Codec**: Unsupported datatypes, ambiguous content buckets, shape mismatches
//! - **Inference**: Faults raised by a model while predicting or explaining
//! - **Protocol**: Malformed bodies and unknown routes
//! - **Configuration**: Invalid settings or missing configuration
//!
//! # Example
//!
//! ```rust
//! use infergate::error::{GatewayError, Result};
//!
//! fn find(name: &str) -> Result<()> {
//!     Err(GatewayError::ModelNotFound { name: name.to_string() })
//! }
//!
//! let err = find("iris").unwrap_err();
//! assert_eq!(err.http_status(), 404);
//! assert!(err.is_client_error());
//! ```

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    // Registry errors
    #[error("Model with name {name} does not exist")]
    ModelNotFound { name: String },

    #[error("Model {name} has no version {version}")]
    ModelVersionNotFound { name: String, version: String },

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    // Repository errors
    #[error("Failed to load model {name}: {reason}")]
    LoadFailed { name: String, reason: LoadFailure },

    // Tensor codec errors
    #[error("Unsupported datatype: {0}")]
    UnsupportedDatatype(String),

    #[error("Tensor {tensor} has more than one populated content field: {populated:?}")]
    AmbiguousContent {
        tensor: String,
        populated: Vec<&'static str>,
    },

    #[error("Tensor {tensor} shape expects {expected} elements, got {actual}")]
    ShapeMismatch {
        tensor: String,
        expected: usize,
        actual: usize,
    },

    // Inference errors
    #[error("Model {name} does not support explain")]
    ExplainUnsupported { name: String },

    #[error("Inference failed for model {name}: {cause}")]
    InferenceFailed { name: String, cause: String },

    // Protocol errors
    #[error("Invalid request body: {0}")]
    InvalidRequestBody(String),

    #[error("No route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("Method {method} not allowed for {path}")]
    MethodNotAllowed { method: String, path: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // External errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a model failed to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadFailure {
    /// No eligible artifact was found under the model directory.
    MissingArtifact(PathBuf),
    /// More than one eligible artifact was found; exactly one is allowed.
    AmbiguousArtifact(Vec<PathBuf>),
    /// Any other load fault raised by the model.
    Other(String),
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadFailure::MissingArtifact(dir) => {
                write!(f, "no model artifact found under {}", dir.display())
            }
            LoadFailure::AmbiguousArtifact(files) => {
                write!(
                    f,
                    "more than one model file is detected, only one is allowed: {:?}",
                    files
                )
            }
            LoadFailure::Other(reason) => f.write_str(reason),
        }
    }
}

impl GatewayError {
    /// Wrap an arbitrary model fault as an inference failure.
    pub fn inference(name: impl Into<String>, cause: impl fmt::Display) -> Self {
        GatewayError::InferenceFailed {
            name: name.into(),
            cause: cause.to_string(),
        }
    }

    /// Build a load failure with a free-form reason.
    pub fn load_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        GatewayError::LoadFailed {
            name: name.into(),
            reason: LoadFailure::Other(reason.into()),
        }
    }

    /// Convert to the HTTP status code used by both REST dialects.
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::ModelNotFound { .. }
            | GatewayError::ModelVersionNotFound { .. }
            | GatewayError::RouteNotFound { .. } => 404,
            GatewayError::MethodNotAllowed { .. } => 405,
            GatewayError::InvalidRequestBody(_)
            | GatewayError::UnsupportedDatatype(_)
            | GatewayError::AmbiguousContent { .. }
            | GatewayError::ShapeMismatch { .. }
            | GatewayError::InvalidModel(_) => 400,
            GatewayError::ExplainUnsupported { .. } => 501,
            _ => 500,
        }
    }

    /// Convert to the gRPC status code used by the RPC dialect.
    pub fn grpc_code(&self) -> tonic::Code {
        match self {
            GatewayError::ModelNotFound { .. }
            | GatewayError::ModelVersionNotFound { .. }
            | GatewayError::RouteNotFound { .. } => tonic::Code::NotFound,
            GatewayError::InvalidRequestBody(_)
            | GatewayError::UnsupportedDatatype(_)
            | GatewayError::AmbiguousContent { .. }
            | GatewayError::ShapeMismatch { .. }
            | GatewayError::InvalidModel(_) => tonic::Code::InvalidArgument,
            GatewayError::ExplainUnsupported { .. } | GatewayError::MethodNotAllowed { .. } => {
                tonic::Code::Unimplemented
            }
            GatewayError::LoadFailed { .. } => tonic::Code::FailedPrecondition,
            _ => tonic::Code::Internal,
        }
    }

    /// Check if the fault was caused by the caller rather than the gateway or a model.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::InvalidRequestBody(e.to_string())
    }
}

impl From<GatewayError> for tonic::Status {
    fn from(e: GatewayError) -> Self {
        tonic::Status::new(e.grpc_code(), e.to_string())
    }
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
