//! Canonical tensor representation and the wire codecs.
//!
//! A [`Tensor`] carries exactly one typed content bucket ([`TensorData`]) selected by
//! its [`Datatype`]. Wire codecs implement [`TensorCodec`] to translate between a
//! protocol's tensor encoding and this canonical form:
//!
//! - [`json::JsonCodec`]: the v2 REST tensor JSON schema
//! - [`proto::ProtoCodec`]: the v2 gRPC typed-content messages

pub mod json;
pub mod proto;

pub use json::{JsonCodec, JsonTensor};
pub use proto::ProtoCodec;

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Element datatype of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Datatype {
    Bool,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    Fp16,
    Fp32,
    Fp64,
    Bytes,
}

impl Datatype {
    /// All datatypes, in wire tag order.
    pub const ALL: [Datatype; 13] = [
        Datatype::Bool,
        Datatype::Uint8,
        Datatype::Uint16,
        Datatype::Uint32,
        Datatype::Uint64,
        Datatype::Int8,
        Datatype::Int16,
        Datatype::Int32,
        Datatype::Int64,
        Datatype::Fp16,
        Datatype::Fp32,
        Datatype::Fp64,
        Datatype::Bytes,
    ];

    /// Wire tag of the datatype.
    pub fn as_str(&self) -> &'static str {
        match self {
            Datatype::Bool => "BOOL",
            Datatype::Uint8 => "UINT8",
            Datatype::Uint16 => "UINT16",
            Datatype::Uint32 => "UINT32",
            Datatype::Uint64 => "UINT64",
            Datatype::Int8 => "INT8",
            Datatype::Int16 => "INT16",
            Datatype::Int32 => "INT32",
            Datatype::Int64 => "INT64",
            Datatype::Fp16 => "FP16",
            Datatype::Fp32 => "FP32",
            Datatype::Fp64 => "FP64",
            Datatype::Bytes => "BYTES",
        }
    }

    /// Content bucket that holds values of this datatype.
    pub fn bucket(&self) -> Bucket {
        match self {
            Datatype::Bool => Bucket::Bool,
            Datatype::Int8 | Datatype::Int16 | Datatype::Int32 => Bucket::Int32,
            Datatype::Int64 => Bucket::Int64,
            Datatype::Uint8 | Datatype::Uint16 | Datatype::Uint32 => Bucket::Uint32,
            Datatype::Uint64 => Bucket::Uint64,
            Datatype::Fp16 | Datatype::Fp32 => Bucket::Fp32,
            Datatype::Fp64 => Bucket::Fp64,
            Datatype::Bytes => Bucket::Bytes,
        }
    }

    /// Inclusive integer range for the narrow integer datatypes.
    pub(crate) fn int_range(&self) -> Option<(i64, i64)> {
        match self {
            Datatype::Int8 => Some((i8::MIN as i64, i8::MAX as i64)),
            Datatype::Int16 => Some((i16::MIN as i64, i16::MAX as i64)),
            Datatype::Int32 => Some((i32::MIN as i64, i32::MAX as i64)),
            Datatype::Uint8 => Some((0, u8::MAX as i64)),
            Datatype::Uint16 => Some((0, u16::MAX as i64)),
            Datatype::Uint32 => Some((0, u32::MAX as i64)),
            _ => None,
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Datatype {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        Datatype::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| GatewayError::UnsupportedDatatype(s.to_string()))
    }
}

/// Typed content bucket; several datatypes share a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Bool,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Fp32,
    Fp64,
    Bytes,
}

/// Flat tensor content; exactly one bucket is populated.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Bool(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Uint32(Vec<u32>),
    Uint64(Vec<u64>),
    Fp32(Vec<f32>),
    Fp64(Vec<f64>),
    Bytes(Vec<Vec<u8>>),
}

impl TensorData {
    /// An empty bucket of the given kind.
    pub fn empty(bucket: Bucket) -> Self {
        match bucket {
            Bucket::Bool => TensorData::Bool(Vec::new()),
            Bucket::Int32 => TensorData::Int32(Vec::new()),
            Bucket::Int64 => TensorData::Int64(Vec::new()),
            Bucket::Uint32 => TensorData::Uint32(Vec::new()),
            Bucket::Uint64 => TensorData::Uint64(Vec::new()),
            Bucket::Fp32 => TensorData::Fp32(Vec::new()),
            Bucket::Fp64 => TensorData::Fp64(Vec::new()),
            Bucket::Bytes => TensorData::Bytes(Vec::new()),
        }
    }

    /// Bucket this content occupies.
    pub fn bucket(&self) -> Bucket {
        match self {
            TensorData::Bool(_) => Bucket::Bool,
            TensorData::Int32(_) => Bucket::Int32,
            TensorData::Int64(_) => Bucket::Int64,
            TensorData::Uint32(_) => Bucket::Uint32,
            TensorData::Uint64(_) => Bucket::Uint64,
            TensorData::Fp32(_) => Bucket::Fp32,
            TensorData::Fp64(_) => Bucket::Fp64,
            TensorData::Bytes(_) => Bucket::Bytes,
        }
    }

    /// Number of scalars.
    pub fn len(&self) -> usize {
        match self {
            TensorData::Bool(v) => v.len(),
            TensorData::Int32(v) => v.len(),
            TensorData::Int64(v) => v.len(),
            TensorData::Uint32(v) => v.len(),
            TensorData::Uint64(v) => v.len(),
            TensorData::Fp32(v) => v.len(),
            TensorData::Fp64(v) => v.len(),
            TensorData::Bytes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scalars as JSON values, in row-major order.
    pub fn to_json_values(&self) -> Vec<Value> {
        match self {
            TensorData::Bool(v) => v.iter().map(|&b| Value::Bool(b)).collect(),
            TensorData::Int32(v) => v.iter().map(|&x| Value::from(x)).collect(),
            TensorData::Int64(v) => v.iter().map(|&x| Value::from(x)).collect(),
            TensorData::Uint32(v) => v.iter().map(|&x| Value::from(x)).collect(),
            TensorData::Uint64(v) => v.iter().map(|&x| Value::from(x)).collect(),
            TensorData::Fp32(v) => v.iter().map(|&x| f32_to_json(x)).collect(),
            TensorData::Fp64(v) => v.iter().map(|&x| f64_to_json(x)).collect(),
            TensorData::Bytes(v) => v
                .iter()
                .map(|b| Value::String(String::from_utf8_lossy(b).into_owned()))
                .collect(),
        }
    }
}

/// f32 rendered through its shortest decimal form so `6.8f32` stays `6.8` on the wire.
fn f32_to_json(x: f32) -> Value {
    x.to_string()
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn f64_to_json(x: f64) -> Value {
    serde_json::Number::from_f64(x)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Named, typed, shaped array of scalars.
///
/// When `shape` is non-empty the product of its dimensions equals the number of
/// scalars in `data`. An empty shape marks an unshaped flat sequence whose layout
/// is left to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub name: String,
    pub shape: Vec<u64>,
    pub datatype: Datatype,
    pub data: TensorData,
}

impl Tensor {
    /// Creates a tensor, checking the bucket against the datatype and the shape against the data.
    pub fn new(
        name: impl Into<String>,
        datatype: Datatype,
        shape: Vec<u64>,
        data: TensorData,
    ) -> Result<Self> {
        let tensor = Self {
            name: name.into(),
            shape,
            datatype,
            data,
        };
        tensor.check()?;
        Ok(tensor)
    }

    /// Checks the bucket against the datatype and the shape against the data.
    ///
    /// Fields are public, so tensors built by models are checked again before encoding.
    pub fn check(&self) -> Result<()> {
        if self.data.bucket() != self.datatype.bucket() {
            return Err(GatewayError::InvalidRequestBody(format!(
                "tensor {} declares {} but carries {:?} content",
                self.name,
                self.datatype,
                self.data.bucket()
            )));
        }
        check_shape(&self.name, &self.shape, self.data.len())
    }

    /// [`Tensor::check`] for a tensor a model produced; violations are gateway faults.
    pub(crate) fn check_output(&self) -> Result<()> {
        self.check()
            .map_err(|e| GatewayError::Internal(format!("malformed output tensor: {}", e)))
    }

    /// FP32 tensor.
    pub fn fp32(name: impl Into<String>, shape: Vec<u64>, data: Vec<f32>) -> Result<Self> {
        Self::new(name, Datatype::Fp32, shape, TensorData::Fp32(data))
    }

    /// FP64 tensor.
    pub fn fp64(name: impl Into<String>, shape: Vec<u64>, data: Vec<f64>) -> Result<Self> {
        Self::new(name, Datatype::Fp64, shape, TensorData::Fp64(data))
    }

    /// INT64 tensor.
    pub fn int64(name: impl Into<String>, shape: Vec<u64>, data: Vec<i64>) -> Result<Self> {
        Self::new(name, Datatype::Int64, shape, TensorData::Int64(data))
    }

    /// BYTES tensor.
    pub fn bytes(name: impl Into<String>, shape: Vec<u64>, data: Vec<Vec<u8>>) -> Result<Self> {
        Self::new(name, Datatype::Bytes, shape, TensorData::Bytes(data))
    }

    /// Number of scalars.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Per-instance rows: `shape[0]` contiguous chunks, or the flat scalars when unshaped.
    pub fn rows(&self) -> Result<Vec<Value>> {
        let values = self.data.to_json_values();
        if self.shape.is_empty() {
            return Ok(values);
        }
        Ok(reshape(&self.name, &values, &self.shape)?
            .into_iter()
            .map(Value::Array)
            .collect())
    }

    /// Data nested to the full depth of the shape.
    pub fn to_nested_json(&self) -> Value {
        let values = self.data.to_json_values();
        if self.shape.len() <= 1 {
            return Value::Array(values);
        }
        nest(&values, &self.shape)
    }
}

fn nest(values: &[Value], shape: &[u64]) -> Value {
    match shape.split_first() {
        Some((&outer, rest)) if !rest.is_empty() && outer > 0 => {
            let chunk = values.len() / outer as usize;
            if chunk == 0 {
                return Value::Array((0..outer).map(|_| Value::Array(Vec::new())).collect());
            }
            Value::Array(values.chunks(chunk).map(|c| nest(c, rest)).collect())
        }
        _ => Value::Array(values.to_vec()),
    }
}

/// Number of elements a shape describes.
pub fn element_count(shape: &[u64]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| {
        usize::try_from(dim).ok().and_then(|d| acc.checked_mul(d))
    })
}

/// Checks `product(shape) == len` for shaped tensors; unshaped tensors always pass.
pub fn check_shape(name: &str, shape: &[u64], len: usize) -> Result<()> {
    if shape.is_empty() {
        return Ok(());
    }
    let expected = element_count(shape).unwrap_or(usize::MAX);
    if expected != len {
        return Err(GatewayError::ShapeMismatch {
            tensor: name.to_string(),
            expected,
            actual: len,
        });
    }
    Ok(())
}

/// Splits a flat sequence into `shape[0]` equal contiguous chunks.
pub fn reshape<T: Clone>(name: &str, flat: &[T], shape: &[u64]) -> Result<Vec<Vec<T>>> {
    check_shape(name, shape, flat.len())?;
    let rows = match shape.first() {
        Some(&rows) => rows as usize,
        None => return Ok(vec![flat.to_vec()]),
    };
    if rows == 0 {
        return Ok(Vec::new());
    }
    let chunk = flat.len() / rows;
    if chunk == 0 {
        return Ok(vec![Vec::new(); rows]);
    }
    Ok(flat.chunks(chunk).map(|c| c.to_vec()).collect())
}

/// Wire codec between a protocol's tensor encoding and [`Tensor`].
pub trait TensorCodec {
    /// Tensor as it arrives in a request.
    type Input;
    /// Tensor as it leaves in a response.
    type Output;

    /// Selects the populated content and builds a canonical tensor.
    fn decode(wire: Self::Input) -> Result<Tensor>;

    /// Places the canonical content into the bucket keyed by the datatype.
    fn encode(tensor: &Tensor) -> Result<Self::Output>;
}
