//! Typed-content tensors of the v2 RPC dialect.
//!
//! Each tensor carries an `InferTensorContents` with one repeated field per
//! content bucket. Exactly one field may be populated and it must be the bucket
//! keyed by the tensor's datatype. FP16 has no bucket here.

use super::{Bucket, Datatype, Tensor, TensorCodec, TensorData};
use crate::error::{GatewayError, Result};
use crate::proto::model_infer_request::InferInputTensor;
use crate::proto::model_infer_response::InferOutputTensor;
use crate::proto::InferTensorContents;

/// Codec between RPC tensors and [`Tensor`].
pub struct ProtoCodec;

impl TensorCodec for ProtoCodec {
    type Input = InferInputTensor;
    type Output = InferOutputTensor;

    fn decode(wire: InferInputTensor) -> Result<Tensor> {
        decode_parts(wire.name, &wire.datatype, wire.shape, wire.contents)
    }

    fn encode(tensor: &Tensor) -> Result<InferOutputTensor> {
        Ok(InferOutputTensor {
            name: tensor.name.clone(),
            datatype: tensor.datatype.as_str().to_string(),
            shape: wire_shape(&tensor.shape)?,
            parameters: Default::default(),
            contents: Some(encode_contents(tensor)?),
        })
    }
}

impl ProtoCodec {
    /// Decodes a response tensor, as a client of the dialect does.
    pub fn decode_output(wire: InferOutputTensor) -> Result<Tensor> {
        decode_parts(wire.name, &wire.datatype, wire.shape, wire.contents)
    }

    /// Encodes a tensor for a request, as a client of the dialect does.
    pub fn encode_input(tensor: &Tensor) -> Result<InferInputTensor> {
        Ok(InferInputTensor {
            name: tensor.name.clone(),
            datatype: tensor.datatype.as_str().to_string(),
            shape: wire_shape(&tensor.shape)?,
            parameters: Default::default(),
            contents: Some(encode_contents(tensor)?),
        })
    }
}

fn rpc_datatype(tag: &str) -> Result<Datatype> {
    match tag.parse::<Datatype>()? {
        Datatype::Fp16 => Err(GatewayError::UnsupportedDatatype(tag.to_string())),
        datatype => Ok(datatype),
    }
}

fn wire_shape(shape: &[u64]) -> Result<Vec<i64>> {
    shape
        .iter()
        .map(|&d| {
            i64::try_from(d)
                .map_err(|_| GatewayError::Internal(format!("dimension {} overflows int64", d)))
        })
        .collect()
}

fn decode_parts(
    name: String,
    datatype: &str,
    shape: Vec<i64>,
    contents: Option<InferTensorContents>,
) -> Result<Tensor> {
    let datatype = rpc_datatype(datatype)?;

    let shape = shape
        .into_iter()
        .map(|d| {
            u64::try_from(d).map_err(|_| {
                let reason = format!("tensor {} has negative dimension {}", name, d);
                GatewayError::InvalidRequestBody(reason)
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let data = select_content(&name, datatype, contents.unwrap_or_default())?;
    Tensor::new(name, datatype, shape, data)
}

/// Picks the single populated bucket, in field order.
fn select_content(name: &str, datatype: Datatype, c: InferTensorContents) -> Result<TensorData> {
    let mut populated: Vec<(&'static str, TensorData)> = Vec::new();
    if !c.bool_contents.is_empty() {
        populated.push(("bool_contents", TensorData::Bool(c.bool_contents)));
    }
    if !c.int_contents.is_empty() {
        populated.push(("int_contents", TensorData::Int32(c.int_contents)));
    }
    if !c.int64_contents.is_empty() {
        populated.push(("int64_contents", TensorData::Int64(c.int64_contents)));
    }
    if !c.uint_contents.is_empty() {
        populated.push(("uint_contents", TensorData::Uint32(c.uint_contents)));
    }
    if !c.uint64_contents.is_empty() {
        populated.push(("uint64_contents", TensorData::Uint64(c.uint64_contents)));
    }
    if !c.fp32_contents.is_empty() {
        populated.push(("fp32_contents", TensorData::Fp32(c.fp32_contents)));
    }
    if !c.fp64_contents.is_empty() {
        populated.push(("fp64_contents", TensorData::Fp64(c.fp64_contents)));
    }
    if !c.bytes_contents.is_empty() {
        populated.push(("bytes_contents", TensorData::Bytes(c.bytes_contents)));
    }

    if populated.len() > 1 {
        return Err(GatewayError::AmbiguousContent {
            tensor: name.to_string(),
            populated: populated.iter().map(|(field, _)| *field).collect(),
        });
    }

    let data = match populated.pop() {
        None => TensorData::empty(datatype.bucket()),
        Some((_, data)) if data.bucket() == datatype.bucket() => data,
        Some((field, _)) => {
            return Err(GatewayError::InvalidRequestBody(format!(
                "tensor {} declares {} and must populate {}, not {}",
                name,
                datatype,
                bucket_field(datatype.bucket()),
                field
            )))
        }
    };
    check_range(name, datatype, &data)?;
    Ok(data)
}

/// Narrow integer types travel in 32-bit buckets; values must fit the declared width.
fn check_range(name: &str, datatype: Datatype, data: &TensorData) -> Result<()> {
    let Some((lo, hi)) = datatype.int_range() else {
        return Ok(());
    };
    let out_of_range = match data {
        TensorData::Int32(v) => v.iter().map(|&x| i64::from(x)).find(|x| !(lo..=hi).contains(x)),
        TensorData::Uint32(v) => v.iter().map(|&x| i64::from(x)).find(|x| !(lo..=hi).contains(x)),
        _ => None,
    };
    match out_of_range {
        Some(x) => Err(GatewayError::InvalidRequestBody(format!(
            "tensor {} holds {} which is not a valid {} element",
            name, x, datatype
        ))),
        None => Ok(()),
    }
}

fn encode_contents(tensor: &Tensor) -> Result<InferTensorContents> {
    if tensor.datatype == Datatype::Fp16 {
        return Err(GatewayError::UnsupportedDatatype(tensor.datatype.to_string()));
    }
    tensor.check_output()?;

    let mut contents = InferTensorContents::default();
    match &tensor.data {
        TensorData::Bool(v) => contents.bool_contents = v.clone(),
        TensorData::Int32(v) => contents.int_contents = v.clone(),
        TensorData::Int64(v) => contents.int64_contents = v.clone(),
        TensorData::Uint32(v) => contents.uint_contents = v.clone(),
        TensorData::Uint64(v) => contents.uint64_contents = v.clone(),
        TensorData::Fp32(v) => contents.fp32_contents = v.clone(),
        TensorData::Fp64(v) => contents.fp64_contents = v.clone(),
        TensorData::Bytes(v) => contents.bytes_contents = v.clone(),
    }
    Ok(contents)
}

/// Content bucket names as they appear on the wire.
pub fn bucket_field(bucket: Bucket) -> &'static str {
    match bucket {
        Bucket::Bool => "bool_contents",
        Bucket::Int32 => "int_contents",
        Bucket::Int64 => "int64_contents",
        Bucket::Uint32 => "uint_contents",
        Bucket::Uint64 => "uint64_contents",
        Bucket::Fp32 => "fp32_contents",
        Bucket::Fp64 => "fp64_contents",
        Bucket::Bytes => "bytes_contents",
    }
}
