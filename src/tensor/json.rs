//! Tensor JSON schema used by the v2 REST dialect.
//!
//! ```json
//! {"name": "input-0", "shape": [2, 4], "datatype": "FP32", "data": [6.8, 2.8, ...]}
//! ```
//!
//! `data` may arrive nested to any depth and is flattened row-major. BYTES
//! elements travel as UTF-8 strings.

use super::{Datatype, Tensor, TensorCodec, TensorData};
use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tensor as it appears in v2 REST bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonTensor {
    pub name: String,
    pub shape: Vec<u64>,
    pub datatype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
    pub data: Value,
}

/// Codec for [`JsonTensor`].
pub struct JsonCodec;

impl TensorCodec for JsonCodec {
    type Input = JsonTensor;
    type Output = JsonTensor;

    fn decode(wire: JsonTensor) -> Result<Tensor> {
        let datatype: Datatype = wire.datatype.parse()?;

        let mut scalars = Vec::new();
        flatten(wire.data, &mut scalars);

        let data = convert(&wire.name, datatype, scalars)?;
        Tensor::new(wire.name, datatype, wire.shape, data)
    }

    fn encode(tensor: &Tensor) -> Result<JsonTensor> {
        tensor.check_output()?;
        Ok(JsonTensor {
            name: tensor.name.clone(),
            shape: tensor.shape.clone(),
            datatype: tensor.datatype.as_str().to_string(),
            parameters: None,
            data: Value::Array(tensor.data.to_json_values()),
        })
    }
}

fn flatten(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten(item, out);
            }
        }
        scalar => out.push(scalar),
    }
}

fn convert(name: &str, datatype: Datatype, scalars: Vec<Value>) -> Result<TensorData> {
    let bad = |v: &Value| {
        GatewayError::InvalidRequestBody(format!(
            "tensor {} holds {} which is not a valid {} element",
            name, v, datatype
        ))
    };

    let data = match datatype {
        Datatype::Bool => TensorData::Bool(
            scalars
                .iter()
                .map(|v| v.as_bool().ok_or_else(|| bad(v)))
                .collect::<Result<_>>()?,
        ),
        Datatype::Int8 | Datatype::Int16 | Datatype::Int32 => TensorData::Int32(
            scalars
                .iter()
                .map(|v| ranged_int(datatype, v).map(|x| x as i32).ok_or_else(|| bad(v)))
                .collect::<Result<_>>()?,
        ),
        Datatype::Uint8 | Datatype::Uint16 | Datatype::Uint32 => TensorData::Uint32(
            scalars
                .iter()
                .map(|v| ranged_int(datatype, v).map(|x| x as u32).ok_or_else(|| bad(v)))
                .collect::<Result<_>>()?,
        ),
        Datatype::Int64 => TensorData::Int64(
            scalars
                .iter()
                .map(|v| v.as_i64().ok_or_else(|| bad(v)))
                .collect::<Result<_>>()?,
        ),
        Datatype::Uint64 => TensorData::Uint64(
            scalars
                .iter()
                .map(|v| v.as_u64().ok_or_else(|| bad(v)))
                .collect::<Result<_>>()?,
        ),
        Datatype::Fp16 | Datatype::Fp32 => TensorData::Fp32(
            scalars
                .iter()
                .map(|v| v.as_f64().map(|x| x as f32).ok_or_else(|| bad(v)))
                .collect::<Result<_>>()?,
        ),
        Datatype::Fp64 => TensorData::Fp64(
            scalars
                .iter()
                .map(|v| v.as_f64().ok_or_else(|| bad(v)))
                .collect::<Result<_>>()?,
        ),
        Datatype::Bytes => TensorData::Bytes(
            scalars
                .iter()
                .map(|v| v.as_str().map(|s| s.as_bytes().to_vec()).ok_or_else(|| bad(v)))
                .collect::<Result<_>>()?,
        ),
    };
    Ok(data)
}

fn ranged_int(datatype: Datatype, v: &Value) -> Option<i64> {
    let x = v.as_i64()?;
    let (lo, hi) = datatype.int_range()?;
    (lo..=hi).contains(&x).then_some(x)
}
