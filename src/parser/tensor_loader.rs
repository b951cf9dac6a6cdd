use log::debug;

use crate::error::{Error, Result};
use crate::proto::tensor_proto::DataType;
use crate::proto::tensor_shape_proto::dimension::Value as DimValue;
use crate::proto::type_proto::Value as TypeValue;
use crate::proto::{TensorProto, TypeProto};
use crate::tensor::{byte_size, ElemKind, Tensor};

/// Map an ONNX element type code onto a graph element kind.
pub fn elem_kind_from_proto(data_type: i32) -> Result<ElemKind> {
    match DataType::from_i32(data_type) {
        Some(DataType::Float) => Ok(ElemKind::Float),
        Some(DataType::Int64) => Ok(ElemKind::Index),
        Some(other) => Err(Error::UnsupportedFormat(format!(
            "only float and index tensors are supported, got {:?}",
            other
        ))),
        None => Err(Error::UnsupportedFormat(format!(
            "unknown tensor element type {}",
            data_type
        ))),
    }
}

fn dims_from_proto(dims: &[i64]) -> Result<Vec<usize>> {
    dims.iter()
        .map(|&d| {
            usize::try_from(d)
                .map_err(|_| Error::ParseError(format!("negative tensor dimension {}", d)))
        })
        .collect()
}

fn check_size(name: &str, kind: ElemKind, dims: &[usize], max_bytes: usize) -> Result<()> {
    let bytes = byte_size(kind, dims)?;
    if bytes > max_bytes {
        return Err(Error::ParseError(format!(
            "tensor '{}' of shape {:?} needs {} bytes, over the {} byte limit",
            name, dims, bytes, max_bytes
        )));
    }
    Ok(())
}

/// Decode a serialized tensor of at most `max_bytes`. The typed value list
/// wins when it is non-empty, otherwise `raw_data` is read as packed
/// little-endian values.
pub fn load_tensor(proto: &TensorProto, max_bytes: usize) -> Result<Tensor> {
    let kind = elem_kind_from_proto(proto.data_type)?;
    let dims = dims_from_proto(&proto.dims)?;
    check_size(&proto.name, kind, &dims, max_bytes)?;

    let tensor = match kind {
        ElemKind::Float if !proto.float_data.is_empty() => {
            Tensor::from_f32(&dims, proto.float_data.clone())?
        }
        ElemKind::Index if !proto.int64_data.is_empty() => {
            Tensor::from_i64(&dims, proto.int64_data.clone())?
        }
        _ if !proto.raw_data.is_empty() => Tensor::from_le_bytes(kind, &dims, &proto.raw_data)?,
        _ => {
            return Err(Error::UnsupportedFormat(format!(
                "tensor '{}' has neither typed values nor raw data",
                proto.name
            )))
        }
    };

    debug!("Loaded tensor '{}' as {:?}", proto.name, tensor);
    Ok(tensor)
}

/// Zero-filled tensor with the shape and element type of a declared value.
/// Shapes over `max_bytes` are rejected before anything is allocated.
pub fn load_shape(name: &str, ty: Option<&TypeProto>, max_bytes: usize) -> Result<Tensor> {
    let tensor_type = match ty.and_then(|t| t.value.as_ref()) {
        Some(TypeValue::TensorType(t)) => t,
        None => {
            return Err(Error::UnsupportedFormat(format!(
                "value '{}' is not tensor typed",
                name
            )))
        }
    };
    let kind = elem_kind_from_proto(tensor_type.elem_type)?;
    let shape = tensor_type.shape.as_ref().ok_or_else(|| {
        Error::UnsupportedFormat(format!("value '{}' has no shape", name))
    })?;

    let mut dims = Vec::with_capacity(shape.dim.len());
    for dim in &shape.dim {
        match &dim.value {
            Some(DimValue::DimValue(d)) => dims.push(usize::try_from(*d).map_err(|_| {
                Error::ParseError(format!("value '{}' has negative dimension {}", name, d))
            })?),
            Some(DimValue::DimParam(param)) => {
                return Err(Error::UnsupportedFormat(format!(
                    "value '{}' has symbolic dimension '{}'",
                    name, param
                )))
            }
            None => {
                return Err(Error::UnsupportedFormat(format!(
                    "value '{}' has an unknown dimension",
                    name
                )))
            }
        }
    }
    check_size(name, kind, &dims, max_bytes)?;
    Tensor::try_new(kind, &dims)
}
