use std::str::FromStr;

use log::debug;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::{Error, Result};
use crate::ops::math::gemm::lower_gemm;
use crate::ops::nn::batch_norm::lower_batch_normalization;
use crate::ops::nn::conv::lower_conv;
use crate::ops::nn::pool::{lower_global_average_pool, lower_pool, PoolType};
use crate::ops::shape::{lower_concat, lower_dropout, lower_squeeze, lower_transpose, lower_unsqueeze};
use crate::ops::OperatorRegistry;
use crate::parser::version::is_default_domain;
use crate::parser::{load_tensor, ArgumentDictionary};
use crate::proto::NodeProto;

use super::context::{operator_name, LoweringContext};
use super::symbols::TensorOrigin;

/// ONNX operators lowered here rather than through the common table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr, EnumIter)]
pub enum OnnxOperator {
    Constant,
    Conv,
    MaxPool,
    AveragePool,
    GlobalAveragePool,
    Squeeze,
    Unsqueeze,
    Dropout,
    BatchNormalization,
    Concat,
    Gemm,
    Transpose,
}

/// Lower one node. The common table is consulted first; anything it does
/// not know must be one of [`OnnxOperator`].
pub fn load_operator(
    ctx: &mut LoweringContext<'_>,
    registry: &OperatorRegistry,
    node: &NodeProto,
) -> Result<()> {
    let name = operator_name(node);
    debug!("Lowering {} node '{}'", node.op_type, name);

    if !is_default_domain(&node.domain) {
        return Err(Error::unsupported_operator(
            name,
            node.op_type.as_str(),
            format!("operators from domain '{}' are not supported", node.domain),
        ));
    }

    let dict = ArgumentDictionary::from_node(node);
    let result = match registry.try_lower(ctx, node, &dict) {
        Ok(true) => Ok(()),
        Ok(false) => load_onnx_operator(ctx, node, &dict, &name),
        Err(e) => Err(e),
    };
    result.map_err(|e| e.in_node(&name, &node.op_type))
}

fn load_onnx_operator(
    ctx: &mut LoweringContext<'_>,
    node: &NodeProto,
    dict: &ArgumentDictionary<'_>,
    name: &str,
) -> Result<()> {
    let op = OnnxOperator::from_str(&node.op_type).map_err(|_| {
        Error::unsupported_operator(name, node.op_type.as_str(), "Unsupported operator.")
    })?;

    match op {
        OnnxOperator::Constant => load_constant(ctx, node, dict),
        OnnxOperator::Conv => lower_conv(ctx, node, dict),
        OnnxOperator::MaxPool => lower_pool(ctx, node, dict, PoolType::Max),
        OnnxOperator::AveragePool => lower_pool(ctx, node, dict, PoolType::Average),
        OnnxOperator::GlobalAveragePool => lower_global_average_pool(ctx, node, dict),
        OnnxOperator::Squeeze => lower_squeeze(ctx, node, dict),
        OnnxOperator::Unsqueeze => lower_unsqueeze(ctx, node, dict),
        OnnxOperator::Dropout => lower_dropout(ctx, node, dict),
        OnnxOperator::BatchNormalization => lower_batch_normalization(ctx, node, dict),
        OnnxOperator::Concat => lower_concat(ctx, node, dict),
        OnnxOperator::Gemm => lower_gemm(ctx, node, dict),
        OnnxOperator::Transpose => lower_transpose(ctx, node, dict),
    }
}

/// `Constant` only adds to the tensor pool. A name the caller already
/// bound keeps the caller's tensor.
fn load_constant(
    ctx: &mut LoweringContext<'_>,
    node: &NodeProto,
    dict: &ArgumentDictionary<'_>,
) -> Result<()> {
    let out = node.output.first().ok_or_else(|| {
        Error::MissingField(format!("output of Constant node '{}'", operator_name(node)))
    })?;
    let value = dict.required_tensor("value")?;
    let tensor = load_tensor(value, ctx.max_tensor_bytes)?;
    if !ctx.tensors.insert_if_absent(out, tensor, TensorOrigin::Constant) {
        debug!("Constant '{}' is already bound; keeping the existing tensor", out);
    }
    Ok(())
}
