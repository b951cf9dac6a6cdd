use crate::error::Result;
use crate::importer::context::{input_name, operator_name};
use crate::importer::LoweringContext;
use crate::parser::ArgumentDictionary;
use crate::proto::NodeProto;

/// Channel axis of NCHW activations.
const CHANNEL_IDX: usize = 1;
const DEFAULT_EPSILON: f32 = 1e-5;
const DEFAULT_MOMENTUM: f32 = 0.9;

/// Lower BatchNormalization in inference form. Scale, bias, mean and
/// variance must be known tensors; they are copied into constants.
pub fn lower_batch_normalization(
    ctx: &mut LoweringContext<'_>,
    node: &NodeProto,
    dict: &ArgumentDictionary<'_>,
) -> Result<()> {
    let name = operator_name(node);
    let epsilon = dict.float("epsilon")?.unwrap_or(DEFAULT_EPSILON);
    let momentum = dict.float("momentum")?.unwrap_or(DEFAULT_MOMENTUM);

    let input = ctx.get_or_create_variable(input_name(node, 0)?)?;

    let mut params = Vec::with_capacity(4);
    for (idx, role) in ["scale", "bias", "mean", "var"].iter().enumerate() {
        let tensor = ctx.get_tensor(input_name(node, idx + 1)?)?.clone();
        params.push(ctx.graph.create_constant(&format!("{}.{}", name, role), tensor));
    }

    let out = ctx.graph.create_batch_normalization(
        &name,
        input,
        params[0],
        params[1],
        params[2],
        params[3],
        CHANNEL_IDX,
        epsilon,
        momentum,
    )?;
    ctx.add_node_as_output(node, out)
}
