use log::debug;

use crate::error::{Error, Result};
use crate::graph::WindowParams;
use crate::importer::context::{input_name, operator_name};
use crate::importer::LoweringContext;
use crate::layout::{get_pads, get_stride, ShapeNCHW, NCHW2NHWC, NHWC2NCHW};
use crate::parser::ArgumentDictionary;
use crate::proto::NodeProto;

/// Pooling type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolType {
    Max,
    Average,
}

fn create_pool(
    ctx: &mut LoweringContext<'_>,
    node: &NodeProto,
    pool_type: PoolType,
    window: WindowParams,
) -> Result<()> {
    let name = operator_name(node);
    let input = ctx.get_or_create_variable(input_name(node, 0)?)?;
    let tr = ctx.graph.create_transpose(&name, input, &NCHW2NHWC)?;
    let pooled = match pool_type {
        PoolType::Max => ctx.graph.create_pool_max(&name, tr, window)?,
        PoolType::Average => ctx.graph.create_pool_avg(&name, tr, window)?,
    };
    let out = ctx.graph.create_transpose(&name, pooled, &NHWC2NCHW)?;
    debug!("{:?} pool {} -> {:?}", pool_type, name, ctx.graph.dims(out)?);
    ctx.add_node_as_output(node, out)
}

fn input_shape(ctx: &mut LoweringContext<'_>, node: &NodeProto) -> Result<ShapeNCHW> {
    let input = ctx.get_or_create_variable(input_name(node, 0)?)?;
    ShapeNCHW::new(ctx.graph.dims(input)?)
}

/// MaxPool and AveragePool. With `global_pooling` set the kernel spans
/// the input width.
pub fn lower_pool(
    ctx: &mut LoweringContext<'_>,
    node: &NodeProto,
    dict: &ArgumentDictionary<'_>,
    pool_type: PoolType,
) -> Result<()> {
    let stride = get_stride(dict)?;
    let pads = get_pads(dict)?;
    let shape = input_shape(ctx, node)?;

    let kernel = if dict.contains("global_pooling") {
        shape.w
    } else {
        dict.ints_head("kernel_shape")?
            .ok_or_else(|| Error::MissingField("attribute 'kernel_shape'".to_string()))?
    };

    create_pool(
        ctx,
        node,
        pool_type,
        WindowParams {
            kernel,
            stride,
            pads,
        },
    )
}

/// GlobalAveragePool over a square spatial input.
pub fn lower_global_average_pool(
    ctx: &mut LoweringContext<'_>,
    node: &NodeProto,
    dict: &ArgumentDictionary<'_>,
) -> Result<()> {
    let stride = get_stride(dict)?;
    let pads = get_pads(dict)?;
    let shape = input_shape(ctx, node)?;
    if shape.h != shape.w {
        return Err(Error::unsupported_operator(
            "",
            "",
            format!(
                "global pooling needs height == width, got {}x{}",
                shape.h, shape.w
            ),
        ));
    }

    create_pool(
        ctx,
        node,
        PoolType::Average,
        WindowParams {
            kernel: shape.h,
            stride,
            pads,
        },
    )
}
