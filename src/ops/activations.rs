use crate::error::{Error, Result};
use crate::graph::Activation;
use crate::importer::context::{input_name, operator_name};
use crate::importer::LoweringContext;
use crate::ops::registry::Operator;
use crate::parser::ArgumentDictionary;
use crate::proto::NodeProto;

/// Element-wise activation (Relu, Sigmoid, Tanh)
#[derive(Debug, Clone, Copy)]
pub struct ActivationOp(pub Activation);

/// Softmax operator
#[derive(Debug, Clone, Copy, Default)]
pub struct Softmax;

impl Operator for ActivationOp {
    fn lower(
        &self,
        ctx: &mut LoweringContext<'_>,
        node: &NodeProto,
        _dict: &ArgumentDictionary<'_>,
    ) -> Result<()> {
        let name = operator_name(node);
        let input = ctx.get_or_create_variable(input_name(node, 0)?)?;
        let out = ctx.graph.create_activation(&name, self.0, input)?;
        ctx.add_node_as_output(node, out)
    }
}

impl Operator for Softmax {
    fn lower(
        &self,
        ctx: &mut LoweringContext<'_>,
        node: &NodeProto,
        dict: &ArgumentDictionary<'_>,
    ) -> Result<()> {
        let name = operator_name(node);
        let input = ctx.get_or_create_variable(input_name(node, 0)?)?;
        let rank = ctx.graph.ty(input)?.rank() as i64;

        let axis = dict.int("axis")?.unwrap_or(1);
        let resolved = if axis < 0 { axis + rank } else { axis };
        if resolved < 0 || resolved >= rank {
            return Err(Error::ValidationError(format!(
                "Softmax axis {} out of range for rank {}",
                axis, rank
            )));
        }

        let out = ctx.graph.create_softmax(&name, input, resolved as usize)?;
        ctx.add_node_as_output(node, out)
    }
}
