use crate::error::Result;
use crate::importer::context::{input_name, operator_name};
use crate::importer::LoweringContext;
use crate::ops::registry::Operator;
use crate::parser::ArgumentDictionary;
use crate::proto::NodeProto;

/// Matrix multiplication of two 2-D operands
#[derive(Debug, Clone, Copy, Default)]
pub struct MatMul;

impl Operator for MatMul {
    fn lower(
        &self,
        ctx: &mut LoweringContext<'_>,
        node: &NodeProto,
        _dict: &ArgumentDictionary<'_>,
    ) -> Result<()> {
        let name = operator_name(node);
        let lhs = ctx.get_or_create_variable(input_name(node, 0)?)?;
        let rhs = ctx.get_or_create_variable(input_name(node, 1)?)?;
        let out = ctx.graph.create_matmul(&name, lhs, rhs)?;
        ctx.add_node_as_output(node, out)
    }
}
