use log::debug;

use crate::error::{Error, Result};
use crate::graph::{ArithmeticOp, NodeId};
use crate::importer::context::{input_name, operator_name};
use crate::importer::LoweringContext;
use crate::layout::broadcast_axis;
use crate::ops::registry::Operator;
use crate::parser::attributes::to_usize;
use crate::parser::ArgumentDictionary;
use crate::proto::NodeProto;

/// Binary element-wise operator (Add, Sub, Mul, Div, Max, Min)
#[derive(Debug, Clone, Copy)]
pub struct Arithmetic(pub ArithmeticOp);

/// Variadic Sum operator
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

/// Broadcast `rhs` to the type of `lhs` when broadcasting is enabled and
/// the shapes differ. `axis` places `rhs` inside `lhs`; it defaults to
/// aligning the trailing dims.
pub(crate) fn broadcast_rhs(
    ctx: &mut LoweringContext<'_>,
    name: &str,
    lhs: NodeId,
    rhs: NodeId,
    axis: Option<i64>,
) -> Result<NodeId> {
    let target = ctx.graph.dims(lhs)?.to_vec();
    let dims = ctx.graph.dims(rhs)?.to_vec();
    if target == dims {
        return Ok(rhs);
    }
    let axis = match axis {
        Some(axis) => to_usize("axis", axis)?,
        None => broadcast_axis(&target, &dims)?,
    };
    debug!("Broadcasting {:?} to {:?} at axis {} for {}", dims, target, axis, name);
    ctx.graph.create_broadcast(name, rhs, &target, axis)
}

impl Operator for Arithmetic {
    fn lower(
        &self,
        ctx: &mut LoweringContext<'_>,
        node: &NodeProto,
        dict: &ArgumentDictionary<'_>,
    ) -> Result<()> {
        let name = operator_name(node);
        let lhs = ctx.get_or_create_variable(input_name(node, 0)?)?;
        let mut rhs = ctx.get_or_create_variable(input_name(node, 1)?)?;

        if ctx.broadcast(dict)? {
            rhs = broadcast_rhs(ctx, &name, lhs, rhs, dict.int("axis")?)?;
        }

        let out = ctx.graph.create_arithmetic(&name, self.0, lhs, rhs)?;
        ctx.add_node_as_output(node, out)
    }
}

impl Operator for Sum {
    fn lower(
        &self,
        ctx: &mut LoweringContext<'_>,
        node: &NodeProto,
        _dict: &ArgumentDictionary<'_>,
    ) -> Result<()> {
        let name = operator_name(node);
        if node.input.is_empty() {
            return Err(Error::ValidationError(format!(
                "Sum node '{}' has no inputs",
                name
            )));
        }

        let mut acc = ctx.get_or_create_variable(input_name(node, 0)?)?;
        for idx in 1..node.input.len() {
            let next = ctx.get_or_create_variable(input_name(node, idx)?)?;
            acc = ctx.graph.create_add(&name, acc, next)?;
        }
        ctx.add_node_as_output(node, acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use crate::importer::context::tests::{node, Fixture};
    use crate::parser::attributes::tests::int_attr;
    use crate::tensor::{ElemKind, Tensor};

    fn fixture(opset: i64) -> Fixture {
        let mut fx = Fixture::new(opset);
        fx.input("a", Tensor::new(ElemKind::Float, &[2, 3]));
        fx.initializer("b", Tensor::from_f32(&[3], vec![1.0, 2.0, 3.0]).unwrap());
        fx.initializer("c", Tensor::new(ElemKind::Float, &[2, 3]));
        fx
    }

    #[test]
    fn test_same_shape_add() {
        let mut fx = fixture(7);
        let n = node("Add", &["a", "c"], &["y"]);
        let dict = ArgumentDictionary::from_node(&n);
        Arithmetic(ArithmeticOp::Add)
            .lower(&mut fx.ctx(), &n, &dict)
            .unwrap();
        assert!(matches!(fx.kind("y"), NodeKind::Arithmetic(ArithmeticOp::Add)));
        // a, c and the add
        assert_eq!(fx.graph.len(), 3);
    }

    #[test]
    fn test_implicit_broadcast_from_opset_7() {
        let mut fx = fixture(7);
        let n = node("Mul", &["a", "b"], &["y"]);
        let dict = ArgumentDictionary::from_node(&n);
        Arithmetic(ArithmeticOp::Mul)
            .lower(&mut fx.ctx(), &n, &dict)
            .unwrap();
        assert_eq!(fx.dims("y"), vec![2, 3]);
        let y = fx.values.get("y").unwrap();
        let rhs = fx.graph.operands(y)[1];
        assert!(matches!(
            fx.graph.node(rhs).unwrap().kind,
            NodeKind::Broadcast { axis: 1, .. }
        ));
    }

    #[test]
    fn test_opset_6_needs_broadcast_attribute() {
        let mut fx = fixture(6);
        let n = node("Sub", &["a", "b"], &["y"]);
        let dict = ArgumentDictionary::from_node(&n);
        let err = Arithmetic(ArithmeticOp::Sub)
            .lower(&mut fx.ctx(), &n, &dict)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidGraph(_)));

        let mut n = node("Sub", &["a", "b"], &["z"]);
        n.attribute.push(int_attr("broadcast", 1));
        n.attribute.push(int_attr("axis", 1));
        let dict = ArgumentDictionary::from_node(&n);
        Arithmetic(ArithmeticOp::Sub)
            .lower(&mut fx.ctx(), &n, &dict)
            .unwrap();
        assert_eq!(fx.dims("z"), vec![2, 3]);
    }

    #[test]
    fn test_sum_chains_adds() {
        let mut fx = fixture(7);
        fx.initializer("d", Tensor::new(ElemKind::Float, &[2, 3]));
        let n = node("Sum", &["a", "c", "d"], &["s"]);
        let dict = ArgumentDictionary::from_node(&n);
        Sum.lower(&mut fx.ctx(), &n, &dict).unwrap();
        let s = fx.values.get("s").unwrap();
        let inner = fx.graph.operands(s)[0];
        assert!(matches!(
            fx.graph.node(inner).unwrap().kind,
            NodeKind::Arithmetic(ArithmeticOp::Add)
        ));
    }
}
