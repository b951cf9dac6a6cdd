use log::debug;

use crate::error::{Error, Result};
use crate::importer::context::{input_name, operator_name, optional_input_name};
use crate::importer::LoweringContext;
use crate::ops::math::arithmetic::broadcast_rhs;
use crate::parser::ArgumentDictionary;
use crate::proto::NodeProto;

const TRANSPOSE_2D: [usize; 2] = [1, 0];

/// Lower `Y = op(A) * op(B) + C`.
///
/// Only `alpha == beta == 1` is accepted. `C` is broadcast to the product
/// when the model's broadcast rule allows it, aligned on the trailing dims.
pub fn lower_gemm(
    ctx: &mut LoweringContext<'_>,
    node: &NodeProto,
    dict: &ArgumentDictionary<'_>,
) -> Result<()> {
    let name = operator_name(node);

    for scale in ["alpha", "beta"] {
        if let Some(value) = dict.float(scale)? {
            if value != 1.0 {
                return Err(Error::unsupported_operator(
                    "",
                    "",
                    format!("{} must be 1.0, got {}", scale, value),
                ));
            }
        }
    }

    let mut a = ctx.get_or_create_variable(input_name(node, 0)?)?;
    let mut b = ctx.get_or_create_variable(input_name(node, 1)?)?;
    let c = match optional_input_name(node, 2) {
        Some(c) => Some(ctx.get_or_create_variable(c)?),
        None => None,
    };

    let broadcast_c = ctx.broadcast(dict)?;
    let trans_a = dict.int("transA")?.unwrap_or(0) != 0;
    let trans_b = dict.int("transB")?.unwrap_or(0) != 0;

    if trans_a {
        a = ctx.graph.create_transpose(&name, a, &TRANSPOSE_2D)?;
    }
    if trans_b {
        b = ctx.graph.create_transpose(&name, b, &TRANSPOSE_2D)?;
    }

    let mul = ctx.graph.create_matmul(&name, a, b)?;
    let out = match c {
        Some(mut c) => {
            if broadcast_c {
                c = broadcast_rhs(ctx, &name, mul, c, None)?;
            }
            ctx.graph.create_add(&name, mul, c)?
        }
        None => mul,
    };

    debug!(
        "Gemm {} lowered (transA={}, transB={}, broadcast={})",
        name, trans_a, trans_b, broadcast_c
    );
    ctx.add_node_as_output(node, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::graph::{ArithmeticOp, NodeKind};
    use crate::importer::context::tests::{node, Fixture};
    use crate::parser::attributes::tests::int_attr;
    use crate::proto::attribute_proto::AttributeType;
    use crate::proto::AttributeProto;
    use crate::tensor::{ElemKind, Tensor};

    fn fixture(opset: i64) -> Fixture {
        let mut fx = Fixture::new(opset);
        fx.input("a", Tensor::new(ElemKind::Float, &[2, 3]));
        fx.initializer("b", Tensor::new(ElemKind::Float, &[3, 5]));
        fx.initializer("c", Tensor::new(ElemKind::Float, &[5]));
        fx.initializer("bt", Tensor::new(ElemKind::Float, &[5, 3]));
        fx
    }

    #[test]
    fn test_broadcast_c_at_rank_difference() {
        let mut fx = fixture(7);
        let n = node("Gemm", &["a", "b", "c"], &["y"]);
        let dict = ArgumentDictionary::from_node(&n);
        lower_gemm(&mut fx.ctx(), &n, &dict).unwrap();

        assert_eq!(fx.dims("y"), vec![2, 5]);
        assert!(matches!(fx.kind("y"), NodeKind::Arithmetic(ArithmeticOp::Add)));
        let y = fx.values.get("y").unwrap();
        let ops = fx.graph.operands(y);
        assert!(matches!(fx.graph.node(ops[0]).unwrap().kind, NodeKind::MatMul));
        assert!(matches!(
            fx.graph.node(ops[1]).unwrap().kind,
            NodeKind::Broadcast { axis: 1, .. }
        ));
    }

    #[test]
    fn test_no_broadcast_before_opset_7() {
        let mut fx = fixture(6);
        let n = node("Gemm", &["a", "b", "c"], &["y"]);
        let dict = ArgumentDictionary::from_node(&n);
        assert!(lower_gemm(&mut fx.ctx(), &n, &dict).is_err());
        assert!(fx
            .graph
            .nodes()
            .all(|(_, n)| !matches!(n.kind, NodeKind::Broadcast { .. })));

        let mut n = node("Gemm", &["a", "b", "c"], &["z"]);
        n.attribute.push(int_attr("broadcast", 1));
        let dict = ArgumentDictionary::from_node(&n);
        lower_gemm(&mut fx.ctx(), &n, &dict).unwrap();
        assert_eq!(fx.dims("z"), vec![2, 5]);
    }

    #[test]
    fn test_trans_b() {
        let mut fx = fixture(7);
        let mut n = node("Gemm", &["a", "bt", "c"], &["y"]);
        n.attribute.push(int_attr("transB", 1));
        let dict = ArgumentDictionary::from_node(&n);
        lower_gemm(&mut fx.ctx(), &n, &dict).unwrap();
        assert_eq!(fx.dims("y"), vec![2, 5]);
    }

    #[test]
    fn test_scaled_gemm_is_unsupported() {
        let mut fx = fixture(7);
        let mut n = node("Gemm", &["a", "b", "c"], &["y"]);
        n.attribute.push(AttributeProto {
            name: "alpha".to_string(),
            r#type: AttributeType::Float as i32,
            f: 0.5,
            ..Default::default()
        });
        let dict = ArgumentDictionary::from_node(&n);
        let err = lower_gemm(&mut fx.ctx(), &n, &dict).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperator);
    }
}
