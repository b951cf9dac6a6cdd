use log::debug;

use crate::error::{Error, Result};
use crate::graph::WindowParams;
use crate::importer::context::{input_name, operator_name, optional_input_name};
use crate::importer::LoweringContext;
use crate::layout::{get_kernel, get_pads, get_stride, NCHW2NHWC, NHWC2NCHW};
use crate::parser::attributes::to_usize;
use crate::parser::ArgumentDictionary;
use crate::proto::NodeProto;
use crate::tensor::{ElemKind, Tensor};

/// Lower an NCHW convolution onto the channel-last graph operator.
///
/// The weight must be a known tensor; it is re-laid out once at load time
/// into a `conv.filter` constant. A missing or unknown bias becomes a zero
/// `conv.bias` constant.
pub fn lower_conv(
    ctx: &mut LoweringContext<'_>,
    node: &NodeProto,
    dict: &ArgumentDictionary<'_>,
) -> Result<()> {
    let name = operator_name(node);

    let stride = get_stride(dict)?;
    let group = match dict.int("group")? {
        Some(g) if g > 0 => to_usize("group", g)?,
        Some(g) => {
            return Err(Error::ValidationError(format!(
                "Conv group must be positive, got {}",
                g
            )))
        }
        None => 1,
    };
    let pads = get_pads(dict)?;

    let input = ctx.get_or_create_variable(input_name(node, 0)?)?;

    let weight = ctx.get_tensor(input_name(node, 1)?)?;
    if weight.dims().len() != 4 {
        return Err(Error::ValidationError(format!(
            "Conv weight must be 4-D, got {:?}",
            weight.dims()
        )));
    }
    let wtag = weight.transpose(&NCHW2NHWC)?;
    let depth = wtag.dims()[0];
    let kernel = get_kernel(dict, [wtag.dims()[1], wtag.dims()[2]])?;

    let mut bias = Tensor::new(ElemKind::Float, &[depth]);
    if let Some(bias_name) = optional_input_name(node, 2) {
        if let Some(supplied) = ctx.tensors.get(bias_name) {
            bias.copy_from(supplied)?;
        }
    }

    let filter = ctx.graph.create_constant("conv.filter", wtag);
    let bias = ctx.graph.create_constant("conv.bias", bias);

    let window = WindowParams {
        kernel,
        stride,
        pads,
    };
    let tr = ctx.graph.create_transpose(&name, input, &NCHW2NHWC)?;
    let conv = ctx.graph.create_conv(&name, tr, filter, bias, window, group)?;
    let out = ctx.graph.create_transpose(&name, conv, &NHWC2NCHW)?;

    debug!(
        "Conv {}: kernel {}, stride {}, pads {:?}, group {} -> {:?}",
        name,
        kernel,
        stride,
        pads,
        group,
        ctx.graph.dims(out)?
    );
    ctx.add_node_as_output(node, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::graph::NodeKind;
    use crate::importer::context::tests::{node, Fixture};
    use crate::parser::attributes::tests::{int_attr, ints_attr, string_attr};

    fn fixture() -> Fixture {
        let mut fx = Fixture::new(7);
        fx.input("x", Tensor::new(ElemKind::Float, &[1, 3, 4, 4]));
        let weights: Vec<f32> = (0..54).map(|v| v as f32).collect();
        fx.initializer("w", Tensor::from_f32(&[2, 3, 3, 3], weights).unwrap());
        fx.initializer("b", Tensor::from_f32(&[2], vec![0.5, -0.5]).unwrap());
        fx
    }

    #[test]
    fn test_conv_output_shape_and_layout() {
        let mut fx = fixture();
        let n = node("Conv", &["x", "w"], &["y"]);
        let dict = ArgumentDictionary::from_node(&n);
        lower_conv(&mut fx.ctx(), &n, &dict).unwrap();

        assert_eq!(fx.dims("y"), vec![1, 2, 2, 2]);
        let y = fx.values.get("y").unwrap();
        assert!(matches!(
            &fx.graph.node(y).unwrap().kind,
            NodeKind::Transpose { shuffle } if shuffle == &NHWC2NCHW.to_vec()
        ));

        let conv = fx.graph.operands(y)[0];
        let ops = fx.graph.operands(conv);
        assert!(matches!(
            &fx.graph.node(ops[0]).unwrap().kind,
            NodeKind::Transpose { shuffle } if shuffle == &NCHW2NHWC.to_vec()
        ));
        let filter = fx.graph.variable_payload(ops[1]).unwrap();
        assert_eq!(filter.dims(), &[2, 3, 3, 3]);
        let bias = fx.graph.variable_payload(ops[2]).unwrap();
        assert!(bias.as_f32().unwrap().iter().all(|v| *v == 0.0));
        assert_eq!(fx.graph.node(ops[1]).unwrap().name, "conv.filter");
    }

    #[test]
    fn test_filter_is_channel_last() {
        let mut fx = Fixture::new(7);
        fx.input("x", Tensor::new(ElemKind::Float, &[1, 2, 1, 1]));
        // [depth=1, c=2, 1, 1]
        fx.initializer("w", Tensor::from_f32(&[1, 2, 1, 1], vec![3.0, 4.0]).unwrap());
        let n = node("Conv", &["x", "w"], &["y"]);
        let dict = ArgumentDictionary::from_node(&n);
        lower_conv(&mut fx.ctx(), &n, &dict).unwrap();
        let filter = fx.graph.find_by_name("conv.filter").unwrap();
        let payload = fx.graph.variable_payload(filter).unwrap();
        assert_eq!(payload.dims(), &[1, 1, 1, 2]);
    }

    #[test]
    fn test_known_bias_is_copied() {
        let mut fx = fixture();
        let n = node("Conv", &["x", "w", "b"], &["y"]);
        let dict = ArgumentDictionary::from_node(&n);
        lower_conv(&mut fx.ctx(), &n, &dict).unwrap();
        let bias = fx.graph.find_by_name("conv.bias").unwrap();
        let values: Vec<f32> = fx
            .graph
            .variable_payload(bias)
            .unwrap()
            .as_f32()
            .unwrap()
            .iter()
            .copied()
            .collect();
        assert_eq!(values, vec![0.5, -0.5]);
    }

    #[test]
    fn test_explicit_pads_and_stride() {
        let mut fx = fixture();
        let mut n = node("Conv", &["x", "w"], &["y"]);
        n.attribute.push(ints_attr("pads", &[1, 1, 1, 1]));
        n.attribute.push(ints_attr("strides", &[2, 2]));
        n.attribute.push(ints_attr("kernel_shape", &[3, 3]));
        let dict = ArgumentDictionary::from_node(&n);
        lower_conv(&mut fx.ctx(), &n, &dict).unwrap();
        assert_eq!(fx.dims("y"), vec![1, 2, 2, 2]);
    }

    #[test]
    fn test_same_padding_is_unsupported() {
        let mut fx = fixture();
        let mut n = node("Conv", &["x", "w"], &["y"]);
        n.attribute.push(string_attr("auto_pad", "SAME_UPPER"));
        let dict = ArgumentDictionary::from_node(&n);
        let err = lower_conv(&mut fx.ctx(), &n, &dict).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperator);
    }

    #[test]
    fn test_group_must_divide_channels() {
        let mut fx = fixture();
        let mut n = node("Conv", &["x", "w"], &["y"]);
        n.attribute.push(int_attr("group", 2));
        let dict = ArgumentDictionary::from_node(&n);
        assert!(lower_conv(&mut fx.ctx(), &n, &dict).is_err());
    }

    #[test]
    fn test_runtime_weight_is_rejected() {
        let mut fx = fixture();
        let n = node("Conv", &["x", "missing"], &["z"]);
        let dict = ArgumentDictionary::from_node(&n);
        let err = lower_conv(&mut fx.ctx(), &n, &dict).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperator);
    }
}
