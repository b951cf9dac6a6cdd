//! Shape and data-movement operators.

use crate::error::{Error, Result};
use crate::importer::context::{input_name, operator_name, optional_input_name};
use crate::importer::LoweringContext;
use crate::ops::registry::Operator;
use crate::parser::ArgumentDictionary;
use crate::proto::NodeProto;
use crate::tensor::element_count;

/// Reshape operator
#[derive(Debug, Clone, Copy, Default)]
pub struct Reshape;

/// Flatten operator
#[derive(Debug, Clone, Copy, Default)]
pub struct Flatten;

/// Identity operator
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

/// Resolve a requested shape against the input dims: `0` copies the input
/// dim at the same position and a single `-1` takes the remaining size.
pub fn resolve_reshape_dims(input: &[usize], requested: &[i64]) -> Result<Vec<usize>> {
    let total: usize = input.iter().product();
    let mut dims = Vec::with_capacity(requested.len());
    let mut inferred = None;

    for (i, &d) in requested.iter().enumerate() {
        match d {
            -1 if inferred.is_none() => {
                inferred = Some(i);
                dims.push(1);
            }
            0 => dims.push(*input.get(i).ok_or_else(|| {
                Error::ValidationError(format!(
                    "Reshape cannot copy dim {} of a rank {} input",
                    i,
                    input.len()
                ))
            })?),
            d if d > 0 => dims.push(d as usize),
            _ => {
                return Err(Error::ValidationError(format!(
                    "invalid Reshape dims {:?}",
                    requested
                )))
            }
        }
    }

    if let Some(i) = inferred {
        let known = element_count(&dims).map_err(|_| {
            Error::ValidationError(format!("Reshape dims {:?} are too large", requested))
        })?;
        if known == 0 || total % known != 0 {
            return Err(Error::ValidationError(format!(
                "cannot infer Reshape dims {:?} for {} elements",
                requested, total
            )));
        }
        dims[i] = total / known;
    }
    Ok(dims)
}

/// Resolve a possibly negative axis into `0..rank`.
fn normalize_axis(axis: i64, rank: usize, what: &str) -> Result<usize> {
    let rank = rank as i64;
    let resolved = if axis < 0 { axis + rank } else { axis };
    if resolved < 0 || resolved >= rank {
        return Err(Error::ValidationError(format!(
            "{} axis {} out of range for rank {}",
            what, axis, rank
        )));
    }
    Ok(resolved as usize)
}

fn normalize_axes(axes: &[i64], rank: usize, what: &str) -> Result<Vec<usize>> {
    axes.iter().map(|&a| normalize_axis(a, rank, what)).collect()
}

impl Operator for Reshape {
    fn lower(
        &self,
        ctx: &mut LoweringContext<'_>,
        node: &NodeProto,
        dict: &ArgumentDictionary<'_>,
    ) -> Result<()> {
        let name = operator_name(node);
        let input = ctx.get_or_create_variable(input_name(node, 0)?)?;

        let requested = match dict.ints("shape")? {
            Some(shape) => shape.to_vec(),
            None => {
                let shape_name = optional_input_name(node, 1).ok_or_else(|| {
                    Error::MissingField(format!("shape of Reshape node '{}'", name))
                })?;
                ctx.get_tensor(shape_name)?.to_index_vec()?
            }
        };

        let dims = resolve_reshape_dims(ctx.graph.dims(input)?, &requested)?;
        let out = ctx.graph.create_reshape(&name, input, &dims)?;
        ctx.add_node_as_output(node, out)
    }
}

impl Operator for Flatten {
    fn lower(
        &self,
        ctx: &mut LoweringContext<'_>,
        node: &NodeProto,
        dict: &ArgumentDictionary<'_>,
    ) -> Result<()> {
        let name = operator_name(node);
        let input = ctx.get_or_create_variable(input_name(node, 0)?)?;
        let in_dims = ctx.graph.dims(input)?.to_vec();

        // axis == rank is allowed and yields [size, 1]
        let axis = match dict.int("axis")?.unwrap_or(1) {
            a if a == in_dims.len() as i64 => in_dims.len(),
            a => normalize_axis(a, in_dims.len(), "Flatten")?,
        };
        let outer: usize = in_dims[..axis].iter().product();
        let inner: usize = in_dims[axis..].iter().product();

        let out = ctx.graph.create_reshape(&name, input, &[outer, inner])?;
        ctx.add_node_as_output(node, out)
    }
}

impl Operator for Identity {
    fn lower(
        &self,
        ctx: &mut LoweringContext<'_>,
        node: &NodeProto,
        _dict: &ArgumentDictionary<'_>,
    ) -> Result<()> {
        let input = ctx.get_or_create_variable(input_name(node, 0)?)?;
        ctx.add_node_as_output(node, input)
    }
}

/// Dropout is the identity at inference time.
pub fn lower_dropout(
    ctx: &mut LoweringContext<'_>,
    node: &NodeProto,
    dict: &ArgumentDictionary<'_>,
) -> Result<()> {
    Identity.lower(ctx, node, dict)
}

pub fn lower_squeeze(
    ctx: &mut LoweringContext<'_>,
    node: &NodeProto,
    dict: &ArgumentDictionary<'_>,
) -> Result<()> {
    let name = operator_name(node);
    let input = ctx.get_or_create_variable(input_name(node, 0)?)?;
    let rank = ctx.graph.ty(input)?.rank();

    let axes = normalize_axes(dict.required_ints("axes")?, rank, "Squeeze")?;

    let out = ctx.graph.create_squeeze(&name, input, &axes)?;
    ctx.add_node_as_output(node, out)
}

/// Unsqueeze; `axes` index the output shape.
pub fn lower_unsqueeze(
    ctx: &mut LoweringContext<'_>,
    node: &NodeProto,
    dict: &ArgumentDictionary<'_>,
) -> Result<()> {
    let name = operator_name(node);
    let input = ctx.get_or_create_variable(input_name(node, 0)?)?;
    let axes = dict.required_ints("axes")?;
    let out_rank = ctx.graph.ty(input)?.rank() + axes.len();

    let axes = normalize_axes(axes, out_rank, "Unsqueeze")?;

    let out = ctx.graph.create_expand_dims(&name, input, &axes)?;
    ctx.add_node_as_output(node, out)
}

pub fn lower_concat(
    ctx: &mut LoweringContext<'_>,
    node: &NodeProto,
    dict: &ArgumentDictionary<'_>,
) -> Result<()> {
    let name = operator_name(node);
    let axis = dict.required_int("axis")?;

    let mut inputs = Vec::with_capacity(node.input.len());
    for idx in 0..node.input.len() {
        inputs.push(ctx.get_or_create_variable(input_name(node, idx)?)?);
    }
    let first = inputs.first().copied().ok_or_else(|| {
        Error::ValidationError(format!("Concat node '{}' has no inputs", name))
    })?;
    let rank = ctx.graph.ty(first)?.rank();
    let axis = normalize_axis(axis, rank, "Concat")?;

    let out = ctx.graph.create_concat(&name, &inputs, axis)?;
    ctx.add_node_as_output(node, out)
}

/// Transpose by `perm`; without it the dims are reversed.
pub fn lower_transpose(
    ctx: &mut LoweringContext<'_>,
    node: &NodeProto,
    dict: &ArgumentDictionary<'_>,
) -> Result<()> {
    let name = operator_name(node);
    let input = ctx.get_or_create_variable(input_name(node, 0)?)?;
    let perm = match dict.ints("perm")? {
        Some(_) => dict.required_shape("perm")?,
        None => (0..ctx.graph.ty(input)?.rank()).rev().collect(),
    };
    let out = ctx.graph.create_transpose(&name, input, &perm)?;
    ctx.add_node_as_output(node, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use crate::importer::context::tests::{node, Fixture};
    use crate::parser::attributes::tests::{int_attr, ints_attr};
    use crate::tensor::{ElemKind, Tensor};

    fn fixture() -> Fixture {
        let mut fx = Fixture::new(7);
        fx.input("x", Tensor::new(ElemKind::Float, &[2, 3, 4]));
        fx.input("u", Tensor::new(ElemKind::Float, &[1, 3, 1]));
        fx
    }

    fn lower_with<F>(fx: &mut Fixture, f: F, n: &NodeProto) -> Result<()>
    where
        F: Fn(&mut LoweringContext<'_>, &NodeProto, &ArgumentDictionary<'_>) -> Result<()>,
    {
        let dict = ArgumentDictionary::from_node(n);
        f(&mut fx.ctx(), n, &dict)
    }

    #[test]
    fn test_resolve_reshape_dims() {
        assert_eq!(resolve_reshape_dims(&[2, 3, 4], &[0, -1]).unwrap(), vec![2, 12]);
        assert_eq!(resolve_reshape_dims(&[2, 3, 4], &[4, 6]).unwrap(), vec![4, 6]);
        assert!(resolve_reshape_dims(&[2, 3, 4], &[-1, -1]).is_err());
        assert!(resolve_reshape_dims(&[2, 3, 4], &[5, -1]).is_err());
        assert!(resolve_reshape_dims(&[2], &[0, 0]).is_err());
        assert!(resolve_reshape_dims(&[2, 3, 4], &[1 << 40, 1 << 40, -1]).is_err());
    }

    #[test]
    fn test_reshape_from_attribute_and_input() {
        let mut fx = fixture();
        fx.initializer("shape", Tensor::from_i64(&[2], vec![-1, 4]).unwrap());

        let mut n = node("Reshape", &["x"], &["a"]);
        n.attribute.push(ints_attr("shape", &[6, 4]));
        lower_with(&mut fx, |c, n, d| Reshape.lower(c, n, d), &n).unwrap();
        assert_eq!(fx.dims("a"), vec![6, 4]);

        let n = node("Reshape", &["x", "shape"], &["b"]);
        lower_with(&mut fx, |c, n, d| Reshape.lower(c, n, d), &n).unwrap();
        assert_eq!(fx.dims("b"), vec![6, 4]);
    }

    #[test]
    fn test_flatten() {
        let mut fx = fixture();
        let n = node("Flatten", &["x"], &["f"]);
        lower_with(&mut fx, |c, n, d| Flatten.lower(c, n, d), &n).unwrap();
        assert_eq!(fx.dims("f"), vec![2, 12]);

        let mut n = node("Flatten", &["x"], &["g"]);
        n.attribute.push(int_attr("axis", 0));
        lower_with(&mut fx, |c, n, d| Flatten.lower(c, n, d), &n).unwrap();
        assert_eq!(fx.dims("g"), vec![1, 24]);
    }

    #[test]
    fn test_identity_and_dropout_add_no_nodes() {
        let mut fx = fixture();
        let n = node("Dropout", &["x"], &["d", "mask"]);
        lower_with(&mut fx, lower_dropout, &n).unwrap();
        let n = node("Identity", &["d"], &["i"]);
        lower_with(&mut fx, |c, n, d| Identity.lower(c, n, d), &n).unwrap();

        let x = fx.values.get("x").unwrap();
        assert_eq!(fx.values.get("d"), Some(x));
        assert_eq!(fx.values.get("i"), Some(x));
        assert_eq!(fx.graph.len(), 1);
    }

    #[test]
    fn test_squeeze_unsqueeze() {
        let mut fx = fixture();
        let mut n = node("Squeeze", &["u"], &["s"]);
        n.attribute.push(ints_attr("axes", &[0, -1]));
        lower_with(&mut fx, lower_squeeze, &n).unwrap();
        assert_eq!(fx.dims("s"), vec![3]);

        let mut n = node("Unsqueeze", &["s"], &["e"]);
        n.attribute.push(ints_attr("axes", &[0, 2]));
        lower_with(&mut fx, lower_unsqueeze, &n).unwrap();
        assert_eq!(fx.dims("e"), vec![1, 3, 1]);

        let mut n = node("Squeeze", &["x"], &["bad"]);
        n.attribute.push(ints_attr("axes", &[1]));
        assert!(lower_with(&mut fx, lower_squeeze, &n).is_err());

        let n = node("Squeeze", &["u"], &["noaxes"]);
        assert!(matches!(
            lower_with(&mut fx, lower_squeeze, &n).unwrap_err(),
            Error::MissingField(_)
        ));
    }

    #[test]
    fn test_concat() {
        let mut fx = fixture();
        fx.input("y", Tensor::new(ElemKind::Float, &[2, 5, 4]));
        let mut n = node("Concat", &["x", "y"], &["c"]);
        n.attribute.push(int_attr("axis", 1));
        lower_with(&mut fx, lower_concat, &n).unwrap();
        assert_eq!(fx.dims("c"), vec![2, 8, 4]);
        assert!(matches!(fx.kind("c"), NodeKind::Concat { axis: 1 }));

        let n = node("Concat", &["x", "y"], &["noaxis"]);
        assert!(lower_with(&mut fx, lower_concat, &n).is_err());
    }

    #[test]
    fn test_transpose() {
        let mut fx = fixture();
        let mut n = node("Transpose", &["x"], &["t"]);
        n.attribute.push(ints_attr("perm", &[1, 0, 2]));
        lower_with(&mut fx, lower_transpose, &n).unwrap();
        assert_eq!(fx.dims("t"), vec![3, 2, 4]);

        let n = node("Transpose", &["x"], &["r"]);
        lower_with(&mut fx, lower_transpose, &n).unwrap();
        assert_eq!(fx.dims("r"), vec![4, 3, 2]);
    }
}
