use std::collections::HashMap;
use std::fmt;

use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::{Error, Result};
use crate::layout::{calculate_conv_pool_output_dims, can_broadcast_at, transposed_dims, ShapeNHWC};
use crate::tensor::{element_count, ElemKind, Tensor};

use super::nodes::{
    Activation, ArithmeticOp, Node, NodeId, NodeKind, TensorType, VariableKind, WindowParams,
};

/// Typed dataflow graph of tensor operations. Edges run from operand to
/// user and carry the operand index.
#[derive(Debug, Default)]
pub struct Graph {
    name: String,
    graph: StableDiGraph<Node, usize>,
    name_counts: HashMap<String, usize>,
    by_name: HashMap<String, NodeId>,
    created: Vec<NodeId>,
}

/// Marker returned by [`Graph::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.graph
            .node_weight(id)
            .ok_or_else(|| Error::InvalidGraph(format!("no node with id {}", id.index())))
    }

    pub fn ty(&self, id: NodeId) -> Result<&TensorType> {
        Ok(&self.node(id)?.ty)
    }

    pub fn dims(&self, id: NodeId) -> Result<&[usize]> {
        Ok(&self.node(id)?.ty.dims)
    }

    /// All nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.graph
            .node_indices()
            .filter_map(move |id| self.graph.node_weight(id).map(|n| (id, n)))
    }

    /// Operands of `id`, in operand order.
    pub fn operands(&self, id: NodeId) -> Vec<NodeId> {
        let mut edges: Vec<(usize, NodeId)> = self
            .graph
            .edges_directed(id, Direction::Incoming)
            .map(|e| (*e.weight(), e.source()))
            .collect();
        edges.sort_by_key(|(idx, _)| *idx);
        edges.into_iter().map(|(_, src)| src).collect()
    }

    /// Nodes that consume the value of `id`.
    pub fn users(&self, id: NodeId) -> Vec<NodeId> {
        let mut users: Vec<NodeId> = self
            .graph
            .neighbors_directed(id, Direction::Outgoing)
            .collect();
        users.sort();
        users.dedup();
        users
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    /// Terminal `Save` nodes.
    pub fn saves(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, n)| matches!(n.kind, NodeKind::Save))
            .map(|(id, _)| id)
            .collect()
    }

    /// Payload of a variable node.
    pub fn variable_payload(&self, id: NodeId) -> Result<&Tensor> {
        match &self.node(id)?.kind {
            NodeKind::Variable { payload, .. } => Ok(payload),
            other => Err(Error::InvalidGraph(format!(
                "node {} is a {}, not a variable",
                id.index(),
                other.as_ref()
            ))),
        }
    }

    fn unique_name(&mut self, base: &str) -> String {
        let count = self.name_counts.entry(base.to_string()).or_insert(0);
        let name = if *count == 0 {
            base.to_string()
        } else {
            format!("{}__{}", base, count)
        };
        *count += 1;
        name
    }

    fn add_node(&mut self, name: &str, kind: NodeKind, ty: TensorType, operands: &[NodeId]) -> NodeId {
        let name = self.unique_name(name);
        let id = self.graph.add_node(Node {
            name: name.clone(),
            kind,
            ty,
        });
        for (idx, &operand) in operands.iter().enumerate() {
            self.graph.add_edge(operand, id, idx);
        }
        self.by_name.insert(name, id);
        self.created.push(id);
        id
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.created.len())
    }

    /// Remove every node created after `checkpoint`, newest first.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        let keep = checkpoint.0.min(self.created.len());
        for id in self.created.drain(keep..).rev() {
            if let Some(node) = self.graph.remove_node(id) {
                self.by_name.remove(&node.name);
            }
        }
    }

    fn expect_elem(&self, id: NodeId, elem: ElemKind, what: &str) -> Result<()> {
        let ty = self.ty(id)?;
        if ty.elem != elem {
            return Err(Error::InvalidGraph(format!(
                "{} expects {} operands, got {}",
                what, elem, ty
            )));
        }
        Ok(())
    }

    pub fn create_variable(&mut self, name: &str, kind: VariableKind, payload: Tensor) -> NodeId {
        let ty = TensorType::of(&payload);
        self.add_node(name, NodeKind::Variable { kind, payload }, ty, &[])
    }

    pub fn create_placeholder(&mut self, name: &str, payload: Tensor) -> NodeId {
        self.create_variable(name, VariableKind::Placeholder, payload)
    }

    pub fn create_constant(&mut self, name: &str, payload: Tensor) -> NodeId {
        self.create_variable(name, VariableKind::Constant, payload)
    }

    pub fn create_transpose(&mut self, name: &str, input: NodeId, shuffle: &[usize]) -> Result<NodeId> {
        let in_ty = self.ty(input)?.clone();
        let dims = transposed_dims(&in_ty.dims, shuffle)?;
        Ok(self.add_node(
            name,
            NodeKind::Transpose {
                shuffle: shuffle.to_vec(),
            },
            TensorType::new(in_ty.elem, dims),
            &[input],
        ))
    }

    /// NHWC convolution with a `[depth, kernel, kernel, channels / group]`
    /// filter and a `[depth]` bias.
    pub fn create_conv(
        &mut self,
        name: &str,
        input: NodeId,
        filter: NodeId,
        bias: NodeId,
        window: WindowParams,
        group: usize,
    ) -> Result<NodeId> {
        for id in [input, filter, bias] {
            self.expect_elem(id, ElemKind::Float, "Convolution")?;
        }
        let idim = ShapeNHWC::new(self.dims(input)?)?;
        let fdim = self.dims(filter)?.to_vec();
        let bdim = self.dims(bias)?.to_vec();

        if group == 0 || fdim.len() != 4 {
            return Err(Error::InvalidGraph(format!(
                "Convolution {} needs a 4-D filter and group >= 1, got {:?} and group {}",
                name, fdim, group
            )));
        }
        let depth = fdim[0];
        if fdim[1] != window.kernel || fdim[2] != window.kernel {
            return Err(Error::InvalidGraph(format!(
                "Convolution {} filter {:?} does not match kernel {}",
                name, fdim, window.kernel
            )));
        }
        if idim.c != fdim[3] * group || depth % group != 0 {
            return Err(Error::InvalidGraph(format!(
                "Convolution {} has {} input channels but filter {:?} with group {}",
                name, idim.c, fdim, group
            )));
        }
        if bdim != [depth] {
            return Err(Error::InvalidGraph(format!(
                "Convolution {} bias {:?} does not match depth {}",
                name, bdim, depth
            )));
        }

        let (out_h, out_w) =
            calculate_conv_pool_output_dims(idim.h, idim.w, window.kernel, window.stride, &window.pads)?;
        let ty = TensorType::new(ElemKind::Float, vec![idim.n, out_h, out_w, depth]);
        Ok(self.add_node(
            name,
            NodeKind::Convolution { window, group },
            ty,
            &[input, filter, bias],
        ))
    }

    fn pool_type(&self, input: NodeId, window: &WindowParams) -> Result<TensorType> {
        self.expect_elem(input, ElemKind::Float, "Pooling")?;
        let idim = ShapeNHWC::new(self.dims(input)?)?;
        let (out_h, out_w) =
            calculate_conv_pool_output_dims(idim.h, idim.w, window.kernel, window.stride, &window.pads)?;
        Ok(TensorType::new(ElemKind::Float, vec![idim.n, out_h, out_w, idim.c]))
    }

    pub fn create_pool_max(&mut self, name: &str, input: NodeId, window: WindowParams) -> Result<NodeId> {
        let ty = self.pool_type(input, &window)?;
        Ok(self.add_node(name, NodeKind::MaxPool { window }, ty, &[input]))
    }

    pub fn create_pool_avg(&mut self, name: &str, input: NodeId, window: WindowParams) -> Result<NodeId> {
        let ty = self.pool_type(input, &window)?;
        Ok(self.add_node(name, NodeKind::AvgPool { window }, ty, &[input]))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_batch_normalization(
        &mut self,
        name: &str,
        input: NodeId,
        scale: NodeId,
        bias: NodeId,
        mean: NodeId,
        var: NodeId,
        channel_idx: usize,
        epsilon: f32,
        momentum: f32,
    ) -> Result<NodeId> {
        let in_ty = self.ty(input)?.clone();
        self.expect_elem(input, ElemKind::Float, "BatchNormalization")?;
        let channels = *in_ty.dims.get(channel_idx).ok_or_else(|| {
            Error::InvalidGraph(format!(
                "BatchNormalization {} channel index {} out of range for {}",
                name, channel_idx, in_ty
            ))
        })?;
        for param in [scale, bias, mean, var] {
            self.expect_elem(param, ElemKind::Float, "BatchNormalization")?;
            let size = self.ty(param)?.size();
            if size != channels {
                return Err(Error::InvalidGraph(format!(
                    "BatchNormalization {} parameter has {} elements, expected {}",
                    name, size, channels
                )));
            }
        }
        Ok(self.add_node(
            name,
            NodeKind::BatchNormalization {
                channel_idx,
                epsilon,
                momentum,
            },
            in_ty,
            &[input, scale, bias, mean, var],
        ))
    }

    pub fn create_concat(&mut self, name: &str, inputs: &[NodeId], axis: usize) -> Result<NodeId> {
        let first = inputs
            .first()
            .ok_or_else(|| Error::InvalidGraph(format!("Concat {} has no inputs", name)))?;
        let mut ty = self.ty(*first)?.clone();
        if axis >= ty.rank() {
            return Err(Error::InvalidGraph(format!(
                "Concat {} axis {} out of range for {}",
                name, axis, ty
            )));
        }
        for &other in &inputs[1..] {
            let other_ty = self.ty(other)?;
            let compatible = other_ty.elem == ty.elem
                && other_ty.rank() == ty.rank()
                && other_ty
                    .dims
                    .iter()
                    .zip(&ty.dims)
                    .enumerate()
                    .all(|(i, (a, b))| i == axis || a == b);
            if !compatible {
                return Err(Error::InvalidGraph(format!(
                    "Concat {} cannot join {} with {} along axis {}",
                    name, ty, other_ty, axis
                )));
            }
            ty.dims[axis] += other_ty.dims[axis];
        }
        Ok(self.add_node(name, NodeKind::Concat { axis }, ty, inputs))
    }

    pub fn create_matmul(&mut self, name: &str, lhs: NodeId, rhs: NodeId) -> Result<NodeId> {
        let l = self.ty(lhs)?.clone();
        let r = self.ty(rhs)?.clone();
        match (l.dims.as_slice(), r.dims.as_slice()) {
            (&[m, k1], &[k2, n]) if k1 == k2 && l.elem == r.elem => Ok(self.add_node(
                name,
                NodeKind::MatMul,
                TensorType::new(l.elem, vec![m, n]),
                &[lhs, rhs],
            )),
            _ => Err(Error::InvalidGraph(format!(
                "MatMul {} cannot multiply {} by {}",
                name, l, r
            ))),
        }
    }

    /// Element-wise binary op; both operands must have identical types.
    pub fn create_arithmetic(
        &mut self,
        name: &str,
        op: ArithmeticOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<NodeId> {
        let l = self.ty(lhs)?.clone();
        let r = self.ty(rhs)?;
        if &l != r {
            return Err(Error::InvalidGraph(format!(
                "{} {} needs operands of the same type, got {} and {}",
                op.as_ref(),
                name,
                l,
                r
            )));
        }
        Ok(self.add_node(name, NodeKind::Arithmetic(op), l, &[lhs, rhs]))
    }

    pub fn create_add(&mut self, name: &str, lhs: NodeId, rhs: NodeId) -> Result<NodeId> {
        self.create_arithmetic(name, ArithmeticOp::Add, lhs, rhs)
    }

    pub fn create_activation(&mut self, name: &str, act: Activation, input: NodeId) -> Result<NodeId> {
        self.expect_elem(input, ElemKind::Float, act.as_ref())?;
        let ty = self.ty(input)?.clone();
        Ok(self.add_node(name, NodeKind::Activation(act), ty, &[input]))
    }

    pub fn create_softmax(&mut self, name: &str, input: NodeId, axis: usize) -> Result<NodeId> {
        self.expect_elem(input, ElemKind::Float, "SoftMax")?;
        let ty = self.ty(input)?.clone();
        if axis >= ty.rank() {
            return Err(Error::InvalidGraph(format!(
                "SoftMax {} axis {} out of range for {}",
                name, axis, ty
            )));
        }
        Ok(self.add_node(name, NodeKind::SoftMax { axis }, ty, &[input]))
    }

    pub fn create_reshape(&mut self, name: &str, input: NodeId, dims: &[usize]) -> Result<NodeId> {
        let in_ty = self.ty(input)?.clone();
        let size = element_count(dims).ok();
        if size != Some(in_ty.size()) {
            return Err(Error::InvalidGraph(format!(
                "Reshape {} cannot turn {} into {:?}",
                name, in_ty, dims
            )));
        }
        Ok(self.add_node(
            name,
            NodeKind::Reshape {
                dims: dims.to_vec(),
            },
            TensorType::new(in_ty.elem, dims.to_vec()),
            &[input],
        ))
    }

    /// Remove the unit dims at `axes`.
    pub fn create_squeeze(&mut self, name: &str, input: NodeId, axes: &[usize]) -> Result<NodeId> {
        let in_ty = self.ty(input)?.clone();
        let mut axes = axes.to_vec();
        axes.sort_unstable();
        axes.dedup();
        for &axis in &axes {
            if in_ty.dims.get(axis) != Some(&1) {
                return Err(Error::InvalidGraph(format!(
                    "Squeeze {} cannot remove axis {} of {}",
                    name, axis, in_ty
                )));
            }
        }
        let dims: Vec<usize> = in_ty
            .dims
            .iter()
            .enumerate()
            .filter(|(i, _)| axes.binary_search(i).is_err())
            .map(|(_, &d)| d)
            .collect();
        Ok(self.add_node(
            name,
            NodeKind::Squeeze { axes },
            TensorType::new(in_ty.elem, dims),
            &[input],
        ))
    }

    /// Insert unit dims; `axes` index the output shape.
    pub fn create_expand_dims(&mut self, name: &str, input: NodeId, axes: &[usize]) -> Result<NodeId> {
        let in_ty = self.ty(input)?.clone();
        let mut axes = axes.to_vec();
        axes.sort_unstable();
        let mut dims = in_ty.dims.clone();
        for (i, &axis) in axes.iter().enumerate() {
            if axis > dims.len() || (i > 0 && axes[i - 1] == axis) {
                return Err(Error::InvalidGraph(format!(
                    "ExpandDims {} cannot insert axis {} into {}",
                    name, axis, in_ty
                )));
            }
            dims.insert(axis, 1);
        }
        Ok(self.add_node(
            name,
            NodeKind::ExpandDims { axes },
            TensorType::new(in_ty.elem, dims),
            &[input],
        ))
    }

    pub fn create_broadcast(
        &mut self,
        name: &str,
        input: NodeId,
        dims: &[usize],
        axis: usize,
    ) -> Result<NodeId> {
        let in_ty = self.ty(input)?.clone();
        if !can_broadcast_at(&in_ty.dims, dims, axis) {
            return Err(Error::InvalidGraph(format!(
                "Broadcast {} cannot expand {} to {:?} at axis {}",
                name, in_ty, dims, axis
            )));
        }
        Ok(self.add_node(
            name,
            NodeKind::Broadcast {
                dims: dims.to_vec(),
                axis,
            },
            TensorType::new(in_ty.elem, dims.to_vec()),
            &[input],
        ))
    }

    pub fn create_save(&mut self, name: &str, input: NodeId) -> Result<NodeId> {
        let ty = self.ty(input)?.clone();
        Ok(self.add_node(name, NodeKind::Save, ty, &[input]))
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph {} ({} nodes)", self.name, self.len())?;
        for (id, node) in self.nodes() {
            let operands: Vec<String> = self
                .operands(id)
                .iter()
                .filter_map(|op| self.graph.node_weight(*op).map(|n| n.name.clone()))
                .collect();
            writeln!(
                f,
                "  {} = {}({}) : {}",
                node.name,
                node.kind.as_ref(),
                operands.join(", "),
                node.ty
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(graph: &mut Graph, name: &str, dims: &[usize]) -> NodeId {
        graph.create_placeholder(name, Tensor::new(ElemKind::Float, dims))
    }

    #[test]
    fn test_unique_names() {
        let mut graph = Graph::new("g");
        let a = image(&mut graph, "x", &[1]);
        let b = image(&mut graph, "x", &[1]);
        assert_eq!(graph.node(a).unwrap().name, "x");
        assert_eq!(graph.node(b).unwrap().name, "x__1");
        assert_eq!(graph.find_by_name("x__1"), Some(b));
    }

    #[test]
    fn test_conv_output_type_and_operands() {
        let mut graph = Graph::new("g");
        let input = image(&mut graph, "in", &[1, 4, 4, 3]);
        let filter = graph.create_constant("filter", Tensor::new(ElemKind::Float, &[2, 3, 3, 3]));
        let bias = graph.create_constant("bias", Tensor::new(ElemKind::Float, &[2]));
        let window = WindowParams {
            kernel: 3,
            stride: 1,
            pads: [0; 4],
        };
        let conv = graph.create_conv("conv", input, filter, bias, window, 1).unwrap();
        assert_eq!(graph.dims(conv).unwrap(), &[1, 2, 2, 2]);
        assert_eq!(graph.operands(conv), vec![input, filter, bias]);
        assert_eq!(graph.users(filter), vec![conv]);

        let bad_bias = graph.create_constant("bias", Tensor::new(ElemKind::Float, &[3]));
        assert!(graph.create_conv("conv", input, filter, bad_bias, window, 1).is_err());
    }

    #[test]
    fn test_arithmetic_requires_equal_types() {
        let mut graph = Graph::new("g");
        let a = image(&mut graph, "a", &[2, 5]);
        let b = image(&mut graph, "b", &[5]);
        assert!(graph.create_add("add", a, b).is_err());

        let bb = graph.create_broadcast("bcast", b, &[2, 5], 1).unwrap();
        let add = graph.create_add("add", a, bb).unwrap();
        assert_eq!(graph.dims(add).unwrap(), &[2, 5]);
    }

    #[test]
    fn test_squeeze_and_expand_dims() {
        let mut graph = Graph::new("g");
        let x = image(&mut graph, "x", &[1, 3, 1, 2]);
        let sq = graph.create_squeeze("sq", x, &[2, 0]).unwrap();
        assert_eq!(graph.dims(sq).unwrap(), &[3, 2]);
        assert!(graph.create_squeeze("sq", x, &[1]).is_err());

        let ex = graph.create_expand_dims("ex", sq, &[0, 3]).unwrap();
        assert_eq!(graph.dims(ex).unwrap(), &[1, 3, 2, 1]);
        assert!(graph.create_expand_dims("ex", sq, &[5]).is_err());
    }

    #[test]
    fn test_concat_and_matmul() {
        let mut graph = Graph::new("g");
        let a = image(&mut graph, "a", &[2, 3]);
        let b = image(&mut graph, "b", &[2, 4]);
        let cat = graph.create_concat("cat", &[a, b], 1).unwrap();
        assert_eq!(graph.dims(cat).unwrap(), &[2, 7]);
        assert!(graph.create_concat("cat", &[a, b], 0).is_err());

        let w = image(&mut graph, "w", &[7, 5]);
        let mm = graph.create_matmul("mm", cat, w).unwrap();
        assert_eq!(graph.dims(mm).unwrap(), &[2, 5]);
        assert!(graph.create_matmul("mm", w, cat).is_err());
    }

    #[test]
    fn test_rollback_discards_newer_nodes() {
        let mut graph = Graph::new("g");
        let x = image(&mut graph, "x", &[2, 2]);
        let checkpoint = graph.checkpoint();
        let y = image(&mut graph, "y", &[2, 2]);
        graph.create_add("sum", x, y).unwrap();
        assert_eq!(graph.len(), 3);

        graph.rollback(checkpoint);
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.find_by_name("x"), Some(x));
        assert_eq!(graph.find_by_name("sum"), None);
        assert!(graph.users(x).is_empty());
    }

    #[test]
    fn test_display_lists_nodes() {
        let mut graph = Graph::new("g");
        let x = image(&mut graph, "x", &[2, 2]);
        graph.create_save("save_x", x).unwrap();
        let text = graph.to_string();
        assert!(text.contains("save_x = Save(x) : float[2, 2]"));
        assert_eq!(graph.saves().len(), 1);
    }
}
