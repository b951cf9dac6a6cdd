use std::fmt;

use petgraph::stable_graph::NodeIndex;
use strum_macros::AsRefStr;

use crate::layout::Pads;
use crate::tensor::{ElemKind, Tensor};

/// Handle to a node's (single) result value.
pub type NodeId = NodeIndex;

/// Element kind plus dims of a value flowing through the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorType {
    pub elem: ElemKind,
    pub dims: Vec<usize>,
}

impl TensorType {
    pub fn new(elem: ElemKind, dims: impl Into<Vec<usize>>) -> Self {
        Self {
            elem,
            dims: dims.into(),
        }
    }

    pub fn of(tensor: &Tensor) -> Self {
        Self::new(tensor.elem_kind(), tensor.dims())
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.elem, self.dims)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// Bound at run time, or pre-supplied by the caller.
    Placeholder,
    /// Weights embedded in the model.
    Constant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub enum Activation {
    Relu,
    Sigmoid,
    Tanh,
}

/// Sliding window parameters for convolution and pooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowParams {
    pub kernel: usize,
    pub stride: usize,
    pub pads: Pads,
}

/// Operation performed by a graph node. Operands are stored on the graph
/// edges, in the order listed in each variant's doc.
#[derive(Debug, Clone, PartialEq, AsRefStr)]
pub enum NodeKind {
    /// No operands.
    Variable { kind: VariableKind, payload: Tensor },
    /// `[input]`
    Transpose { shuffle: Vec<usize> },
    /// `[input, filter, bias]`, NHWC input and KRSC filter.
    Convolution { window: WindowParams, group: usize },
    /// `[input]`, NHWC.
    MaxPool { window: WindowParams },
    /// `[input]`, NHWC.
    AvgPool { window: WindowParams },
    /// `[input, scale, bias, mean, var]`
    BatchNormalization {
        channel_idx: usize,
        epsilon: f32,
        momentum: f32,
    },
    /// One operand per concatenated input.
    Concat { axis: usize },
    /// `[lhs, rhs]`
    MatMul,
    /// `[lhs, rhs]`
    Arithmetic(ArithmeticOp),
    /// `[input]`
    Activation(Activation),
    /// `[input]`
    SoftMax { axis: usize },
    /// `[input]`
    Reshape { dims: Vec<usize> },
    /// `[input]`
    Squeeze { axes: Vec<usize> },
    /// `[input]`
    ExpandDims { axes: Vec<usize> },
    /// `[input]`, placed at `axis` inside `dims`.
    Broadcast { dims: Vec<usize>, axis: usize },
    /// `[input]`; terminal node marking a model output.
    Save,
}

/// A graph node and the type of the value it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub ty: TensorType,
}

impl Node {
    pub fn is_variable(&self) -> bool {
        matches!(self.kind, NodeKind::Variable { .. })
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Variable {
                kind: VariableKind::Placeholder,
                ..
            }
        )
    }

    pub fn is_constant(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Variable {
                kind: VariableKind::Constant,
                ..
            }
        )
    }
}
