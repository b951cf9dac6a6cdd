//! Internal computation graph the importer lowers into.

pub mod builder;
pub mod nodes;

pub use builder::{Checkpoint, Graph};
pub use nodes::{
    Activation, ArithmeticOp, Node, NodeId, NodeKind, TensorType, VariableKind, WindowParams,
};
