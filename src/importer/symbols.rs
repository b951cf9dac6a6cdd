//! Name-keyed symbol tables maintained during a single lowering pass.

use std::collections::HashMap;

use crate::graph::NodeId;
use crate::tensor::Tensor;

/// Where a pooled tensor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorOrigin {
    /// Declared graph input, shape only.
    Input,
    /// Supplied by the caller before loading.
    Binding,
    /// Graph initializer.
    Initializer,
    /// `Constant` node.
    Constant,
}

impl TensorOrigin {
    /// Inputs and caller bindings are fed at run time and never folded
    /// into the graph as constants.
    pub fn is_placeholder(self) -> bool {
        matches!(self, TensorOrigin::Input | TensorOrigin::Binding)
    }
}

#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub tensor: Tensor,
    pub origin: TensorOrigin,
}

/// Named tensors known to the loader: bindings, initializers, inputs and
/// embedded constants. A bound name is never replaced.
#[derive(Debug, Default)]
pub struct TensorPool {
    tensors: HashMap<String, PoolEntry>,
}

impl TensorPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `tensor` unless `name` is already bound. Returns whether the
    /// tensor was stored.
    pub fn insert_if_absent(&mut self, name: &str, tensor: Tensor, origin: TensorOrigin) -> bool {
        if self.tensors.contains_key(name) {
            return false;
        }
        self.tensors
            .insert(name.to_string(), PoolEntry { tensor, origin });
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name).map(|e| &e.tensor)
    }

    pub fn entry(&self, name: &str) -> Option<&PoolEntry> {
        self.tensors.get(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

/// Serialized value name to the graph value currently representing it.
#[derive(Debug, Default)]
pub struct OutputRegistry {
    values: HashMap<String, NodeId>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, replacing any earlier binding.
    pub fn bind(&mut self, name: &str, value: NodeId) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.values.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
