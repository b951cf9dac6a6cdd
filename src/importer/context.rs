use log::{debug, warn};

use crate::error::{Error, Result};
use crate::graph::{Graph, NodeId};
use crate::parser::{ArgumentDictionary, ModelVersion, MAX_PROTO_SIZE};
use crate::proto::NodeProto;
use crate::tensor::Tensor;

use super::symbols::{OutputRegistry, TensorPool};

/// Everything an operator lowering needs: the graph being built, the two
/// symbol tables and the model version.
pub struct LoweringContext<'a> {
    pub graph: &'a mut Graph,
    pub tensors: &'a mut TensorPool,
    pub values: &'a mut OutputRegistry,
    pub version: ModelVersion,
    /// Largest tensor a `Constant` node may materialize.
    pub max_tensor_bytes: usize,
}

/// Name of the `idx`-th input of `node`.
pub fn input_name(node: &NodeProto, idx: usize) -> Result<&str> {
    match node.input.get(idx) {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(Error::MissingField(format!(
            "input {} of {} node '{}'",
            idx,
            node.op_type,
            operator_name(node)
        ))),
    }
}

/// Name of an optional input; empty names mean the input was skipped.
pub fn optional_input_name(node: &NodeProto, idx: usize) -> Option<&str> {
    node.input
        .get(idx)
        .map(String::as_str)
        .filter(|name| !name.is_empty())
}

/// The node's own name, falling back to its first output, then its type.
pub fn operator_name(node: &NodeProto) -> String {
    if !node.name.is_empty() {
        node.name.clone()
    } else if let Some(out) = node.output.first() {
        out.clone()
    } else {
        node.op_type.clone()
    }
}

impl<'a> LoweringContext<'a> {
    pub fn new(
        graph: &'a mut Graph,
        tensors: &'a mut TensorPool,
        values: &'a mut OutputRegistry,
        version: ModelVersion,
    ) -> Self {
        Self {
            graph,
            tensors,
            values,
            version,
            max_tensor_bytes: MAX_PROTO_SIZE,
        }
    }

    pub fn with_max_tensor_bytes(mut self, max_tensor_bytes: usize) -> Self {
        self.max_tensor_bytes = max_tensor_bytes;
        self
    }

    /// Graph value for `name`. Values produced by earlier nodes win; a pooled
    /// tensor is materialized on first use as a placeholder or constant and
    /// registered so later uses share it.
    pub fn get_or_create_variable(&mut self, name: &str) -> Result<NodeId> {
        if let Some(id) = self.values.get(name) {
            return Ok(id);
        }
        let entry = self.tensors.entry(name).ok_or_else(|| {
            Error::InvalidGraph(format!("value '{}' is used before it is defined", name))
        })?;
        let payload = entry.tensor.clone();
        let id = if entry.origin.is_placeholder() {
            self.graph.create_placeholder(name, payload)
        } else {
            self.graph.create_constant(name, payload)
        };
        debug!("Materialized '{}' as {:?} variable", name, entry.origin);
        self.values.bind(name, id);
        Ok(id)
    }

    /// Pooled tensor `name`, for operands that must be known at load time.
    pub fn get_tensor(&self, name: &str) -> Result<&Tensor> {
        self.tensors.get(name).ok_or_else(|| {
            Error::unsupported_operator("", "", format!("input '{}' must be a constant tensor", name))
        })
    }

    /// Bind output(0) of `node` to `value`. Only the first output is ever
    /// bound; the rest are reported and left undefined.
    pub fn add_node_as_output(&mut self, node: &NodeProto, value: NodeId) -> Result<()> {
        let first = node.output.first().ok_or_else(|| {
            Error::MissingField(format!(
                "output of {} node '{}'",
                node.op_type,
                operator_name(node)
            ))
        })?;
        if node.output.len() > 1 {
            warn!(
                "{} node '{}' declares {} outputs; only '{}' is bound",
                node.op_type,
                operator_name(node),
                node.output.len(),
                first
            );
        }
        self.values.bind(first, value);
        Ok(())
    }

    pub fn broadcast(&self, dict: &ArgumentDictionary<'_>) -> Result<bool> {
        self.version.broadcast(dict)
    }
}
