//! ONNX model importer: reads a serialized model and lowers its graph into
//! a [`Graph`].
//!
//! Two modes are supported. [`OnnxModelLoader::parse`] loads a model
//! embedded in memory, registering only its declared inputs, and leaves
//! output handling to the caller. [`OnnxModelLoader::from_file`] loads a
//! standalone model: caller bindings, initializers and inputs are pooled,
//! every node is lowered in order and each declared output gets a
//! `save_<name>` node.
//!
//! A failed load removes every node it added to the target graph.

pub mod context;
pub mod dispatch;
pub mod symbols;

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::graph::{Graph, NodeId};
use crate::ops::OperatorRegistry;
use crate::parser::{load_shape, load_tensor, LoaderOptions, ModelDeserializer, ModelVersion};
use crate::proto::{GraphProto, ModelProto};
use crate::tensor::Tensor;

pub use context::LoweringContext;
pub use dispatch::OnnxOperator;
pub use symbols::{OutputRegistry, TensorOrigin, TensorPool};

/// Loads one ONNX model into a caller-owned graph.
pub struct OnnxModelLoader<'g> {
    graph: &'g mut Graph,
    registry: OperatorRegistry,
    tensors: TensorPool,
    values: OutputRegistry,
    outputs: HashMap<String, NodeId>,
    version: Option<ModelVersion>,
    options: LoaderOptions,
}

impl<'g> OnnxModelLoader<'g> {
    fn new(graph: &'g mut Graph, options: LoaderOptions) -> Self {
        Self {
            graph,
            registry: OperatorRegistry::initialize_standard_operators(),
            tensors: TensorPool::new(),
            values: OutputRegistry::new(),
            outputs: HashMap::new(),
            version: None,
            options,
        }
    }

    /// Load a model held in memory with default options.
    pub fn parse(model: &[u8], graph: &'g mut Graph) -> Result<Self> {
        Self::parse_with_options(model, graph, LoaderOptions::default())
    }

    pub fn parse_with_options(
        model: &[u8],
        graph: &'g mut Graph,
        options: LoaderOptions,
    ) -> Result<Self> {
        let proto = ModelDeserializer::read_bytes(model, &options)?;
        Self::run(graph, options, |loader| loader.load_embedded(proto))
    }

    /// Load an embedded model from any byte stream.
    pub fn from_reader<R: Read>(
        reader: R,
        graph: &'g mut Graph,
        options: LoaderOptions,
    ) -> Result<Self> {
        let proto = ModelDeserializer::read_stream(reader, &options)?;
        Self::run(graph, options, |loader| loader.load_embedded(proto))
    }

    /// Load a standalone model file. `bindings` pre-populate the tensor
    /// pool and take precedence over same-named initializers and
    /// constants.
    pub fn from_file<I, S>(path: impl AsRef<Path>, bindings: I, graph: &'g mut Graph) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Tensor)>,
        S: Into<String>,
    {
        Self::from_file_with_options(path, bindings, graph, LoaderOptions::default())
    }

    pub fn from_file_with_options<I, S>(
        path: impl AsRef<Path>,
        bindings: I,
        graph: &'g mut Graph,
        options: LoaderOptions,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Tensor)>,
        S: Into<String>,
    {
        let proto = ModelDeserializer::read_file(path.as_ref(), &options)?;
        let bindings: Vec<(String, Tensor)> = bindings
            .into_iter()
            .map(|(name, tensor)| (name.into(), tensor))
            .collect();
        Self::run(graph, options, |loader| loader.load_standalone(proto, bindings))
    }

    /// Run `load`, rolling the graph back if it fails.
    fn run<F>(graph: &'g mut Graph, options: LoaderOptions, load: F) -> Result<Self>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let checkpoint = graph.checkpoint();
        let mut loader = Self::new(graph, options);
        match load(&mut loader) {
            Ok(()) => Ok(loader),
            Err(e) => {
                debug!("Load failed, discarding partial graph: {}", e);
                loader.graph.rollback(checkpoint);
                Err(e)
            }
        }
    }

    fn set_version(&mut self, model: &ModelProto) -> Result<()> {
        let version = ModelVersion::resolve(model, self.options.min_ir_version)?;
        info!(
            "Importing ONNX model (ir_version {}, opset {}) from '{}'",
            version.ir_version, version.opset_version, model.producer_name
        );
        self.version = Some(version);
        Ok(())
    }

    fn take_graph(model: ModelProto) -> Result<GraphProto> {
        model
            .graph
            .ok_or_else(|| Error::MissingField("model graph".to_string()))
    }

    fn load_embedded(&mut self, model: ModelProto) -> Result<()> {
        self.set_version(&model)?;
        let net = Self::take_graph(model)?;
        self.load_inputs(&net)?;
        self.load_network(&net)
    }

    fn load_standalone(&mut self, model: ModelProto, bindings: Vec<(String, Tensor)>) -> Result<()> {
        self.set_version(&model)?;
        let net = Self::take_graph(model)?;

        for (name, tensor) in bindings {
            self.tensors
                .insert_if_absent(&name, tensor, TensorOrigin::Binding);
        }
        self.load_initializers(&net)?;
        self.load_inputs(&net)?;
        self.load_network(&net)?;
        self.set_output_nodes(&net)
    }

    /// Pool a zero tensor for every declared input not already known.
    fn load_inputs(&mut self, net: &GraphProto) -> Result<()> {
        for input in &net.input {
            if self.tensors.contains(&input.name) {
                continue;
            }
            let tensor = load_shape(
                &input.name,
                input.r#type.as_ref(),
                self.options.max_proto_size,
            )?;
            debug!("Input '{}' {:?}", input.name, tensor);
            self.tensors
                .insert_if_absent(&input.name, tensor, TensorOrigin::Input);
        }
        Ok(())
    }

    fn load_initializers(&mut self, net: &GraphProto) -> Result<()> {
        for init in &net.initializer {
            let tensor = load_tensor(init, self.options.max_proto_size)?;
            if !self
                .tensors
                .insert_if_absent(&init.name, tensor, TensorOrigin::Initializer)
            {
                debug!("Initializer '{}' is bound by the caller", init.name);
            }
        }
        Ok(())
    }

    fn load_network(&mut self, net: &GraphProto) -> Result<()> {
        let version = self.version.ok_or_else(|| {
            Error::ValidationError("model version must be set before lowering".to_string())
        })?;
        let mut ctx = LoweringContext::new(
            &mut *self.graph,
            &mut self.tensors,
            &mut self.values,
            version,
        )
        .with_max_tensor_bytes(self.options.max_proto_size);
        for node in &net.node {
            dispatch::load_operator(&mut ctx, &self.registry, node)?;
        }
        info!("Lowered {} nodes of graph '{}'", net.node.len(), net.name);
        Ok(())
    }

    fn set_output_nodes(&mut self, net: &GraphProto) -> Result<()> {
        if net.output.is_empty() {
            return Err(Error::ValidationError(
                "Network needs external outputs defined.".to_string(),
            ));
        }
        for output in &net.output {
            let value = self.values.get(&output.name).ok_or_else(|| {
                Error::ValidationError(format!(
                    "declared output '{}' is not produced by any node",
                    output.name
                ))
            })?;
            let save = self
                .graph
                .create_save(&format!("save_{}", output.name), value)?;
            self.outputs.insert(output.name.clone(), save);
        }
        info!("Finalized {} outputs", self.outputs.len());
        Ok(())
    }

    pub fn ir_version(&self) -> Option<i64> {
        self.version.map(|v| v.ir_version)
    }

    pub fn opset_version(&self) -> Option<i64> {
        self.version.map(|v| v.opset_version)
    }

    /// The `Save` node created for a declared output.
    pub fn output_by_name(&self, name: &str) -> Result<NodeId> {
        self.outputs
            .get(name)
            .copied()
            .ok_or_else(|| Error::ValidationError(format!("no output named '{}'", name)))
    }

    /// Declared outputs and their `Save` nodes.
    pub fn outputs(&self) -> &HashMap<String, NodeId> {
        &self.outputs
    }

    /// Graph value currently bound to a serialized value name.
    pub fn node_value_by_name(&self, name: &str) -> Option<NodeId> {
        self.values.get(name)
    }

    pub fn tensor(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn graph(&self) -> &Graph {
        &*self.graph
    }
}
