pub mod error;
pub mod graph;
pub mod importer;
pub mod layout;
pub mod ops;
pub mod parser;
pub mod proto;
pub mod tensor;

// Re-export commonly used types
pub use error::{Error, ErrorKind, Result};
pub use graph::{Graph, Node, NodeId, NodeKind, TensorType, VariableKind};
pub use importer::{OnnxModelLoader, OnnxOperator};
pub use ops::registry::{Operator, OperatorRegistry};
pub use parser::{LoaderOptions, MAX_PROTO_SIZE};
pub use tensor::{ElemKind, Tensor};
