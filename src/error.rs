use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Protobuf parsing error: {0}")]
    ProtobufError(#[from] prost::DecodeError),

    #[error("Failed to load model from {0}: {1}")]
    ModelLoadError(PathBuf, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Version incompatibility: {0}")]
    VersionIncompatible(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid graph structure: {0}")]
    InvalidGraph(String),

    #[error("Unsupported tensor format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported operator {op_type} in node '{node}': {reason}")]
    UnsupportedOperator {
        node: String,
        op_type: String,
        reason: String,
    },

    #[error("{op_type} node '{node}': {source}")]
    InNode {
        node: String,
        op_type: String,
        #[source]
        source: Box<Error>,
    },
}

/// Coarse classification of load failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed bytes, unreadable file or size limit exceeded.
    Parse,
    /// Unsupported versions, missing outputs and ill-formed graphs.
    Validation,
    /// Tensor element type or encoding not handled.
    UnsupportedFormat,
    /// Unknown operator or an unsupported variant of a known one.
    UnsupportedOperator,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::IoError(_)
            | Error::ProtobufError(_)
            | Error::ModelLoadError(..)
            | Error::ParseError(_) => ErrorKind::Parse,
            Error::VersionIncompatible(_)
            | Error::MissingField(_)
            | Error::ValidationError(_)
            | Error::InvalidGraph(_) => ErrorKind::Validation,
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::UnsupportedOperator { .. } => ErrorKind::UnsupportedOperator,
            Error::InNode { source, .. } => source.kind(),
        }
    }

    /// The error with any node context stripped.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::InNode { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Name of the node whose lowering failed, if known.
    pub fn node_name(&self) -> Option<&str> {
        match self {
            Error::InNode { node, .. } | Error::UnsupportedOperator { node, .. }
                if !node.is_empty() =>
            {
                Some(node.as_str())
            }
            _ => None,
        }
    }

    pub(crate) fn unsupported_operator(
        node: impl Into<String>,
        op_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::UnsupportedOperator {
            node: node.into(),
            op_type: op_type.into(),
            reason: reason.into(),
        }
    }

    /// Attach node identity to an error raised while lowering a node.
    /// Operator errors get their empty fields filled in; everything else is
    /// wrapped in [`Error::InNode`].
    pub(crate) fn in_node(self, node_name: &str, node_op_type: &str) -> Self {
        match self {
            Error::UnsupportedOperator {
                node,
                op_type,
                reason,
            } => Error::UnsupportedOperator {
                node: if node.is_empty() { node_name.to_string() } else { node },
                op_type: if op_type.is_empty() {
                    node_op_type.to_string()
                } else {
                    op_type
                },
                reason,
            },
            wrapped @ Error::InNode { .. } => wrapped,
            other => Error::InNode {
                node: node_name.to_string(),
                op_type: node_op_type.to_string(),
                source: Box::new(other),
            },
        }
    }
}
