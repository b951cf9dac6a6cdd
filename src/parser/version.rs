use log::debug;

use crate::error::{Error, Result};
use crate::parser::attributes::ArgumentDictionary;
use crate::proto::ModelProto;

/// Oldest IR version the importer reads.
pub const MIN_IR_VERSION: i64 = 3;

/// Last opset whose binary operators broadcast only when asked to.
pub const LAST_EXPLICIT_BROADCAST_OPSET: i64 = 6;

/// Structural and operator-set versions of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelVersion {
    pub ir_version: i64,
    pub opset_version: i64,
}

/// `""` and its alias `"ai.onnx"` both name the default operator set.
pub(crate) fn is_default_domain(domain: &str) -> bool {
    domain.is_empty() || domain == "ai.onnx"
}

impl ModelVersion {
    /// Read and validate the versions of `model`. The first opset import in
    /// the default domain sets the active opset.
    pub fn resolve(model: &ModelProto, min_ir_version: i64) -> Result<Self> {
        let ir_version = model.ir_version;
        if ir_version < min_ir_version {
            return Err(Error::VersionIncompatible(format!(
                "ONNX model with ir_version {} is too old to be supported (minimum {})",
                ir_version, min_ir_version
            )));
        }

        let opset_version = model
            .opset_import
            .iter()
            .find(|imp| is_default_domain(&imp.domain))
            .map(|imp| imp.version)
            .unwrap_or(0);
        if opset_version <= 0 {
            return Err(Error::VersionIncompatible(
                "the opset of this ONNX model is not supported".to_string(),
            ));
        }

        debug!("Model ir_version {}, opset {}", ir_version, opset_version);
        Ok(Self {
            ir_version,
            opset_version,
        })
    }

    /// Whether binary operators broadcast their second operand. Implicit
    /// from opset 7 on; before that only with `broadcast == 1`.
    pub fn broadcast(&self, dict: &ArgumentDictionary<'_>) -> Result<bool> {
        if self.opset_version > LAST_EXPLICIT_BROADCAST_OPSET {
            return Ok(true);
        }
        Ok(dict.int("broadcast")? == Some(1))
    }
}
