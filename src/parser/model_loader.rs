use std::fs::File;
use std::io::Read;
use std::path::Path;

use bytes::Bytes;
use log::{debug, info};
use prost::Message;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::version::MIN_IR_VERSION;
use crate::proto::ModelProto;

/// Largest serialized model accepted by default.
pub const MAX_PROTO_SIZE: usize = 512 * 1024 * 1024;

/// Options controlling how a model is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    /// Upper bound on the serialized model size, in bytes
    pub max_proto_size: usize,
    /// Oldest accepted IR version
    pub min_ir_version: i64,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_proto_size: MAX_PROTO_SIZE,
            min_ir_version: MIN_IR_VERSION,
        }
    }
}

impl LoaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size limit
    pub fn set_max_proto_size(mut self, max_proto_size: usize) -> Self {
        self.max_proto_size = max_proto_size;
        self
    }

    /// Set the oldest accepted IR version
    pub fn set_min_ir_version(mut self, min_ir_version: i64) -> Self {
        self.min_ir_version = min_ir_version;
        self
    }

    /// Parse options from JSON; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::ValidationError(format!("invalid loader options: {}", e)))
    }
}

/// Reads serialized ONNX models from memory, streams and files.
pub struct ModelDeserializer;

impl ModelDeserializer {
    /// Load an ONNX model from a file path
    pub fn read_file(path: &Path, options: &LoaderOptions) -> Result<ModelProto> {
        let file = File::open(path).map_err(|e| {
            Error::ModelLoadError(
                path.to_path_buf(),
                format!("Can't find the model or network files: {}", e),
            )
        })?;
        info!("Reading ONNX model from {}", path.display());
        Self::read_stream(file, options).map_err(|e| match e {
            Error::IoError(io) => {
                Error::ModelLoadError(path.to_path_buf(), format!("Failed to read file: {}", io))
            }
            other => other,
        })
    }

    /// Load an ONNX model from any byte stream
    pub fn read_stream<R: Read>(reader: R, options: &LoaderOptions) -> Result<ModelProto> {
        let limit = options.max_proto_size;
        let mut buffer = Vec::new();
        reader
            .take(limit as u64 + 1)
            .read_to_end(&mut buffer)?;
        Self::check_size(buffer.len(), limit)?;
        Self::decode(Bytes::from(buffer))
    }

    /// Load an ONNX model from bytes
    pub fn read_bytes(data: &[u8], options: &LoaderOptions) -> Result<ModelProto> {
        Self::check_size(data.len(), options.max_proto_size)?;
        Self::decode(Bytes::copy_from_slice(data))
    }

    fn check_size(len: usize, limit: usize) -> Result<()> {
        if len > limit {
            return Err(Error::ParseError(format!(
                "serialized model exceeds the {} byte limit",
                limit
            )));
        }
        Ok(())
    }

    /// Deserialize protobuf bytes into a ModelProto
    pub fn decode(bytes: Bytes) -> Result<ModelProto> {
        let len = bytes.len();
        let model = ModelProto::decode(bytes)?;
        debug!("Decoded {} byte model from '{}'", len, model.producer_name);
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::proto::{GraphProto, OperatorSetIdProto};
    use std::io::Cursor;

    fn tiny_model() -> ModelProto {
        ModelProto {
            ir_version: 3,
            producer_name: "test".to_string(),
            opset_import: vec![OperatorSetIdProto {
                domain: String::new(),
                version: 7,
            }],
            graph: Some(GraphProto {
                name: "g".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_bytes_and_stream_agree() {
        let bytes = tiny_model().encode_to_vec();
        let options = LoaderOptions::default();
        let a = ModelDeserializer::read_bytes(&bytes, &options).unwrap();
        let b = ModelDeserializer::read_stream(Cursor::new(bytes), &options).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, tiny_model());
    }

    #[test]
    fn test_size_limit() {
        let bytes = tiny_model().encode_to_vec();
        let options = LoaderOptions::new().set_max_proto_size(bytes.len() - 1);
        let err = ModelDeserializer::read_bytes(&bytes, &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        let err = ModelDeserializer::read_stream(Cursor::new(bytes), &options).unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let err = ModelDeserializer::read_bytes(&[0xff, 0xff, 0xff], &LoaderOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::ProtobufError(_)));
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_missing_file() {
        let err = ModelDeserializer::read_file(
            Path::new("/definitely/not/here.onnx"),
            &LoaderOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ModelLoadError(..)));
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_options_from_json() {
        let options = LoaderOptions::from_json(r#"{ "max_proto_size": 1024 }"#).unwrap();
        assert_eq!(options.max_proto_size, 1024);
        assert_eq!(options.min_ir_version, MIN_IR_VERSION);
        assert!(LoaderOptions::from_json("not json").is_err());
    }
}
