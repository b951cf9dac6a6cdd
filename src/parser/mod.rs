pub mod attributes;
pub mod model_loader;
pub mod tensor_loader;
pub mod version;

// Re-export key types from the parser module
pub use attributes::{ArgumentDictionary, AttributeValue};
pub use model_loader::{LoaderOptions, ModelDeserializer, MAX_PROTO_SIZE};
pub use tensor_loader::{load_shape, load_tensor};
pub use version::ModelVersion;
