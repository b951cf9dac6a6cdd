pub mod registry;
pub mod activations;
pub mod shape;

pub use registry::{Operator, OperatorRegistry};

// Module files for math subdirectory
pub mod math {
    pub mod arithmetic;
    pub mod gemm;
    pub mod matmul;
}

// Module files for nn subdirectory
pub mod nn {
    pub mod batch_norm;
    pub mod conv;
    pub mod pool;
}
