pub mod conv_params;
pub mod tensor_layout;

pub use conv_params::{get_kernel, get_pads, get_stride, Pads};
pub use tensor_layout::{
    broadcast_axis, calculate_conv_pool_output_dims, can_broadcast_at, check_permutation,
    transposed_dims, ShapeNCHW, ShapeNHWC, NCHW2NHWC, NHWC2NCHW,
};
