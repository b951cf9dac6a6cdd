//! Window parameters shared by convolution and pooling lowering.

use crate::error::{Error, Result};
use crate::parser::attributes::{to_usize_vec, ArgumentDictionary};

/// `[top, left, bottom, right]`.
pub type Pads = [usize; 4];

/// Resolve padding from `pads` or `auto_pad`. `auto_pad` may only be
/// `VALID` or `NOTSET`; absent attributes mean no padding.
pub fn get_pads(dict: &ArgumentDictionary<'_>) -> Result<Pads> {
    if let Some(pads) = dict.ints("pads")? {
        let pads = to_usize_vec("pads", pads)?;
        return match pads.as_slice() {
            &[top, left, bottom, right] => Ok([top, left, bottom, right]),
            _ => Err(Error::ValidationError(format!(
                "pads must have 4 elements, got {:?}",
                pads
            ))),
        };
    }
    if let Some(auto_pad) = dict.string("auto_pad")? {
        if auto_pad == "VALID" || auto_pad == "NOTSET" {
            return Ok([0; 4]);
        }
        return Err(Error::unsupported_operator(
            "",
            "",
            format!("only auto_pad==VALID is supported, got {}", auto_pad),
        ));
    }
    Ok([0; 4])
}

/// Stride from the head of `strides`, default 1.
pub fn get_stride(dict: &ArgumentDictionary<'_>) -> Result<usize> {
    Ok(dict.ints_head("strides")?.unwrap_or(1))
}

/// Kernel size from `kernel_shape`, or from the spatial dims of a weight
/// given as `[height, width]`, which must then be square.
pub fn get_kernel(dict: &ArgumentDictionary<'_>, spatial: [usize; 2]) -> Result<usize> {
    if let Some(kernel) = dict.ints_head("kernel_shape")? {
        return Ok(kernel);
    }
    let [height, width] = spatial;
    if height != width {
        return Err(Error::unsupported_operator(
            "",
            "",
            format!("only square kernels are supported, got {}x{}", height, width),
        ));
    }
    Ok(height)
}
