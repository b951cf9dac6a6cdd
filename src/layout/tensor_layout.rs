use std::fmt;

use crate::error::{Error, Result};

/// Moves the channel axis of an NCHW tensor to the end.
pub const NCHW2NHWC: [usize; 4] = [0, 2, 3, 1];

/// Inverse of [`NCHW2NHWC`].
pub const NHWC2NCHW: [usize; 4] = [0, 3, 1, 2];

/// Check that `axes` is a permutation of `0..rank`.
pub fn check_permutation(axes: &[usize], rank: usize) -> Result<()> {
    if axes.len() != rank {
        return Err(Error::InvalidGraph(format!(
            "Transpose axes must have the same length as tensor rank. Got {} axes for rank {}",
            axes.len(),
            rank
        )));
    }

    let mut seen = vec![false; rank];
    for &axis in axes {
        if axis >= rank {
            return Err(Error::InvalidGraph(format!(
                "Transpose axis {} out of bounds for tensor of rank {}",
                axis, rank
            )));
        }
        if seen[axis] {
            return Err(Error::InvalidGraph(format!(
                "Duplicate axis {} in transpose axes",
                axis
            )));
        }
        seen[axis] = true;
    }
    Ok(())
}

/// Dims after applying `shuffle`; output dim `i` is `dims[shuffle[i]]`.
pub fn transposed_dims(dims: &[usize], shuffle: &[usize]) -> Result<Vec<usize>> {
    check_permutation(shuffle, dims.len())?;
    Ok(shuffle.iter().map(|&axis| dims[axis]).collect())
}

/// Axis at which a lower-rank operand lines up with the trailing dims of
/// the result: the rank difference.
pub fn broadcast_axis(result_dims: &[usize], operand_dims: &[usize]) -> Result<usize> {
    result_dims.len().checked_sub(operand_dims.len()).ok_or_else(|| {
        Error::InvalidGraph(format!(
            "Cannot broadcast operand of rank {} to result of rank {}",
            operand_dims.len(),
            result_dims.len()
        ))
    })
}

/// Whether `dims`, placed at `axis` inside `target`, can be broadcast to it.
/// Each operand dim must equal the target dim or be 1.
pub fn can_broadcast_at(dims: &[usize], target: &[usize], axis: usize) -> bool {
    if axis + dims.len() > target.len() {
        return false;
    }
    dims.iter()
        .zip(&target[axis..])
        .all(|(&d, &t)| d == t || d == 1)
}

/// Spatial output size of a convolution or pooling window.
///
/// `pads` is `[top, left, bottom, right]`.
pub fn calculate_conv_pool_output_dims(
    height: usize,
    width: usize,
    kernel: usize,
    stride: usize,
    pads: &[usize; 4],
) -> Result<(usize, usize)> {
    if stride == 0 {
        return Err(Error::ValidationError("stride must be positive".to_string()));
    }
    let padded = |dim: usize, before: usize, after: usize| {
        dim.checked_add(before)
            .and_then(|d| d.checked_add(after))
            .ok_or_else(|| Error::ValidationError(format!("pads {:?} are too large", pads)))
    };
    let padded_h = padded(height, pads[0], pads[2])?;
    let padded_w = padded(width, pads[1], pads[3])?;
    if kernel == 0 || kernel > padded_h || kernel > padded_w {
        return Err(Error::InvalidGraph(format!(
            "kernel {} does not fit padded input {}x{}",
            kernel, padded_h, padded_w
        )));
    }
    Ok(((padded_h - kernel) / stride + 1, (padded_w - kernel) / stride + 1))
}

/// Named view of a channel-last image shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeNHWC {
    pub n: usize,
    pub h: usize,
    pub w: usize,
    pub c: usize,
}

impl ShapeNHWC {
    pub fn new(dims: &[usize]) -> Result<Self> {
        match dims {
            &[n, h, w, c] => Ok(Self { n, h, w, c }),
            _ => Err(Error::InvalidGraph(format!(
                "expected a 4-D NHWC shape, got {:?}",
                dims
            ))),
        }
    }

    pub fn dims(&self) -> [usize; 4] {
        [self.n, self.h, self.w, self.c]
    }
}

/// Named view of a channel-first image shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeNCHW {
    pub n: usize,
    pub c: usize,
    pub h: usize,
    pub w: usize,
}

impl ShapeNCHW {
    pub fn new(dims: &[usize]) -> Result<Self> {
        match dims {
            &[n, c, h, w] => Ok(Self { n, c, h, w }),
            _ => Err(Error::InvalidGraph(format!(
                "expected a 4-D NCHW shape, got {:?}",
                dims
            ))),
        }
    }
}

impl fmt::Display for ShapeNHWC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NHWC[{}, {}, {}, {}]", self.n, self.h, self.w, self.c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_permutations_are_inverse() {
        let dims = [1, 3, 4, 5];
        let nhwc = transposed_dims(&dims, &NCHW2NHWC).unwrap();
        assert_eq!(nhwc, vec![1, 4, 5, 3]);
        assert_eq!(transposed_dims(&nhwc, &NHWC2NCHW).unwrap(), dims.to_vec());
    }

    #[test]
    fn test_output_dims_formula() {
        assert_eq!(
            calculate_conv_pool_output_dims(4, 4, 3, 1, &[0, 0, 0, 0]).unwrap(),
            (2, 2)
        );
        assert_eq!(
            calculate_conv_pool_output_dims(224, 224, 7, 2, &[3, 3, 3, 3]).unwrap(),
            (112, 112)
        );
        assert_eq!(
            calculate_conv_pool_output_dims(5, 6, 2, 2, &[0, 0, 0, 0]).unwrap(),
            (2, 3)
        );
        assert!(calculate_conv_pool_output_dims(2, 2, 3, 1, &[0, 0, 0, 0]).is_err());
        assert!(calculate_conv_pool_output_dims(4, 4, 3, 0, &[0, 0, 0, 0]).is_err());
        assert!(calculate_conv_pool_output_dims(4, 4, 3, 1, &[usize::MAX, 0, 1, 0]).is_err());
    }

    #[test]
    fn test_broadcast_axis_is_rank_difference() {
        assert_eq!(broadcast_axis(&[2, 5], &[5]).unwrap(), 1);
        assert_eq!(broadcast_axis(&[2, 5], &[2, 5]).unwrap(), 0);
        assert!(broadcast_axis(&[5], &[2, 5]).is_err());

        assert!(can_broadcast_at(&[5], &[2, 5], 1));
        assert!(can_broadcast_at(&[1, 5], &[2, 5], 0));
        assert!(!can_broadcast_at(&[3], &[2, 5], 1));
        assert!(!can_broadcast_at(&[5], &[2, 5], 2));
    }

    #[test]
    fn test_shape_views() {
        let s = ShapeNHWC::new(&[1, 2, 3, 4]).unwrap();
        assert_eq!((s.n, s.h, s.w, s.c), (1, 2, 3, 4));
        assert_eq!(s.to_string(), "NHWC[1, 2, 3, 4]");
        assert!(ShapeNCHW::new(&[1, 2, 3]).is_err());
    }
}
