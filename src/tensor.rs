use std::fmt;

use ndarray::{ArrayD, IxDyn};
use num_traits::Zero;

use crate::error::{Error, Result};

/// Shape of a tensor
pub type Shape = Vec<usize>;

/// Element kinds understood by the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElemKind {
    /// 32-bit IEEE float
    Float,
    /// 64-bit signed index
    Index,
}

impl ElemKind {
    /// Get the size in bytes
    pub fn size_in_bytes(&self) -> usize {
        match self {
            ElemKind::Float => std::mem::size_of::<f32>(),
            ElemKind::Index => std::mem::size_of::<i64>(),
        }
    }
}

impl fmt::Display for ElemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElemKind::Float => write!(f, "float"),
            ElemKind::Index => write!(f, "index"),
        }
    }
}

#[derive(Clone, PartialEq)]
enum Storage {
    Float(ArrayD<f32>),
    Index(ArrayD<i64>),
}

/// Dense, contiguous, row-major tensor.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    storage: Storage,
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor({}, {:?})", self.elem_kind(), self.dims())
    }
}

fn zeros<T: Clone + Zero>(dims: &[usize]) -> ArrayD<T> {
    ArrayD::zeros(IxDyn(dims))
}

/// Number of elements in a tensor of shape `dims`, or a parse error when
/// the product overflows.
pub fn element_count(dims: &[usize]) -> Result<usize> {
    let count = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| Error::ParseError(format!("tensor shape {:?} is too large", dims)))?;
    // ndarray caps the element count at isize::MAX
    if count > isize::MAX as usize {
        return Err(Error::ParseError(format!("tensor shape {:?} is too large", dims)));
    }
    Ok(count)
}

/// Size in bytes of a `kind` tensor of shape `dims`.
pub fn byte_size(kind: ElemKind, dims: &[usize]) -> Result<usize> {
    element_count(dims)?
        .checked_mul(kind.size_in_bytes())
        .ok_or_else(|| Error::ParseError(format!("tensor shape {:?} is too large", dims)))
}

fn from_vec<T>(dims: &[usize], values: Vec<T>) -> Result<ArrayD<T>> {
    let expected = element_count(dims)?;
    if values.len() != expected {
        return Err(Error::ParseError(format!(
            "tensor of shape {:?} needs {} elements, got {}",
            dims,
            expected,
            values.len()
        )));
    }
    ArrayD::from_shape_vec(IxDyn(dims), values)
        .map_err(|e| Error::ParseError(format!("cannot shape tensor as {:?}: {}", dims, e)))
}

impl Tensor {
    /// Allocate a zero-filled tensor.
    pub fn new(kind: ElemKind, dims: &[usize]) -> Self {
        let storage = match kind {
            ElemKind::Float => Storage::Float(zeros(dims)),
            ElemKind::Index => Storage::Index(zeros(dims)),
        };
        Self { storage }
    }

    /// Like [`Tensor::new`], for shapes that come from untrusted input.
    pub fn try_new(kind: ElemKind, dims: &[usize]) -> Result<Self> {
        byte_size(kind, dims)?;
        Ok(Self::new(kind, dims))
    }

    pub fn from_f32(dims: &[usize], values: Vec<f32>) -> Result<Self> {
        Ok(Self {
            storage: Storage::Float(from_vec(dims, values)?),
        })
    }

    pub fn from_i64(dims: &[usize], values: Vec<i64>) -> Result<Self> {
        Ok(Self {
            storage: Storage::Index(from_vec(dims, values)?),
        })
    }

    /// Interpret `bytes` as a tightly packed little-endian array of `kind`.
    pub fn from_le_bytes(kind: ElemKind, dims: &[usize], bytes: &[u8]) -> Result<Self> {
        let width = kind.size_in_bytes();
        if bytes.len() % width != 0 {
            return Err(Error::ParseError(format!(
                "raw payload of {} bytes is not a multiple of the {} element size",
                bytes.len(),
                kind
            )));
        }
        match kind {
            ElemKind::Float => {
                let values = bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                Self::from_f32(dims, values)
            }
            ElemKind::Index => {
                let values = bytes
                    .chunks_exact(8)
                    .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect();
                Self::from_i64(dims, values)
            }
        }
    }

    /// Raw little-endian byte image of the payload.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match &self.storage {
            Storage::Float(a) => a.iter().flat_map(|v| v.to_le_bytes()).collect(),
            Storage::Index(a) => a.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    pub fn elem_kind(&self) -> ElemKind {
        match self.storage {
            Storage::Float(_) => ElemKind::Float,
            Storage::Index(_) => ElemKind::Index,
        }
    }

    pub fn dims(&self) -> &[usize] {
        match &self.storage {
            Storage::Float(a) => a.shape(),
            Storage::Index(a) => a.shape(),
        }
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        self.dims().iter().product()
    }

    pub fn as_f32(&self) -> Result<&ArrayD<f32>> {
        match &self.storage {
            Storage::Float(a) => Ok(a),
            Storage::Index(_) => Err(Error::UnsupportedFormat(
                "expected a float tensor, found an index tensor".to_string(),
            )),
        }
    }

    pub fn as_i64(&self) -> Result<&ArrayD<i64>> {
        match &self.storage {
            Storage::Index(a) => Ok(a),
            Storage::Float(_) => Err(Error::UnsupportedFormat(
                "expected an index tensor, found a float tensor".to_string(),
            )),
        }
    }

    /// Flattened index values, in row-major order.
    pub fn to_index_vec(&self) -> Result<Vec<i64>> {
        Ok(self.as_i64()?.iter().copied().collect())
    }

    pub fn zero(&mut self) {
        match &mut self.storage {
            Storage::Float(a) => a.fill(0.0),
            Storage::Index(a) => a.fill(0),
        }
    }

    /// Copy the payload of `other` into `self`, keeping this tensor's shape.
    /// Both tensors must have the same element kind and element count.
    pub fn copy_from(&mut self, other: &Tensor) -> Result<()> {
        if self.size() != other.size() {
            return Err(Error::InvalidGraph(format!(
                "cannot copy {:?} into {:?}: element counts differ",
                other, self
            )));
        }
        if self.elem_kind() != other.elem_kind() {
            return Err(Error::InvalidGraph(format!(
                "cannot copy {:?} into {:?}: element kinds differ",
                other, self
            )));
        }
        match (&mut self.storage, &other.storage) {
            (Storage::Float(dst), Storage::Float(src)) => {
                dst.iter_mut().zip(src.iter()).for_each(|(d, s)| *d = *s);
            }
            (Storage::Index(dst), Storage::Index(src)) => {
                dst.iter_mut().zip(src.iter()).for_each(|(d, s)| *d = *s);
            }
            _ => {}
        }
        Ok(())
    }

    /// Permute the dimensions; output dim `i` is input dim `shuffle[i]`.
    pub fn transpose(&self, shuffle: &[usize]) -> Result<Tensor> {
        crate::layout::check_permutation(shuffle, self.dims().len())?;
        let storage = match &self.storage {
            Storage::Float(a) => Storage::Float(
                a.view()
                    .permuted_axes(IxDyn(shuffle))
                    .as_standard_layout()
                    .into_owned(),
            ),
            Storage::Index(a) => Storage::Index(
                a.view()
                    .permuted_axes(IxDyn(shuffle))
                    .as_standard_layout()
                    .into_owned(),
            ),
        };
        Ok(Tensor { storage })
    }
}
