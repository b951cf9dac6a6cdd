use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::proto::attribute_proto::AttributeType;
use crate::proto::{AttributeProto, NodeProto, TensorProto};

/// Typed view of one node attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttributeValue<'a> {
    Int(i64),
    Float(f32),
    String(&'a [u8]),
    Tensor(&'a TensorProto),
    Ints(&'a [i64]),
    Floats(&'a [f32]),
    /// A kind the importer does not read (graphs, sparse tensors, ...).
    Unsupported(i32),
}

impl<'a> AttributeValue<'a> {
    pub fn from_proto(attr: &'a AttributeProto) -> Self {
        match AttributeType::from_i32(attr.r#type) {
            Some(AttributeType::Int) => AttributeValue::Int(attr.i),
            Some(AttributeType::Float) => AttributeValue::Float(attr.f),
            Some(AttributeType::String) => AttributeValue::String(&attr.s),
            Some(AttributeType::Ints) => AttributeValue::Ints(&attr.ints),
            Some(AttributeType::Floats) => AttributeValue::Floats(&attr.floats),
            Some(AttributeType::Tensor) => match &attr.t {
                Some(t) => AttributeValue::Tensor(t),
                None => AttributeValue::Unsupported(attr.r#type),
            },
            Some(AttributeType::Undefined) => Self::infer(attr),
            _ => AttributeValue::Unsupported(attr.r#type),
        }
    }

    /// Old writers leave the type unset; pick the populated field.
    fn infer(attr: &'a AttributeProto) -> Self {
        if let Some(t) = &attr.t {
            AttributeValue::Tensor(t)
        } else if !attr.ints.is_empty() {
            AttributeValue::Ints(&attr.ints)
        } else if !attr.floats.is_empty() {
            AttributeValue::Floats(&attr.floats)
        } else if !attr.s.is_empty() {
            AttributeValue::String(&attr.s)
        } else if attr.f != 0.0 {
            AttributeValue::Float(attr.f)
        } else {
            AttributeValue::Int(attr.i)
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Int(_) => "int",
            AttributeValue::Float(_) => "float",
            AttributeValue::String(_) => "string",
            AttributeValue::Tensor(_) => "tensor",
            AttributeValue::Ints(_) => "ints",
            AttributeValue::Floats(_) => "floats",
            AttributeValue::Unsupported(_) => "unsupported",
        }
    }
}

/// Attributes of one node, keyed by name. Later duplicates overwrite
/// earlier ones.
#[derive(Debug, Default)]
pub struct ArgumentDictionary<'a> {
    entries: HashMap<&'a str, AttributeValue<'a>>,
}

impl<'a> ArgumentDictionary<'a> {
    pub fn from_node(node: &'a NodeProto) -> Self {
        let entries = node
            .attribute
            .iter()
            .map(|attr| (attr.name.as_str(), AttributeValue::from_proto(attr)))
            .collect();
        Self { entries }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<AttributeValue<'a>> {
        self.entries.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn mismatch(name: &str, expected: &str, found: &AttributeValue<'_>) -> Error {
        Error::UnsupportedFormat(format!(
            "attribute '{}' must be {}, found {}",
            name,
            expected,
            found.type_name()
        ))
    }

    pub fn int(&self, name: &str) -> Result<Option<i64>> {
        match self.get(name) {
            None => Ok(None),
            Some(AttributeValue::Int(v)) => Ok(Some(v)),
            Some(other) => Err(Self::mismatch(name, "an int", &other)),
        }
    }

    pub fn float(&self, name: &str) -> Result<Option<f32>> {
        match self.get(name) {
            None => Ok(None),
            Some(AttributeValue::Float(v)) => Ok(Some(v)),
            Some(other) => Err(Self::mismatch(name, "a float", &other)),
        }
    }

    pub fn string(&self, name: &str) -> Result<Option<String>> {
        match self.get(name) {
            None => Ok(None),
            Some(AttributeValue::String(bytes)) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|_| {
                    Error::UnsupportedFormat(format!("attribute '{}' is not valid UTF-8", name))
                }),
            Some(other) => Err(Self::mismatch(name, "a string", &other)),
        }
    }

    pub fn tensor(&self, name: &str) -> Result<Option<&'a TensorProto>> {
        match self.get(name) {
            None => Ok(None),
            Some(AttributeValue::Tensor(t)) => Ok(Some(t)),
            Some(other) => Err(Self::mismatch(name, "a tensor", &other)),
        }
    }

    pub fn ints(&self, name: &str) -> Result<Option<&'a [i64]>> {
        match self.get(name) {
            None => Ok(None),
            Some(AttributeValue::Ints(v)) => Ok(Some(v)),
            Some(other) => Err(Self::mismatch(name, "a list of ints", &other)),
        }
    }

    pub fn required_int(&self, name: &str) -> Result<i64> {
        self.int(name)?.ok_or_else(|| missing(name))
    }

    pub fn required_tensor(&self, name: &str) -> Result<&'a TensorProto> {
        self.tensor(name)?.ok_or_else(|| missing(name))
    }

    pub fn required_ints(&self, name: &str) -> Result<&'a [i64]> {
        self.ints(name)?.ok_or_else(|| missing(name))
    }

    /// A list of non-negative ints, as used for shapes and axes.
    pub fn required_shape(&self, name: &str) -> Result<Vec<usize>> {
        to_usize_vec(name, self.required_ints(name)?)
    }

    /// First element of an int list; `strides` and `kernel_shape` are
    /// square for every spatial operator the importer handles.
    pub fn ints_head(&self, name: &str) -> Result<Option<usize>> {
        match self.ints(name)? {
            None => Ok(None),
            Some([]) => Err(Error::ValidationError(format!(
                "attribute '{}' must not be empty",
                name
            ))),
            Some([head, ..]) => to_usize(name, *head).map(Some),
        }
    }
}

fn missing(name: &str) -> Error {
    Error::MissingField(format!("attribute '{}'", name))
}

pub(crate) fn to_usize(name: &str, value: i64) -> Result<usize> {
    usize::try_from(value).map_err(|_| {
        Error::ValidationError(format!(
            "attribute '{}' holds negative value {}",
            name, value
        ))
    })
}

pub(crate) fn to_usize_vec(name: &str, values: &[i64]) -> Result<Vec<usize>> {
    values.iter().map(|&v| to_usize(name, v)).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn int_attr(name: &str, i: i64) -> AttributeProto {
        AttributeProto {
            name: name.to_string(),
            r#type: AttributeType::Int as i32,
            i,
            ..Default::default()
        }
    }

    pub(crate) fn ints_attr(name: &str, ints: &[i64]) -> AttributeProto {
        AttributeProto {
            name: name.to_string(),
            r#type: AttributeType::Ints as i32,
            ints: ints.to_vec(),
            ..Default::default()
        }
    }

    pub(crate) fn string_attr(name: &str, s: &str) -> AttributeProto {
        AttributeProto {
            name: name.to_string(),
            r#type: AttributeType::String as i32,
            s: s.as_bytes().to_vec(),
            ..Default::default()
        }
    }

    pub(crate) fn node_with(attrs: Vec<AttributeProto>) -> NodeProto {
        NodeProto {
            op_type: "Test".to_string(),
            attribute: attrs,
            ..Default::default()
        }
    }

    #[test]
    fn test_typed_accessors() {
        let node = node_with(vec![
            int_attr("group", 2),
            ints_attr("pads", &[1, 1, 1, 1]),
            string_attr("auto_pad", "VALID"),
        ]);
        let dict = ArgumentDictionary::from_node(&node);
        assert_eq!(dict.len(), 3);
        assert_eq!(dict.int("group").unwrap(), Some(2));
        assert_eq!(dict.ints("pads").unwrap(), Some(&[1i64, 1, 1, 1][..]));
        assert_eq!(dict.string("auto_pad").unwrap().as_deref(), Some("VALID"));
        assert_eq!(dict.float("epsilon").unwrap(), None);
    }

    #[test]
    fn test_type_mismatch_is_unsupported_format() {
        let node = node_with(vec![int_attr("axes", 1)]);
        let dict = ArgumentDictionary::from_node(&node);
        let err = dict.ints("axes").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        assert!(matches!(
            dict.required_int("axis").unwrap_err(),
            Error::MissingField(_)
        ));
    }

    #[test]
    fn test_duplicate_names_last_wins() {
        let node = node_with(vec![int_attr("axis", 0), int_attr("axis", 3)]);
        let dict = ArgumentDictionary::from_node(&node);
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.required_int("axis").unwrap(), 3);
    }

    #[test]
    fn test_untyped_attribute_is_inferred() {
        let attr = AttributeProto {
            name: "perm".to_string(),
            ints: vec![1, 0],
            ..Default::default()
        };
        assert_eq!(AttributeValue::from_proto(&attr), AttributeValue::Ints(&[1, 0]));
    }

    #[test]
    fn test_ints_head_and_negative_values() {
        let node = node_with(vec![ints_attr("strides", &[2, 2]), ints_attr("axes", &[-1])]);
        let dict = ArgumentDictionary::from_node(&node);
        assert_eq!(dict.ints_head("strides").unwrap(), Some(2));
        assert_eq!(dict.ints_head("kernel_shape").unwrap(), None);
        assert!(dict.required_shape("axes").is_err());
    }
}
