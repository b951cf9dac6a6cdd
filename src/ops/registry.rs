use std::collections::HashMap;
use std::fmt::Debug;

use log::debug;

use crate::error::{Error, Result};
use crate::importer::LoweringContext;
use crate::parser::ArgumentDictionary;
use crate::proto::NodeProto;

/// An operator lowering shared across model formats: it reads a node's
/// inputs through the context and binds the node's output.
pub trait Operator: Send + Sync + Debug {
    fn lower(
        &self,
        ctx: &mut LoweringContext<'_>,
        node: &NodeProto,
        dict: &ArgumentDictionary<'_>,
    ) -> Result<()>;
}

/// Registry for common operators, keyed by operator type name.
#[derive(Debug, Default)]
pub struct OperatorRegistry {
    operators: HashMap<String, Box<dyn Operator>>,
}

impl OperatorRegistry {
    /// Create an empty operator registry
    pub fn new() -> Self {
        Self {
            operators: HashMap::new(),
        }
    }

    /// Register an operator
    pub fn register_operator(&mut self, name: &str, op: Box<dyn Operator>) -> Result<()> {
        if self.operators.contains_key(name) {
            return Err(Error::ValidationError(format!(
                "Operator {} is already registered",
                name
            )));
        }
        self.operators.insert(name.to_string(), op);
        Ok(())
    }

    pub fn get_operator(&self, name: &str) -> Option<&dyn Operator> {
        self.operators.get(name).map(|op| op.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Initialize the registry with the common operator table
    pub fn initialize_standard_operators() -> Self {
        use crate::graph::{Activation, ArithmeticOp};
        use crate::ops::activations::{ActivationOp, Softmax};
        use crate::ops::math::arithmetic::{Arithmetic, Sum};
        use crate::ops::math::matmul::MatMul;
        use crate::ops::shape::{Flatten, Identity, Reshape};

        let table: Vec<(&str, Box<dyn Operator>)> = vec![
            ("Add", Box::new(Arithmetic(ArithmeticOp::Add))),
            ("Sub", Box::new(Arithmetic(ArithmeticOp::Sub))),
            ("Mul", Box::new(Arithmetic(ArithmeticOp::Mul))),
            ("Div", Box::new(Arithmetic(ArithmeticOp::Div))),
            ("Max", Box::new(Arithmetic(ArithmeticOp::Max))),
            ("Min", Box::new(Arithmetic(ArithmeticOp::Min))),
            ("Sum", Box::new(Sum)),
            ("MatMul", Box::new(MatMul)),
            ("Relu", Box::new(ActivationOp(Activation::Relu))),
            ("Sigmoid", Box::new(ActivationOp(Activation::Sigmoid))),
            ("Tanh", Box::new(ActivationOp(Activation::Tanh))),
            ("Softmax", Box::new(Softmax)),
            ("Reshape", Box::new(Reshape)),
            ("Flatten", Box::new(Flatten)),
            ("Identity", Box::new(Identity)),
        ];

        let mut registry = Self::new();
        for (name, op) in table {
            registry.operators.insert(name.to_string(), op);
        }
        registry
    }

    /// Lower `node` if its type is in the table. Returns `Ok(false)` when
    /// the type is not registered so the caller can try its own operators.
    pub fn try_lower(
        &self,
        ctx: &mut LoweringContext<'_>,
        node: &NodeProto,
        dict: &ArgumentDictionary<'_>,
    ) -> Result<bool> {
        match self.get_operator(&node.op_type) {
            Some(op) => {
                debug!("Lowering {} through the common table", node.op_type);
                op.lower(ctx, node, dict)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::context::tests::{node, Fixture};
    use crate::ops::shape::Identity;
    use crate::tensor::{ElemKind, Tensor};

    #[test]
    fn test_standard_table() {
        let registry = OperatorRegistry::initialize_standard_operators();
        for name in ["Add", "Sum", "MatMul", "Relu", "Softmax", "Reshape", "Flatten", "Identity"] {
            assert!(registry.contains(name), "{} missing", name);
        }
        assert!(!registry.contains("Conv"));
        assert_eq!(registry.names().len(), 15);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = OperatorRegistry::new();
        registry.register_operator("Identity", Box::new(Identity)).unwrap();
        assert!(registry
            .register_operator("Identity", Box::new(Identity))
            .is_err());
    }

    #[test]
    fn test_try_lower_miss_is_not_an_error() {
        let registry = OperatorRegistry::initialize_standard_operators();
        let mut fx = Fixture::new(7);
        fx.input("x", Tensor::new(ElemKind::Float, &[2]));

        let conv = node("Conv", &["x"], &["y"]);
        let dict = ArgumentDictionary::from_node(&conv);
        assert!(!registry.try_lower(&mut fx.ctx(), &conv, &dict).unwrap());

        let id = node("Identity", &["x"], &["y"]);
        let dict = ArgumentDictionary::from_node(&id);
        assert!(registry.try_lower(&mut fx.ctx(), &id, &dict).unwrap());
        assert_eq!(fx.dims("y"), vec![2]);
    }
}
