pub mod binary;
pub mod matrix;
pub mod reduce;
pub mod unary;
pub mod unary_scalar;

use crate::{
    array::{Array, ArrayDesc},
    backends::ArrayBackend,
    compat::*,
    error::{GyeolError, GyeolResult},
    graph::Value,
};
pub use binary::{Add, Div, Mul, Sub};
pub use matrix::{MatMul, Transpose};
pub use reduce::{BroadcastTo, Sum};
pub use unary::{Exp, Log, Neg, Sigmoid, Square, Tanh};
pub use unary_scalar::{AddScalar, MulScalar, PowScalar};

/// The operator plug-in contract.
///
/// One instance is created per application and recorded on the resulting
/// operation node, so an operator may carry per-call parameters (a scalar
/// operand, a target shape). Backward formulas are written against
/// [`Value`]s, which makes the backward pass itself differentiable when
/// graph building is enabled (double backward).
pub trait Operator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Validates the declared input contract. Runs before any computation;
    /// a violation must name the exact failed expectation.
    fn check_signature(&self, inputs: &[ArrayDesc]) -> GyeolResult<()>;

    /// Executes the forward computation through the backend capability
    /// interface. Must not assume a concrete backend.
    fn forward(&self, backend: &dyn ArrayBackend, inputs: &[Array]) -> GyeolResult<Vec<Array>>;

    /// Produces one gradient per input (`None` where no gradient is
    /// defined or needed), given output gradients and retained values.
    fn backward(&self, ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>>;

    /// Input indices whose concrete arrays the backward formula needs.
    fn retain_inputs(&self) -> &'static [usize] {
        &[]
    }

    /// Output indices whose concrete arrays the backward formula needs.
    fn retain_outputs(&self) -> &'static [usize] {
        &[]
    }
}

/// Everything a backward formula may see.
///
/// Only declared retention indices are exposed; asking for an undeclared
/// one is a contract violation, not a silent copy.
pub struct BackwardContext {
    pub(crate) op_name: &'static str,
    pub(crate) grad_outputs: Vec<Option<Value>>,
    pub(crate) retained_inputs: Vec<(usize, Value)>,
    pub(crate) retained_outputs: Vec<(usize, Value)>,
    pub(crate) input_descs: Vec<ArrayDesc>,
    pub(crate) output_descs: Vec<ArrayDesc>,
}

impl BackwardContext {
    pub fn op_name(&self) -> &'static str {
        self.op_name
    }

    pub fn input_count(&self) -> usize {
        self.input_descs.len()
    }

    pub fn output_count(&self) -> usize {
        self.output_descs.len()
    }

    pub fn input_desc(&self, index: usize) -> GyeolResult<&ArrayDesc> {
        self.input_descs.get(index).ok_or_else(|| GyeolError::GradientContract {
            op: self.op_name.to_string(),
            reason: format!("input index {index} out of range"),
        })
    }

    pub fn output_desc(&self, index: usize) -> GyeolResult<&ArrayDesc> {
        self.output_descs.get(index).ok_or_else(|| GyeolError::GradientContract {
            op: self.op_name.to_string(),
            reason: format!("output index {index} out of range"),
        })
    }

    pub fn grad_outputs(&self) -> &[Option<Value>] {
        &self.grad_outputs
    }

    /// The gradient flowing into output `index`; an error if no consumer
    /// contributed one.
    pub fn grad_output(&self, index: usize) -> GyeolResult<Value> {
        match self.grad_outputs.get(index) {
            Some(Some(grad)) => Ok(grad.clone()),
            Some(None) => Err(GyeolError::GradientContract {
                op: self.op_name.to_string(),
                reason: format!("no gradient available for output {index}"),
            }),
            None => Err(GyeolError::GradientContract {
                op: self.op_name.to_string(),
                reason: format!("output index {index} out of range"),
            }),
        }
    }

    pub fn retained_input(&self, index: usize) -> GyeolResult<Value> {
        self.retained_inputs
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| GyeolError::GradientContract {
                op: self.op_name.to_string(),
                reason: format!("input {index} was not declared retained"),
            })
    }

    pub fn retained_output(&self, index: usize) -> GyeolResult<Value> {
        self.retained_outputs
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| GyeolError::GradientContract {
                op: self.op_name.to_string(),
                reason: format!("output {index} was not declared retained"),
            })
    }
}

/// Signature-check helper: errors name the exact failed expectation.
pub(crate) fn check(ok: bool, op: &str, constraint: &str) -> GyeolResult<()> {
    if ok {
        Ok(())
    } else {
        Err(GyeolError::TypeCheck {
            op: op.to_string(),
            constraint: constraint.to_string(),
        })
    }
}

/// Unwraps the single output of a one-output operator application.
pub(crate) fn into_single(mut outputs: Vec<Value>, op: &str) -> GyeolResult<Value> {
    if outputs.len() != 1 {
        return Err(GyeolError::InternalError(format!(
            "operation {op} produced {} outputs, expected 1",
            outputs.len()
        )));
    }
    outputs.pop().ok_or_else(|| GyeolError::InternalError(format!("operation {op} produced no output")))
}
