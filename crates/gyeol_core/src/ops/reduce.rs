use super::{check, into_single, BackwardContext, Operator};
use crate::{
    array::{Array, ArrayDesc},
    backends::ArrayBackend,
    compat::*,
    error::GyeolResult,
    graph::{apply, Value},
};

/// Full reduction to a scalar.
pub struct Sum;

impl Operator for Sum {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn check_signature(&self, inputs: &[ArrayDesc]) -> GyeolResult<()> {
        check(inputs.len() == 1, "sum", "exactly 1 input")?;
        check(!inputs[0].dtype.is_bool(), "sum", "input[0].dtype != bool")
    }

    fn forward(&self, backend: &dyn ArrayBackend, inputs: &[Array]) -> GyeolResult<Vec<Array>> {
        Ok(vec![backend.reduce_sum(&inputs[0])?])
    }

    fn backward(&self, ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
        let gy = ctx.grad_output(0)?;
        let input_shape = ctx.input_desc(0)?.shape.clone();
        Ok(vec![Some(gy.broadcast_to(&input_shape)?)])
    }
}

/// Materialized broadcast of a scalar to a target shape; the gradient
/// counterpart of [`Sum`].
pub struct BroadcastTo {
    pub shape: Vec<usize>,
}

impl Operator for BroadcastTo {
    fn name(&self) -> &'static str {
        "broadcast_to"
    }

    fn check_signature(&self, inputs: &[ArrayDesc]) -> GyeolResult<()> {
        check(inputs.len() == 1, "broadcast_to", "exactly 1 input")?;
        check(inputs[0].shape.is_empty(), "broadcast_to", "input[0].ndim == 0")?;
        check(!inputs[0].dtype.is_bool(), "broadcast_to", "input[0].dtype != bool")
    }

    fn forward(&self, backend: &dyn ArrayBackend, inputs: &[Array]) -> GyeolResult<Vec<Array>> {
        Ok(vec![backend.broadcast_to(&inputs[0], &self.shape)?])
    }

    fn backward(&self, ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
        let gy = ctx.grad_output(0)?;
        Ok(vec![Some(gy.sum()?)])
    }
}

impl Value {
    pub fn sum(&self) -> GyeolResult<Value> {
        into_single(apply(Arc::new(Sum), &[self.clone()])?, "sum")
    }

    pub fn broadcast_to(&self, shape: &[usize]) -> GyeolResult<Value> {
        let op = BroadcastTo { shape: shape.to_vec() };
        into_single(apply(Arc::new(op), &[self.clone()])?, "broadcast_to")
    }
}
