use super::{check, into_single, BackwardContext, Operator};
use crate::{
    array::{Array, ArrayDesc},
    backends::ArrayBackend,
    compat::*,
    error::GyeolResult,
    graph::{apply, Value},
};

/// 2-D matrix product.
pub struct MatMul;

impl Operator for MatMul {
    fn name(&self) -> &'static str {
        "matmul"
    }

    fn check_signature(&self, inputs: &[ArrayDesc]) -> GyeolResult<()> {
        check(inputs.len() == 2, "matmul", "exactly 2 inputs")?;
        check(inputs[0].shape.len() == 2, "matmul", "input[0].ndim == 2")?;
        check(inputs[1].shape.len() == 2, "matmul", "input[1].ndim == 2")?;
        check(
            inputs[0].shape[1] == inputs[1].shape[0],
            "matmul",
            "input[0].shape[1] == input[1].shape[0]",
        )?;
        check(inputs[0].dtype == inputs[1].dtype, "matmul", "input[0].dtype == input[1].dtype")?;
        check(inputs[0].dtype.is_float(), "matmul", "input[0].dtype.is_float()")
    }

    fn forward(&self, backend: &dyn ArrayBackend, inputs: &[Array]) -> GyeolResult<Vec<Array>> {
        Ok(vec![backend.matmul(&inputs[0], &inputs[1])?])
    }

    fn backward(&self, ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
        let gy = ctx.grad_output(0)?;
        let lhs = ctx.retained_input(0)?;
        let rhs = ctx.retained_input(1)?;
        // d/dA (A·B) = G·Bᵗ ; d/dB (A·B) = Aᵗ·G
        let gx0 = gy.matmul(&rhs.transpose()?)?;
        let gx1 = lhs.transpose()?.matmul(&gy)?;
        Ok(vec![Some(gx0), Some(gx1)])
    }

    fn retain_inputs(&self) -> &'static [usize] {
        &[0, 1]
    }
}

/// 2-D transpose.
pub struct Transpose;

impl Operator for Transpose {
    fn name(&self) -> &'static str {
        "transpose"
    }

    fn check_signature(&self, inputs: &[ArrayDesc]) -> GyeolResult<()> {
        check(inputs.len() == 1, "transpose", "exactly 1 input")?;
        check(inputs[0].shape.len() == 2, "transpose", "input[0].ndim == 2")
    }

    fn forward(&self, backend: &dyn ArrayBackend, inputs: &[Array]) -> GyeolResult<Vec<Array>> {
        Ok(vec![backend.transpose2d(&inputs[0])?])
    }

    fn backward(&self, ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
        Ok(vec![Some(ctx.grad_output(0)?.transpose()?)])
    }
}

impl Value {
    pub fn matmul(&self, rhs: &Value) -> GyeolResult<Value> {
        into_single(apply(Arc::new(MatMul), &[self.clone(), rhs.clone()])?, "matmul")
    }

    pub fn transpose(&self) -> GyeolResult<Value> {
        into_single(apply(Arc::new(Transpose), &[self.clone()])?, "transpose")
    }
}
