use super::{check, into_single, BackwardContext, Operator};
use crate::{
    array::{Array, ArrayDesc},
    backends::{self, ArrayBackend},
    compat::*,
    error::GyeolResult,
    graph::{apply, Value},
    scalar::Scalar,
};

pub struct AddScalar {
    pub scalar: Scalar,
}

impl Operator for AddScalar {
    fn name(&self) -> &'static str {
        "add_scalar"
    }

    fn check_signature(&self, inputs: &[ArrayDesc]) -> GyeolResult<()> {
        check(inputs.len() == 1, "add_scalar", "exactly 1 input")?;
        check(!inputs[0].dtype.is_bool(), "add_scalar", "input[0].dtype != bool")
    }

    fn forward(&self, backend: &dyn ArrayBackend, inputs: &[Array]) -> GyeolResult<Vec<Array>> {
        let scalar = self.scalar.to_dtype(inputs[0].dtype());
        Ok(vec![backend.unary_scalar(backends::UnaryScalarOp::AddScalar, &inputs[0], scalar)?])
    }

    fn backward(&self, ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
        Ok(vec![Some(ctx.grad_output(0)?)])
    }
}

pub struct MulScalar {
    pub scalar: Scalar,
}

impl Operator for MulScalar {
    fn name(&self) -> &'static str {
        "mul_scalar"
    }

    fn check_signature(&self, inputs: &[ArrayDesc]) -> GyeolResult<()> {
        check(inputs.len() == 1, "mul_scalar", "exactly 1 input")?;
        check(!inputs[0].dtype.is_bool(), "mul_scalar", "input[0].dtype != bool")
    }

    fn forward(&self, backend: &dyn ArrayBackend, inputs: &[Array]) -> GyeolResult<Vec<Array>> {
        let scalar = self.scalar.to_dtype(inputs[0].dtype());
        Ok(vec![backend.unary_scalar(backends::UnaryScalarOp::MulScalar, &inputs[0], scalar)?])
    }

    fn backward(&self, ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
        let gy = ctx.grad_output(0)?;
        let dtype = ctx.input_desc(0)?.dtype;
        Ok(vec![Some(gy.mul_scalar(self.scalar.to_dtype(dtype))?)])
    }
}

pub struct PowScalar {
    pub scalar: Scalar,
}

impl Operator for PowScalar {
    fn name(&self) -> &'static str {
        "pow_scalar"
    }

    fn check_signature(&self, inputs: &[ArrayDesc]) -> GyeolResult<()> {
        check(inputs.len() == 1, "pow_scalar", "exactly 1 input")?;
        check(inputs[0].dtype.is_float(), "pow_scalar", "input[0].dtype.is_float()")
    }

    fn forward(&self, backend: &dyn ArrayBackend, inputs: &[Array]) -> GyeolResult<Vec<Array>> {
        let scalar = self.scalar.to_dtype(inputs[0].dtype());
        Ok(vec![backend.unary_scalar(backends::UnaryScalarOp::PowScalar, &inputs[0], scalar)?])
    }

    fn backward(&self, ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
        let gy = ctx.grad_output(0)?;
        let x = ctx.retained_input(0)?;
        let dtype = ctx.input_desc(0)?.dtype;
        // d/dx x^c = c * x^(c-1)
        let exponent = self.scalar.to_f64();
        let lowered = x.pow_scalar(Scalar::from_f64(exponent - 1.0, dtype))?;
        let scaled = lowered.mul_scalar(Scalar::from_f64(exponent, dtype))?;
        Ok(vec![Some(gy.mul(&scaled)?)])
    }

    fn retain_inputs(&self) -> &'static [usize] {
        &[0]
    }
}

impl Value {
    pub fn add_scalar(&self, scalar: impl Into<Scalar>) -> GyeolResult<Value> {
        let op = AddScalar { scalar: scalar.into() };
        into_single(apply(Arc::new(op), &[self.clone()])?, "add_scalar")
    }

    pub fn mul_scalar(&self, scalar: impl Into<Scalar>) -> GyeolResult<Value> {
        let op = MulScalar { scalar: scalar.into() };
        into_single(apply(Arc::new(op), &[self.clone()])?, "mul_scalar")
    }

    pub fn pow_scalar(&self, scalar: impl Into<Scalar>) -> GyeolResult<Value> {
        let op = PowScalar { scalar: scalar.into() };
        into_single(apply(Arc::new(op), &[self.clone()])?, "pow_scalar")
    }
}
