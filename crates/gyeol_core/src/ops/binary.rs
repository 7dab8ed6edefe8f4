use super::{check, into_single, BackwardContext, Operator};
use crate::{
    array::{Array, ArrayDesc},
    backends::{self, ArrayBackend},
    compat::*,
    error::GyeolResult,
    graph::{apply, Value},
};

fn check_elementwise_pair(op: &str, inputs: &[ArrayDesc]) -> GyeolResult<()> {
    check(inputs.len() == 2, op, "exactly 2 inputs")?;
    check(inputs[0].shape == inputs[1].shape, op, "input[0].shape == input[1].shape")?;
    check(inputs[0].dtype == inputs[1].dtype, op, "input[0].dtype == input[1].dtype")?;
    check(!inputs[0].dtype.is_bool(), op, "input[0].dtype != bool")
}

macro_rules! binary_operator {
    ($struct_name:ident, $name:literal, $kernel:ident, $retain:expr) => {
        pub struct $struct_name;

        impl Operator for $struct_name {
            fn name(&self) -> &'static str {
                $name
            }

            fn check_signature(&self, inputs: &[ArrayDesc]) -> GyeolResult<()> {
                check_elementwise_pair($name, inputs)
            }

            fn forward(&self, backend: &dyn ArrayBackend, inputs: &[Array]) -> GyeolResult<Vec<Array>> {
                let out = backend.binary(backends::BinaryOp::$kernel, &inputs[0], &inputs[1])?;
                Ok(vec![out])
            }

            fn backward(&self, ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
                $struct_name::grad(ctx)
            }

            fn retain_inputs(&self) -> &'static [usize] {
                $retain
            }
        }
    };
}

binary_operator!(Add, "add", Add, &[]);
binary_operator!(Sub, "sub", Sub, &[]);
binary_operator!(Mul, "mul", Mul, &[0, 1]);
binary_operator!(Div, "div", Div, &[0, 1]);

impl Add {
    fn grad(ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
        let gy = ctx.grad_output(0)?;
        Ok(vec![Some(gy.clone()), Some(gy)])
    }
}

impl Sub {
    fn grad(ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
        let gy = ctx.grad_output(0)?;
        let gx1 = gy.neg()?;
        Ok(vec![Some(gy), Some(gx1)])
    }
}

impl Mul {
    fn grad(ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
        let gy = ctx.grad_output(0)?;
        let lhs = ctx.retained_input(0)?;
        let rhs = ctx.retained_input(1)?;
        Ok(vec![Some(gy.mul(&rhs)?), Some(gy.mul(&lhs)?)])
    }
}

impl Div {
    fn grad(ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
        let gy = ctx.grad_output(0)?;
        let lhs = ctx.retained_input(0)?;
        let rhs = ctx.retained_input(1)?;
        // d/da (a/b) = 1/b ; d/db (a/b) = -a/b^2
        let gx0 = gy.div(&rhs)?;
        let gx1 = gy.mul(&lhs)?.div(&rhs.mul(&rhs)?)?.neg()?;
        Ok(vec![Some(gx0), Some(gx1)])
    }
}

impl Value {
    pub fn add(&self, rhs: &Value) -> GyeolResult<Value> {
        into_single(apply(Arc::new(Add), &[self.clone(), rhs.clone()])?, "add")
    }

    pub fn sub(&self, rhs: &Value) -> GyeolResult<Value> {
        into_single(apply(Arc::new(Sub), &[self.clone(), rhs.clone()])?, "sub")
    }

    pub fn mul(&self, rhs: &Value) -> GyeolResult<Value> {
        into_single(apply(Arc::new(Mul), &[self.clone(), rhs.clone()])?, "mul")
    }

    pub fn div(&self, rhs: &Value) -> GyeolResult<Value> {
        into_single(apply(Arc::new(Div), &[self.clone(), rhs.clone()])?, "div")
    }
}
