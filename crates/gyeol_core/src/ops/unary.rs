use super::{check, into_single, BackwardContext, Operator};
use crate::{
    array::{Array, ArrayDesc},
    backends::{self, ArrayBackend},
    compat::*,
    error::GyeolResult,
    graph::{apply, current_mode, Value},
    scalar::Scalar,
};

macro_rules! unary_operator {
    ($struct_name:ident, $name:literal, $kernel:ident, float_only: $float_only:literal,
     retain_inputs: $retain_in:expr, retain_outputs: $retain_out:expr) => {
        pub struct $struct_name;

        impl Operator for $struct_name {
            fn name(&self) -> &'static str {
                $name
            }

            fn check_signature(&self, inputs: &[ArrayDesc]) -> GyeolResult<()> {
                check(inputs.len() == 1, $name, "exactly 1 input")?;
                if $float_only {
                    check(inputs[0].dtype.is_float(), $name, "input[0].dtype.is_float()")
                } else {
                    check(!inputs[0].dtype.is_bool(), $name, "input[0].dtype != bool")
                }
            }

            fn forward(&self, backend: &dyn ArrayBackend, inputs: &[Array]) -> GyeolResult<Vec<Array>> {
                let out = backend.unary(backends::UnaryOp::$kernel, &inputs[0])?;
                Ok(vec![out])
            }

            fn backward(&self, ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
                $struct_name::grad(ctx)
            }

            fn retain_inputs(&self) -> &'static [usize] {
                $retain_in
            }

            fn retain_outputs(&self) -> &'static [usize] {
                $retain_out
            }
        }
    };
}

unary_operator!(Neg, "neg", Neg, float_only: false, retain_inputs: &[], retain_outputs: &[]);
unary_operator!(Square, "square", Square, float_only: false, retain_inputs: &[0], retain_outputs: &[]);
unary_operator!(Exp, "exp", Exp, float_only: true, retain_inputs: &[], retain_outputs: &[0]);
unary_operator!(Log, "log", Log, float_only: true, retain_inputs: &[0], retain_outputs: &[]);
unary_operator!(Sigmoid, "sigmoid", Sigmoid, float_only: true, retain_inputs: &[], retain_outputs: &[0]);
unary_operator!(Tanh, "tanh", Tanh, float_only: true, retain_inputs: &[], retain_outputs: &[0]);

impl Neg {
    fn grad(ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
        Ok(vec![Some(ctx.grad_output(0)?.neg()?)])
    }
}

impl Square {
    fn grad(ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
        let gy = ctx.grad_output(0)?;
        let x = ctx.retained_input(0)?;
        let dtype = ctx.input_desc(0)?.dtype;
        // d/dx x^2 = 2x
        let two_x = x.mul_scalar(Scalar::from_f64(2.0, dtype))?;
        Ok(vec![Some(gy.mul(&two_x)?)])
    }
}

impl Exp {
    fn grad(ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
        let gy = ctx.grad_output(0)?;
        let y = ctx.retained_output(0)?;
        Ok(vec![Some(gy.mul(&y)?)])
    }
}

impl Log {
    fn grad(ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
        let gy = ctx.grad_output(0)?;
        let x = ctx.retained_input(0)?;
        // The derivative 1/x is undefined at 0 and the forward was already
        // NaN for negative inputs; convention: propagate 1/x as computed.
        if current_mode().debug_checks {
            let values = x.to_f64_vec()?;
            if values.iter().any(|&v| v <= 0.0) {
                log::warn!("log backward evaluated at a non-positive input; gradient follows the 1/x convention");
            }
        }
        Ok(vec![Some(gy.div(&x)?)])
    }
}

impl Sigmoid {
    fn grad(ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
        let gy = ctx.grad_output(0)?;
        let y = ctx.retained_output(0)?;
        let dtype = ctx.output_desc(0)?.dtype;
        // d/dx sigmoid(x) = y * (1 - y), from the forward output
        let one_minus_y = y.neg()?.add_scalar(Scalar::one(dtype))?;
        Ok(vec![Some(gy.mul(&y.mul(&one_minus_y)?)?)])
    }
}

impl Tanh {
    fn grad(ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
        let gy = ctx.grad_output(0)?;
        let y = ctx.retained_output(0)?;
        let dtype = ctx.output_desc(0)?.dtype;
        // d/dx tanh(x) = 1 - y^2
        let one_minus_y2 = y.square()?.neg()?.add_scalar(Scalar::one(dtype))?;
        Ok(vec![Some(gy.mul(&one_minus_y2)?)])
    }
}

impl Value {
    pub fn neg(&self) -> GyeolResult<Value> {
        into_single(apply(Arc::new(Neg), &[self.clone()])?, "neg")
    }

    pub fn square(&self) -> GyeolResult<Value> {
        into_single(apply(Arc::new(Square), &[self.clone()])?, "square")
    }

    pub fn exp(&self) -> GyeolResult<Value> {
        into_single(apply(Arc::new(Exp), &[self.clone()])?, "exp")
    }

    pub fn log(&self) -> GyeolResult<Value> {
        into_single(apply(Arc::new(Log), &[self.clone()])?, "log")
    }

    pub fn sigmoid(&self) -> GyeolResult<Value> {
        into_single(apply(Arc::new(Sigmoid), &[self.clone()])?, "sigmoid")
    }

    pub fn tanh(&self) -> GyeolResult<Value> {
        into_single(apply(Arc::new(Tanh), &[self.clone()])?, "tanh")
    }
}
