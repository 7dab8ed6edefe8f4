use approx::assert_relative_eq;
use gyeol_core::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Central-difference gradient check: `f` must map one value to a scalar.
fn check_gradient<F>(f: F, data: &[f64], shape: &[usize], dtype: DType)
where
    F: Fn(&Value) -> GyeolResult<Value>,
{
    let x = Value::from_f64_slice(data, shape, dtype).unwrap();
    x.requires_grad().unwrap();
    let y = f(&x).unwrap();
    y.backward().unwrap();
    let analytic = x.grad().unwrap().to_f64_vec().unwrap();

    let (eps, tol) = match dtype {
        DType::F64 => (1e-6, 1e-5),
        _ => (1e-3, 2e-2),
    };

    let _guard = no_grad();
    for i in 0..data.len() {
        let mut plus = data.to_vec();
        plus[i] += eps;
        let mut minus = data.to_vec();
        minus[i] -= eps;

        let y_plus = f(&Value::from_f64_slice(&plus, shape, dtype).unwrap()).unwrap().item().unwrap();
        let y_minus = f(&Value::from_f64_slice(&minus, shape, dtype).unwrap()).unwrap().item().unwrap();
        let numeric = (y_plus - y_minus) / (2.0 * eps);

        assert_relative_eq!(analytic[i], numeric, max_relative = tol, epsilon = tol);
    }
}

fn random_inputs(rng: &mut StdRng, len: usize, lo: f64, hi: f64) -> Vec<f64> {
    (0..len).map(|_| rng.gen_range(lo..hi)).collect()
}

fn check_for_both_float_dtypes<F>(f: F, data: &[f64], shape: &[usize])
where
    F: Fn(&Value) -> GyeolResult<Value>,
{
    check_gradient(&f, data, shape, DType::F32);
    check_gradient(&f, data, shape, DType::F64);
}

#[test]
fn gradcheck_unary_elementwise() {
    let mut rng = StdRng::seed_from_u64(7);
    let data = random_inputs(&mut rng, 6, -1.5, 1.5);

    check_for_both_float_dtypes(|x| x.neg()?.sum(), &data, &[6]);
    check_for_both_float_dtypes(|x| x.square()?.sum(), &data, &[2, 3]);
    check_for_both_float_dtypes(|x| x.exp()?.sum(), &data, &[6]);
    check_for_both_float_dtypes(|x| x.sigmoid()?.sum(), &data, &[6]);
    check_for_both_float_dtypes(|x| x.tanh()?.sum(), &data, &[3, 2]);
}

#[test]
fn gradcheck_log_on_positive_inputs() {
    let mut rng = StdRng::seed_from_u64(11);
    let data = random_inputs(&mut rng, 5, 0.5, 2.0);
    check_for_both_float_dtypes(|x| x.log()?.sum(), &data, &[5]);
}

#[test]
fn gradcheck_binary_elementwise() {
    let mut rng = StdRng::seed_from_u64(13);
    let data = random_inputs(&mut rng, 4, 0.5, 1.5);
    let other = random_inputs(&mut rng, 4, 0.5, 1.5);

    for dtype in [DType::F32, DType::F64] {
        let c = Value::from_f64_slice(&other, &[4], dtype).unwrap();
        check_gradient(|x| x.add(&c)?.sum(), &data, &[4], dtype);
        check_gradient(|x| x.sub(&c)?.sum(), &data, &[4], dtype);
        check_gradient(|x| c.sub(x)?.sum(), &data, &[4], dtype);
        check_gradient(|x| x.mul(&c)?.sum(), &data, &[4], dtype);
        check_gradient(|x| x.div(&c)?.sum(), &data, &[4], dtype);
        check_gradient(|x| c.div(x)?.sum(), &data, &[4], dtype);
    }
}

#[test]
fn gradcheck_scalar_operand_ops() {
    let mut rng = StdRng::seed_from_u64(17);
    let data = random_inputs(&mut rng, 5, 0.5, 2.0);

    check_for_both_float_dtypes(|x| x.add_scalar(0.75f64)?.sum(), &data, &[5]);
    check_for_both_float_dtypes(|x| x.mul_scalar(-1.25f64)?.sum(), &data, &[5]);
    check_for_both_float_dtypes(|x| x.pow_scalar(3.0f64)?.sum(), &data, &[5]);
}

#[test]
fn gradcheck_matmul() {
    let mut rng = StdRng::seed_from_u64(19);
    let lhs = random_inputs(&mut rng, 6, -1.0, 1.0);
    let rhs = random_inputs(&mut rng, 6, -1.0, 1.0);

    for dtype in [DType::F32, DType::F64] {
        let c = Value::from_f64_slice(&rhs, &[3, 2], dtype).unwrap();
        check_gradient(|x| x.matmul(&c)?.sum(), &lhs, &[2, 3], dtype);

        let c = Value::from_f64_slice(&lhs, &[2, 3], dtype).unwrap();
        check_gradient(|x| c.matmul(x)?.sum(), &rhs, &[3, 2], dtype);
    }
}

#[test]
fn gradcheck_composite_expression() {
    let mut rng = StdRng::seed_from_u64(23);
    let data = random_inputs(&mut rng, 4, 0.5, 1.5);

    // sum(sigmoid(x^2) * x + exp(-x)), shared use of x across branches
    check_for_both_float_dtypes(
        |x| {
            let a = x.square()?.sigmoid()?.mul(x)?;
            let b = x.neg()?.exp()?;
            a.add(&b)?.sum()
        },
        &data,
        &[4],
    );
}

#[test]
fn double_backward_cubic() {
    // y = x^3: dy/dx = 3x^2, d2y/dx2 = 6x
    let x = Value::from_f64_slice(&[3.0], &[1], DType::F64).unwrap();
    x.requires_grad().unwrap();
    let y = x.pow_scalar(3.0f64).unwrap().sum().unwrap();

    let opts = BackwardOptions { create_graph: true };
    let grads = backward(&[y], &[None], &[x.clone()], &opts).unwrap();
    let gx = grads[0].clone().unwrap();
    assert_relative_eq!(gx.item().unwrap(), 27.0, max_relative = 1e-9);

    x.clear_grad();
    let gx_sum = gx.sum().unwrap();
    backward(&[gx_sum], &[None], &[x.clone()], &BackwardOptions::default()).unwrap();
    assert_relative_eq!(x.grad().unwrap().item().unwrap(), 18.0, max_relative = 1e-9);
}

#[test]
fn double_backward_through_retained_output() {
    // sigmoid retains its forward output; the second-order gradient must
    // stay connected through it.
    let point = 0.4f64;
    let x = Value::from_f64_slice(&[point], &[1], DType::F64).unwrap();
    x.requires_grad().unwrap();
    let y = x.sigmoid().unwrap().sum().unwrap();

    let opts = BackwardOptions { create_graph: true };
    let grads = backward(&[y], &[None], &[x.clone()], &opts).unwrap();
    let gx = grads[0].clone().unwrap();

    x.clear_grad();
    backward(&[gx.sum().unwrap()], &[None], &[x.clone()], &BackwardOptions::default()).unwrap();
    let second = x.grad().unwrap().item().unwrap();

    // Finite-difference estimate of d/dx sigmoid'(x)
    let eps = 1e-6;
    let sigmoid_prime = |v: f64| {
        let s = 1.0 / (1.0 + (-v).exp());
        s * (1.0 - s)
    };
    let numeric = (sigmoid_prime(point + eps) - sigmoid_prime(point - eps)) / (2.0 * eps);
    assert_relative_eq!(second, numeric, max_relative = 1e-4);
}

#[test]
fn double_backward_matches_finite_difference_of_gradient() {
    // f(x) = sum(x * exp(x)); first gradient g(x) = (1 + x) exp(x).
    let point = 0.7f64;
    let x = Value::from_f64_slice(&[point], &[1], DType::F64).unwrap();
    x.requires_grad().unwrap();
    let y = x.exp().unwrap().mul(&x).unwrap().sum().unwrap();

    let opts = BackwardOptions { create_graph: true };
    let grads = backward(&[y], &[None], &[x.clone()], &opts).unwrap();
    let gx = grads[0].clone().unwrap();

    x.clear_grad();
    backward(&[gx.sum().unwrap()], &[None], &[x.clone()], &BackwardOptions::default()).unwrap();
    let second = x.grad().unwrap().item().unwrap();

    let eps = 1e-6;
    let grad_of = |v: f64| (1.0 + v) * v.exp();
    let numeric = (grad_of(point + eps) - grad_of(point - eps)) / (2.0 * eps);
    assert_relative_eq!(second, numeric, max_relative = 1e-4);
}

#[test]
fn gradient_descent_reduces_loss() {
    // Tiny end-to-end sanity run: fit y = 2x with one scalar weight.
    let xs = [1.0f64, 2.0, 3.0];
    let ts = [2.0f64, 4.0, 6.0];

    let w = Value::from_f64_slice(&[0.5], &[1], DType::F64).unwrap();
    w.requires_grad().unwrap();
    let backend = gyeol_core::backends::get_backend(Device::CPU).unwrap();

    let loss_of = |w: &Value| -> GyeolResult<Value> {
        let mut total = Value::from_f64_slice(&[0.0], &[1], DType::F64)?.sum()?;
        for (&x, &t) in xs.iter().zip(ts.iter()) {
            let pred = w.mul_scalar(x)?;
            let err = pred.add_scalar(-t)?.square()?.sum()?;
            total = total.add(&err)?;
        }
        Ok(total)
    };

    let mut last_loss = f64::INFINITY;
    for _ in 0..5 {
        let loss = loss_of(&w).unwrap();
        let current = loss.item().unwrap();
        assert!(current < last_loss);
        last_loss = current;

        loss.backward().unwrap();

        // In-place SGD step so the parameter keeps its identity.
        let _guard = no_grad();
        let step = w.grad().unwrap().mul_scalar(0.02f64).unwrap();
        let updated = w.sub(&step).unwrap();
        backend.copy_to(&w.array().unwrap(), &updated.array().unwrap()).unwrap();
        w.clear_grad();
    }

    assert!(last_loss < 0.1);
}
