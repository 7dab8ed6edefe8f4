use gyeol_core::{
    array::{Array, ArrayDesc},
    backends::{self, ArrayBackend},
    graph::{self, GraphEdge},
    ops::{BackwardContext, Operator},
    prelude::*,
};
use std::collections::HashMap;
use std::sync::Arc;

#[test]
fn rank_strictly_increases_along_creator_chains() {
    let x = Value::from_f32_slice(&[1.0, 2.0], &[2]).unwrap();
    x.requires_grad().unwrap();
    let w = Value::from_f32_slice(&[1.0, 0.5], &[2]).unwrap();
    w.requires_grad().unwrap();

    let a = x.mul(&w).unwrap();
    let b = a.sigmoid().unwrap();
    let y = b.mul(&a).unwrap().sum().unwrap();

    assert_eq!(x.rank(), 0);
    assert_eq!(a.rank(), 1);
    assert_eq!(b.rank(), 2);
    assert_eq!(y.rank(), 4);

    // Every input edge of every reachable op satisfies the invariant.
    let dump = graph::export(&[y.clone()]);
    let value_ranks: HashMap<_, _> = dump.values.iter().map(|v| (v.id, v.rank)).collect();
    let op_ranks: HashMap<_, _> = dump.ops.iter().map(|o| (o.id, o.rank)).collect();
    let mut input_edges = 0;
    for edge in &dump.edges {
        if let GraphEdge::ValueToOp { from, to } = edge {
            assert!(op_ranks[to] > value_ranks[from]);
            input_edges += 1;
        }
    }
    assert!(input_edges >= 5);
}

#[test]
fn export_walks_the_reachable_graph_without_computing() {
    let x = Value::scalar(2.0f32).unwrap();
    x.requires_grad().unwrap();
    let y = x.square().unwrap().exp().unwrap();

    let dump = graph::export(&[y.clone()]);
    assert_eq!(dump.ops.len(), 2);
    assert_eq!(dump.values.len(), 3);
    assert!(dump.edges.iter().any(|e| matches!(e, GraphEdge::OpToValue { .. })));

    // No gradients were produced by the traversal.
    assert!(x.grad().is_err());

    let dot = dump.to_dot();
    assert!(dot.starts_with("digraph"));
    assert!(dot.contains("square"));
    assert!(dot.contains("exp"));
}

#[test]
fn type_check_errors_name_the_violated_constraint() {
    let vector = Value::from_f32_slice(&[1.0, 2.0], &[2]).unwrap();
    let matrix = Value::from_f32_slice(&[1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();

    match vector.matmul(&matrix).unwrap_err() {
        GyeolError::TypeCheck { op, constraint } => {
            assert_eq!(op, "matmul");
            assert_eq!(constraint, "input[0].ndim == 2");
        },
        other => panic!("expected TypeCheck, got {other:?}"),
    }

    let short = Value::from_f32_slice(&[1.0], &[1]).unwrap();
    match vector.add(&short).unwrap_err() {
        GyeolError::TypeCheck { op, constraint } => {
            assert_eq!(op, "add");
            assert_eq!(constraint, "input[0].shape == input[1].shape");
        },
        other => panic!("expected TypeCheck, got {other:?}"),
    }

    let ints = Value::from_f64_slice(&[1.0, 2.0], &[2], DType::I32).unwrap();
    match ints.exp().unwrap_err() {
        GyeolError::TypeCheck { op, constraint } => {
            assert_eq!(op, "exp");
            assert_eq!(constraint, "input[0].dtype.is_float()");
        },
        other => panic!("expected TypeCheck, got {other:?}"),
    }
}

#[test]
fn retained_output_is_identity_preserving() {
    // sigmoid's backward reads its retained forward output. Overwriting
    // that buffer in place must be visible to the gradient formula: the
    // retention is the concrete array, not a stale copy.
    let x = Value::scalar(0.0f64).unwrap();
    x.requires_grad().unwrap();
    let y = x.sigmoid().unwrap(); // y = 0.5, y' = 0.25

    let backend = backends::get_backend(Device::CPU).unwrap();
    let fake = Array::scalar(0.25f64).unwrap();
    backend.copy_to(&y.array().unwrap(), &fake).unwrap();

    y.backward().unwrap();
    // grad = y * (1 - y) evaluated on the overwritten buffer: 0.1875
    assert_eq!(x.grad().unwrap().item().unwrap(), 0.25 * 0.75);
}

struct WrongArity;

impl Operator for WrongArity {
    fn name(&self) -> &'static str {
        "wrong_arity"
    }

    fn check_signature(&self, inputs: &[ArrayDesc]) -> GyeolResult<()> {
        if inputs.len() == 1 {
            Ok(())
        } else {
            Err(GyeolError::TypeCheck {
                op: "wrong_arity".into(),
                constraint: "exactly 1 input".into(),
            })
        }
    }

    fn forward(&self, backend: &dyn ArrayBackend, inputs: &[Array]) -> GyeolResult<Vec<Array>> {
        Ok(vec![backend.unary(backends::UnaryOp::Neg, &inputs[0])?])
    }

    fn backward(&self, _ctx: &BackwardContext) -> GyeolResult<Vec<Option<Value>>> {
        // One input, zero gradients returned.
        Ok(vec![])
    }
}

#[test]
fn wrong_gradient_count_violates_the_contract() {
    let x = Value::scalar(1.0f32).unwrap();
    x.requires_grad().unwrap();
    let outputs = apply(Arc::new(WrongArity), &[x.clone()]).unwrap();

    let err = outputs[0].backward().unwrap_err();
    match err {
        GyeolError::GradientContract { op, reason } => {
            assert_eq!(op, "wrong_arity");
            assert!(reason.contains("0 gradients"));
        },
        other => panic!("expected GradientContract, got {other:?}"),
    }
}

#[test]
fn debug_checks_catch_non_finite_gradients() {
    // log(0) backward divides by zero. Silent in production mode, an
    // anomaly when debug checks are on.
    let x = Value::scalar(0.0f64).unwrap();
    x.requires_grad().unwrap();

    let y = x.log().unwrap();
    y.backward().unwrap();
    assert!(x.grad().unwrap().item().unwrap().is_infinite());

    x.clear_grad();
    let _guard = debug_checks();
    let err = y.backward().unwrap_err();
    match err {
        GyeolError::NumericalAnomaly { op, .. } => assert_eq!(op, "log"),
        other => panic!("expected NumericalAnomaly, got {other:?}"),
    }
}

#[test]
fn device_and_backend_adapter_surface() {
    let backend = backends::get_backend(Device::CPU).unwrap();
    assert!(backend.device().is_cpu());
    backend.synchronize_if_needed().unwrap();

    let array = Array::from_f32_slice(&[1.0, 2.0], &[2]).unwrap();
    assert!(Array::same_storage(&array, &array.clone()));
    assert!(!Array::same_storage(&array, &array.deep_clone().unwrap()));
    assert_eq!(array.desc().shape, vec![2]);
    assert_eq!(array.desc().dtype, DType::F32);
}
