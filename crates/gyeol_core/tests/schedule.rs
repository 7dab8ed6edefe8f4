use gyeol_core::{backends, prelude::*, schedule::GraphCompiler};

fn input(data: &[f64]) -> Value {
    Value::from_f64_slice(data, &[1, 2], DType::F64).unwrap()
}

#[test]
fn replay_matches_the_traced_iteration_bit_for_bit() {
    let w = Value::from_f64_slice(&[0.3, -0.8, 1.1, 0.2], &[2, 2], DType::F64).unwrap();
    w.requires_grad().unwrap();

    let w_inner = w.clone();
    let mut compiler = GraphCompiler::new(move |inputs: &[Value]| {
        let h = inputs[0].matmul(&w_inner)?;
        let y = h.tanh()?.sum()?;
        Ok(vec![y])
    });

    // Iteration 1: trace. Runs the graph builder normally and records.
    let x1 = input(&[0.5, -1.25]);
    let out1 = compiler.call(&[x1]).unwrap();
    let y1 = out1[0].item().unwrap();
    out1[0].backward().unwrap();
    let g1 = w.grad().unwrap().to_f64_vec().unwrap();
    compiler.finish_iteration().unwrap();

    // Iteration 2: replay on fresh arrays with the same contents.
    w.clear_grad();
    let x2 = input(&[0.5, -1.25]);
    let out2 = compiler.call(&[x2]).unwrap();
    let y2 = out2[0].item().unwrap();
    assert_eq!(y1, y2);

    compiler.backward().unwrap();
    let g2 = w.grad().unwrap().to_f64_vec().unwrap();
    assert_eq!(g1, g2);
    compiler.finish_iteration().unwrap();

    // Replayed outputs carry no graph; the compiled region replaces the
    // graph builder entirely.
    let x3 = input(&[0.5, -1.25]);
    let out3 = compiler.call(&[x3]).unwrap();
    assert!(out3[0].is_leaf());
    compiler.finish_iteration().unwrap();
}

#[test]
fn replay_gradients_match_dynamic_execution_on_new_inputs() {
    // The compiled closure includes sigmoid, whose gradient formula
    // retains its exact output array: replay must refresh that buffer in
    // place (copy, not reference swap) to stay correct on new inputs.
    let w = Value::from_f64_slice(&[0.7, -0.4, 0.15, 0.9], &[2, 2], DType::F64).unwrap();
    w.requires_grad().unwrap();

    let w_inner = w.clone();
    let mut compiler = GraphCompiler::new(move |inputs: &[Value]| {
        let y = inputs[0].matmul(&w_inner)?.sigmoid()?.sum()?;
        Ok(vec![y])
    });

    // Trace with the first batch.
    let out = compiler.call(&[input(&[0.2, 0.4])]).unwrap();
    out[0].backward().unwrap();
    compiler.finish_iteration().unwrap();
    w.clear_grad();

    // Replay with a different batch.
    let fresh = [1.5, -0.6];
    let out = compiler.call(&[input(&fresh)]).unwrap();
    let replayed_y = out[0].item().unwrap();
    compiler.backward().unwrap();
    let replayed_grads = w.grad().unwrap().to_f64_vec().unwrap();
    compiler.finish_iteration().unwrap();
    w.clear_grad();

    // Reference: the same computation run dynamically.
    let x = input(&fresh);
    let y = x.matmul(&w).unwrap().sigmoid().unwrap().sum().unwrap();
    assert_eq!(y.item().unwrap(), replayed_y);
    y.backward().unwrap();
    assert_eq!(w.grad().unwrap().to_f64_vec().unwrap(), replayed_grads);
}

#[test]
fn in_place_parameter_updates_stay_visible_to_replays() {
    let w = Value::from_f64_slice(&[1.0, 1.0, 1.0, 1.0], &[2, 2], DType::F64).unwrap();
    w.requires_grad().unwrap();

    let w_inner = w.clone();
    let mut compiler = GraphCompiler::new(move |inputs: &[Value]| {
        Ok(vec![inputs[0].matmul(&w_inner)?.sum()?])
    });

    let out = compiler.call(&[input(&[2.0, 3.0])]).unwrap();
    assert_eq!(out[0].item().unwrap(), 10.0);
    compiler.finish_iteration().unwrap();

    // Parameter step, in place: the schedule's table references the same
    // buffer, so replays see the update.
    let backend = backends::get_backend(Device::CPU).unwrap();
    let doubled = Array::from_f64_slice(&[2.0, 2.0, 2.0, 2.0], &[2, 2], DType::F64).unwrap();
    backend.copy_to(&w.array().unwrap(), &doubled).unwrap();

    let out = compiler.call(&[input(&[2.0, 3.0])]).unwrap();
    assert_eq!(out[0].item().unwrap(), 20.0);
    compiler.finish_iteration().unwrap();
}

#[test]
fn evaluation_mode_reuses_schedules_freely() {
    let w = Value::from_f64_slice(&[0.5, 0.25, -0.5, 1.0], &[2, 2], DType::F64).unwrap();

    let w_inner = w.clone();
    let mut compiler = GraphCompiler::new(move |inputs: &[Value]| {
        Ok(vec![inputs[0].matmul(&w_inner)?.tanh()?.sum()?])
    });

    let _eval = eval_mode();
    let _inference = no_grad();

    let traced = compiler.call(&[input(&[0.1, 0.9])]).unwrap()[0].item().unwrap();
    compiler.finish_iteration().unwrap();

    let first_replay = compiler.call(&[input(&[0.1, 0.9])]).unwrap()[0].item().unwrap();
    let second_replay = compiler.call(&[input(&[0.1, 0.9])]).unwrap()[0].item().unwrap();
    assert_eq!(traced, first_replay);
    assert_eq!(first_replay, second_replay);
}

#[test]
fn nested_static_regions_are_rejected() {
    let mut outer = GraphCompiler::new(|inputs: &[Value]| Ok(vec![inputs[0].square()?.sum()?]));
    let mut inner = GraphCompiler::new(|inputs: &[Value]| Ok(vec![inputs[0].exp()?.sum()?]));

    let x = input(&[1.0, 2.0]);
    let _ = outer.call(&[x.clone()]).unwrap(); // outer trace session opens

    // A second region cannot start tracing while the first is recording.
    let err = inner.call(&[x]).unwrap_err();
    assert!(matches!(err, GyeolError::ScheduleNested));

    outer.finish_iteration().unwrap();
}

#[test]
fn schedule_state_discipline() {
    // Replay-backward with nothing in flight.
    let mut compiler = GraphCompiler::new(|inputs: &[Value]| Ok(vec![inputs[0].square()?.sum()?]));
    assert!(matches!(
        compiler.backward().unwrap_err(),
        GyeolError::ScheduleState { expected: "replaying", .. }
    ));

    // A schedule whose trace never saw a backward pass cannot replay one.
    let x = input(&[1.0, 2.0]);
    let _ = compiler.call(&[x.clone()]).unwrap();
    compiler.finish_iteration().unwrap(); // builds forward-only

    let _ = compiler.call(&[x]).unwrap(); // replay
    assert!(matches!(
        compiler.backward().unwrap_err(),
        GyeolError::ScheduleState {
            expected: "traced backward pass",
            ..
        }
    ));
    compiler.finish_iteration().unwrap();
}

#[test]
fn replay_before_build_is_rejected() {
    let mut compiler = GraphCompiler::new(|inputs: &[Value]| Ok(vec![inputs[0].square()?.sum()?]));
    let err = compiler.replay(&[input(&[1.0, 2.0])]).unwrap_err();
    assert!(matches!(err, GyeolError::ScheduleNotBuilt));
}

#[test]
fn distinct_input_signatures_get_distinct_schedules() {
    let mut compiler = GraphCompiler::new(|inputs: &[Value]| Ok(vec![inputs[0].square()?.sum()?]));

    let _ = compiler.call(&[input(&[1.0, 2.0])]).unwrap();
    compiler.finish_iteration().unwrap();

    // A different shape is a different key: traced anew, not replayed
    // against the wrong recording.
    let wide = Value::from_f64_slice(&[1.0, 2.0, 3.0], &[1, 3], DType::F64).unwrap();
    let out = compiler.call(&[wide]).unwrap();
    assert_eq!(out[0].item().unwrap(), 14.0);
    compiler.finish_iteration().unwrap();

    // The original signature still replays.
    let out = compiler.call(&[input(&[1.0, 2.0])]).unwrap();
    assert!(out[0].is_leaf());
    assert_eq!(out[0].item().unwrap(), 5.0);
    compiler.finish_iteration().unwrap();
}
