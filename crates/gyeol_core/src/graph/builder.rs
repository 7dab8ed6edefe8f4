use super::{
    mode,
    node::{self, OpNode_, Value, Value_},
    registry, OpNodeId, ValueId,
};
use crate::{
    backends,
    compat::*,
    error::{GyeolError, GyeolResult},
    ops::Operator,
    schedule::trace,
};
use smallvec::SmallVec;

/// Applies an operation to input value nodes: the graph builder.
///
/// Validates the operator's declared contract, dispatches the forward
/// computation through the backend capability interface, and, when graph
/// building is on and some input requires gradients, wires a fresh
/// operation node: strong input edges, weak output back-references, rank
/// `1 + max(input ranks)`, and the retention the operator declared. With
/// tracking off, the outputs come back as plain creator-less values.
pub fn apply(op: Arc<dyn Operator>, inputs: &[Value]) -> GyeolResult<Vec<Value>> {
    let mut input_descs = Vec::with_capacity(inputs.len());
    for input in inputs {
        input_descs.push(input.desc()?);
    }

    if let Some(first) = input_descs.first() {
        for desc in &input_descs[1..] {
            if desc.device != first.device {
                return Err(GyeolError::DeviceConflictInOp {
                    left: first.device,
                    right: desc.device,
                    op: op.name().to_string(),
                });
            }
        }
    }

    op.check_signature(&input_descs)?;

    let device = input_descs.first().map(|d| d.device).unwrap_or_default();
    let backend = backends::get_backend(device)?;

    let mut input_arrays = Vec::with_capacity(inputs.len());
    for input in inputs {
        input_arrays.push(input.array()?);
    }

    let output_arrays = op.forward(backend, &input_arrays)?;

    trace::record_apply(&op, &input_arrays, &output_arrays)?;

    let engine_mode = mode::current_mode();
    let tracking = engine_mode.build_graph && inputs.iter().any(|v| v.is_requires_grad());

    if !tracking {
        return Ok(output_arrays.into_iter().map(Value::new).collect());
    }

    // Retention declarations are a programming contract; out-of-range
    // indices fail fast rather than surfacing later in backward.
    for &index in op.retain_inputs() {
        assert!(
            index < inputs.len(),
            "operation {} retained input index {index} out of range ({} inputs)",
            op.name(),
            inputs.len()
        );
    }
    for &index in op.retain_outputs() {
        assert!(
            index < output_arrays.len(),
            "operation {} retained output index {index} out of range ({} outputs)",
            op.name(),
            output_arrays.len()
        );
    }

    let rank = 1 + inputs.iter().map(|v| v.rank()).max().unwrap_or(0);
    let op_id = OpNodeId::new();

    let input_ids: Vec<ValueId> = inputs
        .iter()
        .map(|input| {
            node::inc_value(input.id());
            input.id()
        })
        .collect();

    let retained_inputs: SmallVec<[usize; 2]> = op.retain_inputs().iter().copied().collect();
    let retained_outputs: SmallVec<[usize; 2]> = op.retain_outputs().iter().copied().collect();
    let retained_output_arrays: SmallVec<[(usize, crate::array::Array); 2]> = op
        .retain_outputs()
        .iter()
        .map(|&index| (index, output_arrays[index].clone()))
        .collect();

    let output_descs = output_arrays.iter().map(|a| a.desc()).collect();

    let mut outputs = Vec::with_capacity(output_arrays.len());
    let mut output_ids = Vec::with_capacity(output_arrays.len());
    for array in output_arrays {
        let requires_grad = array.dtype().is_float();
        let value_ = Value_ {
            array: Some(array),
            grad: None,
            creator: Some(op_id),
            rank,
            requires_grad,
            ref_count: AtomicUsize::new(1),
        };
        let value_id = ValueId::new();
        registry::insert_value(value_id, value_);
        output_ids.push(value_id);
        outputs.push(Value(value_id));
    }

    let op_ = OpNode_ {
        op,
        inputs: input_ids,
        outputs: output_ids,
        rank,
        retained_inputs,
        retained_outputs,
        retained_output_arrays,
        input_descs,
        output_descs,
        // One creator edge per output; outputs hold their op strongly,
        // the op holds them weakly.
        ref_count: AtomicUsize::new(outputs.len()),
    };
    registry::insert_op(op_id, op_);

    Ok(outputs)
}
