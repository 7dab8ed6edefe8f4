//! Backward propagation.
//!
//! Drives gradient computation from seed value nodes back to target value
//! nodes. Operation nodes are processed strictly by descending rank with
//! FIFO tie-break, which guarantees every downstream consumer has
//! contributed its partial gradient before a node's backward formula runs.

use crate::{
    array::Array,
    backends,
    compat::*,
    error::{GyeolError, GyeolResult},
    graph::{
        mode,
        node::{self, Value},
        registry, OpNodeId, ValueId,
    },
    ops::BackwardContext,
    schedule::trace,
};

#[derive(Clone, Copy, Debug, Default)]
pub struct BackwardOptions {
    /// Build a differentiable graph for the gradient computation itself,
    /// enabling a second backward pass (double backprop).
    pub create_graph: bool,
}

struct HeapEntry {
    rank: usize,
    seq: usize,
    op_id: OpNodeId,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank && self.seq == other.seq
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        // Max-heap: highest rank first; equal ranks pop in insertion order.
        self.rank.cmp(&other.rank).then(other.seq.cmp(&self.seq))
    }
}

struct OpSnapshot {
    op: Arc<dyn crate::ops::Operator>,
    inputs: Vec<ValueId>,
    outputs: Vec<ValueId>,
    retained_inputs: Vec<usize>,
    retained_outputs: Vec<usize>,
    retained_output_arrays: Vec<(usize, Array)>,
    input_descs: Vec<crate::array::ArrayDesc>,
    output_descs: Vec<crate::array::ArrayDesc>,
}

fn snapshot_op(op_id: OpNodeId) -> GyeolResult<OpSnapshot> {
    registry::with_op(op_id, |o| OpSnapshot {
        op: o.op.clone(),
        inputs: o.inputs.clone(),
        outputs: o.outputs.clone(),
        retained_inputs: o.retained_inputs.to_vec(),
        retained_outputs: o.retained_outputs.to_vec(),
        retained_output_arrays: o.retained_output_arrays.to_vec(),
        input_descs: o.input_descs.clone(),
        output_descs: o.output_descs.clone(),
    })
    .ok_or(GyeolError::OpNodeNotFound(op_id))
}

fn accumulate_slot(grads: &mut HashMap<ValueId, Value>, value_id: ValueId, gx: Value) -> GyeolResult<()> {
    match grads.remove(&value_id) {
        Some(previous) => {
            let total = previous.add(&gx)?;
            grads.insert(value_id, total);
        },
        None => {
            grads.insert(value_id, gx);
        },
    }
    Ok(())
}

fn accumulate_into_grad_slot(target: &Value, contribution: &Value) -> GyeolResult<()> {
    match target.grad() {
        Ok(previous) => {
            let total = previous.add(contribution)?;
            node::set_grad_edge(target.id(), total.id())
        },
        Err(GyeolError::GradientNotComputed(_)) => node::set_grad_edge(target.id(), contribution.id()),
        Err(err) => Err(err),
    }
}

/// Whether a value node may receive gradients at all. Integer and boolean
/// valued nodes never do.
fn grad_eligible(value_id: ValueId) -> bool {
    registry::with_value(value_id, |v| {
        v.requires_grad && v.array.as_ref().map(|a| a.dtype().is_float()).unwrap_or(false)
    })
    .unwrap_or(false)
}

/// Propagates gradients from `outputs` back to `targets`.
///
/// `seed_grads` supplies one optional seed per output; an omitted seed
/// defaults to ones when the output is scalar and is an error otherwise.
/// Each target's gradient is accumulated (summed) into its grad slot and
/// also returned, `None` for targets no gradient path reached.
///
/// Re-entrant: with `create_graph` the pass builds a differentiable graph,
/// so `backward` may be invoked again on the results from within a
/// backward formula.
pub fn backward(
    outputs: &[Value],
    seed_grads: &[Option<Array>],
    targets: &[Value],
    opts: &BackwardOptions,
) -> GyeolResult<Vec<Option<Value>>> {
    if outputs.len() != seed_grads.len() {
        return Err(GyeolError::SizeMismatch {
            expected: outputs.len(),
            got: seed_grads.len(),
        });
    }

    // The pass's own arithmetic only builds graph when the caller asked
    // for a differentiable gradient computation.
    let _mode_guard = if opts.create_graph {
        mode::with_graph()
    } else {
        mode::no_grad()
    };
    // Under an active trace session, everything below records one pass
    // depth further down (forward = 0, backward = 1, double backward = 2).
    let _depth_guard = trace::backward_pass_guard();

    let mut grads: HashMap<ValueId, Value> = HashMap::new();

    for (index, (output, seed)) in outputs.iter().zip(seed_grads.iter()).enumerate() {
        let out_array = output.array()?;
        let seed_value = match seed {
            Some(array) => {
                if array.shape() != out_array.shape() {
                    return Err(GyeolError::ShapeMismatch {
                        expected: out_array.shape().to_vec(),
                        got: array.shape().to_vec(),
                    });
                }
                if array.dtype() != out_array.dtype() {
                    return Err(GyeolError::DTypeMismatch {
                        expected: out_array.dtype(),
                        got: array.dtype(),
                    });
                }
                Value::from_array(array.clone(), opts.create_graph && array.dtype().is_float())
            },
            None => {
                if !out_array.layout().is_scalar() {
                    return Err(GyeolError::MissingSeedGradient { index });
                }
                Value::from_array(Array::ones_like(&out_array)?, opts.create_graph)
            },
        };
        accumulate_slot(&mut grads, output.id(), seed_value)?;
    }

    let target_ids: HashSet<ValueId> = targets.iter().map(|v| v.id()).collect();

    let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::new();
    let mut seen: HashSet<OpNodeId> = HashSet::new();
    let mut seq = 0usize;

    for output in outputs {
        if target_ids.contains(&output.id()) {
            continue;
        }
        if let Some(op_id) = output.creator() {
            if seen.insert(op_id) {
                let rank = registry::with_op(op_id, |o| o.rank).ok_or(GyeolError::OpNodeNotFound(op_id))?;
                heap.push(HeapEntry { rank, seq, op_id });
                seq += 1;
            }
        }
    }

    while let Some(entry) = heap.pop() {
        let info = snapshot_op(entry.op_id)?;

        let grad_outputs: Vec<Option<Value>> = info.outputs.iter().map(|id| grads.get(id).cloned()).collect();
        if grad_outputs.iter().all(Option::is_none) {
            continue;
        }

        let retained_inputs: Vec<(usize, Value)> = info
            .retained_inputs
            .iter()
            .map(|&i| (i, node::value_from_id(info.inputs[i])))
            .collect();

        let mut retained_outputs = Vec::with_capacity(info.retained_outputs.len());
        for &i in &info.retained_outputs {
            // Prefer the live output node so double backward stays
            // connected; fall back to the pinned array when user code has
            // already dropped the output (identity preserved either way).
            let value = match node::resolve_value(info.outputs[i]) {
                Some(value) => value,
                None => {
                    let array = info
                        .retained_output_arrays
                        .iter()
                        .find(|(j, _)| *j == i)
                        .map(|(_, a)| a.clone())
                        .ok_or_else(|| {
                            GyeolError::InternalError(format!(
                                "operation {} lost its retained output {i}",
                                info.op.name()
                            ))
                        })?;
                    Value::new(array)
                },
            };
            retained_outputs.push((i, value));
        }

        let ctx = BackwardContext {
            op_name: info.op.name(),
            grad_outputs,
            retained_inputs,
            retained_outputs,
            input_descs: info.input_descs.clone(),
            output_descs: info.output_descs,
        };

        let gxs = info.op.backward(&ctx)?;

        if gxs.len() != info.inputs.len() {
            return Err(GyeolError::GradientContract {
                op: info.op.name().to_string(),
                reason: format!("returned {} gradients for {} inputs", gxs.len(), info.inputs.len()),
            });
        }

        let debug = mode::current_mode().debug_checks;
        for (index, (input_id, gx)) in info.inputs.iter().zip(gxs.into_iter()).enumerate() {
            let Some(gx) = gx else { continue };

            if debug {
                let gx_array = gx.array()?;
                let expected = &info.input_descs[index];
                if gx_array.shape() != expected.shape.as_slice() {
                    return Err(GyeolError::GradientContract {
                        op: info.op.name().to_string(),
                        reason: format!(
                            "gradient for input {index} has shape {:?}, expected {:?}",
                            gx_array.shape(),
                            expected.shape
                        ),
                    });
                }
                if gx_array.dtype() != expected.dtype {
                    return Err(GyeolError::GradientContract {
                        op: info.op.name().to_string(),
                        reason: format!(
                            "gradient for input {index} has dtype {:?}, expected {:?}",
                            gx_array.dtype(),
                            expected.dtype
                        ),
                    });
                }
                let backend = backends::backend_of(&gx_array)?;
                if backend.has_non_finite(&gx_array)? {
                    return Err(GyeolError::NumericalAnomaly {
                        op: info.op.name().to_string(),
                        detail: format!("gradient for input {index} contains NaN/Inf"),
                    });
                }
            }

            if !grad_eligible(*input_id) {
                continue;
            }

            accumulate_slot(&mut grads, *input_id, gx)?;

            // Stop descending past requested targets and unchained nodes.
            if target_ids.contains(input_id) {
                continue;
            }
            let creator = registry::with_value(*input_id, |v| v.creator).flatten();
            if let Some(creator_id) = creator {
                if seen.insert(creator_id) {
                    let rank =
                        registry::with_op(creator_id, |o| o.rank).ok_or(GyeolError::OpNodeNotFound(creator_id))?;
                    heap.push(HeapEntry {
                        rank,
                        seq,
                        op_id: creator_id,
                    });
                    seq += 1;
                }
            }
        }
    }

    let mut results = Vec::with_capacity(targets.len());
    for target in targets {
        match grads.get(&target.id()) {
            Some(contribution) => {
                accumulate_into_grad_slot(target, contribution)?;
                trace::record_target_grad(target.id(), &contribution.array()?);
                results.push(Some(target.grad()?));
            },
            None => results.push(None),
        }
    }
    Ok(results)
}

/// `Value::backward` body: seeds this (scalar) value with ones and
/// propagates to every reachable grad-requiring leaf.
pub(crate) fn backward_to_leaves(root: &Value, opts: &BackwardOptions) -> GyeolResult<()> {
    if !root.dtype()?.is_float() {
        return Err(GyeolError::RequiresGradNotSet(root.id()));
    }

    let targets = collect_grad_leaves(root);
    backward(&[root.clone()], &[None], &targets, opts)?;
    Ok(())
}

/// Reachable leaves (no creator) with `requires_grad` set, discovered by
/// walking creator/input edges.
fn collect_grad_leaves(root: &Value) -> Vec<Value> {
    let mut pending = vec![root.id()];
    let mut visited: HashSet<ValueId> = HashSet::new();
    let mut leaves = Vec::new();

    while let Some(value_id) = pending.pop() {
        if !visited.insert(value_id) {
            continue;
        }
        let creator = registry::with_value(value_id, |v| v.creator).flatten();
        match creator {
            Some(op_id) => {
                if let Some(inputs) = registry::with_op(op_id, |o| o.inputs.clone()) {
                    pending.extend(inputs);
                }
            },
            None => {
                if grad_eligible(value_id) {
                    leaves.push(node::value_from_id(value_id));
                }
            },
        }
    }

    leaves
}
