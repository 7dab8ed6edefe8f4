use crate::{
    array::{Array, ArrayDesc},
    backends,
    compat::*,
    error::{GyeolError, GyeolResult},
    graph::{mode, node, Value, ValueId},
    ops::Operator,
    types::{Device, DType},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleState {
    Empty,
    Tracing,
    Built,
    Replaying,
}

impl ScheduleState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Tracing => "tracing",
            Self::Built => "built",
            Self::Replaying => "replaying",
        }
    }
}

/// Cache key of a schedule: input signature plus the mode flags that
/// change what gets recorded.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleKey {
    pub shapes: Vec<Vec<usize>>,
    pub dtypes: Vec<DType>,
    pub build_graph: bool,
    pub train: bool,
}

impl ScheduleKey {
    pub fn from_descs(descs: &[ArrayDesc], engine_mode: mode::EngineMode) -> Self {
        Self {
            shapes: descs.iter().map(|d| d.shape.clone()).collect(),
            dtypes: descs.iter().map(|d| d.dtype).collect(),
            build_graph: engine_mode.build_graph,
            train: engine_mode.train,
        }
    }
}

/// How a produced array is written back into its table slot after a
/// replayed call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteBack {
    /// The slot is repointed at the fresh result. Cheap, and fine as long
    /// as nothing holds the old buffer by identity.
    Alias,
    /// The result is copied into the existing buffer. Required when a
    /// gradient formula retained that exact array: a reference swap would
    /// desynchronize the retained handle from the table.
    CopyInPlace,
}

/// Pre-call hook: argument position → table slot.
#[derive(Clone, Debug)]
pub struct ArgHook {
    pub arg_index: usize,
    pub slot: usize,
}

/// Post-call hook: result position → table slot, with the write mode.
#[derive(Clone, Debug)]
pub struct RetHook {
    pub ret_index: usize,
    pub slot: usize,
    pub mode: WriteBack,
}

/// One recorded operation invocation.
#[derive(Clone)]
pub(crate) struct ScheduleCall {
    pub(crate) op: Arc<dyn Operator>,
    pub(crate) arg_hooks: Vec<ArgHook>,
    pub(crate) ret_hooks: Vec<RetHook>,
}

/// A recorded, replayable execution of one subgraph.
///
/// Lives through `Empty → Tracing → Built → Replaying`. Call lists are
/// kept per pass depth (0 = forward, 1 = backward, 2 = double backward),
/// all sharing one unique-array table.
pub struct Schedule {
    state: ScheduleState,
    device: Device,
    /// The unique-array table: every distinct buffer the traced calls
    /// touched, deduplicated by identity.
    table: Vec<Option<Array>>,
    /// Buffer identity → slot; only used while tracing.
    intern: HashMap<usize, usize>,
    passes: Vec<Vec<ScheduleCall>>,
    input_slots: Vec<usize>,
    input_descs: Vec<ArrayDesc>,
    output_slots: Vec<usize>,
    /// Target value → slot holding its recorded gradient contribution.
    grad_hooks: Vec<(ValueId, usize)>,
    /// Slots refreshed by some recorded call (as opposed to captured
    /// constants/parameters); computed at build time, drives forking.
    produced_slots: HashSet<usize>,
}

impl Schedule {
    pub(crate) fn new(device: Device) -> Self {
        Self {
            state: ScheduleState::Empty,
            device,
            table: Vec::new(),
            intern: HashMap::new(),
            passes: Vec::new(),
            input_slots: Vec::new(),
            input_descs: Vec::new(),
            output_slots: Vec::new(),
            grad_hooks: Vec::new(),
            produced_slots: HashSet::new(),
        }
    }

    pub fn state(&self) -> ScheduleState {
        self.state
    }

    pub fn pass_len(&self, depth: usize) -> usize {
        self.passes.get(depth).map(Vec::len).unwrap_or(0)
    }

    fn intern_array(&mut self, array: &Array) -> usize {
        let key = array.ptr_id();
        if let Some(&slot) = self.intern.get(&key) {
            return slot;
        }
        let slot = self.table.len();
        self.table.push(Some(array.clone()));
        self.intern.insert(key, slot);
        slot
    }

    pub(crate) fn begin_trace(&mut self, inputs: &[Array]) -> GyeolResult<()> {
        if self.state != ScheduleState::Empty {
            return Err(GyeolError::ScheduleState {
                expected: "empty",
                got: self.state.name(),
            });
        }
        self.state = ScheduleState::Tracing;
        for array in inputs {
            let slot = self.intern_array(array);
            self.input_slots.push(slot);
            self.input_descs.push(array.desc());
        }
        Ok(())
    }

    pub(crate) fn record_call(
        &mut self,
        op: &Arc<dyn Operator>,
        inputs: &[Array],
        outputs: &[Array],
        depth: usize,
    ) -> GyeolResult<()> {
        if self.state != ScheduleState::Tracing {
            return Err(GyeolError::ScheduleState {
                expected: "tracing",
                got: self.state.name(),
            });
        }

        let arg_hooks = inputs
            .iter()
            .enumerate()
            .map(|(arg_index, array)| ArgHook {
                arg_index,
                slot: self.intern_array(array),
            })
            .collect();

        // Every output of our operators is a fresh allocation, so each gets
        // a post-call hook that refreshes its slot from the real result.
        let ret_hooks = outputs
            .iter()
            .enumerate()
            .map(|(ret_index, array)| RetHook {
                ret_index,
                slot: self.intern_array(array),
                mode: WriteBack::Alias,
            })
            .collect();

        while self.passes.len() <= depth {
            self.passes.push(Vec::new());
        }
        self.passes[depth].push(ScheduleCall {
            op: op.clone(),
            arg_hooks,
            ret_hooks,
        });
        Ok(())
    }

    pub(crate) fn record_region_outputs(&mut self, outputs: &[Array]) -> GyeolResult<()> {
        for array in outputs {
            let slot = self.intern.get(&array.ptr_id()).copied().ok_or_else(|| {
                GyeolError::InternalError(
                    "traced region output was not produced by a recorded call".to_string(),
                )
            })?;
            self.output_slots.push(slot);
        }
        Ok(())
    }

    pub(crate) fn record_target_grad(&mut self, value_id: ValueId, array: &Array) {
        let slot = self.intern_array(array);
        if let Some(entry) = self.grad_hooks.iter_mut().find(|(id, _)| *id == value_id) {
            entry.1 = slot;
        } else {
            self.grad_hooks.push((value_id, slot));
        }
    }

    /// Freezes the recording.
    ///
    /// Finalization walks every recorded call and flips the write mode of
    /// slots whose buffers must keep their identity across replays: arrays
    /// retained by the producing operator's own gradient formula, and
    /// arrays a downstream traced call consumes as a retained input.
    pub(crate) fn build(&mut self) -> GyeolResult<()> {
        if self.state != ScheduleState::Tracing {
            return Err(GyeolError::ScheduleState {
                expected: "tracing",
                got: self.state.name(),
            });
        }

        let mut stable_slots: HashSet<usize> = HashSet::new();
        for pass in &self.passes {
            for call in pass {
                for &index in call.op.retain_inputs() {
                    if let Some(hook) = call.arg_hooks.iter().find(|h| h.arg_index == index) {
                        stable_slots.insert(hook.slot);
                    }
                }
                for &index in call.op.retain_outputs() {
                    if let Some(hook) = call.ret_hooks.iter().find(|h| h.ret_index == index) {
                        stable_slots.insert(hook.slot);
                    }
                }
            }
        }

        for pass in &mut self.passes {
            for call in pass {
                for hook in &mut call.ret_hooks {
                    self.produced_slots.insert(hook.slot);
                    if stable_slots.contains(&hook.slot) {
                        hook.mode = WriteBack::CopyInPlace;
                    }
                }
            }
        }

        self.intern = HashMap::new();
        self.state = ScheduleState::Built;
        log::debug!(
            "schedule built: {} table slots, {} passes ({} forward calls)",
            self.table.len(),
            self.passes.len(),
            self.pass_len(0)
        );
        Ok(())
    }

    fn run_pass(&mut self, depth: usize) -> GyeolResult<()> {
        let backend = backends::get_backend(self.device)?;
        let calls = core::mem::take(&mut self.passes[depth]);

        let result = (|| -> GyeolResult<()> {
            for call in &calls {
                let mut args = Vec::with_capacity(call.arg_hooks.len());
                for hook in &call.arg_hooks {
                    let array = self.table[hook.slot]
                        .clone()
                        .ok_or_else(|| GyeolError::InternalError(format!("table slot {} is empty", hook.slot)))?;
                    args.push(array);
                }

                let outputs = call.op.forward(backend, &args)?;

                for hook in &call.ret_hooks {
                    let output = outputs.get(hook.ret_index).ok_or_else(|| {
                        GyeolError::InternalError(format!(
                            "replayed call {} produced no output {}",
                            call.op.name(),
                            hook.ret_index
                        ))
                    })?;
                    match hook.mode {
                        WriteBack::Alias => {
                            self.table[hook.slot] = Some(output.clone());
                        },
                        WriteBack::CopyInPlace => {
                            let dst = self.table[hook.slot].as_ref().ok_or_else(|| {
                                GyeolError::InternalError(format!("table slot {} is empty", hook.slot))
                            })?;
                            backend.copy_to(dst, output)?;
                        },
                    }
                }
            }
            Ok(())
        })();

        self.passes[depth] = calls;
        result
    }

    /// Replays the forward pass on new inputs of the traced signature.
    pub fn forward(&mut self, inputs: &[Array]) -> GyeolResult<Vec<Array>> {
        match self.state {
            ScheduleState::Built | ScheduleState::Replaying => {},
            ScheduleState::Empty | ScheduleState::Tracing => return Err(GyeolError::ScheduleNotBuilt),
        }
        if super::trace::is_active() {
            // A replay inside another region's trace would silently escape
            // the recording; only the outermost region may be static.
            return Err(GyeolError::ScheduleNested);
        }
        if inputs.len() != self.input_slots.len() {
            return Err(GyeolError::ScheduleInputMismatch {
                index: inputs.len().min(self.input_slots.len()),
                reason: format!("expected {} inputs, got {}", self.input_slots.len(), inputs.len()),
            });
        }

        let backend = backends::get_backend(self.device)?;
        for (index, (array, desc)) in inputs.iter().zip(self.input_descs.iter()).enumerate() {
            if array.shape() != desc.shape.as_slice() {
                return Err(GyeolError::ScheduleInputMismatch {
                    index,
                    reason: format!("shape {:?} does not match traced {:?}", array.shape(), desc.shape),
                });
            }
            if array.dtype() != desc.dtype {
                return Err(GyeolError::ScheduleInputMismatch {
                    index,
                    reason: format!("dtype {:?} does not match traced {:?}", array.dtype(), desc.dtype),
                });
            }
            let slot = self.input_slots[index];
            let dst = self.table[slot]
                .as_ref()
                .ok_or_else(|| GyeolError::InternalError(format!("input slot {slot} is empty")))?;
            backend.copy_to(dst, array)?;
        }

        self.run_pass(0)?;
        self.state = ScheduleState::Replaying;

        let mut outputs = Vec::with_capacity(self.output_slots.len());
        for &slot in &self.output_slots {
            let array = self.table[slot]
                .clone()
                .ok_or_else(|| GyeolError::InternalError(format!("output slot {slot} is empty")))?;
            outputs.push(array);
        }
        backend.synchronize_if_needed()?;
        Ok(outputs)
    }

    /// Replays the recorded backward pass and accumulates the recorded
    /// target gradients, matching the semantics of a dynamic backward.
    pub fn backward(&mut self) -> GyeolResult<()> {
        if self.state != ScheduleState::Replaying {
            return Err(GyeolError::ScheduleState {
                expected: "replaying",
                got: self.state.name(),
            });
        }
        if self.pass_len(1) == 0 {
            return Err(GyeolError::ScheduleState {
                expected: "traced backward pass",
                got: "forward-only schedule",
            });
        }

        self.run_pass(1)?;

        let _guard = mode::no_grad();
        for &(value_id, slot) in &self.grad_hooks {
            let Some(target) = node::resolve_value(value_id) else {
                continue;
            };
            let array = self.table[slot]
                .as_ref()
                .ok_or_else(|| GyeolError::InternalError(format!("gradient slot {slot} is empty")))?;
            // The slot buffer is rewritten on the next replay; the stored
            // gradient must not alias it.
            let contribution = Value::new(array.deep_clone()?);
            match target.grad() {
                Ok(previous) => {
                    let total = previous.add(&contribution)?;
                    node::set_grad_edge(value_id, total.id())?;
                },
                Err(GyeolError::GradientNotComputed(_)) => {
                    node::set_grad_edge(value_id, contribution.id())?;
                },
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// A fresh instance sharing the prototype's recording.
    ///
    /// Produced and input slots get their own buffers (two in-flight
    /// forward passes must not clobber each other); captured constants and
    /// parameters stay shared so in-place parameter updates remain visible
    /// to every instance.
    pub(crate) fn fork(&self) -> GyeolResult<Schedule> {
        match self.state {
            ScheduleState::Built | ScheduleState::Replaying => {},
            _ => {
                return Err(GyeolError::ScheduleState {
                    expected: "built",
                    got: self.state.name(),
                })
            },
        }

        let input_slots: HashSet<usize> = self.input_slots.iter().copied().collect();
        let mut table = Vec::with_capacity(self.table.len());
        for (slot, entry) in self.table.iter().enumerate() {
            let forked = match entry {
                Some(array) => {
                    if self.produced_slots.contains(&slot) || input_slots.contains(&slot) {
                        Some(array.deep_clone()?)
                    } else {
                        Some(array.clone())
                    }
                },
                None => None,
            };
            table.push(forked);
        }

        Ok(Schedule {
            state: ScheduleState::Built,
            device: self.device,
            table,
            intern: HashMap::new(),
            passes: self.passes.clone(),
            input_slots: self.input_slots.clone(),
            input_descs: self.input_descs.clone(),
            output_slots: self.output_slots.clone(),
            grad_hooks: self.grad_hooks.clone(),
            produced_slots: self.produced_slots.clone(),
        })
    }

    pub(crate) fn reset_to_built(&mut self) {
        if self.state == ScheduleState::Replaying {
            self.state = ScheduleState::Built;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_before_build_is_rejected() {
        let mut schedule = Schedule::new(Device::CPU);
        assert!(matches!(schedule.forward(&[]), Err(GyeolError::ScheduleNotBuilt)));

        schedule.begin_trace(&[]).unwrap();
        assert!(matches!(schedule.forward(&[]), Err(GyeolError::ScheduleNotBuilt)));
    }

    #[test]
    fn build_requires_an_open_trace() {
        let mut schedule = Schedule::new(Device::CPU);
        assert!(matches!(
            schedule.build(),
            Err(GyeolError::ScheduleState { expected: "tracing", .. })
        ));
    }

    #[test]
    fn trace_cannot_restart() {
        let mut schedule = Schedule::new(Device::CPU);
        schedule.begin_trace(&[]).unwrap();
        assert!(matches!(
            schedule.begin_trace(&[]),
            Err(GyeolError::ScheduleState { expected: "empty", .. })
        ));
        schedule.build().unwrap();
        assert_eq!(schedule.state(), ScheduleState::Built);
    }
}
