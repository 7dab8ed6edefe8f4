use super::{
    cache::ScheduleCache,
    plan::{Schedule, ScheduleKey},
    trace,
};
use crate::{
    compat::*,
    error::{GyeolError, GyeolResult},
    graph::{mode, Value},
    types::Device,
};

/// Explicit compiled-graph driver around a subgraph-producing closure.
///
/// `trace_once`, `build` and replay are distinct steps; [`GraphCompiler::call`]
/// strings them together: the first call with a given input signature
/// traces, the next call finalizes the recording and every later call
/// replays the schedule instead of running the graph builder.
///
/// A training iteration looks like:
///
/// ```ignore
/// let loss = compiler.call(&[input])?;        // trace or replay
/// match loss[0].backward() {                  // dynamic on the trace run
///     ...
/// }
/// compiler.backward()?;                       // replayed iterations
/// compiler.finish_iteration()?;
/// ```
///
/// Everything executed between `trace_once` and `build` is recorded, so the
/// traced loss must be produced inside the compiled closure.
pub struct GraphCompiler<F> {
    f: F,
    cache: ScheduleCache,
    tracing_key: Option<ScheduleKey>,
    active: Vec<(ScheduleKey, Schedule)>,
}

impl<F> GraphCompiler<F>
where
    F: FnMut(&[Value]) -> GyeolResult<Vec<Value>>,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            cache: ScheduleCache::new(),
            tracing_key: None,
            active: Vec::new(),
        }
    }

    pub fn is_tracing(&self) -> bool {
        self.tracing_key.is_some()
    }

    fn key_for(&self, inputs: &[Value]) -> GyeolResult<(ScheduleKey, Device)> {
        let mut descs = Vec::with_capacity(inputs.len());
        for input in inputs {
            descs.push(input.desc()?);
        }
        let device = descs.first().map(|d| d.device).unwrap_or_default();
        Ok((ScheduleKey::from_descs(&descs, mode::current_mode()), device))
    }

    /// Trace on first use, build on the following call, replay afterwards.
    pub fn call(&mut self, inputs: &[Value]) -> GyeolResult<Vec<Value>> {
        if self.tracing_key.is_some() {
            self.build()?;
        }

        let (key, _device) = self.key_for(inputs)?;
        match self.cache.acquire(&key)? {
            Some(schedule) => self.run_replay(key, schedule, inputs),
            None => self.trace_once(inputs),
        }
    }

    /// Replays an already-built schedule for this input signature; never
    /// traces.
    pub fn replay(&mut self, inputs: &[Value]) -> GyeolResult<Vec<Value>> {
        let (key, _device) = self.key_for(inputs)?;
        match self.cache.acquire(&key)? {
            Some(schedule) => self.run_replay(key, schedule, inputs),
            None => Err(GyeolError::ScheduleNotBuilt),
        }
    }

    fn run_replay(&mut self, key: ScheduleKey, mut schedule: Schedule, inputs: &[Value]) -> GyeolResult<Vec<Value>> {
        let mut arrays = Vec::with_capacity(inputs.len());
        for input in inputs {
            arrays.push(input.array()?);
        }
        let outputs = schedule.forward(&arrays)?;
        log::debug!("schedule replayed ({} forward calls)", schedule.pass_len(0));

        let values: Vec<Value> = outputs.into_iter().map(Value::new).collect();
        if key.train {
            // In flight until the backward pass (or an explicit
            // iteration-finished signal) confirms it is done.
            self.active.push((key, schedule));
        } else {
            self.cache.release(&key, schedule);
        }
        Ok(values)
    }

    /// First (tracing) execution: runs the closure normally while the trace
    /// session records every operation call. The session stays open until
    /// [`GraphCompiler::build`] so a subsequent backward pass is captured
    /// too.
    pub fn trace_once(&mut self, inputs: &[Value]) -> GyeolResult<Vec<Value>> {
        let (key, device) = self.key_for(inputs)?;

        let mut arrays = Vec::with_capacity(inputs.len());
        for input in inputs {
            arrays.push(input.array()?);
        }
        trace::begin(device, &arrays)?;

        let outputs = match (self.f)(inputs) {
            Ok(outputs) => outputs,
            Err(err) => {
                trace::abort();
                return Err(err);
            },
        };

        let mut output_arrays = Vec::with_capacity(outputs.len());
        for output in &outputs {
            match output.array() {
                Ok(array) => output_arrays.push(array),
                Err(err) => {
                    trace::abort();
                    return Err(err);
                },
            }
        }
        if let Err(err) = trace::seal_forward(&output_arrays) {
            trace::abort();
            return Err(err);
        }

        self.tracing_key = Some(key);
        Ok(outputs)
    }

    /// Finalizes the open trace into a replayable schedule.
    pub fn build(&mut self) -> GyeolResult<()> {
        let key = self.tracing_key.take().ok_or(GyeolError::ScheduleState {
            expected: "tracing",
            got: "empty",
        })?;
        let mut schedule = trace::finish()?;
        schedule.build()?;
        self.cache.insert_prototype(key, schedule);
        Ok(())
    }

    /// Replays the recorded backward pass of the most recent replayed
    /// forward. On the tracing iteration the dynamic `Value::backward` is
    /// the one that runs (and gets recorded); this method serves the
    /// replayed iterations, whose outputs carry no graph.
    pub fn backward(&mut self) -> GyeolResult<()> {
        match self.active.last_mut() {
            Some((_, schedule)) => schedule.backward(),
            None => Err(GyeolError::ScheduleState {
                expected: "replaying",
                got: "idle",
            }),
        }
    }

    /// Marks the iteration finished: finalizes an open trace and returns
    /// every in-flight instance to the pool.
    pub fn finish_iteration(&mut self) -> GyeolResult<()> {
        if self.tracing_key.is_some() {
            self.build()?;
        }
        let active = core::mem::take(&mut self.active);
        for (key, schedule) in active {
            self.cache.release(&key, schedule);
        }
        Ok(())
    }
}
