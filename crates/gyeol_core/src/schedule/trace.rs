//! The active trace session.
//!
//! At most one session per thread: nested static regions are a graph
//! discipline error. While a session is open, `graph::builder::apply`
//! reports every operation call here; the backward propagator raises the
//! pass depth around its run so backward (and double-backward) calls land
//! in their own call lists.

use super::plan::Schedule;
use crate::{
    array::Array,
    compat::*,
    error::{GyeolError, GyeolResult},
    graph::ValueId,
    ops::Operator,
    types::Device,
};

pub(crate) struct TraceSession {
    schedule: Schedule,
    record_forward: bool,
    backward_depth: usize,
}

#[cfg(feature = "std")]
mod slot {
    use super::TraceSession;
    use std::cell::RefCell;
    use std::thread_local;

    thread_local! {
        static ACTIVE: RefCell<Option<TraceSession>> = const { RefCell::new(None) };
    }

    pub(super) fn with<R>(f: impl FnOnce(&mut Option<TraceSession>) -> R) -> R {
        ACTIVE.with(|active| f(&mut active.borrow_mut()))
    }
}

#[cfg(not(feature = "std"))]
mod slot {
    use super::TraceSession;
    use crate::compat::*;

    static ACTIVE: Mutex<Option<TraceSession>> = Mutex::new(None);

    pub(super) fn with<R>(f: impl FnOnce(&mut Option<TraceSession>) -> R) -> R {
        f(&mut ACTIVE.lock())
    }
}

pub(crate) fn is_active() -> bool {
    slot::with(|active| active.is_some())
}

/// Opens a session and starts recording the forward pass.
pub(crate) fn begin(device: Device, inputs: &[Array]) -> GyeolResult<()> {
    slot::with(|active| {
        if active.is_some() {
            return Err(GyeolError::ScheduleNested);
        }
        let mut schedule = Schedule::new(device);
        schedule.begin_trace(inputs)?;
        *active = Some(TraceSession {
            schedule,
            record_forward: true,
            backward_depth: 0,
        });
        Ok(())
    })
}

/// Marks the traced region's outputs and stops forward recording; the
/// session stays open so the backward pass can still be captured.
pub(crate) fn seal_forward(outputs: &[Array]) -> GyeolResult<()> {
    slot::with(|active| match active.as_mut() {
        Some(session) => {
            session.schedule.record_region_outputs(outputs)?;
            session.record_forward = false;
            Ok(())
        },
        None => Err(GyeolError::ScheduleState {
            expected: "tracing",
            got: "empty",
        }),
    })
}

/// Closes the session, handing the recorded schedule back.
pub(crate) fn finish() -> GyeolResult<Schedule> {
    slot::with(|active| match active.take() {
        Some(session) => Ok(session.schedule),
        None => Err(GyeolError::ScheduleState {
            expected: "tracing",
            got: "empty",
        }),
    })
}

/// Drops a session after a failed trace; the partial recording is unusable.
pub(crate) fn abort() {
    slot::with(|active| {
        *active = None;
    });
}

/// Reports one executed operation call. No-op without an active session or
/// outside a recorded phase.
pub(crate) fn record_apply(op: &Arc<dyn Operator>, inputs: &[Array], outputs: &[Array]) -> GyeolResult<()> {
    slot::with(|active| {
        let Some(session) = active.as_mut() else {
            return Ok(());
        };
        let depth = if session.backward_depth > 0 {
            session.backward_depth
        } else if session.record_forward {
            0
        } else {
            return Ok(());
        };
        session.schedule.record_call(op, inputs, outputs, depth)
    })
}

/// Records where a target's gradient contribution lives, so replays can
/// accumulate it without rebuilding the graph.
pub(crate) fn record_target_grad(value_id: ValueId, array: &Array) {
    slot::with(|active| {
        if let Some(session) = active.as_mut() {
            if session.backward_depth > 0 {
                session.schedule.record_target_grad(value_id, array);
            }
        }
    });
}

/// RAII marker for one propagator run: raises the recording depth while a
/// session is open. Nested runs (double backward) stack to depth 2.
pub(crate) struct BackwardPassGuard {
    entered: bool,
}

pub(crate) fn backward_pass_guard() -> BackwardPassGuard {
    let entered = slot::with(|active| match active.as_mut() {
        Some(session) => {
            session.backward_depth += 1;
            true
        },
        None => false,
    });
    BackwardPassGuard { entered }
}

impl Drop for BackwardPassGuard {
    fn drop(&mut self) {
        if self.entered {
            slot::with(|active| {
                if let Some(session) = active.as_mut() {
                    session.backward_depth -= 1;
                }
            });
        }
    }
}
