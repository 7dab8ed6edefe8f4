//! Engine mode flags.
//!
//! There is no process-wide mutable singleton: modes are immutable values
//! on a per-thread stack, entered and left through RAII guards, so separate
//! model instances (and re-entrant backward passes) cannot trample each
//! other's flags.

use crate::compat::*;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EngineMode {
    /// Whether `apply` wires operation nodes at all. Off = pure
    /// computation, zero graph overhead.
    pub build_graph: bool,
    /// Training vs. evaluation; part of the schedule cache key.
    pub train: bool,
    /// Opt-in validation: gradient shape/dtype contracts and NaN scans.
    pub debug_checks: bool,
}

impl Default for EngineMode {
    fn default() -> Self {
        Self {
            build_graph: true,
            train: true,
            debug_checks: false,
        }
    }
}

#[cfg(feature = "std")]
mod stack {
    use super::EngineMode;
    use std::cell::RefCell;
    use std::thread_local;
    use std::vec::Vec;

    thread_local! {
        static MODE_STACK: RefCell<Vec<EngineMode>> = const { RefCell::new(Vec::new()) };
    }

    pub(super) fn current() -> EngineMode {
        MODE_STACK.with(|stack| stack.borrow().last().copied().unwrap_or_default())
    }

    pub(super) fn push(mode: EngineMode) {
        MODE_STACK.with(|stack| stack.borrow_mut().push(mode));
    }

    pub(super) fn pop() {
        MODE_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[cfg(not(feature = "std"))]
mod stack {
    use super::EngineMode;
    use crate::compat::*;

    // Single execution context without std threads.
    static MODE_STACK: Mutex<Vec<EngineMode>> = Mutex::new(Vec::new());

    pub(super) fn current() -> EngineMode {
        MODE_STACK.lock().last().copied().unwrap_or_default()
    }

    pub(super) fn push(mode: EngineMode) {
        MODE_STACK.lock().push(mode);
    }

    pub(super) fn pop() {
        MODE_STACK.lock().pop();
    }
}

pub fn current_mode() -> EngineMode {
    stack::current()
}

/// Guard that keeps a mode entry on the stack until dropped.
pub struct ModeGuard {
    _private: (),
}

impl Drop for ModeGuard {
    fn drop(&mut self) {
        stack::pop();
    }
}

pub fn push_mode(mode: EngineMode) -> ModeGuard {
    stack::push(mode);
    ModeGuard { _private: () }
}

/// Disables graph construction for the guard's lifetime (inference mode).
pub fn no_grad() -> ModeGuard {
    let mode = EngineMode {
        build_graph: false,
        ..current_mode()
    };
    push_mode(mode)
}

/// Re-enables graph construction, e.g. inside a backward pass that must
/// itself be differentiable.
pub fn with_graph() -> ModeGuard {
    let mode = EngineMode {
        build_graph: true,
        ..current_mode()
    };
    push_mode(mode)
}

/// Switches to evaluation mode for the guard's lifetime.
pub fn eval_mode() -> ModeGuard {
    let mode = EngineMode {
        train: false,
        ..current_mode()
    };
    push_mode(mode)
}

/// Enables debug validation (gradient contracts, NaN scans) for the
/// guard's lifetime.
pub fn debug_checks() -> ModeGuard {
    let mode = EngineMode {
        debug_checks: true,
        ..current_mode()
    };
    push_mode(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_builds_graph() {
        let mode = current_mode();
        assert!(mode.build_graph);
        assert!(mode.train);
        assert!(!mode.debug_checks);
    }

    #[test]
    fn guards_nest_and_restore() {
        {
            let _outer = no_grad();
            assert!(!current_mode().build_graph);
            {
                let _inner = with_graph();
                assert!(current_mode().build_graph);
            }
            assert!(!current_mode().build_graph);
        }
        assert!(current_mode().build_graph);
    }
}
