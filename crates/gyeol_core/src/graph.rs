pub mod builder;
pub mod export;
pub mod mode;
pub mod node;
pub(crate) mod registry;

use crate::compat::*;

pub use builder::apply;
pub use export::{export, GraphDump, GraphEdge, OpInfo, ValueInfo};
pub use mode::{current_mode, debug_checks, eval_mode, no_grad, EngineMode, ModeGuard};
pub use node::Value;
pub use registry::{op_count, value_count};

/// Identifier of a value node in the global registry.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ValueId(pub(crate) usize);

impl ValueId {
    pub(crate) fn new() -> Self {
        static VALUE_COUNTER: AtomicUsize = AtomicUsize::new(0);
        Self(VALUE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identifier of an operation node in the global registry.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct OpNodeId(pub(crate) usize);

impl OpNodeId {
    pub(crate) fn new() -> Self {
        static OP_COUNTER: AtomicUsize = AtomicUsize::new(0);
        Self(OP_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}
