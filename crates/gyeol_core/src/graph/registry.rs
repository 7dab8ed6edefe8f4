use super::{
    node::{OpNode_, Value_},
    OpNodeId, ValueId,
};
use crate::compat::*;

#[cfg(feature = "std")]
use dashmap::DashMap;

#[cfg(feature = "std")]
static VALUES: LazyLock<DashMap<ValueId, Value_>> = LazyLock::new(|| {
    let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(64);
    let shard_count = cores.next_power_of_two();
    DashMap::with_capacity_and_shard_amount(1 << 12, shard_count)
});

#[cfg(not(feature = "std"))]
static VALUES: LazyLock<RwLock<HashMap<ValueId, Value_>>> = LazyLock::new(|| RwLock::new(HashMap::new()));

#[cfg(feature = "std")]
static OP_NODES: LazyLock<DashMap<OpNodeId, OpNode_>> = LazyLock::new(|| {
    let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(64);
    let shard_count = cores.next_power_of_two();
    DashMap::with_capacity_and_shard_amount(1 << 12, shard_count)
});

#[cfg(not(feature = "std"))]
static OP_NODES: LazyLock<RwLock<HashMap<OpNodeId, OpNode_>>> = LazyLock::new(|| RwLock::new(HashMap::new()));

// ===== value nodes =====

pub(crate) fn insert_value(value_id: ValueId, value_: Value_) {
    #[cfg(feature = "std")]
    {
        VALUES.insert(value_id, value_);
    }
    #[cfg(not(feature = "std"))]
    {
        let mut values = VALUES.write();
        values.insert(value_id, value_);
    }
}

pub(crate) fn value_exists(value_id: ValueId) -> bool {
    #[cfg(feature = "std")]
    {
        VALUES.contains_key(&value_id)
    }
    #[cfg(not(feature = "std"))]
    {
        let values = VALUES.read();
        values.contains_key(&value_id)
    }
}

/// Removes the entry and hands it back so edge teardown can continue
/// outside the registry lock.
pub(crate) fn take_value(value_id: ValueId) -> Option<Value_> {
    #[cfg(feature = "std")]
    {
        VALUES.remove(&value_id).map(|(_, value_)| value_)
    }
    #[cfg(not(feature = "std"))]
    {
        let mut values = VALUES.write();
        values.remove(&value_id)
    }
}

pub(crate) fn with_value<F, R>(value_id: ValueId, f: F) -> Option<R>
where
    F: FnOnce(&Value_) -> R,
{
    #[cfg(feature = "std")]
    {
        VALUES.get(&value_id).map(|value_ref| f(&value_ref))
    }
    #[cfg(not(feature = "std"))]
    {
        let values = VALUES.read();
        values.get(&value_id).map(f)
    }
}

pub(crate) fn with_value_mut<F, R>(value_id: ValueId, f: F) -> Option<R>
where
    F: FnOnce(&mut Value_) -> R,
{
    #[cfg(feature = "std")]
    {
        VALUES.get_mut(&value_id).map(|mut value_ref| f(&mut value_ref))
    }
    #[cfg(not(feature = "std"))]
    {
        let mut values = VALUES.write();
        values.get_mut(&value_id).map(f)
    }
}

/// Number of live value nodes (for tests and leak diagnostics).
pub fn value_count() -> usize {
    #[cfg(feature = "std")]
    {
        VALUES.len()
    }
    #[cfg(not(feature = "std"))]
    {
        let values = VALUES.read();
        values.len()
    }
}

// ===== operation nodes =====

pub(crate) fn insert_op(op_id: OpNodeId, op_: OpNode_) {
    #[cfg(feature = "std")]
    {
        OP_NODES.insert(op_id, op_);
    }
    #[cfg(not(feature = "std"))]
    {
        let mut ops = OP_NODES.write();
        ops.insert(op_id, op_);
    }
}

pub(crate) fn op_exists(op_id: OpNodeId) -> bool {
    #[cfg(feature = "std")]
    {
        OP_NODES.contains_key(&op_id)
    }
    #[cfg(not(feature = "std"))]
    {
        let ops = OP_NODES.read();
        ops.contains_key(&op_id)
    }
}

pub(crate) fn take_op(op_id: OpNodeId) -> Option<OpNode_> {
    #[cfg(feature = "std")]
    {
        OP_NODES.remove(&op_id).map(|(_, op_)| op_)
    }
    #[cfg(not(feature = "std"))]
    {
        let mut ops = OP_NODES.write();
        ops.remove(&op_id)
    }
}

pub(crate) fn with_op<F, R>(op_id: OpNodeId, f: F) -> Option<R>
where
    F: FnOnce(&OpNode_) -> R,
{
    #[cfg(feature = "std")]
    {
        OP_NODES.get(&op_id).map(|op_ref| f(&op_ref))
    }
    #[cfg(not(feature = "std"))]
    {
        let ops = OP_NODES.read();
        ops.get(&op_id).map(f)
    }
}

/// Number of live operation nodes (for tests and leak diagnostics).
pub fn op_count() -> usize {
    #[cfg(feature = "std")]
    {
        OP_NODES.len()
    }
    #[cfg(not(feature = "std"))]
    {
        let ops = OP_NODES.read();
        ops.len()
    }
}
