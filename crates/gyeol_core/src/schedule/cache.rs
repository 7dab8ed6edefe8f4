use super::plan::{Schedule, ScheduleKey};
use crate::{compat::*, error::GyeolResult};

struct SchedulePool {
    prototype: Schedule,
    free: Vec<Schedule>,
}

/// Built schedules by key, with instance pooling.
///
/// The prototype produced by a trace stays pristine; callers get forked
/// instances, so several forward passes can be in flight inside one
/// training iteration without sharing table buffers. Instances come back
/// to the pool when the iteration is marked finished.
pub struct ScheduleCache {
    pools: HashMap<ScheduleKey, SchedulePool>,
}

impl ScheduleCache {
    pub fn new() -> Self {
        Self { pools: HashMap::new() }
    }

    pub fn has(&self, key: &ScheduleKey) -> bool {
        self.pools.contains_key(key)
    }

    pub(crate) fn insert_prototype(&mut self, key: ScheduleKey, schedule: Schedule) {
        self.pools.insert(
            key,
            SchedulePool {
                prototype: schedule,
                free: Vec::new(),
            },
        );
    }

    /// Hands out a distinct instance for this call, or `None` when the key
    /// has never been traced.
    pub(crate) fn acquire(&mut self, key: &ScheduleKey) -> GyeolResult<Option<Schedule>> {
        let Some(pool) = self.pools.get_mut(key) else {
            return Ok(None);
        };
        if let Some(mut schedule) = pool.free.pop() {
            schedule.reset_to_built();
            return Ok(Some(schedule));
        }
        Ok(Some(pool.prototype.fork()?))
    }

    /// Returns an instance to its pool once it is no longer in flight.
    pub(crate) fn release(&mut self, key: &ScheduleKey, mut schedule: Schedule) {
        schedule.reset_to_built();
        if let Some(pool) = self.pools.get_mut(key) {
            pool.free.push(schedule);
        }
    }
}

impl Default for ScheduleCache {
    fn default() -> Self {
        Self::new()
    }
}
