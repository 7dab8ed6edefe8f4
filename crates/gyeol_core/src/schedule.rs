//! Static schedules: trace once, replay many.
//!
//! The schedule compiler sits beside the graph builder. The first call of a
//! shape-stable subgraph runs normally while a trace session records every
//! operation call; `build` freezes the recording into a replayable
//! [`plan::Schedule`]; later calls replay the recorded call list against a
//! shared unique-array table instead of rebuilding the graph.

pub mod cache;
pub mod compiler;
pub mod plan;
pub(crate) mod trace;

pub use cache::ScheduleCache;
pub use compiler::GraphCompiler;
pub use plan::{ArgHook, RetHook, Schedule, ScheduleKey, ScheduleState, WriteBack};
