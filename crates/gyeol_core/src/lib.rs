#![no_std]
#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod array;
pub mod backends;
pub(crate) mod compat;
pub mod error;
pub mod gradient;
pub mod graph;
pub mod ops;
pub mod prelude;
pub mod scalar;
pub mod schedule;
pub mod types;
