//! Prelude module for convenient imports
//!
//! Usage: `use gyeol_core::prelude::*;`

pub use crate::array::Array;
pub use crate::error::{GyeolError, GyeolResult};
pub use crate::gradient::{backward, BackwardOptions};
pub use crate::graph::{apply, debug_checks, eval_mode, export, no_grad, Value};
pub use crate::scalar::Scalar;
pub use crate::schedule::GraphCompiler;
pub use crate::types::{Device, DType};
