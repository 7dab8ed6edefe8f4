use crate::{
    compat::*,
    graph::{OpNodeId, ValueId},
    types::{Device, DType},
};

/// Main error type for gyeol_core.
///
/// This enum covers all error conditions that can occur while building the
/// computation graph, propagating gradients, or replaying a compiled
/// schedule.
#[derive(Clone)]
pub enum GyeolError {
    // ===== Device Errors =====
    /// Device conflict between the operands of one operation.
    DeviceConflictInOp { left: Device, right: Device, op: String },
    /// No backend registered for the given device tag.
    UnsupportedDevice(Device),

    // ===== DType Errors =====
    /// Data type mismatch between expected and actual dtype.
    DTypeMismatch { expected: DType, got: DType },
    /// Data type conflict between the operands of one operation.
    DTypeConflictInOp { left: DType, right: DType, op: String },
    /// Unsupported dtype for a specific operation.
    UnsupportedDTypeForOp { dtype: DType, op: String },

    // ===== Shape Errors =====
    /// Shape mismatch between expected and actual shapes.
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    /// Element count mismatch between expected and actual sizes.
    SizeMismatch { expected: usize, got: usize },
    /// Incompatible shapes in a binary operation.
    IncompatibleShapes { lhs: Vec<usize>, rhs: Vec<usize>, op: String },

    // ===== Operator Contract Errors =====
    /// An operator's declared input contract was violated at apply time.
    /// Carries the operation name and the exact failed expectation.
    TypeCheck { op: String, constraint: String },

    // ===== Graph Errors =====
    /// Value node not found in the global registry.
    ValueNotFound(ValueId),
    /// Operation node not found in the global registry.
    OpNodeNotFound(OpNodeId),
    /// The value node exists but its array has not been materialized.
    ArrayNotMaterialized(ValueId),
    /// Gradients were requested for a non-float value node.
    RequiresGradNotSet(ValueId),

    // ===== Gradient Errors =====
    /// A seed gradient was omitted for a non-scalar output.
    MissingSeedGradient { index: usize },
    /// A backward formula returned the wrong count/shape/dtype of
    /// gradients for its operation node.
    GradientContract { op: String, reason: String },
    /// The gradient for this value node has not been computed.
    GradientNotComputed(ValueId),
    /// A gradient array contained NaN/Inf while debug checks were active.
    NumericalAnomaly { op: String, detail: String },

    // ===== Schedule Errors =====
    /// A trace session was opened while another one was active.
    ScheduleNested,
    /// Replay was requested before `build` completed.
    ScheduleNotBuilt,
    /// A schedule method was called in the wrong state.
    ScheduleState { expected: &'static str, got: &'static str },
    /// Replay inputs do not match the traced shapes/dtypes.
    ScheduleInputMismatch { index: usize, reason: String },

    // ===== Internal Errors =====
    /// Internal error with a descriptive message.
    InternalError(String),
}

impl fmt::Display for GyeolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Device Errors
            Self::DeviceConflictInOp { left, right, op } => {
                write!(f, "device conflict in operation {op}: left on {left:?}, right on {right:?}")
            },
            Self::UnsupportedDevice(device) => {
                write!(f, "no backend registered for device {device:?}")
            },

            // DType Errors
            Self::DTypeMismatch { expected, got } => {
                write!(f, "dtype mismatch: expected {expected:?}, got {got:?}")
            },
            Self::DTypeConflictInOp { left, right, op } => {
                write!(f, "dtype conflict in operation {op}: left is {left:?}, right is {right:?}")
            },
            Self::UnsupportedDTypeForOp { dtype, op } => {
                write!(f, "unsupported dtype {dtype:?} for operation {op}")
            },

            // Shape Errors
            Self::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {expected:?}, got {got:?}")
            },
            Self::SizeMismatch { expected, got } => {
                write!(f, "size mismatch: expected {expected}, got {got}")
            },
            Self::IncompatibleShapes { lhs, rhs, op } => {
                write!(f, "incompatible shapes in {op}: {lhs:?} vs {rhs:?}")
            },

            // Operator Contract Errors
            Self::TypeCheck { op, constraint } => {
                write!(f, "type check failed in {op}: expected {constraint}")
            },

            // Graph Errors
            Self::ValueNotFound(id) => write!(f, "value node {id:?} not found"),
            Self::OpNodeNotFound(id) => write!(f, "operation node {id:?} not found"),
            Self::ArrayNotMaterialized(id) => {
                write!(f, "value node {id:?} has no materialized array")
            },
            Self::RequiresGradNotSet(id) => {
                write!(f, "value node {id:?} cannot carry gradients (only float values can)")
            },

            // Gradient Errors
            Self::MissingSeedGradient { index } => {
                write!(f, "output {index} is non-scalar and no seed gradient was given")
            },
            Self::GradientContract { op, reason } => {
                write!(f, "backward contract violated by {op}: {reason}")
            },
            Self::GradientNotComputed(id) => {
                write!(f, "gradient for value node {id:?} has not been computed")
            },
            Self::NumericalAnomaly { op, detail } => {
                write!(f, "numerical anomaly in {op}: {detail}")
            },

            // Schedule Errors
            Self::ScheduleNested => {
                write!(f, "schedule trace sessions cannot nest; mark only the outermost static region")
            },
            Self::ScheduleNotBuilt => {
                write!(f, "schedule replay requested before build completed")
            },
            Self::ScheduleState { expected, got } => {
                write!(f, "schedule is in state {got}, expected {expected}")
            },
            Self::ScheduleInputMismatch { index, reason } => {
                write!(f, "replay input {index} does not match the traced signature: {reason}")
            },

            // Internal Errors
            Self::InternalError(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl fmt::Debug for GyeolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for GyeolError {}

/// Result type alias for gyeol_core operations.
pub type GyeolResult<T> = Result<T, GyeolError>;
