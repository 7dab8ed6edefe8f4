pub mod cpu;

use crate::{
    array::Array,
    compat::*,
    error::GyeolResult,
    scalar::Scalar,
    types::{DType, Device},
};
pub use cpu::{CpuBackend, CpuStorage};

/// Elementwise binary kernels a backend must provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
        }
    }
}

/// Elementwise unary kernels a backend must provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Square,
    Exp,
    Log,
    Sigmoid,
    Tanh,
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Neg => "neg",
            Self::Square => "square",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
        }
    }
}

/// Elementwise kernels with one scalar operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryScalarOp {
    AddScalar,
    MulScalar,
    PowScalar,
}

impl UnaryScalarOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddScalar => "add_scalar",
            Self::MulScalar => "mul_scalar",
            Self::PowScalar => "pow_scalar",
        }
    }
}

/// Backend-tagged storage of one array.
///
/// Each backend owns exactly one variant; a backend only ever touches its
/// own variant, which is how the capability contract stays honest without
/// a type switch in the core.
#[derive(Debug, Clone)]
pub enum Storage {
    Cpu(CpuStorage),
}

impl Storage {
    pub fn dtype(&self) -> DType {
        match self {
            Self::Cpu(storage) => storage.dtype(),
        }
    }

    pub fn device(&self) -> Device {
        match self {
            Self::Cpu(_) => Device::CPU,
        }
    }
}

/// Capability interface every array backend implements.
///
/// The graph core dispatches through this trait only; it is selected once
/// per array via the device tag (`get_backend`), never by inspecting a
/// concrete storage type.
pub trait ArrayBackend: Send + Sync {
    fn device(&self) -> Device;

    // ----- allocation -----

    fn from_f64_slice(&self, data: &[f64], shape: &[usize], dtype: DType) -> GyeolResult<Array>;

    fn full(&self, shape: &[usize], dtype: DType, value: Scalar) -> GyeolResult<Array>;

    fn deep_clone(&self, input: &Array) -> GyeolResult<Array>;

    // ----- movement -----

    /// Overwrites `dst`'s buffer with `src`'s contents in place. Shapes and
    /// dtypes must match; the destination keeps its identity.
    fn copy_to(&self, dst: &Array, src: &Array) -> GyeolResult<()>;

    /// Barrier for backends with asynchronous execution streams. The CPU
    /// backend is synchronous and returns immediately.
    fn synchronize_if_needed(&self) -> GyeolResult<()>;

    // ----- kernels -----

    fn binary(&self, op: BinaryOp, lhs: &Array, rhs: &Array) -> GyeolResult<Array>;

    fn unary(&self, op: UnaryOp, input: &Array) -> GyeolResult<Array>;

    fn unary_scalar(&self, op: UnaryScalarOp, input: &Array, scalar: Scalar) -> GyeolResult<Array>;

    /// 2-D × 2-D matrix product.
    fn matmul(&self, lhs: &Array, rhs: &Array) -> GyeolResult<Array>;

    /// 2-D transpose into a fresh contiguous buffer.
    fn transpose2d(&self, input: &Array) -> GyeolResult<Array>;

    /// Full reduction to a scalar array.
    fn reduce_sum(&self, input: &Array) -> GyeolResult<Array>;

    /// Materialized broadcast to `shape`.
    fn broadcast_to(&self, input: &Array, shape: &[usize]) -> GyeolResult<Array>;

    // ----- readback / checks -----

    fn to_f64_vec(&self, input: &Array) -> GyeolResult<Vec<f64>>;

    /// Whether the array contains NaN or Inf. Only consulted when debug
    /// checks are active.
    fn has_non_finite(&self, input: &Array) -> GyeolResult<bool>;
}

static CPU_BACKEND: CpuBackend = CpuBackend;

/// Capability lookup on a device tag.
pub fn get_backend(device: Device) -> GyeolResult<&'static dyn ArrayBackend> {
    match device {
        Device::CPU => Ok(&CPU_BACKEND),
    }
}

/// Backend lookup for an array's own device tag.
pub fn backend_of(array: &Array) -> GyeolResult<&'static dyn ArrayBackend> {
    get_backend(array.device())
}
