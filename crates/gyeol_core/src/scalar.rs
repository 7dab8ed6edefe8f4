use crate::{compat::*, types::DType};
use half::{bf16, f16};

/// A dtype-tagged scalar constant.
///
/// Used for scalar-operand operators and for seed/fill values, so a constant
/// can travel with the dtype of the array it will meet.
#[derive(Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Scalar {
    BOOL(bool),
    BF16(bf16),
    F16(f16),
    F32(f32),
    F64(f64),
    U8(u8),
    U32(u32),
    I32(i32),
    I64(i64),
}

impl Scalar {
    pub fn dtype(&self) -> DType {
        match self {
            Self::BOOL(_) => DType::BOOL,
            Self::BF16(_) => DType::BF16,
            Self::F16(_) => DType::F16,
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
            Self::U8(_) => DType::U8,
            Self::U32(_) => DType::U32,
            Self::I32(_) => DType::I32,
            Self::I64(_) => DType::I64,
        }
    }

    pub fn from_f64(value: f64, dtype: DType) -> Self {
        match dtype {
            DType::BOOL => Self::BOOL(value != 0.0),
            DType::BF16 => Self::BF16(bf16::from_f64(value)),
            DType::F16 => Self::F16(f16::from_f64(value)),
            DType::F32 => Self::F32(value as f32),
            DType::F64 => Self::F64(value),
            DType::U8 => Self::U8(value as u8),
            DType::U32 => Self::U32(value as u32),
            DType::I32 => Self::I32(value as i32),
            DType::I64 => Self::I64(value as i64),
        }
    }

    pub fn zero(dtype: DType) -> Self {
        Self::from_f64(0.0, dtype)
    }

    pub fn one(dtype: DType) -> Self {
        Self::from_f64(1.0, dtype)
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Self::BOOL(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            },
            Self::BF16(v) => f64::from(*v),
            Self::F16(v) => f64::from(*v),
            Self::F32(v) => f64::from(*v),
            Self::F64(v) => *v,
            Self::U8(v) => f64::from(*v),
            Self::U32(v) => f64::from(*v),
            Self::I32(v) => f64::from(*v),
            Self::I64(v) => *v as f64,
        }
    }

    /// Same numeric value, retagged to `dtype`.
    pub fn to_dtype(&self, dtype: DType) -> Self {
        Self::from_f64(self.to_f64(), dtype)
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BOOL(v) => write!(f, "{v}"),
            Self::BF16(v) => write!(f, "{v}bf16"),
            Self::F16(v) => write!(f, "{v}f16"),
            Self::F32(v) => write!(f, "{v}f32"),
            Self::F64(v) => write!(f, "{v}f64"),
            Self::U8(v) => write!(f, "{v}u8"),
            Self::U32(v) => write!(f, "{v}u32"),
            Self::I32(v) => write!(f, "{v}i32"),
            Self::I64(v) => write!(f, "{v}i64"),
        }
    }
}

impl From<f32> for Scalar {
    fn from(value: f32) -> Self {
        Self::F32(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::F64(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::I32(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::BOOL(value)
    }
}
