use crate::{
    array::Array,
    backends::{ArrayBackend, BinaryOp, Storage, UnaryOp, UnaryScalarOp},
    compat::*,
    error::{GyeolError, GyeolResult},
    scalar::Scalar,
    types::{DType, Device, Layout},
};
use half::{bf16, f16};
use num_traits::Float;

#[derive(Debug, Clone)]
pub enum CpuStorage {
    BOOL(Vec<bool>),
    BF16(Vec<bf16>),
    F16(Vec<f16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    U8(Vec<u8>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

impl CpuStorage {
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

    pub fn len(&self) -> usize {
        match self {
            Self::BOOL(v) => v.len(),
            Self::BF16(v) => v.len(),
            Self::F16(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn from_f64(data: &[f64], dtype: DType) -> Self {
        match dtype {
            DType::BOOL => Self::BOOL(data.iter().map(|&v| v != 0.0).collect()),
            DType::BF16 => Self::BF16(data.iter().map(|&v| bf16::from_f64(v)).collect()),
            DType::F16 => Self::F16(data.iter().map(|&v| f16::from_f64(v)).collect()),
            DType::F32 => Self::F32(data.iter().map(|&v| v as f32).collect()),
            DType::F64 => Self::F64(data.to_vec()),
            DType::U8 => Self::U8(data.iter().map(|&v| v as u8).collect()),
            DType::U32 => Self::U32(data.iter().map(|&v| v as u32).collect()),
            DType::I32 => Self::I32(data.iter().map(|&v| v as i32).collect()),
            DType::I64 => Self::I64(data.iter().map(|&v| v as i64).collect()),
        }
    }

    fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            Self::BOOL(v) => v.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect(),
            Self::BF16(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::F16(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::F32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::F64(v) => v.clone(),
            Self::U8(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::U32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::I32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::I64(v) => v.iter().map(|&x| x as f64).collect(),
        }
    }
}

#[inline]
fn binary_float<T: Float>(op: BinaryOp, lhs: T, rhs: T) -> T {
    match op {
        BinaryOp::Add => lhs + rhs,
        BinaryOp::Sub => lhs - rhs,
        BinaryOp::Mul => lhs * rhs,
        BinaryOp::Div => lhs / rhs,
    }
}

#[inline]
fn unary_float<T: Float>(op: UnaryOp, value: T) -> T {
    match op {
        UnaryOp::Neg => -value,
        UnaryOp::Square => value * value,
        UnaryOp::Exp => value.exp(),
        UnaryOp::Log => value.ln(),
        UnaryOp::Sigmoid => T::one() / (T::one() + (-value).exp()),
        UnaryOp::Tanh => value.tanh(),
    }
}

#[inline]
fn unary_scalar_float<T: Float>(op: UnaryScalarOp, value: T, scalar: T) -> T {
    match op {
        UnaryScalarOp::AddScalar => value + scalar,
        UnaryScalarOp::MulScalar => value * scalar,
        UnaryScalarOp::PowScalar => value.powf(scalar),
    }
}

fn zip_map<T: Copy>(lhs: &[T], rhs: &[T], f: impl Fn(T, T) -> T) -> Vec<T> {
    lhs.iter().zip(rhs.iter()).map(|(&a, &b)| f(a, b)).collect()
}

impl CpuStorage {
    fn binary(&self, rhs: &Self, op: BinaryOp) -> GyeolResult<Self> {
        macro_rules! int_arm {
            ($a:expr, $b:expr, $variant:ident) => {
                Ok(Self::$variant(zip_map($a, $b, |x, y| match op {
                    BinaryOp::Add => x.wrapping_add(y),
                    BinaryOp::Sub => x.wrapping_sub(y),
                    BinaryOp::Mul => x.wrapping_mul(y),
                    BinaryOp::Div => x.wrapping_div(y),
                })))
            };
        }

        match (self, rhs) {
            (Self::BF16(a), Self::BF16(b)) => Ok(Self::BF16(zip_map(a, b, |x, y| {
                bf16::from_f32(binary_float(op, f32::from(x), f32::from(y)))
            }))),
            (Self::F16(a), Self::F16(b)) => Ok(Self::F16(zip_map(a, b, |x, y| {
                f16::from_f32(binary_float(op, f32::from(x), f32::from(y)))
            }))),
            (Self::F32(a), Self::F32(b)) => Ok(Self::F32(zip_map(a, b, |x, y| binary_float(op, x, y)))),
            (Self::F64(a), Self::F64(b)) => Ok(Self::F64(zip_map(a, b, |x, y| binary_float(op, x, y)))),
            (Self::U8(a), Self::U8(b)) => int_arm!(a, b, U8),
            (Self::U32(a), Self::U32(b)) => int_arm!(a, b, U32),
            (Self::I32(a), Self::I32(b)) => int_arm!(a, b, I32),
            (Self::I64(a), Self::I64(b)) => int_arm!(a, b, I64),
            (Self::BOOL(_), Self::BOOL(_)) => Err(GyeolError::UnsupportedDTypeForOp {
                dtype: DType::BOOL,
                op: op.name().to_string(),
            }),
            (lhs, rhs) => Err(GyeolError::DTypeConflictInOp {
                left: lhs.dtype(),
                right: rhs.dtype(),
                op: op.name().to_string(),
            }),
        }
    }

    fn unary(&self, op: UnaryOp) -> GyeolResult<Self> {
        match self {
            Self::BF16(v) => Ok(Self::BF16(
                v.iter().map(|&x| bf16::from_f32(unary_float(op, f32::from(x)))).collect(),
            )),
            Self::F16(v) => Ok(Self::F16(
                v.iter().map(|&x| f16::from_f32(unary_float(op, f32::from(x)))).collect(),
            )),
            Self::F32(v) => Ok(Self::F32(v.iter().map(|&x| unary_float(op, x)).collect())),
            Self::F64(v) => Ok(Self::F64(v.iter().map(|&x| unary_float(op, x)).collect())),
            Self::I32(v) if op == UnaryOp::Neg => Ok(Self::I32(v.iter().map(|&x| x.wrapping_neg()).collect())),
            Self::I64(v) if op == UnaryOp::Neg => Ok(Self::I64(v.iter().map(|&x| x.wrapping_neg()).collect())),
            Self::I32(v) if op == UnaryOp::Square => Ok(Self::I32(v.iter().map(|&x| x.wrapping_mul(x)).collect())),
            Self::I64(v) if op == UnaryOp::Square => Ok(Self::I64(v.iter().map(|&x| x.wrapping_mul(x)).collect())),
            storage => Err(GyeolError::UnsupportedDTypeForOp {
                dtype: storage.dtype(),
                op: op.name().to_string(),
            }),
        }
    }

    fn unary_scalar(&self, op: UnaryScalarOp, scalar: Scalar) -> GyeolResult<Self> {
        let s = scalar.to_f64();
        match self {
            Self::BF16(v) => Ok(Self::BF16(
                v.iter()
                    .map(|&x| bf16::from_f32(unary_scalar_float(op, f32::from(x), s as f32)))
                    .collect(),
            )),
            Self::F16(v) => Ok(Self::F16(
                v.iter()
                    .map(|&x| f16::from_f32(unary_scalar_float(op, f32::from(x), s as f32)))
                    .collect(),
            )),
            Self::F32(v) => Ok(Self::F32(v.iter().map(|&x| unary_scalar_float(op, x, s as f32)).collect())),
            Self::F64(v) => Ok(Self::F64(v.iter().map(|&x| unary_scalar_float(op, x, s)).collect())),
            Self::I32(v) if op != UnaryScalarOp::PowScalar => {
                let s = s as i32;
                Ok(Self::I32(v.iter().map(|&x| match op {
                    UnaryScalarOp::AddScalar => x.wrapping_add(s),
                    _ => x.wrapping_mul(s),
                }).collect()))
            },
            Self::I64(v) if op != UnaryScalarOp::PowScalar => {
                let s = s as i64;
                Ok(Self::I64(v.iter().map(|&x| match op {
                    UnaryScalarOp::AddScalar => x.wrapping_add(s),
                    _ => x.wrapping_mul(s),
                }).collect()))
            },
            storage => Err(GyeolError::UnsupportedDTypeForOp {
                dtype: storage.dtype(),
                op: op.name().to_string(),
            }),
        }
    }

    fn reduce_sum(&self) -> GyeolResult<Self> {
        match self {
            Self::BF16(v) => {
                let total: f32 = v.iter().map(|&x| f32::from(x)).sum();
                Ok(Self::BF16(vec![bf16::from_f32(total)]))
            },
            Self::F16(v) => {
                let total: f32 = v.iter().map(|&x| f32::from(x)).sum();
                Ok(Self::F16(vec![f16::from_f32(total)]))
            },
            Self::F32(v) => Ok(Self::F32(vec![v.iter().sum()])),
            Self::F64(v) => Ok(Self::F64(vec![v.iter().sum()])),
            Self::U8(v) => Ok(Self::U8(vec![v.iter().fold(0u8, |acc, &x| acc.wrapping_add(x))])),
            Self::U32(v) => Ok(Self::U32(vec![v.iter().fold(0u32, |acc, &x| acc.wrapping_add(x))])),
            Self::I32(v) => Ok(Self::I32(vec![v.iter().fold(0i32, |acc, &x| acc.wrapping_add(x))])),
            Self::I64(v) => Ok(Self::I64(vec![v.iter().fold(0i64, |acc, &x| acc.wrapping_add(x))])),
            Self::BOOL(_) => Err(GyeolError::UnsupportedDTypeForOp {
                dtype: DType::BOOL,
                op: "reduce_sum".to_string(),
            }),
        }
    }

    /// Gathers a broadcast view into a fresh contiguous buffer.
    fn gather_broadcast(&self, src_layout: &Layout, target_shape: &[usize]) -> GyeolResult<Self> {
        let broadcast = src_layout.broadcast_to(target_shape)?;
        let out_size: usize = target_shape.iter().product();
        let out_strides = Layout::compute_strides(target_shape);
        let src_strides = broadcast.strides();

        let index_of = |flat: usize| -> usize {
            let mut src_index = broadcast.offset();
            for (dim, &out_stride) in out_strides.iter().enumerate() {
                let coord = (flat / out_stride) % target_shape[dim];
                src_index += coord * src_strides[dim];
            }
            src_index
        };

        macro_rules! gather_arm {
            ($data:expr, $variant:ident) => {{
                let mut out = Vec::with_capacity(out_size);
                for flat in 0..out_size {
                    out.push($data[index_of(flat)]);
                }
                Ok(Self::$variant(out))
            }};
        }

        match self {
            Self::BOOL(v) => gather_arm!(v, BOOL),
            Self::BF16(v) => gather_arm!(v, BF16),
            Self::F16(v) => gather_arm!(v, F16),
            Self::F32(v) => gather_arm!(v, F32),
            Self::F64(v) => gather_arm!(v, F64),
            Self::U8(v) => gather_arm!(v, U8),
            Self::U32(v) => gather_arm!(v, U32),
            Self::I32(v) => gather_arm!(v, I32),
            Self::I64(v) => gather_arm!(v, I64),
        }
    }

    fn copy_from(&mut self, src: &Self) -> GyeolResult<()> {
        macro_rules! copy_arm {
            ($dst:expr, $src:expr) => {{
                if $dst.len() != $src.len() {
                    return Err(GyeolError::SizeMismatch {
                        expected: $dst.len(),
                        got: $src.len(),
                    });
                }
                $dst.copy_from_slice($src);
                Ok(())
            }};
        }

        match (self, src) {
            (Self::BOOL(dst), Self::BOOL(src)) => copy_arm!(dst, src),
            (Self::BF16(dst), Self::BF16(src)) => copy_arm!(dst, src),
            (Self::F16(dst), Self::F16(src)) => copy_arm!(dst, src),
            (Self::F32(dst), Self::F32(src)) => copy_arm!(dst, src),
            (Self::F64(dst), Self::F64(src)) => copy_arm!(dst, src),
            (Self::U8(dst), Self::U8(src)) => copy_arm!(dst, src),
            (Self::U32(dst), Self::U32(src)) => copy_arm!(dst, src),
            (Self::I32(dst), Self::I32(src)) => copy_arm!(dst, src),
            (Self::I64(dst), Self::I64(src)) => copy_arm!(dst, src),
            (dst, src) => Err(GyeolError::DTypeMismatch {
                expected: dst.dtype(),
                got: src.dtype(),
            }),
        }
    }

    fn has_non_finite(&self) -> bool {
        match self {
            Self::BF16(v) => v.iter().any(|&x| !f32::from(x).is_finite()),
            Self::F16(v) => v.iter().any(|&x| !f32::from(x).is_finite()),
            Self::F32(v) => v.iter().any(|&x| !x.is_finite()),
            Self::F64(v) => v.iter().any(|&x| !x.is_finite()),
            _ => false,
        }
    }
}

pub struct CpuBackend;

impl CpuBackend {
    fn wrap(&self, storage: CpuStorage, shape: &[usize]) -> Array {
        Array::from_parts(Storage::Cpu(storage), Layout::from_shape(shape), Device::CPU)
    }
}

fn cpu<'a>(storage: &'a Storage) -> &'a CpuStorage {
    match storage {
        Storage::Cpu(inner) => inner,
    }
}

impl ArrayBackend for CpuBackend {
    fn device(&self) -> Device {
        Device::CPU
    }

    fn from_f64_slice(&self, data: &[f64], shape: &[usize], dtype: DType) -> GyeolResult<Array> {
        let size: usize = shape.iter().product();
        if data.len() != size {
            return Err(GyeolError::SizeMismatch {
                expected: size,
                got: data.len(),
            });
        }
        Ok(self.wrap(CpuStorage::from_f64(data, dtype), shape))
    }

    fn full(&self, shape: &[usize], dtype: DType, value: Scalar) -> GyeolResult<Array> {
        let size: usize = shape.iter().product();
        let data = vec![value.to_f64(); size];
        Ok(self.wrap(CpuStorage::from_f64(&data, dtype), shape))
    }

    fn deep_clone(&self, input: &Array) -> GyeolResult<Array> {
        let storage = input.with_storage(|s| Ok(cpu(s).clone()))?;
        Ok(self.wrap(storage, input.shape()))
    }

    fn copy_to(&self, dst: &Array, src: &Array) -> GyeolResult<()> {
        if Array::same_storage(dst, src) {
            return Ok(());
        }
        if dst.shape() != src.shape() {
            return Err(GyeolError::ShapeMismatch {
                expected: dst.shape().to_vec(),
                got: src.shape().to_vec(),
            });
        }
        let src_storage = src.with_storage(|s| Ok(cpu(s).clone()))?;
        dst.with_storage_mut(|d| match d {
            Storage::Cpu(inner) => inner.copy_from(&src_storage),
        })
    }

    fn synchronize_if_needed(&self) -> GyeolResult<()> {
        Ok(())
    }

    fn binary(&self, op: BinaryOp, lhs: &Array, rhs: &Array) -> GyeolResult<Array> {
        if lhs.size() != rhs.size() {
            return Err(GyeolError::IncompatibleShapes {
                lhs: lhs.shape().to_vec(),
                rhs: rhs.shape().to_vec(),
                op: op.name().to_string(),
            });
        }
        let storage = if Array::same_storage(lhs, rhs) {
            lhs.with_storage(|a| cpu(a).binary(cpu(a), op))?
        } else {
            lhs.with_storage(|a| rhs.with_storage(|b| cpu(a).binary(cpu(b), op)))?
        };
        Ok(self.wrap(storage, lhs.shape()))
    }

    fn unary(&self, op: UnaryOp, input: &Array) -> GyeolResult<Array> {
        let storage = input.with_storage(|s| cpu(s).unary(op))?;
        Ok(self.wrap(storage, input.shape()))
    }

    fn unary_scalar(&self, op: UnaryScalarOp, input: &Array, scalar: Scalar) -> GyeolResult<Array> {
        let storage = input.with_storage(|s| cpu(s).unary_scalar(op, scalar))?;
        Ok(self.wrap(storage, input.shape()))
    }

    fn matmul(&self, lhs: &Array, rhs: &Array) -> GyeolResult<Array> {
        let (lhs_shape, rhs_shape) = (lhs.shape().to_vec(), rhs.shape().to_vec());
        if lhs_shape.len() != 2 || rhs_shape.len() != 2 || lhs_shape[1] != rhs_shape[0] {
            return Err(GyeolError::IncompatibleShapes {
                lhs: lhs_shape,
                rhs: rhs_shape,
                op: "matmul".to_string(),
            });
        }
        let (m, k, n) = (lhs_shape[0], lhs_shape[1], rhs_shape[1]);

        macro_rules! matmul_arm {
            ($a:expr, $b:expr, $ty:ty, $variant:ident, $from:expr, $into:expr) => {{
                let mut out = vec![<$ty as Default>::default(); m * n];
                for row in 0..m {
                    for col in 0..n {
                        let mut acc = 0.0;
                        for inner in 0..k {
                            acc += $from($a[row * k + inner]) * $from($b[inner * n + col]);
                        }
                        out[row * n + col] = $into(acc);
                    }
                }
                Ok(CpuStorage::$variant(out))
            }};
        }

        let storage = lhs.with_storage(|a| {
            rhs.with_storage(|b| match (cpu(a), cpu(b)) {
                (CpuStorage::BF16(a), CpuStorage::BF16(b)) => {
                    matmul_arm!(a, b, bf16, BF16, |x| f64::from(x), |acc: f64| bf16::from_f64(acc))
                },
                (CpuStorage::F16(a), CpuStorage::F16(b)) => {
                    matmul_arm!(a, b, f16, F16, |x| f64::from(x), |acc: f64| f16::from_f64(acc))
                },
                (CpuStorage::F32(a), CpuStorage::F32(b)) => {
                    matmul_arm!(a, b, f32, F32, |x| f64::from(x), |acc: f64| acc as f32)
                },
                (CpuStorage::F64(a), CpuStorage::F64(b)) => {
                    matmul_arm!(a, b, f64, F64, |x: f64| x, |acc: f64| acc)
                },
                (a, b) if a.dtype() != b.dtype() => Err(GyeolError::DTypeConflictInOp {
                    left: a.dtype(),
                    right: b.dtype(),
                    op: "matmul".to_string(),
                }),
                (a, _) => Err(GyeolError::UnsupportedDTypeForOp {
                    dtype: a.dtype(),
                    op: "matmul".to_string(),
                }),
            })
        })?;
        Ok(self.wrap(storage, &[m, n]))
    }

    fn transpose2d(&self, input: &Array) -> GyeolResult<Array> {
        let shape = input.shape().to_vec();
        if shape.len() != 2 {
            return Err(GyeolError::InternalError(format!(
                "transpose2d expects a 2-D array, got shape {shape:?}"
            )));
        }
        let (rows, cols) = (shape[0], shape[1]);

        macro_rules! transpose_arm {
            ($data:expr, $variant:ident) => {{
                let mut out = $data.clone();
                for row in 0..rows {
                    for col in 0..cols {
                        out[col * rows + row] = $data[row * cols + col];
                    }
                }
                Ok(CpuStorage::$variant(out))
            }};
        }

        let storage = input.with_storage(|s| match cpu(s) {
            CpuStorage::BOOL(v) => transpose_arm!(v, BOOL),
            CpuStorage::BF16(v) => transpose_arm!(v, BF16),
            CpuStorage::F16(v) => transpose_arm!(v, F16),
            CpuStorage::F32(v) => transpose_arm!(v, F32),
            CpuStorage::F64(v) => transpose_arm!(v, F64),
            CpuStorage::U8(v) => transpose_arm!(v, U8),
            CpuStorage::U32(v) => transpose_arm!(v, U32),
            CpuStorage::I32(v) => transpose_arm!(v, I32),
            CpuStorage::I64(v) => transpose_arm!(v, I64),
        })?;
        Ok(self.wrap(storage, &[cols, rows]))
    }

    fn reduce_sum(&self, input: &Array) -> GyeolResult<Array> {
        let storage = input.with_storage(|s| cpu(s).reduce_sum())?;
        Ok(self.wrap(storage, &[]))
    }

    fn broadcast_to(&self, input: &Array, shape: &[usize]) -> GyeolResult<Array> {
        let layout = input.layout().clone();
        let storage = input.with_storage(|s| cpu(s).gather_broadcast(&layout, shape))?;
        Ok(self.wrap(storage, shape))
    }

    fn to_f64_vec(&self, input: &Array) -> GyeolResult<Vec<f64>> {
        input.with_storage(|s| Ok(cpu(s).to_f64_vec()))
    }

    fn has_non_finite(&self, input: &Array) -> GyeolResult<bool> {
        input.with_storage(|s| Ok(cpu(s).has_non_finite()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::get_backend;

    #[test]
    fn binary_add_f32() {
        let backend = get_backend(Device::CPU).unwrap();
        let lhs = Array::from_f32_slice(&[1.0, 2.0, 3.0], &[3]).unwrap();
        let rhs = Array::from_f32_slice(&[10.0, 20.0, 30.0], &[3]).unwrap();
        let out = backend.binary(BinaryOp::Add, &lhs, &rhs).unwrap();
        assert_eq!(out.to_f32_vec().unwrap(), vec![11.0, 22.0, 33.0]);
    }

    #[test]
    fn binary_with_aliased_operand() {
        let backend = get_backend(Device::CPU).unwrap();
        let x = Array::from_f32_slice(&[2.0, 3.0], &[2]).unwrap();
        let out = backend.binary(BinaryOp::Mul, &x, &x).unwrap();
        assert_eq!(out.to_f32_vec().unwrap(), vec![4.0, 9.0]);
    }

    #[test]
    fn copy_to_preserves_identity() {
        let backend = get_backend(Device::CPU).unwrap();
        let dst = Array::zeros(&[2], DType::F32).unwrap();
        let src = Array::from_f32_slice(&[5.0, 6.0], &[2]).unwrap();
        let id_before = dst.ptr_id();
        backend.copy_to(&dst, &src).unwrap();
        assert_eq!(dst.ptr_id(), id_before);
        assert_eq!(dst.to_f32_vec().unwrap(), vec![5.0, 6.0]);
    }

    #[test]
    fn matmul_2x2() {
        let backend = get_backend(Device::CPU).unwrap();
        let lhs = Array::from_f32_slice(&[1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
        let rhs = Array::from_f32_slice(&[5.0, 6.0, 7.0, 8.0], &[2, 2]).unwrap();
        let out = backend.matmul(&lhs, &rhs).unwrap();
        assert_eq!(out.shape(), &[2, 2]);
        assert_eq!(out.to_f32_vec().unwrap(), vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn broadcast_materializes() {
        let backend = get_backend(Device::CPU).unwrap();
        let x = Array::from_f32_slice(&[1.0, 2.0], &[2]).unwrap();
        let out = backend.broadcast_to(&x, &[3, 2]).unwrap();
        assert_eq!(out.to_f32_vec().unwrap(), vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn reduce_sum_to_scalar() {
        let backend = get_backend(Device::CPU).unwrap();
        let x = Array::from_f32_slice(&[1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
        let out = backend.reduce_sum(&x).unwrap();
        assert_eq!(out.ndim(), 0);
        assert_eq!(out.item().unwrap(), 10.0);
    }
}
