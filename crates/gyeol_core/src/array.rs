use crate::{
    backends::{self, Storage},
    compat::*,
    error::{GyeolError, GyeolResult},
    scalar::Scalar,
    types::{DType, Device, Layout},
};

/// Shape/dtype/device descriptor of an array, used for operator signature
/// checks before any computation runs.
#[derive(Clone, PartialEq, Eq)]
pub struct ArrayDesc {
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub device: Device,
}

impl fmt::Debug for ArrayDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{:?}@{:?}", self.dtype, self.shape, self.device)
    }
}

/// An opaque numeric buffer: shared storage plus layout, dtype and a
/// backend tag.
///
/// Cloning an `Array` clones the handle, not the buffer; two handles over
/// the same buffer compare equal under [`Array::same_storage`]. That
/// identity comparison and the shape/dtype queries are all the graph core
/// requires of an array. Everything numeric goes through the backend
/// selected by the device tag.
#[derive(Clone)]
pub struct Array {
    storage: Arc<RwLock<Storage>>,
    layout: Layout,
    dtype: DType,
    device: Device,
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array({:?}{:?}@{:?})", self.dtype, self.layout.shape(), self.device)
    }
}

impl Array {
    pub(crate) fn from_parts(storage: Storage, layout: Layout, device: Device) -> Self {
        let dtype = storage.dtype();
        Self {
            storage: Arc::new(RwLock::new(storage)),
            layout,
            dtype,
            device,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn desc(&self) -> ArrayDesc {
        ArrayDesc {
            shape: self.layout.shape().to_vec(),
            dtype: self.dtype,
            device: self.device,
        }
    }

    /// Stable identity of the underlying buffer, used for interning arrays
    /// into a schedule's unique-array table.
    pub fn ptr_id(&self) -> usize {
        Arc::as_ptr(&self.storage) as *const () as usize
    }

    /// Whether two handles share one concrete buffer.
    pub fn same_storage(lhs: &Self, rhs: &Self) -> bool {
        Arc::ptr_eq(&lhs.storage, &rhs.storage)
    }

    pub(crate) fn with_storage<R>(&self, f: impl FnOnce(&Storage) -> GyeolResult<R>) -> GyeolResult<R> {
        #[cfg(feature = "std")]
        {
            let guard = self
                .storage
                .read()
                .map_err(|_| GyeolError::InternalError("array storage lock poisoned".to_string()))?;
            f(&guard)
        }
        #[cfg(not(feature = "std"))]
        {
            let guard = self.storage.read();
            f(&guard)
        }
    }

    pub(crate) fn with_storage_mut<R>(&self, f: impl FnOnce(&mut Storage) -> GyeolResult<R>) -> GyeolResult<R> {
        #[cfg(feature = "std")]
        {
            let mut guard = self
                .storage
                .write()
                .map_err(|_| GyeolError::InternalError("array storage lock poisoned".to_string()))?;
            f(&mut guard)
        }
        #[cfg(not(feature = "std"))]
        {
            let mut guard = self.storage.write();
            f(&mut guard)
        }
    }

    // ===== creation =====

    pub fn from_f64_slice(data: &[f64], shape: &[usize], dtype: DType) -> GyeolResult<Self> {
        let backend = backends::get_backend(Device::CPU)?;
        backend.from_f64_slice(data, shape, dtype)
    }

    pub fn from_f32_slice(data: &[f32], shape: &[usize]) -> GyeolResult<Self> {
        let widened: Vec<f64> = data.iter().map(|&v| f64::from(v)).collect();
        Self::from_f64_slice(&widened, shape, DType::F32)
    }

    pub fn scalar(value: impl Into<Scalar>) -> GyeolResult<Self> {
        let value = value.into();
        Self::full(&[], value.dtype(), value)
    }

    pub fn zeros(shape: &[usize], dtype: DType) -> GyeolResult<Self> {
        Self::full(shape, dtype, Scalar::zero(dtype))
    }

    pub fn ones(shape: &[usize], dtype: DType) -> GyeolResult<Self> {
        Self::full(shape, dtype, Scalar::one(dtype))
    }

    pub fn full(shape: &[usize], dtype: DType, value: Scalar) -> GyeolResult<Self> {
        let backend = backends::get_backend(Device::CPU)?;
        backend.full(shape, dtype, value)
    }

    pub fn zeros_like(other: &Self) -> GyeolResult<Self> {
        let backend = backends::get_backend(other.device())?;
        backend.full(other.shape(), other.dtype(), Scalar::zero(other.dtype()))
    }

    pub fn ones_like(other: &Self) -> GyeolResult<Self> {
        let backend = backends::get_backend(other.device())?;
        backend.full(other.shape(), other.dtype(), Scalar::one(other.dtype()))
    }

    // ===== readback / copies =====

    /// A fresh buffer with identical contents; used when forking a built
    /// schedule for a concurrent training pass.
    pub fn deep_clone(&self) -> GyeolResult<Self> {
        let backend = backends::get_backend(self.device())?;
        backend.deep_clone(self)
    }

    pub fn to_f64_vec(&self) -> GyeolResult<Vec<f64>> {
        let backend = backends::get_backend(self.device())?;
        backend.to_f64_vec(self)
    }

    pub fn to_f32_vec(&self) -> GyeolResult<Vec<f32>> {
        Ok(self.to_f64_vec()?.into_iter().map(|v| v as f32).collect())
    }

    /// Single element readback for size-1 arrays.
    pub fn item(&self) -> GyeolResult<f64> {
        if self.size() != 1 {
            return Err(GyeolError::SizeMismatch {
                expected: 1,
                got: self.size(),
            });
        }
        Ok(self.to_f64_vec()?[0])
    }
}
