use crate::{
    compat::*,
    error::{GyeolError, GyeolResult},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", derive(bincode::Encode, bincode::Decode))]
pub struct Layout {
    shape: Vec<usize>,
    strides: Vec<usize>,
    offset: usize,
}

impl Layout {
    pub fn new(shape: &[usize], strides: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            strides: strides.to_vec(),
            offset: 0,
        }
    }

    pub fn from_shape(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            strides: Self::compute_strides(shape),
            offset: 0,
        }
    }

    pub fn scalar() -> Self {
        Self::from_shape(&[])
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn dim_size(&self, dim: usize) -> Option<usize> {
        self.shape.get(dim).copied()
    }

    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// A size-1 layout counts as scalar; seeds default to ones for these.
    pub fn is_scalar(&self) -> bool {
        self.size() == 1
    }

    pub fn is_contiguous(&self) -> bool {
        if self.ndim() == 0 {
            return true;
        }

        let mut expected_stride = 1;
        for i in (0..self.ndim()).rev() {
            if self.strides[i] != expected_stride {
                return false;
            }
            expected_stride *= self.shape[i];
        }

        true
    }

    pub(crate) fn compute_strides(shape: &[usize]) -> Vec<usize> {
        if shape.is_empty() {
            return vec![];
        }

        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len() - 1).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    pub fn broadcast_to(&self, target_shape: &[usize]) -> GyeolResult<Self> {
        let shape = self.shape();

        if shape.len() > target_shape.len() {
            return Err(GyeolError::IncompatibleShapes {
                lhs: shape.to_vec(),
                rhs: target_shape.to_vec(),
                op: "broadcast".to_string(),
            });
        }

        let rank_diff = target_shape.len() - shape.len();
        let mut padded_shape = vec![1; rank_diff];
        padded_shape.extend_from_slice(shape);

        let mut new_strides = vec![0; target_shape.len()];

        for i in 0..target_shape.len() {
            let src_dim = padded_shape[i];
            let tgt_dim = target_shape[i];

            if src_dim == tgt_dim {
                if i < rank_diff {
                    new_strides[i] = 0;
                } else {
                    new_strides[i] = self.strides[i - rank_diff];
                }
            } else if src_dim == 1 {
                new_strides[i] = 0;
            } else {
                return Err(GyeolError::IncompatibleShapes {
                    lhs: shape.to_vec(),
                    rhs: target_shape.to_vec(),
                    op: format!("broadcast at dimension {}", i),
                });
            }
        }

        Ok(Self {
            shape: target_shape.to_vec(),
            strides: new_strides,
            offset: self.offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_strides() {
        let layout = Layout::from_shape(&[2, 3, 4]);
        assert_eq!(layout.strides(), &[12, 4, 1]);
        assert!(layout.is_contiguous());
    }

    #[test]
    fn scalar_layout() {
        let layout = Layout::scalar();
        assert_eq!(layout.ndim(), 0);
        assert_eq!(layout.size(), 1);
        assert!(layout.is_scalar());
    }

    #[test]
    fn broadcast_strides_are_zeroed() {
        let layout = Layout::from_shape(&[3, 1]);
        let broadcast = layout.broadcast_to(&[2, 3, 4]).unwrap();
        assert_eq!(broadcast.shape(), &[2, 3, 4]);
        assert_eq!(broadcast.strides(), &[0, 1, 0]);
    }

    #[test]
    fn broadcast_rejects_mismatched_dim() {
        let layout = Layout::from_shape(&[3]);
        assert!(layout.broadcast_to(&[4]).is_err());
    }
}
