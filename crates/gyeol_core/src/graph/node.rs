use super::{registry, OpNodeId, ValueId};
use crate::{
    array::{Array, ArrayDesc},
    compat::*,
    error::{GyeolError, GyeolResult},
    ops::Operator,
    scalar::Scalar,
    types::{DType, Device},
};
use smallvec::SmallVec;

/// Registry entry of one value node.
///
/// Strong holders of a value node: user `Value` handles, the input edges of
/// consuming operation nodes, and the grad edge of the value it is the
/// gradient of. Operation nodes reference their own outputs only weakly.
pub(crate) struct Value_ {
    pub(crate) array: Option<Array>,
    pub(crate) grad: Option<ValueId>,
    pub(crate) creator: Option<OpNodeId>,
    pub(crate) rank: usize,
    pub(crate) requires_grad: bool,
    pub(crate) ref_count: AtomicUsize,
}

/// Registry entry of one applied operation.
///
/// `inputs` are strong references (the backward formula may need them);
/// `outputs` are weak: plain ids whose liveness is checked against the
/// registry on resolve, so intermediates die as soon as user code drops
/// them. Retained outputs additionally pin their concrete arrays here,
/// which keeps the buffer identity without a strong value/op cycle.
pub(crate) struct OpNode_ {
    pub(crate) op: Arc<dyn Operator>,
    pub(crate) inputs: Vec<ValueId>,
    pub(crate) outputs: Vec<ValueId>,
    pub(crate) rank: usize,
    pub(crate) retained_inputs: SmallVec<[usize; 2]>,
    pub(crate) retained_outputs: SmallVec<[usize; 2]>,
    pub(crate) retained_output_arrays: SmallVec<[(usize, Array); 2]>,
    pub(crate) input_descs: Vec<ArrayDesc>,
    pub(crate) output_descs: Vec<ArrayDesc>,
    pub(crate) ref_count: AtomicUsize,
}

// ===== reference-count plumbing =====

pub(crate) fn inc_value(value_id: ValueId) {
    registry::with_value(value_id, |v| {
        v.ref_count.fetch_add(1, Ordering::Relaxed);
    });
}

pub(crate) fn inc_op(op_id: OpNodeId) {
    registry::with_op(op_id, |o| {
        o.ref_count.fetch_add(1, Ordering::Relaxed);
    });
}

/// Decrements and reports whether the node reached zero holders.
fn dec_value(value_id: ValueId) -> bool {
    registry::with_value(value_id, |v| {
        let prev_count = v.ref_count.load(Ordering::Relaxed);
        if prev_count > 0 {
            v.ref_count.fetch_sub(1, Ordering::Relaxed);
        }
        prev_count <= 1
    })
    .unwrap_or(false)
}

fn dec_op(op_id: OpNodeId) -> bool {
    registry::with_op(op_id, |o| {
        let prev_count = o.ref_count.load(Ordering::Relaxed);
        if prev_count > 0 {
            o.ref_count.fetch_sub(1, Ordering::Relaxed);
        }
        prev_count <= 1
    })
    .unwrap_or(false)
}

enum Release {
    Value(ValueId),
    Op(OpNodeId),
}

/// Iterative teardown. Long creator chains would overflow the stack if
/// destruction recursed, so dead nodes go through one worklist.
fn release(start: Release) {
    let mut work = VecDeque::new();
    work.push_back(start);

    while let Some(item) = work.pop_front() {
        match item {
            Release::Value(value_id) => {
                if let Some(value_) = registry::take_value(value_id) {
                    if let Some(op_id) = value_.creator {
                        if dec_op(op_id) {
                            work.push_back(Release::Op(op_id));
                        }
                    }
                    if let Some(grad_id) = value_.grad {
                        if dec_value(grad_id) {
                            work.push_back(Release::Value(grad_id));
                        }
                    }
                }
            },
            Release::Op(op_id) => {
                if let Some(op_) = registry::take_op(op_id) {
                    for input_id in op_.inputs {
                        if dec_value(input_id) {
                            work.push_back(Release::Value(input_id));
                        }
                    }
                }
            },
        }
    }
}

pub(crate) fn unref_value(value_id: ValueId) {
    if dec_value(value_id) {
        release(Release::Value(value_id));
    }
}

pub(crate) fn unref_op(op_id: OpNodeId) {
    if dec_op(op_id) {
        release(Release::Op(op_id));
    }
}

/// New handle over an existing node; bumps the holder count.
pub(crate) fn value_from_id(value_id: ValueId) -> Value {
    inc_value(value_id);
    Value(value_id)
}

/// Weak-reference resolve: a handle if the node is still live.
pub(crate) fn resolve_value(value_id: ValueId) -> Option<Value> {
    if registry::value_exists(value_id) {
        Some(value_from_id(value_id))
    } else {
        None
    }
}

pub(crate) fn set_grad_edge(value_id: ValueId, grad_id: ValueId) -> GyeolResult<()> {
    if !registry::value_exists(grad_id) {
        return Err(GyeolError::ValueNotFound(grad_id));
    }
    inc_value(grad_id);

    let old_grad = registry::with_value_mut(value_id, |v| core::mem::replace(&mut v.grad, Some(grad_id)));
    match old_grad {
        Some(old) => {
            if let Some(old_id) = old {
                unref_value(old_id);
            }
            Ok(())
        },
        None => {
            unref_value(grad_id);
            Err(GyeolError::ValueNotFound(value_id))
        },
    }
}

// ===== the user-facing handle =====

/// Handle over one value node of the computation graph.
///
/// Wraps an array, its accumulated gradient and a back-reference to the
/// operation node that produced it. Cloning a handle bumps the node's
/// holder count; dropping the last strong holder tears the node down along
/// with any subgraph nothing else keeps alive.
#[repr(transparent)]
pub struct Value(pub(crate) ValueId);

impl AsRef<Value> for Value {
    fn as_ref(&self) -> &Value {
        self
    }
}

impl Clone for Value {
    fn clone(&self) -> Self {
        inc_value(self.0);
        Value(self.0)
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        unref_value(self.0);
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let detail = registry::with_value(self.0, |v| {
            (v.rank, v.requires_grad, v.array.as_ref().map(|a| a.desc()))
        });
        match detail {
            Some((rank, requires_grad, desc)) => {
                write!(f, "Value({:?}, rank={rank}, requires_grad={requires_grad}, {desc:?})", self.0)
            },
            None => write!(f, "Value({:?}, dead)", self.0),
        }
    }
}

impl Value {
    /// Creates a graph root (leaf) wrapping an existing array.
    pub fn new(array: Array) -> Self {
        Self::from_array(array, false)
    }

    pub(crate) fn from_array(array: Array, requires_grad: bool) -> Self {
        let value_ = Value_ {
            array: Some(array),
            grad: None,
            creator: None,
            rank: 0,
            requires_grad,
            ref_count: AtomicUsize::new(1),
        };
        let value_id = ValueId::new();
        registry::insert_value(value_id, value_);
        Value(value_id)
    }

    pub fn from_f32_slice(data: &[f32], shape: &[usize]) -> GyeolResult<Self> {
        Ok(Self::new(Array::from_f32_slice(data, shape)?))
    }

    pub fn from_f64_slice(data: &[f64], shape: &[usize], dtype: DType) -> GyeolResult<Self> {
        Ok(Self::new(Array::from_f64_slice(data, shape, dtype)?))
    }

    pub fn scalar(value: impl Into<Scalar>) -> GyeolResult<Self> {
        Ok(Self::new(Array::scalar(value)?))
    }

    pub fn zeros(shape: &[usize], dtype: DType) -> GyeolResult<Self> {
        Ok(Self::new(Array::zeros(shape, dtype)?))
    }

    pub fn ones(shape: &[usize], dtype: DType) -> GyeolResult<Self> {
        Ok(Self::new(Array::ones(shape, dtype)?))
    }

    #[inline]
    pub fn id(&self) -> ValueId {
        self.0
    }

    pub fn array(&self) -> GyeolResult<Array> {
        registry::with_value(self.0, |v| v.array.clone())
            .ok_or(GyeolError::ValueNotFound(self.0))?
            .ok_or(GyeolError::ArrayNotMaterialized(self.0))
    }

    pub fn desc(&self) -> GyeolResult<ArrayDesc> {
        Ok(self.array()?.desc())
    }

    pub fn shape(&self) -> GyeolResult<Vec<usize>> {
        Ok(self.array()?.shape().to_vec())
    }

    pub fn dtype(&self) -> GyeolResult<DType> {
        Ok(self.array()?.dtype())
    }

    pub fn device(&self) -> GyeolResult<Device> {
        Ok(self.array()?.device())
    }

    pub fn rank(&self) -> usize {
        registry::with_value(self.0, |v| v.rank).unwrap_or(0)
    }

    pub fn creator(&self) -> Option<OpNodeId> {
        registry::with_value(self.0, |v| v.creator).flatten()
    }

    pub fn is_leaf(&self) -> bool {
        self.creator().is_none()
    }

    pub fn is_requires_grad(&self) -> bool {
        registry::with_value(self.0, |v| v.requires_grad).unwrap_or(false)
    }

    pub fn set_requires_grad(&self, requires: bool) -> GyeolResult<()> {
        if requires && !self.dtype()?.is_float() {
            return Err(GyeolError::RequiresGradNotSet(self.0));
        }
        registry::with_value_mut(self.0, |v| v.requires_grad = requires).ok_or(GyeolError::ValueNotFound(self.0))
    }

    pub fn requires_grad(&self) -> GyeolResult<()> {
        self.set_requires_grad(true)
    }

    // ----- gradients -----

    pub fn grad(&self) -> GyeolResult<Value> {
        let grad_id = registry::with_value(self.0, |v| v.grad).ok_or(GyeolError::ValueNotFound(self.0))?;
        match grad_id {
            Some(grad_id) => Ok(value_from_id(grad_id)),
            None => Err(GyeolError::GradientNotComputed(self.0)),
        }
    }

    pub fn grad_array(&self) -> GyeolResult<Array> {
        self.grad()?.array()
    }

    /// Drops the accumulated gradient, if any. The next backward pass
    /// starts from scratch for this node.
    pub fn clear_grad(&self) {
        let old_grad = registry::with_value_mut(self.0, |v| v.grad.take()).flatten();
        if let Some(old_id) = old_grad {
            unref_value(old_id);
        }
    }

    /// Runs backward from this value down to every grad-requiring leaf,
    /// seeding with ones (the value must be scalar for the implicit seed).
    pub fn backward(&self) -> GyeolResult<()> {
        crate::gradient::backward_to_leaves(self, &crate::gradient::BackwardOptions::default())
    }

    /// Like [`Value::backward`] but with explicit options (e.g. building a
    /// differentiable gradient graph for double backward).
    pub fn backward_with(&self, opts: &crate::gradient::BackwardOptions) -> GyeolResult<()> {
        crate::gradient::backward_to_leaves(self, opts)
    }

    // ----- graph surgery -----

    /// Severs this value from its creator, pruning the graph upstream.
    /// A later backward pass treats it as a leaf. Idempotent.
    pub fn unchain(&self) {
        let creator = registry::with_value_mut(self.0, |v| v.creator.take()).flatten();
        if let Some(op_id) = creator {
            unref_op(op_id);
        }
    }

    /// Unchains this value and everything upstream of it.
    pub fn unchain_backward(&self) {
        let mut pending = vec![self.0];
        let mut seen = HashSet::new();

        while let Some(value_id) = pending.pop() {
            if !seen.insert(value_id) {
                continue;
            }
            let creator = registry::with_value(value_id, |v| v.creator).flatten();
            if let Some(op_id) = creator {
                let inputs = registry::with_op(op_id, |o| o.inputs.clone()).unwrap_or_default();
                pending.extend(inputs);
                // Sever after collecting inputs; the unchain may tear the
                // op node down and the ids above must be read first.
                let taken = registry::with_value_mut(value_id, |v| v.creator.take()).flatten();
                if let Some(op_id) = taken {
                    unref_op(op_id);
                }
            }
        }
    }

    // ----- readback conveniences -----

    pub fn to_f32_vec(&self) -> GyeolResult<Vec<f32>> {
        self.array()?.to_f32_vec()
    }

    pub fn to_f64_vec(&self) -> GyeolResult<Vec<f64>> {
        self.array()?.to_f64_vec()
    }

    pub fn item(&self) -> GyeolResult<f64> {
        self.array()?.item()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::registry;

    #[test]
    fn leaf_lifecycle() {
        let value = Value::from_f32_slice(&[1.0, 2.0], &[2]).unwrap();
        let id = value.id();
        assert!(registry::value_exists(id));
        assert!(value.is_leaf());
        assert_eq!(value.rank(), 0);

        let clone = value.clone();
        drop(value);
        assert!(registry::value_exists(id));
        drop(clone);
        assert!(!registry::value_exists(id));
    }

    #[test]
    fn requires_grad_rejects_non_float() {
        let value = Value::from_f64_slice(&[1.0, 2.0], &[2], DType::I32).unwrap();
        assert!(value.set_requires_grad(true).is_err());

        let float_value = Value::from_f32_slice(&[1.0], &[1]).unwrap();
        float_value.requires_grad().unwrap();
        assert!(float_value.is_requires_grad());
    }

    #[test]
    fn unchain_on_leaf_is_noop() {
        let value = Value::from_f32_slice(&[1.0], &[1]).unwrap();
        value.unchain();
        value.unchain();
        assert!(value.is_leaf());
    }
}
