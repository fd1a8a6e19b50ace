//! Tensor type with gradient tracking

use super::BackwardOp;
use ndarray::Array1;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Shared gradient slot. Clones of a tensor share it, so gradients computed on
/// a clone captured by a backward op land on the original parameter.
pub type GradCell = Rc<RefCell<Option<Array1<f32>>>>;

/// Flat f32 tensor with a logical shape.
///
/// Data is stored row-major in a contiguous `Array1`. Cloning is cheap: the
/// buffer is reference counted and copied on first write.
#[derive(Clone)]
pub struct Tensor {
    id: u64,
    data: Rc<Array1<f32>>,
    shape: Vec<usize>,
    requires_grad: bool,
    grad: GradCell,
    backward_op: Option<Rc<dyn BackwardOp>>,
}

impl Tensor {
    /// Create a 1-D tensor from an array
    pub fn new(data: Array1<f32>, requires_grad: bool) -> Self {
        let shape = vec![data.len()];
        Self {
            id: next_id(),
            data: Rc::new(data),
            shape,
            requires_grad,
            grad: Rc::new(RefCell::new(None)),
            backward_op: None,
        }
    }

    /// Create a 1-D tensor from a vector
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        Self::new(Array1::from(data), requires_grad)
    }

    /// Create a tensor with an explicit shape.
    ///
    /// # Panics
    /// Panics if the shape does not cover exactly `data.len()` elements.
    pub fn from_shape_vec(shape: &[usize], data: Vec<f32>, requires_grad: bool) -> Self {
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {shape:?} does not match {} elements",
            data.len()
        );
        let mut t = Self::from_vec(data, requires_grad);
        t.shape = shape.to_vec();
        t
    }

    /// Tensor of zeros
    pub fn zeros(shape: &[usize], requires_grad: bool) -> Self {
        let n = shape.iter().product();
        Self::from_shape_vec(shape, vec![0.0; n], requires_grad)
    }

    /// Tensor of ones
    pub fn ones(shape: &[usize], requires_grad: bool) -> Self {
        let n = shape.iter().product();
        Self::from_shape_vec(shape, vec![1.0; n], requires_grad)
    }

    /// Unique identity of this node in the graph (shared by clones)
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Flat data
    pub fn data(&self) -> &Array1<f32> {
        &self.data
    }

    /// Mutable flat data (copy-on-write if the buffer is shared)
    pub fn data_mut(&mut self) -> &mut Array1<f32> {
        Rc::make_mut(&mut self.data)
    }

    /// Flat data as a contiguous slice
    pub fn as_slice(&self) -> &[f32] {
        self.data
            .as_slice()
            .expect("tensor storage is always contiguous")
    }

    /// Logical shape
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tensor has no elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Same storage under a new shape; keeps the graph connection.
    ///
    /// # Panics
    /// Panics if the element count differs.
    pub fn reshape(&self, shape: &[usize]) -> Tensor {
        assert_eq!(
            shape.iter().product::<usize>(),
            self.len(),
            "cannot reshape {:?} into {shape:?}",
            self.shape
        );
        let mut t = self.clone();
        t.shape = shape.to_vec();
        t
    }

    /// Check if gradients are tracked
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Enable or disable gradient tracking
    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
    }

    /// Accumulated gradient, if any
    pub fn grad(&self) -> Option<Array1<f32>> {
        self.grad.borrow().clone()
    }

    /// Replace the gradient
    pub fn set_grad(&self, grad: Array1<f32>) {
        *self.grad.borrow_mut() = Some(grad);
    }

    /// Add to the gradient
    pub fn accumulate_grad(&self, grad: Array1<f32>) {
        let mut slot = self.grad.borrow_mut();
        match slot.as_mut() {
            Some(existing) => *existing += &grad,
            None => *slot = Some(grad),
        }
    }

    /// Clear the gradient
    pub fn zero_grad(&self) {
        *self.grad.borrow_mut() = None;
    }

    /// Handle to the gradient slot, for backward ops
    pub fn grad_cell(&self) -> GradCell {
        Rc::clone(&self.grad)
    }

    /// Backward op that produced this tensor
    pub fn backward_op(&self) -> Option<Rc<dyn BackwardOp>> {
        self.backward_op.clone()
    }

    /// Attach the backward op that produced this tensor
    pub fn set_backward_op(&mut self, op: Rc<dyn BackwardOp>) {
        self.backward_op = Some(op);
    }

    /// Copy of this tensor cut from the graph, with fresh gradient state
    pub fn detach(&self) -> Tensor {
        let mut t = Tensor::new((*self.data).clone(), false);
        t.shape = self.shape.clone();
        t
    }

    /// Copy values from `other` without touching graph or grad state.
    ///
    /// # Panics
    /// Panics if the element counts differ.
    pub fn copy_from(&mut self, other: &Tensor) {
        assert_eq!(self.len(), other.len(), "copy_from length mismatch");
        self.data_mut().assign(other.data());
        self.shape = other.shape.clone();
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("requires_grad", &self.requires_grad)
            .field("has_grad", &self.grad.borrow().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_grad_cell() {
        let a = Tensor::from_vec(vec![1.0, 2.0], true);
        let b = a.clone();
        b.accumulate_grad(ndarray::arr1(&[1.0, 1.0]));
        assert_eq!(a.grad().unwrap()[1], 1.0);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_data_mut_is_copy_on_write() {
        let a = Tensor::from_vec(vec![1.0, 2.0], false);
        let mut b = a.clone();
        b.data_mut()[0] = 5.0;
        assert_eq!(a.data()[0], 1.0);
        assert_eq!(b.data()[0], 5.0);
    }

    #[test]
    fn test_reshape_keeps_id() {
        let a = Tensor::from_shape_vec(&[2, 3], vec![0.0; 6], true);
        let b = a.reshape(&[3, 2]);
        assert_eq!(b.shape(), &[3, 2]);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    #[should_panic(expected = "does not match")]
    fn test_from_shape_vec_rejects_bad_shape() {
        let _ = Tensor::from_shape_vec(&[2, 2], vec![0.0; 3], false);
    }

    #[test]
    fn test_detach_drops_grad_tracking() {
        let a = Tensor::from_shape_vec(&[2], vec![1.0, 2.0], true);
        let d = a.detach();
        assert!(!d.requires_grad());
        assert_ne!(a.id(), d.id());
        assert_eq!(d.shape(), &[2]);
    }
}
