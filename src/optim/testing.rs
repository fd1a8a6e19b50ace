//! Convex toy problems shared by optimizer tests

use super::Optimizer;
use crate::Tensor;

/// Run `iterations` steps on f(x) = Σx² and return max |x| afterwards
pub fn descend_quadratic<O: Optimizer>(mut optimizer: O, iterations: usize) -> f32 {
    let mut x = Tensor::from_vec(vec![3.0, -2.0, 1.5, -2.5], true);
    for _ in 0..iterations {
        x.set_grad(x.data().mapv(|v| 2.0 * v));
        optimizer.step(&mut [&mut x]);
    }
    x.data().iter().fold(0.0f32, |acc, v| acc.max(v.abs()))
}

/// Whether f(x) = x² never rises by more than 1e-3 from x = 10
pub fn loss_never_increases<O: Optimizer>(mut optimizer: O, iterations: usize) -> bool {
    let mut x = Tensor::from_vec(vec![10.0], true);
    let mut prev = f32::INFINITY;
    for _ in 0..iterations {
        let v = x.data()[0];
        if v * v > prev + 1e-3 {
            return false;
        }
        prev = v * v;
        x.set_grad(ndarray::arr1(&[2.0 * v]));
        optimizer.step(&mut [&mut x]);
    }
    true
}
