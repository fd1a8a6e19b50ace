//! Unit tests for autograd operations (forward and backward)

use crate::autograd::{
    add, add_broadcast, backward, gelu, layer_norm, linear, mean, mul_mask, multi_head_attention,
    narrow_tokens, pad_tokens, prepend_tokens, scale, transpose_tokens, AttentionShape, Tensor,
};
use approx::assert_abs_diff_eq;
use ndarray::arr1;

#[test]
fn test_tensor_grad_accumulation() {
    let t = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);

    t.accumulate_grad(arr1(&[1.0, 1.0, 1.0]));
    t.accumulate_grad(arr1(&[1.0, 1.0, 1.0]));
    let grad = t.grad().expect("gradient should be available");
    assert_eq!(grad[0], 2.0);
}

#[test]
fn test_add_forward_backward() {
    let a = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
    let b = Tensor::from_vec(vec![4.0, 5.0, 6.0], true);
    let mut c = add(&a, &b);

    assert_abs_diff_eq!(c.data()[1], 7.0);

    backward(&mut c, Some(arr1(&[1.0, 2.0, 3.0])));
    assert_eq!(a.grad().unwrap().to_vec(), vec![1.0, 2.0, 3.0]);
    assert_eq!(b.grad().unwrap().to_vec(), vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_shared_input_gets_summed_gradient() {
    // y = x + 2x, every path reaches x once per use
    let x = Tensor::from_vec(vec![1.0, -1.0], true);
    let doubled = scale(&x, 2.0);
    let mut y = add(&x, &doubled);

    backward(&mut y, None);
    assert_eq!(x.grad().unwrap().to_vec(), vec![3.0, 3.0]);
}

#[test]
fn test_diamond_graph_runs_each_op_once() {
    // h = 3x used twice: y = h + h, dy/dx = 6
    let x = Tensor::from_vec(vec![0.5], true);
    let h = scale(&x, 3.0);
    let mut y = add(&h, &h);

    backward(&mut y, None);
    assert_abs_diff_eq!(x.grad().unwrap()[0], 6.0);
}

#[test]
fn test_frozen_input_gets_no_grad() {
    let a = Tensor::from_vec(vec![1.0], true);
    let b = Tensor::from_vec(vec![2.0], false);
    let mut c = add(&a, &b);

    backward(&mut c, None);
    assert!(a.grad().is_some());
    assert!(b.grad().is_none());
}

#[test]
fn test_add_broadcast_sums_bias_grad() {
    let x = Tensor::from_shape_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0], true);
    let bias = Tensor::from_vec(vec![10.0, 20.0], true);
    let mut y = add_broadcast(&x, &bias);

    assert_eq!(y.data().to_vec(), vec![11.0, 22.0, 13.0, 24.0]);
    assert_eq!(y.shape(), &[2, 2]);

    backward(&mut y, None);
    assert_eq!(bias.grad().unwrap().to_vec(), vec![2.0, 2.0]);
}

#[test]
fn test_mean_backward() {
    let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 6.0], true);
    let mut m = mean(&a);

    assert_abs_diff_eq!(m.data()[0], 3.0);
    backward(&mut m, None);
    assert_abs_diff_eq!(a.grad().unwrap()[2], 0.25);
}

#[test]
fn test_mul_mask_zeroes_gradient() {
    let a = Tensor::from_vec(vec![1.0, 2.0], true);
    let mut y = mul_mask(&a, &arr1(&[0.0, 2.0]));

    assert_eq!(y.data().to_vec(), vec![0.0, 4.0]);
    backward(&mut y, None);
    assert_eq!(a.grad().unwrap().to_vec(), vec![0.0, 2.0]);
}

#[test]
fn test_linear_forward() {
    // Two rows, in = 2, out = 3, PyTorch weight layout
    let x = Tensor::from_shape_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0], false);
    let w = Tensor::from_shape_vec(&[3, 2], vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], false);
    let b = Tensor::from_vec(vec![0.5, 0.5, 0.5], false);
    let y = linear(&x, &w, Some(&b));

    assert_eq!(y.shape(), &[2, 3]);
    assert_eq!(y.data().to_vec(), vec![1.5, 2.5, 3.5, 3.5, 4.5, 7.5]);
}

#[test]
fn test_linear_backward() {
    let x = Tensor::from_shape_vec(&[1, 2], vec![1.0, 2.0], true);
    let w = Tensor::from_shape_vec(&[1, 2], vec![3.0, 4.0], true);
    let b = Tensor::from_vec(vec![0.0], true);
    let mut y = linear(&x, &w, Some(&b));

    backward(&mut y, None);
    assert_eq!(x.grad().unwrap().to_vec(), vec![3.0, 4.0]);
    assert_eq!(w.grad().unwrap().to_vec(), vec![1.0, 2.0]);
    assert_eq!(b.grad().unwrap().to_vec(), vec![1.0]);
}

#[test]
fn test_gelu_known_values() {
    let a = Tensor::from_vec(vec![0.0, 1.0, -1.0], false);
    let y = gelu(&a);

    assert_abs_diff_eq!(y.data()[0], 0.0);
    assert_abs_diff_eq!(y.data()[1], 0.841_192, epsilon = 1e-4);
    assert_abs_diff_eq!(y.data()[2], -0.158_808, epsilon = 1e-4);
}

#[test]
fn test_layer_norm_rows_are_normalized() {
    let x = Tensor::from_shape_vec(&[2, 3], vec![1.0, 2.0, 3.0, 10.0, 10.0, 40.0], false);
    let gamma = Tensor::ones(&[3], false);
    let beta = Tensor::zeros(&[3], false);
    let y = layer_norm(&x, &gamma, &beta, 1e-6);

    assert_eq!(y.shape(), &[2, 3]);
    for row in y.data().as_slice().unwrap().chunks(3) {
        let m: f32 = row.iter().sum::<f32>() / 3.0;
        let v: f32 = row.iter().map(|r| (r - m).powi(2)).sum::<f32>() / 3.0;
        assert_abs_diff_eq!(m, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(v, 1.0, epsilon = 1e-3);
    }
}

#[test]
fn test_attention_with_zero_queries_averages_values() {
    // batch 1, 2 tokens, 1 head of width 2; q = k = 0 gives uniform weights
    let shape = AttentionShape {
        batch: 1,
        seq_len: 2,
        num_heads: 1,
        head_dim: 2,
    };
    #[rustfmt::skip]
    let qkv = Tensor::from_shape_vec(&[1, 2, 6], vec![
        0.0, 0.0, 0.0, 0.0, 1.0, 2.0,
        0.0, 0.0, 0.0, 0.0, 3.0, 6.0,
    ], false);
    let out = multi_head_attention(&qkv, shape);

    assert_eq!(out.shape(), &[1, 2, 2]);
    assert_eq!(out.data().to_vec(), vec![2.0, 4.0, 2.0, 4.0]);
}

#[test]
fn test_attention_heads_are_independent() {
    // Two heads of width 1; head outputs land in their own channel
    let shape = AttentionShape {
        batch: 1,
        seq_len: 1,
        num_heads: 2,
        head_dim: 1,
    };
    let qkv = Tensor::from_shape_vec(&[1, 1, 6], vec![1.0, 2.0, 3.0, 4.0, 5.0, 7.0], false);
    let out = multi_head_attention(&qkv, shape);

    // Single token: softmax is 1, output equals v
    assert_eq!(out.data().to_vec(), vec![5.0, 7.0]);
}

#[test]
fn test_attention_width_one_heads_over_several_tokens() {
    // head_dim 1 makes Q·Kᵀ an outer product; q = 0 keeps the weights uniform
    let shape = AttentionShape {
        batch: 1,
        seq_len: 3,
        num_heads: 2,
        head_dim: 1,
    };
    #[rustfmt::skip]
    let qkv = Tensor::from_shape_vec(&[1, 3, 6], vec![
        0.0, 0.0, 1.0, -1.0, 1.0, 4.0,
        0.0, 0.0, 2.0, 0.5, 2.0, 5.0,
        0.0, 0.0, -3.0, 2.0, 3.0, 6.0,
    ], true);
    let mut out = multi_head_attention(&qkv, shape);

    assert_eq!(out.shape(), &[1, 3, 2]);
    for pair in out.data().to_vec().chunks(2) {
        assert_abs_diff_eq!(pair[0], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(pair[1], 5.0, epsilon = 1e-6);
    }

    backward(&mut out, None);
    let grad = qkv.grad().expect("gradient should be available");
    // Uniform weights: each v entry feeds three outputs with weight 1/3
    for token in grad.to_vec().chunks(6) {
        assert_abs_diff_eq!(token[4], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(token[5], 1.0, epsilon = 1e-5);
    }
}

#[test]
fn test_prepend_tokens_forward_backward() {
    let x = Tensor::from_shape_vec(&[2, 1, 2], vec![1.0, 2.0, 3.0, 4.0], true);
    let cls = Tensor::from_shape_vec(&[1, 1, 2], vec![9.0, 8.0], true);
    let mut y = prepend_tokens(&x, &[&cls]);

    assert_eq!(y.shape(), &[2, 2, 2]);
    assert_eq!(
        y.data().to_vec(),
        vec![9.0, 8.0, 1.0, 2.0, 9.0, 8.0, 3.0, 4.0]
    );

    backward(&mut y, None);
    // Class token is shared by both samples
    assert_eq!(cls.grad().unwrap().to_vec(), vec![2.0, 2.0]);
    assert_eq!(x.grad().unwrap().to_vec(), vec![1.0; 4]);
}

#[test]
fn test_narrow_then_pad_restores_positions() {
    let x = Tensor::from_shape_vec(&[1, 3, 1], vec![1.0, 2.0, 3.0], true);
    let tail = narrow_tokens(&x, 1, 2);
    assert_eq!(tail.data().to_vec(), vec![2.0, 3.0]);

    let mut padded = pad_tokens(&tail, 1);
    assert_eq!(padded.data().to_vec(), vec![0.0, 2.0, 3.0]);

    backward(&mut padded, None);
    assert_eq!(x.grad().unwrap().to_vec(), vec![0.0, 1.0, 1.0]);
}

#[test]
fn test_transpose_tokens() {
    let x = Tensor::from_shape_vec(&[1, 2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], true);
    let mut t = transpose_tokens(&x);

    assert_eq!(t.shape(), &[1, 3, 2]);
    assert_eq!(t.data().to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

    backward(&mut t, Some(arr1(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])));
    assert_eq!(
        x.grad().unwrap().to_vec(),
        vec![1.0, 3.0, 5.0, 2.0, 4.0, 6.0]
    );
}
