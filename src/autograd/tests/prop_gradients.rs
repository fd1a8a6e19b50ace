//! Property-based gradient checks against central finite differences

use super::test_utils::{finite_difference, readout_weights, weighted_sum};
use crate::autograd::{
    backward, gelu, layer_norm, linear, multi_head_attention, AttentionShape, Tensor,
};
use proptest::prelude::*;

fn assert_close(analytical: &[f32], numerical: &[f32], tol: f32) -> Result<(), TestCaseError> {
    for (i, (a, n)) in analytical.iter().zip(numerical).enumerate() {
        let diff = (a - n).abs();
        prop_assert!(
            diff < tol,
            "gradient mismatch at index {}: analytical={}, numerical={}, diff={}",
            i,
            a,
            n,
            diff
        );
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_gelu_gradient(x in prop::collection::vec(-4.0f32..4.0, 1..12)) {
        let a = Tensor::from_vec(x.clone(), true);
        let mut y = gelu(&a);
        let n = y.len();
        backward(&mut y, Some(readout_weights(n)));

        let analytical = a.grad().expect("gradient should be available");
        let numerical = finite_difference(
            |v| weighted_sum(gelu(&Tensor::from_vec(v.to_vec(), false)).as_slice()),
            &x,
            1e-3,
        );
        assert_close(analytical.as_slice().unwrap(), &numerical, 0.05)?;
    }

    #[test]
    fn prop_layer_norm_gradient_two_rows(
        x in prop::collection::vec(-3.0f32..3.0, 8),
        gamma in prop::collection::vec(0.5f32..1.5, 4),
    ) {
        let xt = Tensor::from_shape_vec(&[2, 4], x.clone(), true);
        let gt = Tensor::from_vec(gamma.clone(), true);
        let bt = Tensor::zeros(&[4], true);
        let mut y = layer_norm(&xt, &gt, &bt, 1e-5);
        backward(&mut y, Some(readout_weights(8)));

        let numerical_x = finite_difference(
            |v| {
                let t = Tensor::from_shape_vec(&[2, 4], v.to_vec(), false);
                let g = Tensor::from_vec(gamma.clone(), false);
                weighted_sum(layer_norm(&t, &g, &Tensor::zeros(&[4], false), 1e-5).as_slice())
            },
            &x,
            1e-3,
        );
        let numerical_gamma = finite_difference(
            |v| {
                let t = Tensor::from_shape_vec(&[2, 4], x.clone(), false);
                let g = Tensor::from_vec(v.to_vec(), false);
                weighted_sum(layer_norm(&t, &g, &Tensor::zeros(&[4], false), 1e-5).as_slice())
            },
            &gamma,
            1e-3,
        );

        assert_close(xt.grad().unwrap().as_slice().unwrap(), &numerical_x, 0.15)?;
        assert_close(gt.grad().unwrap().as_slice().unwrap(), &numerical_gamma, 0.05)?;
    }

    #[test]
    fn prop_linear_gradient(
        x in prop::collection::vec(-2.0f32..2.0, 6),
        w in prop::collection::vec(-2.0f32..2.0, 6),
    ) {
        // x: (2, 3), w: (2, 3)
        let xt = Tensor::from_shape_vec(&[2, 3], x.clone(), true);
        let wt = Tensor::from_shape_vec(&[2, 3], w.clone(), true);
        let mut y = linear(&xt, &wt, None);
        backward(&mut y, Some(readout_weights(4)));

        let numerical_x = finite_difference(
            |v| {
                let t = Tensor::from_shape_vec(&[2, 3], v.to_vec(), false);
                let wv = Tensor::from_shape_vec(&[2, 3], w.clone(), false);
                weighted_sum(linear(&t, &wv, None).as_slice())
            },
            &x,
            1e-2,
        );
        let numerical_w = finite_difference(
            |v| {
                let t = Tensor::from_shape_vec(&[2, 3], x.clone(), false);
                let wv = Tensor::from_shape_vec(&[2, 3], v.to_vec(), false);
                weighted_sum(linear(&t, &wv, None).as_slice())
            },
            &w,
            1e-2,
        );

        assert_close(xt.grad().unwrap().as_slice().unwrap(), &numerical_x, 0.05)?;
        assert_close(wt.grad().unwrap().as_slice().unwrap(), &numerical_w, 0.05)?;
    }

    #[test]
    fn prop_attention_gradient(qkv in prop::collection::vec(-1.0f32..1.0, 36)) {
        // batch 1, 3 tokens, 2 heads of width 1 => 3 * 3 * 2 = 18 per batch, 2 batches
        let shape = AttentionShape { batch: 2, seq_len: 3, num_heads: 2, head_dim: 1 };
        let t = Tensor::from_shape_vec(&[2, 3, 6], qkv.clone(), true);
        let mut y = multi_head_attention(&t, shape);
        let n = y.len();
        backward(&mut y, Some(readout_weights(n)));

        let numerical = finite_difference(
            |v| {
                let p = Tensor::from_shape_vec(&[2, 3, 6], v.to_vec(), false);
                weighted_sum(multi_head_attention(&p, shape).as_slice())
            },
            &qkv,
            1e-3,
        );
        assert_close(t.grad().unwrap().as_slice().unwrap(), &numerical, 0.05)?;
    }
}
