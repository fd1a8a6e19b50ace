//! Bicubic resampling of positional-embedding grids
//!
//! Matches PyTorch `interpolate(mode="bicubic", align_corners=False)`:
//! cubic convolution with A = -0.75, half-pixel centres and indices clamped
//! at the border.

use ndarray::{Array3, ArrayView3};

const CUBIC_A: f32 = -0.75;

fn cubic_near(x: f32) -> f32 {
    ((CUBIC_A + 2.0) * x - (CUBIC_A + 3.0)) * x * x + 1.0
}

fn cubic_far(x: f32) -> f32 {
    ((CUBIC_A * x - 5.0 * CUBIC_A) * x + 8.0 * CUBIC_A) * x - 4.0 * CUBIC_A
}

/// Weights for taps at offsets -1, 0, 1, 2 around the floor index
fn cubic_weights(t: f32) -> [f32; 4] {
    [
        cubic_far(t + 1.0),
        cubic_near(t),
        cubic_near(1.0 - t),
        cubic_far(2.0 - t),
    ]
}

/// Source floor index and tap weights for every output coordinate
fn axis_taps(in_size: usize, out_size: usize) -> Vec<(isize, [f32; 4])> {
    let scale = in_size as f32 / out_size as f32;
    (0..out_size)
        .map(|o| {
            let src = (o as f32 + 0.5) * scale - 0.5;
            let floor = src.floor();
            (floor as isize, cubic_weights(src - floor))
        })
        .collect()
}

fn clamp_index(i: isize, size: usize) -> usize {
    i.clamp(0, size as isize - 1) as usize
}

/// Resample a `(side, side, channels)` grid to `(new_side, new_side, channels)`
///
/// Equal sizes return an exact copy.
pub fn resize_bicubic(grid: ArrayView3<'_, f32>, new_side: usize) -> Array3<f32> {
    let (h, w, c) = grid.dim();
    if h == new_side && w == new_side {
        return grid.to_owned();
    }

    let ys = axis_taps(h, new_side);
    let xs = axis_taps(w, new_side);
    let mut out = Array3::<f32>::zeros((new_side, new_side, c));

    for (oy, (y0, wy)) in ys.iter().enumerate() {
        for (ox, (x0, wx)) in xs.iter().enumerate() {
            for (i, wyi) in wy.iter().enumerate() {
                let sy = clamp_index(y0 - 1 + i as isize, h);
                for (j, wxj) in wx.iter().enumerate() {
                    let sx = clamp_index(x0 - 1 + j as isize, w);
                    let weight = wyi * wxj;
                    for ch in 0..c {
                        out[[oy, ox, ch]] += weight * grid[[sy, sx, ch]];
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_weights_sum_to_one() {
        for t in [0.0, 0.25, 0.5, 0.9] {
            assert_abs_diff_eq!(cubic_weights(t).iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        }
        assert_eq!(cubic_weights(0.0), [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_same_size_is_identity() {
        let grid = Array3::from_shape_fn((3, 3, 2), |(y, x, c)| (y * 7 + x * 3 + c) as f32 * 0.1);
        assert_eq!(resize_bicubic(grid.view(), 3), grid);
    }

    #[test]
    fn test_constant_grid_stays_constant() {
        let grid = Array3::from_elem((4, 4, 3), 0.7f32);
        let out = resize_bicubic(grid.view(), 6);
        assert_eq!(out.dim(), (6, 6, 3));
        for v in out.iter() {
            assert_abs_diff_eq!(*v, 0.7, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_upsample_2x_matches_torch() {
        // torch.nn.functional.interpolate(torch.tensor([[[[0.,1.],[2.,3.]]]]),
        //     size=(4,4), mode="bicubic", align_corners=False)[0,0,0]
        let grid = Array3::from_shape_vec((2, 2, 1), vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let out = resize_bicubic(grid.view(), 4);
        let row0: Vec<f32> = (0..4).map(|x| out[[0, x, 0]]).collect();
        let expected = [-0.316_406_25f32, 0.015_625, 0.5625, 0.894_531_25];
        for (a, e) in row0.iter().zip(expected) {
            assert_abs_diff_eq!(*a, e, epsilon = 1e-5);
        }
    }
}
