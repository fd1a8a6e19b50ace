//! Patch embedding: non-overlapping `patch x patch` convolution

use super::init::{ParamInit, INIT_STD};
use super::{join, Parameterized};
use crate::autograd::linear;
use crate::Tensor;

/// Conv2d with kernel = stride = patch size, stored in PyTorch layout
pub struct PatchEmbed {
    /// Kernel (embed_dim x in_chans x patch x patch)
    pub weight: Tensor,
    /// Bias (embed_dim)
    pub bias: Tensor,
    img_size: usize,
    patch_size: usize,
    in_chans: usize,
}

impl PatchEmbed {
    /// Create a patch embedding for square `img_size` inputs
    pub fn new(
        img_size: usize,
        patch_size: usize,
        in_chans: usize,
        embed_dim: usize,
        init: &mut ParamInit,
    ) -> Self {
        Self {
            weight: init.trunc_normal(&[embed_dim, in_chans, patch_size, patch_size], INIT_STD),
            bias: init.zeros(&[embed_dim]),
            img_size,
            patch_size,
            in_chans,
        }
    }

    /// Patches per side
    pub fn grid_size(&self) -> usize {
        self.img_size / self.patch_size
    }

    /// Total patches
    pub fn num_patches(&self) -> usize {
        self.grid_size() * self.grid_size()
    }

    /// Rearrange `(batch, chans, H, W)` pixels into one row per patch,
    /// flattened in `(chan, ky, kx)` order to match the kernel layout.
    fn unfold(&self, images: &Tensor, batch: usize) -> Vec<f32> {
        let (p, c, side, grid) = (self.patch_size, self.in_chans, self.img_size, self.grid_size());
        let src = images.as_slice();
        let row_len = c * p * p;
        let mut out = vec![0.0f32; batch * grid * grid * row_len];

        for b in 0..batch {
            for gy in 0..grid {
                for gx in 0..grid {
                    let row = (b * grid + gy) * grid + gx;
                    let dst = &mut out[row * row_len..(row + 1) * row_len];
                    let mut k = 0;
                    for ch in 0..c {
                        for ky in 0..p {
                            let y = gy * p + ky;
                            let base = ((b * c + ch) * side + y) * side + gx * p;
                            dst[k..k + p].copy_from_slice(&src[base..base + p]);
                            k += p;
                        }
                    }
                }
            }
        }
        out
    }

    /// Embed `(batch, in_chans, img_size, img_size)` images into
    /// `(batch, num_patches, embed_dim)` tokens.
    ///
    /// # Panics
    /// Panics if the image geometry does not match the layer.
    pub fn forward(&self, images: &Tensor) -> Tensor {
        let batch = match images.shape() {
            [b, c, h, w] if *c == self.in_chans && *h == self.img_size && *w == self.img_size => *b,
            other => panic!(
                "patch_embed: expected (batch, {}, {}, {}), got {other:?}",
                self.in_chans, self.img_size, self.img_size
            ),
        };
        let embed_dim = self.weight.shape()[0];
        let row_len = self.in_chans * self.patch_size * self.patch_size;

        let patches = Tensor::from_shape_vec(
            &[batch * self.num_patches(), row_len],
            self.unfold(images, batch),
            false,
        );
        let kernel = self.weight.reshape(&[embed_dim, row_len]);
        linear(&patches, &kernel, Some(&self.bias)).reshape(&[batch, self.num_patches(), embed_dim])
    }
}

impl Parameterized for PatchEmbed {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        vec![
            (join(prefix, "proj.weight"), &self.weight),
            (join(prefix, "proj.bias"), &self.bias),
        ]
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        vec![
            (join(prefix, "proj.weight"), &mut self.weight),
            (join(prefix, "proj.bias"), &mut self.bias),
        ]
    }
}
