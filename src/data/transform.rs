//! Image preprocessing: resize, crop, flip, normalize

use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use rand::rngs::StdRng;
use rand::Rng;

/// ImageNet channel means
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Preprocessing pipeline for one split
///
/// Train: resize to `input_size`, random horizontal flip.
/// Eval: resize the shorter side to `input_size / crop_ratio`, then
/// center-crop `input_size`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub input_size: usize,
    pub crop_ratio: f32,
    pub train: bool,
}

impl Transform {
    pub fn new(input_size: usize, crop_ratio: f32, train: bool) -> Self {
        Self {
            input_size,
            crop_ratio,
            train,
        }
    }

    /// Preprocess `img` into normalized channel-major pixels
    pub fn apply(&self, img: &DynamicImage, rng: &mut StdRng) -> Vec<f32> {
        let size = self.input_size as u32;
        let rgb = if self.train {
            let resized = img.resize_exact(size, size, FilterType::CatmullRom).to_rgb8();
            if rng.gen_bool(0.5) {
                image::imageops::flip_horizontal(&resized)
            } else {
                resized
            }
        } else {
            self.resize_and_crop(img)
        };
        normalize(&rgb)
    }

    fn resize_and_crop(&self, img: &DynamicImage) -> RgbImage {
        let size = self.input_size as u32;
        let short = (self.input_size as f32 / self.crop_ratio).floor().max(size as f32) as u32;
        let (w, h) = (img.width().max(1), img.height().max(1));
        let (rw, rh) = if w <= h {
            (short, ((h as u64 * short as u64) / w as u64).max(size as u64) as u32)
        } else {
            (((w as u64 * short as u64) / h as u64).max(size as u64) as u32, short)
        };
        let resized = img.resize_exact(rw, rh, FilterType::CatmullRom);
        let left = (rw - size) / 2;
        let top = (rh - size) / 2;
        resized.crop_imm(left, top, size, size).to_rgb8()
    }
}

/// Convert an RGB image to channel-major floats with ImageNet normalization
pub fn normalize(rgb: &RgbImage) -> Vec<f32> {
    let plane = (rgb.width() * rgb.height()) as usize;
    let mut out = vec![0.0; 3 * plane];
    for (i, px) in rgb.pixels().enumerate() {
        for c in 0..3 {
            out[c * plane + i] = (px[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    out
}
