//! Floating-point astronomical image container and resampling utilities
//!
//! Images are stored as `ndarray::Array3<f32>` in H×W×C layout with samples
//! normalized to `[0, 1]`. The core never mutates a caller-owned image in
//! place; every operation produces a new array.

use crate::error::{Result, SkyflatError};
use image::DynamicImage;
use ndarray::Array3;

/// A decoded astronomical image (mono or RGB) with float samples
#[derive(Debug, Clone)]
pub struct AstroImage {
    data: Array3<f32>,
}

impl AstroImage {
    /// Wrap an existing H×W×C array
    ///
    /// # Errors
    /// Returns `InvalidConfig` for empty arrays or unsupported channel counts.
    pub fn from_array(data: Array3<f32>) -> Result<Self> {
        let (h, w, c) = data.dim();
        if h == 0 || w == 0 {
            return Err(SkyflatError::invalid_config(
                "Image must have non-zero width and height",
            ));
        }
        if c != 1 && c != 3 {
            return Err(SkyflatError::invalid_config(format!(
                "Unsupported channel count: {c} (expected 1 or 3)"
            )));
        }
        Ok(Self { data })
    }

    /// Decode from a `DynamicImage`, normalizing samples to `[0, 1]`
    ///
    /// Grayscale inputs become single-channel arrays, everything else RGB.
    pub fn from_dynamic_image(image: &DynamicImage) -> Result<Self> {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let data = match image {
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageLuma16(_) => {
                let luma = image.to_luma32f();
                Array3::from_shape_fn((h, w, 1), |(y, x, _)| luma.get_pixel(x as u32, y as u32)[0])
            },
            _ => {
                let rgb = image.to_rgb32f();
                Array3::from_shape_fn((h, w, 3), |(y, x, c)| rgb.get_pixel(x as u32, y as u32)[c])
            },
        };
        Self::from_array(data)
    }

    /// Encode into a 16-bit `DynamicImage`, clamping samples to `[0, 1]`
    pub fn to_dynamic_image(&self) -> DynamicImage {
        let (h, w, c) = self.data.dim();
        let quantize = |v: f32| (v.clamp(0.0, 1.0) * f32::from(u16::MAX)).round() as u16;
        if c == 1 {
            let mut buf = image::ImageBuffer::<image::Luma<u16>, Vec<u16>>::new(w as u32, h as u32);
            for (x, y, px) in buf.enumerate_pixels_mut() {
                px.0 = [quantize(self.data[[y as usize, x as usize, 0]])];
            }
            DynamicImage::ImageLuma16(buf)
        } else {
            let mut buf = image::ImageBuffer::<image::Rgb<u16>, Vec<u16>>::new(w as u32, h as u32);
            for (x, y, px) in buf.enumerate_pixels_mut() {
                for ch in 0..3 {
                    px.0[ch] = quantize(self.data[[y as usize, x as usize, ch]]);
                }
            }
            DynamicImage::ImageRgb16(buf)
        }
    }

    /// Image height in pixels
    #[must_use]
    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    /// Image width in pixels
    #[must_use]
    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    /// Number of color channels (1 or 3)
    #[must_use]
    pub fn channels(&self) -> usize {
        self.data.dim().2
    }

    /// Spatial and channel shape as (height, width, channels)
    #[must_use]
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Borrow the underlying H×W×C array
    #[must_use]
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Consume and return the underlying array
    #[must_use]
    pub fn into_array(self) -> Array3<f32> {
        self.data
    }

    /// Mean over all samples and channels
    #[must_use]
    pub fn mean(&self) -> f32 {
        self.data.mean().unwrap_or(0.0)
    }

    /// Per-pixel channel average, used for luminance statistics
    #[must_use]
    pub fn luminance(&self) -> ndarray::Array2<f32> {
        let (h, w, c) = self.data.dim();
        ndarray::Array2::from_shape_fn((h, w), |(y, x)| {
            (0..c).map(|ch| self.data[[y, x, ch]]).sum::<f32>() / c as f32
        })
    }

    /// Resample to the given spatial dimensions with bicubic interpolation
    ///
    /// Used to bring a background surface built on a downscaled grid back to
    /// full resolution.
    #[must_use]
    pub fn resample_to(&self, height: usize, width: usize) -> Self {
        let (sh, sw, c) = self.data.dim();
        if sh == height && sw == width {
            return self.clone();
        }
        let scale_y = sh as f64 / height as f64;
        let scale_x = sw as f64 / width as f64;
        let mut out = Array3::<f32>::zeros((height, width, c));
        for y in 0..height {
            let src_y = (y as f64 + 0.5) * scale_y - 0.5;
            for x in 0..width {
                let src_x = (x as f64 + 0.5) * scale_x - 0.5;
                for ch in 0..c {
                    out[[y, x, ch]] = bicubic_sample(&self.data, src_y, src_x, ch);
                }
            }
        }
        Self { data: out }
    }
}

/// Catmull-Rom kernel weight for a normalized distance
fn cubic_weight(t: f64) -> f64 {
    let t = t.abs();
    if t < 1.0 {
        1.5 * t * t * t - 2.5 * t * t + 1.0
    } else if t < 2.0 {
        -0.5 * t * t * t + 2.5 * t * t - 4.0 * t + 2.0
    } else {
        0.0
    }
}

/// Bicubic sample of one channel at fractional coordinates, clamped at edges
fn bicubic_sample(data: &Array3<f32>, y: f64, x: f64, ch: usize) -> f32 {
    let (h, w, _) = data.dim();
    let y0 = y.floor() as isize;
    let x0 = x.floor() as isize;
    let mut acc = 0.0f64;
    let mut weight_sum = 0.0f64;
    for dy in -1..=2isize {
        let sy = (y0 + dy).clamp(0, h as isize - 1) as usize;
        let wy = cubic_weight(y - (y0 + dy) as f64);
        for dx in -1..=2isize {
            let sx = (x0 + dx).clamp(0, w as isize - 1) as usize;
            let wx = cubic_weight(x - (x0 + dx) as f64);
            let weight = wy * wx;
            acc += f64::from(data[[sy, sx, ch]]) * weight;
            weight_sum += weight;
        }
    }
    if weight_sum.abs() < f64::EPSILON {
        0.0
    } else {
        (acc / weight_sum) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn gradient_image(h: usize, w: usize) -> AstroImage {
        let data = Array3::from_shape_fn((h, w, 1), |(_, x, _)| 0.1 + 0.001 * x as f32);
        AstroImage::from_array(data).unwrap()
    }

    #[test]
    fn test_shape_accessors() {
        let img = gradient_image(40, 60);
        assert_eq!(img.height(), 40);
        assert_eq!(img.width(), 60);
        assert_eq!(img.channels(), 1);
        assert_eq!(img.shape(), (40, 60, 1));
    }

    #[test]
    fn test_rejects_empty_and_odd_channel_counts() {
        assert!(AstroImage::from_array(Array3::zeros((0, 10, 1))).is_err());
        assert!(AstroImage::from_array(Array3::zeros((10, 10, 2))).is_err());
        assert!(AstroImage::from_array(Array3::zeros((10, 10, 4))).is_err());
    }

    #[test]
    fn test_resample_identity() {
        let img = gradient_image(32, 48);
        let same = img.resample_to(32, 48);
        assert_eq!(same.shape(), img.shape());
        for (a, b) in same.data().iter().zip(img.data().iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_resample_preserves_linear_gradient() {
        // A bicubic kernel reproduces linear ramps away from the borders
        let img = gradient_image(25, 25);
        let up = img.resample_to(100, 100);
        assert_eq!(up.shape(), (100, 100, 1));
        let mid = up.data()[[50, 48, 0]];
        let expected = 0.1 + 0.001 * (48.0 + 0.5) * 25.0 / 100.0;
        assert!((mid - expected).abs() < 5e-3, "got {mid}, want {expected}");
    }

    #[test]
    fn test_luminance_averages_channels() {
        let mut data = Array3::zeros((2, 2, 3));
        data[[0, 0, 0]] = 0.3;
        data[[0, 0, 1]] = 0.6;
        data[[0, 0, 2]] = 0.9;
        let img = AstroImage::from_array(data).unwrap();
        let lum = img.luminance();
        assert!((lum[[0, 0]] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_dynamic_image_round_trip() {
        let img = gradient_image(8, 8);
        let dynamic = img.to_dynamic_image();
        let back = AstroImage::from_dynamic_image(&dynamic).unwrap();
        assert_eq!(back.shape(), img.shape());
        for (a, b) in back.data().iter().zip(img.data().iter()) {
            assert!((a - b).abs() < 1.0 / 65_535.0 + 1e-6);
        }
    }
}
