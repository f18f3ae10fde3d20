//! Inference backend abstraction and tiled background prediction
//!
//! The AI method treats the model as an opaque `infer(tile) -> tile`
//! capability. The runner here owns everything around it: cutting the image
//! into fixed-size tiles, blending overlapping outputs so seams cancel out,
//! and reporting progress per tile.

use crate::config::ExtractionConfig;
use crate::error::{Result, SkyflatError};
use crate::image::AstroImage;
use crate::progress::ProgressSlice;
use ndarray::{Array3, Array4};

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for background-prediction inference backends
pub trait InferenceBackend: Send {
    /// Initialize the backend with the given configuration
    ///
    /// Returns the model load time, or `None` when already initialized.
    ///
    /// # Errors
    /// - Model loading or validation failures
    /// - Missing model artifact in the configuration
    fn initialize(&mut self, config: &ExtractionConfig) -> Result<Option<Duration>>;

    /// Run inference on an NCHW input tensor, producing an NCHW background
    /// tensor of the same spatial shape
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Tensor conversion errors
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Square tile edge the model expects
    fn tile_size(&self) -> usize;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

/// Predict a dense background surface for the whole image
///
/// Images no larger than one tile are resampled through the model in a
/// single pass. Larger images are covered by overlapping tiles whose
/// outputs are blended with a triangular window.
///
/// # Errors
/// Returns `Inference` when the backend is uninitialized, fails, or
/// produces a tensor with an unexpected shape.
pub fn predict_background(
    backend: &mut dyn InferenceBackend,
    image: &AstroImage,
    progress: &ProgressSlice<'_>,
) -> Result<AstroImage> {
    if !backend.is_initialized() {
        return Err(SkyflatError::inference(
            "Inference backend is not initialized",
        ));
    }
    let tile = backend.tile_size();
    if tile < 16 {
        return Err(SkyflatError::inference(format!(
            "Unusable tile size {tile} reported by the inference backend"
        )));
    }

    let (h, w, c) = image.shape();
    if h <= tile && w <= tile {
        // Small frame: one resampled pass through the model
        let scaled = image.resample_to(tile, tile);
        let input = image_to_tensor(scaled.data());
        let output = backend.infer(&input)?;
        let surface = tensor_to_image(&output, c)?;
        progress.report(1.0);
        return Ok(surface.resample_to(h, w));
    }

    if h < tile || w < tile {
        // One narrow dimension: stretch it to tile size, predict, stretch back
        let scaled = image.resample_to(h.max(tile), w.max(tile));
        let surface = predict_background(backend, &scaled, progress)?;
        return Ok(surface.resample_to(h, w));
    }

    let overlap = tile / 4;
    let stride = tile - overlap;
    let rows = tile_origins(h, tile, stride);
    let cols = tile_origins(w, tile, stride);
    let total = rows.len() * cols.len();
    log::debug!("Tiled inference: {total} tiles of {tile}px, overlap {overlap}px");

    let mut acc = Array3::<f32>::zeros((h, w, c));
    let mut weights = Array3::<f32>::zeros((h, w, 1));
    let mut done = 0usize;
    for &y0 in &rows {
        for &x0 in &cols {
            let input = extract_tile(image.data(), y0, x0, tile);
            let output = backend.infer(&input)?;
            let surface = tensor_to_image(&output, c)?;
            if surface.shape() != (tile, tile, c) {
                return Err(SkyflatError::inference(format!(
                    "Backend returned a {:?} tile, expected ({tile}, {tile}, {c})",
                    surface.shape()
                )));
            }
            blend_tile(&mut acc, &mut weights, surface.data(), y0, x0, overlap);
            done += 1;
            progress.report(done as f32 / total as f32);
        }
    }

    for y in 0..h {
        for x in 0..w {
            let weight = weights[[y, x, 0]].max(f32::EPSILON);
            for ch in 0..c {
                acc[[y, x, ch]] /= weight;
            }
        }
    }
    AstroImage::from_array(acc)
}

/// Tile origins covering `dim`, stepping by `stride` with a flush final tile
fn tile_origins(dim: usize, tile: usize, stride: usize) -> Vec<usize> {
    let mut origins = Vec::new();
    let mut pos = 0;
    loop {
        if pos + tile >= dim {
            origins.push(dim - tile);
            break;
        }
        origins.push(pos);
        pos += stride;
    }
    origins
}

/// Cut an H×W×C tile into an NCHW tensor
fn extract_tile(data: &Array3<f32>, y0: usize, x0: usize, tile: usize) -> Array4<f32> {
    let c = data.dim().2;
    Array4::from_shape_fn((1, c, tile, tile), |(_, ch, y, x)| {
        data[[y0 + y, x0 + x, ch]]
    })
}

/// Convert a full H×W×C array into an NCHW tensor
fn image_to_tensor(data: &Array3<f32>) -> Array4<f32> {
    let (h, w, c) = data.dim();
    Array4::from_shape_fn((1, c, h, w), |(_, ch, y, x)| data[[y, x, ch]])
}

/// Convert an NCHW output back to H×W×C, tolerating single-channel outputs
/// for multi-channel inputs
fn tensor_to_image(tensor: &Array4<f32>, channels: usize) -> Result<AstroImage> {
    let (n, co, h, w) = tensor.dim();
    if n != 1 {
        return Err(SkyflatError::inference(format!(
            "Expected batch size 1 from the model, got {n}"
        )));
    }
    if co != channels && co != 1 {
        return Err(SkyflatError::inference(format!(
            "Model produced {co} channels for a {channels}-channel image"
        )));
    }
    let data = Array3::from_shape_fn((h, w, channels), |(y, x, ch)| {
        tensor[[0, ch.min(co - 1), y, x]]
    });
    AstroImage::from_array(data)
}

/// Accumulate one tile with a triangular blending window
fn blend_tile(
    acc: &mut Array3<f32>,
    weights: &mut Array3<f32>,
    tile_data: &Array3<f32>,
    y0: usize,
    x0: usize,
    overlap: usize,
) {
    let (th, tw, c) = tile_data.dim();
    for y in 0..th {
        let wy = edge_weight(y, th, overlap);
        for x in 0..tw {
            let weight = wy * edge_weight(x, tw, overlap);
            for ch in 0..c {
                acc[[y0 + y, x0 + x, ch]] += tile_data[[y, x, ch]] * weight;
            }
            weights[[y0 + y, x0 + x, 0]] += weight;
        }
    }
}

/// Ramp from the tile border up to full weight past the overlap band
fn edge_weight(i: usize, extent: usize, overlap: usize) -> f32 {
    let edge = (i + 1).min(extent - i);
    (edge as f32 / (overlap + 1) as f32).min(1.0)
}
