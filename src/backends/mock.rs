//! Mock inference backends for tests and model-free integration work

use crate::config::ExtractionConfig;
use crate::error::{Result, SkyflatError};
use crate::inference::InferenceBackend;
use ndarray::Array4;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// How the mock transforms its input tile
#[derive(Debug, Clone, Copy)]
enum MockResponse {
    /// Return the input unchanged
    Identity,
    /// Return the per-channel mean of the tile, a crude background estimate
    ChannelMean,
}

/// Deterministic in-process stand-in for a model backend
#[derive(Debug)]
pub struct MockBackend {
    response: MockResponse,
    tile_size: usize,
    initialized: bool,
    inference_count: usize,
}

impl MockBackend {
    /// Mock that echoes its input, useful for blending and plumbing tests
    #[must_use]
    pub fn identity(tile_size: usize) -> Self {
        Self {
            response: MockResponse::Identity,
            tile_size,
            initialized: false,
            inference_count: 0,
        }
    }

    /// Mock that flattens each tile to its per-channel mean
    #[must_use]
    pub fn channel_mean(tile_size: usize) -> Self {
        Self {
            response: MockResponse::ChannelMean,
            tile_size,
            initialized: false,
            inference_count: 0,
        }
    }

    /// Number of `infer` calls served so far
    #[must_use]
    pub fn inference_count(&self) -> usize {
        self.inference_count
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &ExtractionConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(0)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(SkyflatError::inference("Mock backend not initialized"));
        }
        self.inference_count += 1;
        match self.response {
            MockResponse::Identity => Ok(input.clone()),
            MockResponse::ChannelMean => {
                let (n, c, h, w) = input.dim();
                let mut output = Array4::<f32>::zeros((n, c, h, w));
                for ch in 0..c {
                    let plane = input.slice(ndarray::s![0, ch, .., ..]);
                    let mean = plane.mean().unwrap_or(0.0);
                    output.slice_mut(ndarray::s![0, ch, .., ..]).fill(mean);
                }
                Ok(output)
            },
        }
    }

    fn tile_size(&self) -> usize {
        self.tile_size
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
