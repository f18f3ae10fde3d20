//! Tract backend for background-prediction models
//!
//! Pure Rust ONNX inference with no external dependencies: the model
//! artifact is loaded from the path resolved by the caller, optimized and
//! made runnable once, then reused for every tile.

use crate::config::ExtractionConfig;
use crate::error::{Result, SkyflatError};
use crate::inference::InferenceBackend;
use ndarray::{Array4, Ix4};
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// Square tile edge the packaged background models are trained on
const MODEL_TILE_SIZE: usize = 256;

/// Tract backend running background-prediction models on the CPU
#[derive(Debug, Default)]
pub struct TractBackend {
    model: Option<TractModel>,
    initialized: bool,
}

impl TractBackend {
    /// Create a new uninitialized Tract backend
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: None,
            initialized: false,
        }
    }

    fn load_model(&mut self, config: &ExtractionConfig) -> Result<Duration> {
        let model_load_start = Instant::now();

        let Some(ref path) = config.model_path else {
            return Err(SkyflatError::inference(
                "No model artifact configured for the AI method",
            ));
        };

        let model_data = std::fs::read(path).map_err(|e| {
            SkyflatError::inference(format!(
                "Failed to read model artifact '{}': {e}",
                path.display()
            ))
        })?;

        log::info!(
            "Loading background model '{}' ({:.2} MB)",
            path.display(),
            model_data.len() as f64 / (1024.0 * 1024.0)
        );

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| SkyflatError::inference(format!("Failed to load ONNX model: {e}")))?
            .into_optimized()
            .map_err(|e| SkyflatError::inference(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| {
                SkyflatError::inference(format!("Failed to create runnable model: {e}"))
            })?;

        self.model = Some(model);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Tract backend initialized in {:.2}ms",
            model_load_time.as_millis()
        );
        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, config: &ExtractionConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| SkyflatError::inference("Tract model not initialized"))?;

        log::debug!("Running Tract inference on tile {:?}", input.shape());

        let input_tensor = Tensor::from(input.clone());
        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| SkyflatError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .first()
            .ok_or_else(|| SkyflatError::inference("Model produced no output tensors"))?;
        let view = output_tensor
            .to_array_view::<f32>()
            .map_err(|e| SkyflatError::inference(format!("Unexpected output tensor type: {e}")))?;
        view.to_owned()
            .into_dimensionality::<Ix4>()
            .map_err(|e| SkyflatError::inference(format!("Unexpected output tensor rank: {e}")))
    }

    fn tile_size(&self) -> usize {
        MODEL_TILE_SIZE
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
