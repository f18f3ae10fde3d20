//! Extraction configuration and persisted-settings seeding
//!
//! The method choice is a closed enum carrying its method-specific knob, so
//! dispatch in the fitter is exhaustive. Configuration can also be seeded
//! from a persisted flat JSON mapping (the same shape a GUI front end would
//! write to its preferences file); the core treats that purely as
//! initial-state input and validates it like any other caller input.

use crate::error::{Result, SkyflatError};
use crate::points::BackgroundPoint;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Radial basis kernel for the RBF method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RbfKernel {
    /// `r^2 ln r`, the default
    ThinPlate,
    /// `r`
    Linear,
    /// `r^3`
    Cubic,
    /// `r^5`
    Quintic,
}

impl RbfKernel {
    /// Parse the kernel name used in persisted settings
    ///
    /// # Errors
    /// Returns `InvalidConfig` for unknown kernel names.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            // "RBF" is the historical preferences value for the default kernel
            "thin_plate" | "thin-plate" | "rbf" => Ok(Self::ThinPlate),
            "linear" => Ok(Self::Linear),
            "cubic" => Ok(Self::Cubic),
            "quintic" => Ok(Self::Quintic),
            other => Err(SkyflatError::invalid_config(format!(
                "Unknown RBF kernel: {other}"
            ))),
        }
    }
}

/// Background modelling method with its method-specific parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InterpolationMethod {
    /// Radial basis interpolation over the sample points
    Rbf {
        /// Kernel choice
        kernel: RbfKernel,
    },
    /// Dual ordinary kriging over the sample points
    Kriging,
    /// Least-squares B-spline surface of the given order (0-5)
    Splines {
        /// Spline degree; 0 fits piecewise-constant patches
        order: u8,
    },
    /// Neural-network inference, independent of sample points
    Ai,
}

impl InterpolationMethod {
    /// Human-readable method name for error context and logging
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rbf { .. } => "RBF",
            Self::Kriging => "Kriging",
            Self::Splines { .. } => "Splines",
            Self::Ai => "AI",
        }
    }

    /// Minimum number of background points the method is well-posed for
    #[must_use]
    pub fn min_points(&self) -> usize {
        match self {
            Self::Rbf { .. } | Self::Kriging => 2,
            Self::Splines { .. } => 16,
            Self::Ai => 0,
        }
    }

    /// Grid reduction applied before fitting
    ///
    /// Kernel-based global solves scale superlinearly with grid size, so RBF
    /// and Kriging always run on a reduced grid regardless of caller input.
    #[must_use]
    pub fn downscale_factor(&self) -> u32 {
        match self {
            Self::Rbf { .. } | Self::Kriging => 4,
            Self::Splines { .. } | Self::Ai => 1,
        }
    }
}

/// Correction operator applied between image and background surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Correction {
    /// `corrected = image - background`
    Subtraction,
    /// `corrected = image / background * mean(background)`
    Division,
}

/// Parameters for one extraction run
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Background modelling method
    pub method: InterpolationMethod,
    /// Interpolation-vs-relaxation trade-off, 0 = exact interpolation
    pub smoothing: f64,
    /// Correction operator
    pub correction: Correction,
    /// Neighborhood radius for local statistics and hit testing
    pub sample_size: u32,
    /// Resolved local model artifact, required for the AI method
    pub model_path: Option<PathBuf>,
}

impl ExtractionConfig {
    /// Create a configuration builder
    #[must_use]
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder::new()
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            method: InterpolationMethod::Rbf {
                kernel: RbfKernel::ThinPlate,
            },
            smoothing: 0.0,
            correction: Correction::Subtraction,
            sample_size: 25,
            model_path: None,
        }
    }
}

/// Builder for `ExtractionConfig`
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ExtractionConfig::default(),
        }
    }

    #[must_use]
    pub fn method(mut self, method: InterpolationMethod) -> Self {
        self.config.method = method;
        self
    }

    #[must_use]
    pub fn smoothing(mut self, smoothing: f64) -> Self {
        self.config.smoothing = smoothing;
        self
    }

    #[must_use]
    pub fn correction(mut self, correction: Correction) -> Self {
        self.config.correction = correction;
        self
    }

    #[must_use]
    pub fn sample_size(mut self, sample_size: u32) -> Self {
        self.config.sample_size = sample_size;
        self
    }

    #[must_use]
    pub fn model_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.model_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Validate and build the configuration
    ///
    /// # Errors
    /// Returns `InvalidConfig` for out-of-range smoothing, spline order or
    /// sample size.
    pub fn build(self) -> Result<ExtractionConfig> {
        let config = self.config;
        if !(0.0..=1.0).contains(&config.smoothing) {
            return Err(SkyflatError::config_value_error(
                "smoothing",
                config.smoothing,
                "0.0-1.0",
            ));
        }
        if let InterpolationMethod::Splines { order } = config.method {
            if order > 5 {
                return Err(SkyflatError::config_value_error(
                    "spline_order",
                    order,
                    "0-5",
                ));
            }
        }
        if config.sample_size == 0 {
            return Err(SkyflatError::config_value_error(
                "sample_size",
                config.sample_size,
                ">= 1",
            ));
        }
        Ok(config)
    }
}

impl Default for ExtractionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The persisted preferences mapping a front end hands to the core
///
/// Points are stored as coordinate arrays; a trailing flag element, present
/// in older preference files, is tolerated and ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSettings {
    #[serde(default)]
    pub background_points: Vec<Vec<f64>>,
    #[serde(default = "default_sample_size")]
    pub sample_size: u32,
    #[serde(default)]
    pub spline_order: u8,
    #[serde(default, rename = "RBF_kernel")]
    pub rbf_kernel: Option<String>,
    #[serde(default)]
    pub interpol_type_option: Option<String>,
    #[serde(default)]
    pub smoothing: f64,
    #[serde(default)]
    pub correction: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

fn default_sample_size() -> u32 {
    25
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self {
            background_points: Vec::new(),
            sample_size: default_sample_size(),
            spline_order: 0,
            rbf_kernel: None,
            interpol_type_option: None,
            smoothing: 0.0,
            correction: None,
            width: None,
            height: None,
        }
    }
}

impl PersistedSettings {
    /// Parse a persisted preferences file
    ///
    /// # Errors
    /// Returns `InvalidConfig` for unreadable or malformed JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SkyflatError::invalid_config(format!(
                "Failed to read preferences file '{}': {e}",
                path.as_ref().display()
            ))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| SkyflatError::invalid_config(format!("Malformed preferences file: {e}")))
    }

    /// Seed points for the ledger root entry
    #[must_use]
    pub fn seed_points(&self) -> Vec<BackgroundPoint> {
        self.background_points
            .iter()
            .filter(|coords| coords.len() >= 2)
            .map(|coords| BackgroundPoint::new(coords[0], coords[1]))
            .collect()
    }

    /// Resolve an `ExtractionConfig` from the persisted values
    ///
    /// # Errors
    /// Returns `InvalidConfig` for unknown method or kernel names and for
    /// out-of-range parameters.
    pub fn to_config(&self) -> Result<ExtractionConfig> {
        let method = match self.interpol_type_option.as_deref().unwrap_or("RBF") {
            "RBF" => InterpolationMethod::Rbf {
                kernel: RbfKernel::from_name(self.rbf_kernel.as_deref().unwrap_or("thin_plate"))?,
            },
            "Kriging" => InterpolationMethod::Kriging,
            "Splines" => InterpolationMethod::Splines {
                order: self.spline_order,
            },
            "AI" => InterpolationMethod::Ai,
            other => {
                return Err(SkyflatError::invalid_config(format!(
                    "Unknown interpolation method: {other}"
                )))
            },
        };
        let correction = match self.correction.as_deref().unwrap_or("Subtraction") {
            "Subtraction" | "subtraction" => Correction::Subtraction,
            "Division" | "division" => Correction::Division,
            other => {
                return Err(SkyflatError::invalid_config(format!(
                    "Unknown correction type: {other}"
                )))
            },
        };
        ExtractionConfig::builder()
            .method(method)
            .smoothing(self.smoothing)
            .correction(correction)
            .sample_size(self.sample_size)
            .build()
    }
}
