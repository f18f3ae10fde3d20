//! Error types for background extraction operations

use thiserror::Error;

/// Result type alias for background extraction operations
pub type Result<T> = std::result::Result<T, SkyflatError>;

/// Error types for background extraction operations
#[derive(Error, Debug)]
pub enum SkyflatError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode or encode errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Precondition violations (insufficient points, out-of-range parameters)
    #[error("Precondition error: {0}")]
    Precondition(String),

    /// Numerical failures during surface fitting (degenerate or singular system)
    #[error("Fit error: {0}")]
    Fit(String),

    /// Model inference errors (artifact unreadable, incompatible shapes)
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SkyflatError {
    /// Create a new precondition error
    pub fn precondition<S: Into<String>>(msg: S) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a new fit error
    pub fn fit<S: Into<String>>(msg: S) -> Self {
        Self::Fit(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a precondition error for an unmet per-method point-count requirement
    pub fn insufficient_points(method: &str, required: usize, actual: usize) -> Self {
        Self::Precondition(format!(
            "The {method} method requires at least {required} background points, but only {actual} were provided"
        ))
    }

    /// Create a configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range})"
        ))
    }

    /// Create a fit error carrying the method and problem-size context for logging
    pub fn fit_error_with_context(
        method: &str,
        detail: &str,
        point_count: usize,
        shape: (usize, usize, usize),
    ) -> Self {
        Self::Fit(format!(
            "{method} fit failed on {}x{}x{} image with {point_count} points: {detail}",
            shape.0, shape.1, shape.2
        ))
    }
}
