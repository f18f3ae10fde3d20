//! Inference backend implementations

pub mod mock;

#[cfg(feature = "tract")]
pub mod tract;

#[cfg(feature = "tract")]
pub use tract::TractBackend;
