//! Progress reporting for long-running extraction work
//!
//! The core reports a single monotonic fraction in `[0, 1]` through a
//! reporter trait, keeping frontends free to render it however they like.
//! `ProgressTracker` enforces the monotonic contract so a consumer never
//! observes a decreasing value even when pipeline stages overlap.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Trait for receiving extraction progress updates
pub trait ProgressReporter: Send + Sync {
    /// Report overall progress as a fraction in `[0, 1]`
    fn report(&self, fraction: f32);
}

/// No-op progress reporter that discards all updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report(&self, _fraction: f32) {
        // Intentionally empty
    }
}

/// Reporter that logs progress at whole-percent steps
pub struct ConsoleProgressReporter {
    last_percent: AtomicU32,
}

impl ConsoleProgressReporter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_percent: AtomicU32::new(0),
        }
    }
}

impl Default for ConsoleProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report(&self, fraction: f32) {
        let percent = (fraction.clamp(0.0, 1.0) * 100.0) as u32;
        let last = self.last_percent.swap(percent, Ordering::Relaxed);
        if percent != last {
            log::info!("Background extraction: {percent}%");
        }
    }
}

/// Reporter that forwards fractions over a channel to a foreground consumer
///
/// Sending never blocks the worker; a disconnected receiver is ignored.
pub struct ChannelProgressReporter {
    sender: Sender<f32>,
}

impl ChannelProgressReporter {
    #[must_use]
    pub fn new(sender: Sender<f32>) -> Self {
        Self { sender }
    }
}

impl ProgressReporter for ChannelProgressReporter {
    fn report(&self, fraction: f32) {
        let _ = self.sender.send(fraction);
    }
}

/// Monotonic progress dispatcher shared by the pipeline stages
///
/// Fractions are clamped to `[0, 1]` and never move backwards; stages map
/// their local progress into a sub-range via [`ProgressTracker::slice`].
pub struct ProgressTracker {
    reporter: Arc<dyn ProgressReporter>,
    // Fraction bits; f32 in [0,1] compares correctly as u32 bits
    last: AtomicU32,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            last: AtomicU32::new(0),
        }
    }

    /// Tracker that discards all updates, for callers without a sink
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Arc::new(NoOpProgressReporter))
    }

    /// Report an absolute fraction, suppressed when not an increase
    pub fn report(&self, fraction: f32) {
        let fraction = fraction.clamp(0.0, 1.0);
        let bits = fraction.to_bits();
        let prev = self.last.fetch_max(bits, Ordering::Relaxed);
        if bits > prev {
            self.reporter.report(fraction);
        }
    }

    /// Sub-range view for one pipeline stage
    #[must_use]
    pub fn slice(&self, base: f32, span: f32) -> ProgressSlice<'_> {
        ProgressSlice {
            tracker: self,
            base,
            span,
        }
    }
}

/// Maps a stage-local fraction into the tracker's global range
pub struct ProgressSlice<'a> {
    tracker: &'a ProgressTracker,
    base: f32,
    span: f32,
}

impl<'a> ProgressSlice<'a> {
    /// Report stage-local progress in `[0, 1]`
    pub fn report(&self, local_fraction: f32) {
        self.tracker
            .report(self.base + self.span * local_fraction.clamp(0.0, 1.0));
    }

    /// Narrow to a sub-range of this slice, in slice-local coordinates
    #[must_use]
    pub fn sub(&self, base: f32, span: f32) -> ProgressSlice<'a> {
        ProgressSlice {
            tracker: self.tracker,
            base: self.base + self.span * base,
            span: self.span * span,
        }
    }
}
