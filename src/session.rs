//! Per-image extraction session
//!
//! A session bundles the loaded image, its point ledger and the results of
//! the last successful run into one explicit context object that every
//! operation receives. Long-running extractions are spawned onto a worker
//! thread holding read-only snapshots, so the foreground can keep editing
//! the ledger while a fit is in flight.

use crate::config::PersistedSettings;
use crate::error::{Result, SkyflatError};
use crate::extractor::{BackgroundExtractor, ExtractionOutcome};
use crate::image::AstroImage;
use crate::ledger::{EntryId, PointLedger};
use crate::points::GridParams;
use crate::progress::{ProgressReporter, ProgressTracker};
use std::sync::Arc;
use std::thread::JoinHandle;

/// State for one loaded image and its point-set history
pub struct ExtractionSession {
    image: Option<Arc<AstroImage>>,
    ledger: PointLedger,
    last: Option<ExtractionOutcome>,
}

impl ExtractionSession {
    /// Create an empty session with no image loaded
    #[must_use]
    pub fn new() -> Self {
        Self {
            image: None,
            ledger: PointLedger::init(Vec::new()),
            last: None,
        }
    }

    /// Load a new image, discarding the previous ledger and results
    ///
    /// Persisted points are used as the ledger seed only when the persisted
    /// dimensions match the new image; a dimension mismatch means the points
    /// belong to a different frame and the seed is empty.
    pub fn load_image(&mut self, image: AstroImage, persisted: Option<&PersistedSettings>) {
        let (h, w, _) = image.shape();
        let seed = persisted
            .filter(|s| s.width == Some(w as u32) && s.height == Some(h as u32))
            .map(PersistedSettings::seed_points)
            .unwrap_or_default();
        if !seed.is_empty() {
            log::info!("Seeding ledger with {} persisted points", seed.len());
        }
        self.image = Some(Arc::new(image));
        self.ledger = PointLedger::init(seed);
        self.last = None;
    }

    /// The loaded image, if any
    #[must_use]
    pub fn image(&self) -> Option<&Arc<AstroImage>> {
        self.image.as_ref()
    }

    /// The point-set history
    #[must_use]
    pub fn ledger(&self) -> &PointLedger {
        &self.ledger
    }

    /// Results of the last successful extraction
    #[must_use]
    pub fn last_outcome(&self) -> Option<&ExtractionOutcome> {
        self.last.as_ref()
    }

    /// Append grid/flood candidates to the point set
    ///
    /// # Errors
    /// Returns `Precondition` when no image is loaded and `InvalidConfig`
    /// for out-of-range placement parameters.
    pub fn add_grid_points(&mut self, params: &GridParams) -> Result<Option<EntryId>> {
        let image = self
            .image
            .clone()
            .ok_or_else(|| SkyflatError::precondition("No image loaded"))?;
        self.ledger.add_grid(&image, params)
    }

    /// Remove the nearest point within `sample_size`; `None` on a miss
    pub fn remove_point(&mut self, x: f64, y: f64, sample_size: u32) -> Option<EntryId> {
        self.ledger.remove_nearest(x, y, sample_size)
    }

    /// Clear all points
    pub fn reset_points(&mut self) -> Option<EntryId> {
        self.ledger.reset()
    }

    /// Step the ledger back to its parent entry
    pub fn undo_points(&mut self) -> bool {
        self.ledger.undo()
    }

    /// Run an extraction on the calling thread and store the outcome
    ///
    /// A failed run leaves the previous results untouched.
    ///
    /// # Errors
    /// Returns `Precondition` when no image is loaded, plus any extractor
    /// error.
    pub fn extract_blocking(
        &mut self,
        extractor: &mut BackgroundExtractor,
        progress: &ProgressTracker,
    ) -> Result<&ExtractionOutcome> {
        let image = self
            .image
            .clone()
            .ok_or_else(|| SkyflatError::precondition("No image loaded"))?;
        let points = self.ledger.current_snapshot();
        let outcome = extractor.extract(&image, &points, progress)?;
        Ok(self.last.insert(outcome))
    }

    /// Spawn an extraction onto a worker thread
    ///
    /// The worker owns read-only snapshots of the image and point set; the
    /// ledger stays editable while the job runs. Only one job should be in
    /// flight per session. Store the joined outcome with
    /// [`ExtractionSession::store_outcome`].
    ///
    /// # Errors
    /// Returns `Precondition` when no image is loaded.
    pub fn spawn_extraction(
        &self,
        mut extractor: BackgroundExtractor,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<ExtractionJob> {
        let image = self
            .image
            .clone()
            .ok_or_else(|| SkyflatError::precondition("No image loaded"))?;
        let points = self.ledger.current_snapshot();
        let handle = std::thread::spawn(move || {
            let tracker = ProgressTracker::new(reporter);
            extractor.extract(&image, &points, &tracker)
        });
        Ok(ExtractionJob { handle })
    }

    /// Record a successful extraction as the session's current results
    pub fn store_outcome(&mut self, outcome: ExtractionOutcome) {
        self.last = Some(outcome);
    }

    /// Consume the session, yielding the last successful outcome
    #[must_use]
    pub fn into_last_outcome(self) -> Option<ExtractionOutcome> {
        self.last
    }
}

impl Default for ExtractionSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to an in-flight worker extraction
pub struct ExtractionJob {
    handle: JoinHandle<Result<ExtractionOutcome>>,
}

impl ExtractionJob {
    /// Wait for the worker to finish
    ///
    /// # Errors
    /// Returns the extraction error, or `Internal` when the worker panicked.
    pub fn join(self) -> Result<ExtractionOutcome> {
        self.handle
            .join()
            .map_err(|_| SkyflatError::internal("Extraction worker panicked"))?
    }
}
