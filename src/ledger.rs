//! Versioned point-set history
//!
//! The ledger is an arena of immutable snapshots. Every transition derives a
//! new snapshot purely from its parent and the operation parameters, so the
//! chain from any entry back to the root is a complete, replayable history of
//! point-set evolution. Snapshots are reference counted and never mutated,
//! which lets a worker thread hold one while the foreground keeps editing.

use crate::error::Result;
use crate::image::AstroImage;
use crate::points::{self, BackgroundPoint, GridParams};
use std::sync::Arc;

/// Handle to a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(usize);

/// An immutable, ordered point set produced by a ledger transition
pub type PointSnapshot = Arc<Vec<BackgroundPoint>>;

/// The operation that produced a ledger entry
#[derive(Debug, Clone)]
pub enum PointOp {
    /// Root entry seeded on image load
    Init,
    /// Grid/flood generation appended candidate points
    AddGrid(GridParams),
    /// A single point was removed by nearest-match query
    RemovePoint {
        /// Index of the removed point in the parent snapshot
        index: usize,
        /// The removed point itself
        point: BackgroundPoint,
    },
    /// All points were cleared
    Reset,
}

/// One node of the history chain
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    op: PointOp,
    parent: Option<EntryId>,
    snapshot: PointSnapshot,
}

impl LedgerEntry {
    /// The operation that produced this entry
    #[must_use]
    pub fn op(&self) -> &PointOp {
        &self.op
    }

    /// Handle of the parent entry, `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<EntryId> {
        self.parent
    }

    /// The point set of this entry
    #[must_use]
    pub fn snapshot(&self) -> &PointSnapshot {
        &self.snapshot
    }
}

/// Append-only history of background point sets
#[derive(Debug)]
pub struct PointLedger {
    entries: Vec<LedgerEntry>,
    current: EntryId,
}

impl PointLedger {
    /// Create a ledger with a root entry holding the given points
    #[must_use]
    pub fn init(points: Vec<BackgroundPoint>) -> Self {
        let root = LedgerEntry {
            op: PointOp::Init,
            parent: None,
            snapshot: Arc::new(points),
        };
        Self {
            entries: vec![root],
            current: EntryId(0),
        }
    }

    /// Handle of the current entry
    #[must_use]
    pub fn current(&self) -> EntryId {
        self.current
    }

    /// Look up an entry by handle
    #[must_use]
    pub fn entry(&self, id: EntryId) -> Option<&LedgerEntry> {
        self.entries.get(id.0)
    }

    /// Points of the current snapshot
    #[must_use]
    pub fn current_points(&self) -> &[BackgroundPoint] {
        &self.entries[self.current.0].snapshot
    }

    /// Cheap handle to the current snapshot, safe to hand to a worker
    #[must_use]
    pub fn current_snapshot(&self) -> PointSnapshot {
        Arc::clone(&self.entries[self.current.0].snapshot)
    }

    /// Number of entries in the arena
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; a ledger holds at least its root
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Generate grid/flood candidates and append them to the current set
    ///
    /// Candidates duplicating an existing coordinate are skipped. Yields no
    /// new entry when the generator produces nothing.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for out-of-range placement parameters.
    pub fn add_grid(
        &mut self,
        image: &AstroImage,
        params: &GridParams,
    ) -> Result<Option<EntryId>> {
        let generated = points::generate_grid(image, params)?;
        let existing = self.current_points();
        let fresh: Vec<BackgroundPoint> = generated
            .into_iter()
            .filter(|p| !existing.iter().any(|q| q == p))
            .collect();
        if fresh.is_empty() {
            log::debug!("Grid generation yielded no new points, skipping transition");
            return Ok(None);
        }

        let mut merged = Vec::with_capacity(existing.len() + fresh.len());
        merged.extend_from_slice(existing);
        merged.extend_from_slice(&fresh);
        Ok(Some(self.push(PointOp::AddGrid(*params), merged)))
    }

    /// Remove the nearest point to a query coordinate
    ///
    /// The match is accepted only when the Chebyshev distance is within
    /// `sample_size`; otherwise no transition happens and `None` is returned.
    /// A missed match is an outcome, not an error.
    pub fn remove_nearest(&mut self, x: f64, y: f64, sample_size: u32) -> Option<EntryId> {
        let index = points::nearest_match(self.current_points(), x, y, sample_size)?;
        let mut remaining = self.current_points().to_vec();
        let point = remaining.remove(index);
        Some(self.push(PointOp::RemovePoint { index, point }, remaining))
    }

    /// Clear all points; a no-op when the set is already empty so repeated
    /// resets do not pollute the history
    pub fn reset(&mut self) -> Option<EntryId> {
        if self.current_points().is_empty() {
            return None;
        }
        Some(self.push(PointOp::Reset, Vec::new()))
    }

    /// Step back to the parent entry; false at the root
    pub fn undo(&mut self) -> bool {
        match self.entries[self.current.0].parent {
            Some(parent) => {
                self.current = parent;
                true
            },
            None => false,
        }
    }

    fn push(&mut self, op: PointOp, points: Vec<BackgroundPoint>) -> EntryId {
        let id = EntryId(self.entries.len());
        self.entries.push(LedgerEntry {
            op,
            parent: Some(self.current),
            snapshot: Arc::new(points),
        });
        self.current = id;
        id
    }
}
