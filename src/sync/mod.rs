pub mod guard;
pub mod reconciler;
pub mod staleness;
pub mod syncer;

use serde::Serialize;

pub use guard::{SyncGuard, SyncPermit};
pub use reconciler::{ItemSource, Reconciler, SyncItem, TaskMatcher, TitleCourseMatcher};

/// Counts reported by a sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub courses: u64,
    pub assignments: u64,
    pub modules: u64,
}

/// What the reconciler did with one batch of items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
}

impl ReconcileOutcome {
    /// Items that ended up stored, new or refreshed.
    pub fn stored(&self) -> u64 {
        self.inserted + self.updated
    }

    pub fn absorb(&mut self, other: &ReconcileOutcome) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

/// Callbacks for reporting sync progress to a front end.
pub trait SyncProgress: Send + Sync {
    fn on_courses_fetched(&self, _count: usize) {}
    fn on_course_start(&self, _course: &str, _index: usize, _total: usize) {}
    fn on_course_complete(&self, _course: &str, _outcome: &ReconcileOutcome) {}
    fn on_course_failed(&self, _course: &str, _error: &crate::Error) {}
}

/// Progress sink that reports nothing.
pub struct NoopProgress;

impl SyncProgress for NoopProgress {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_absorb_and_stored() {
        let mut total = ReconcileOutcome::default();
        total.absorb(&ReconcileOutcome {
            inserted: 2,
            updated: 1,
            skipped: 4,
        });
        total.absorb(&ReconcileOutcome {
            inserted: 0,
            updated: 3,
            skipped: 0,
        });
        assert_eq!(total.stored(), 6);
        assert_eq!(total.skipped, 4);
    }
}
