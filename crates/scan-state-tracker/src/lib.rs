//! Process-singleton scan state (spec §2 C8), encapsulated behind a
//! value-typed, mutex-guarded façade instead of a free-standing global
//! (spec §9 "Global scan state").
//!
//! Exactly one [`ScanStateTracker`] is expected to exist per process — the
//! orchestrator owns it and passes `Arc<ScanStateTracker>` clones to
//! whatever needs read access (the progress bus on subscribe, a status
//! query endpoint). The tracker itself has no opinion on how many copies
//! of the `Arc` exist; the one-scan-at-a-time invariant comes from
//! `try_start` being the only way to flip `in_progress` on.

use chrono::Utc;
use scan_core::{ScanError, ScanStateSnapshot, Symbol};
use tokio::sync::RwLock;

/// Mutex-guarded process-wide scan state.
///
/// All mutation goes through `&self` methods that take the lock for the
/// shortest span needed; readers (the bus on subscribe, a status query)
/// call [`ScanStateTracker::snapshot`] which clones out a consistent view.
pub struct ScanStateTracker {
    state: RwLock<ScanStateSnapshot>,
}

impl Default for ScanStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanStateTracker {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ScanStateSnapshot::default()),
        }
    }

    /// Atomic check-and-set: if a scan is already in progress, returns
    /// `Err(ErrScanInProgress)` and leaves state untouched (spec §4.1
    /// "Guard (strict)"). Otherwise marks `in_progress` and returns the
    /// new scan id.
    pub async fn try_start(&self, scan_id: uuid::Uuid, total: usize) -> Result<(), ScanError> {
        let mut state = self.state.write().await;
        if state.in_progress {
            return Err(ScanError::ErrScanInProgress);
        }
        *state = ScanStateSnapshot {
            in_progress: true,
            scan_id: Some(scan_id),
            total,
            scanned: 0,
            current_symbol: None,
            started_at: Some(Utc::now()),
        };
        Ok(())
    }

    /// Fill in the universe size once it's known, after the guard in
    /// [`ScanStateTracker::try_start`] has already been acquired with a
    /// placeholder of `0` (spec §4.1 step 3 happens after step 2's
    /// universe determination, but the guard itself must be taken before
    /// either). A no-op if no scan is in progress.
    pub async fn set_total(&self, total: usize) {
        let mut state = self.state.write().await;
        if state.in_progress {
            state.total = total;
        }
    }

    /// Record progress on `symbol` at zero-based `index`.
    pub async fn update_progress(&self, symbol: Symbol, index: usize) {
        let mut state = self.state.write().await;
        state.scanned = index;
        state.current_symbol = Some(symbol);
    }

    /// Tear down scan state at the end of a pipeline run, successful or
    /// not. Idempotent: calling this when no scan is in progress is a
    /// harmless no-op.
    pub async fn complete(&self) {
        let mut state = self.state.write().await;
        *state = ScanStateSnapshot::default();
    }

    /// Force a reset regardless of current state — used by the
    /// orchestrator to recover after a scheduler-loop crash (spec §4.1
    /// "Scheduler loop crash: back off 5 minutes and retry") so a stuck
    /// `in_progress` flag can never permanently wedge the guard.
    pub async fn reset(&self) {
        self.complete().await;
    }

    pub async fn snapshot(&self) -> ScanStateSnapshot {
        self.state.read().await.clone()
    }

    /// Read the current snapshot and run `f` against it without releasing
    /// the read lock in between, so nothing holding the write lock (i.e.
    /// [`ScanStateTracker::complete`]) can land between the read and
    /// whatever `f` does with it. Used by `progress-bus` to register a new
    /// subscriber atomically with the snapshot it replays (spec §8
    /// property 3, late-join bracketing).
    pub async fn with_snapshot<R>(&self, f: impl FnOnce(&ScanStateSnapshot) -> R) -> R {
        let state = self.state.read().await;
        f(&state)
    }

    pub async fn is_in_progress(&self) -> bool {
        self.state.read().await.in_progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_start_while_in_progress_is_rejected() {
        let tracker = ScanStateTracker::new();
        tracker.try_start(uuid::Uuid::new_v4(), 3).await.unwrap();

        let second = tracker.try_start(uuid::Uuid::new_v4(), 3).await;
        assert!(matches!(second, Err(ScanError::ErrScanInProgress)));
    }

    #[tokio::test]
    async fn complete_clears_in_progress_and_allows_restart() {
        let tracker = ScanStateTracker::new();
        tracker.try_start(uuid::Uuid::new_v4(), 1).await.unwrap();
        tracker.complete().await;

        assert!(!tracker.is_in_progress().await);
        assert!(tracker.try_start(uuid::Uuid::new_v4(), 1).await.is_ok());
    }

    #[tokio::test]
    async fn set_total_fills_in_universe_size_after_guard() {
        let tracker = ScanStateTracker::new();
        tracker.try_start(uuid::Uuid::new_v4(), 0).await.unwrap();
        tracker.set_total(7).await;

        assert_eq!(tracker.snapshot().await.total, 7);
    }

    #[tokio::test]
    async fn update_progress_tracks_current_symbol_and_index() {
        let tracker = ScanStateTracker::new();
        tracker.try_start(uuid::Uuid::new_v4(), 10).await.unwrap();
        tracker
            .update_progress(Symbol::new("AAPL").unwrap(), 5)
            .await;

        let snap = tracker.snapshot().await;
        assert_eq!(snap.scanned, 5);
        assert_eq!(snap.current_symbol.unwrap().as_str(), "AAPL");
    }
}
