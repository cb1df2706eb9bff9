//! Catalog mirror refresh state.
//!
//! The mirror itself is repopulated by the external sync job; this module
//! owns the swap discipline: a refresh is tracked by a single in-memory
//! flag (a second concurrent refresh is a no-op), readers keep seeing the
//! previous snapshot until a replacement is complete, and every completed
//! refresh bumps a cache version usable by downstream filtered-view
//! caches for invalidation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::{debug, info};

use crate::error::{CurioError, Result};

#[derive(Debug, Default)]
pub struct MirrorState {
    cache_version: AtomicU64,
    refreshing: AtomicBool,
}

impl MirrorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic counter incremented on every completed refresh.
    pub fn cache_version(&self) -> u64 {
        self.cache_version.load(Ordering::Acquire)
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// Starts a refresh. Returns `None` when one is already in flight —
    /// the second request is a no-op, neither queued nor an error.
    ///
    /// Dropping the guard without calling [`RefreshGuard::complete`]
    /// marks the refresh failed: the flag clears, the version does not
    /// move, and the previous snapshot continues to serve reads.
    pub fn begin_refresh(&self) -> Option<RefreshGuard<'_>> {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("catalog refresh already in progress; skipping");
            return None;
        }
        Some(RefreshGuard {
            state: self,
            completed: false,
        })
    }

    /// Like [`begin_refresh`](Self::begin_refresh), but for callers that
    /// need to report the conflict instead of silently skipping.
    pub fn try_begin_refresh(&self) -> Result<RefreshGuard<'_>> {
        self.begin_refresh().ok_or(CurioError::RefreshInProgress)
    }
}

#[derive(Debug)]
pub struct RefreshGuard<'a> {
    state: &'a MirrorState,
    completed: bool,
}

impl RefreshGuard<'_> {
    /// Marks the replacement snapshot complete and publishes it by
    /// bumping the cache version.
    pub fn complete(mut self) -> u64 {
        self.completed = true;
        let version = self
            .state
            .cache_version
            .fetch_add(1, Ordering::AcqRel)
            .wrapping_add(1);
        info!(cache_version = version, "catalog refresh complete");
        version
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            debug!("catalog refresh ended without completing; previous snapshot retained");
        }
        self.state.refreshing.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_concurrent_refresh_is_a_no_op() {
        let state = MirrorState::new();
        let guard = state.begin_refresh().unwrap();
        assert!(state.begin_refresh().is_none());
        guard.complete();
        assert!(state.begin_refresh().is_some());
    }

    #[test]
    fn concurrent_refresh_surfaces_a_retryable_conflict() {
        let state = MirrorState::new();
        let _guard = state.try_begin_refresh().unwrap();
        let err = state.try_begin_refresh().unwrap_err();
        assert!(matches!(err, CurioError::RefreshInProgress));
        assert!(err.is_retryable());
    }

    #[test]
    fn failed_refresh_keeps_the_previous_version() {
        let state = MirrorState::new();
        {
            let _guard = state.begin_refresh().unwrap();
            // dropped without complete()
        }
        assert_eq!(state.cache_version(), 0);
        assert!(!state.is_refreshing());

        state.begin_refresh().unwrap().complete();
        assert_eq!(state.cache_version(), 1);
    }
}
