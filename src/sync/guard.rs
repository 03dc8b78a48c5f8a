use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Tracks which users have a sync running in this process, so that a login
/// sync and a scheduled sync for the same user never interleave.
#[derive(Debug, Clone, Default)]
pub struct SyncGuard {
    running: Arc<Mutex<HashSet<i64>>>,
}

/// Held for the duration of one user's sync; releases the slot on drop.
#[derive(Debug)]
pub struct SyncPermit {
    running: Arc<Mutex<HashSet<i64>>>,
    user_id: i64,
}

impl SyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the user's slot, or `None` when a sync is already running.
    pub fn try_acquire(&self, user_id: i64) -> Option<SyncPermit> {
        let mut running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        if !running.insert(user_id) {
            return None;
        }
        Some(SyncPermit {
            running: Arc::clone(&self.running),
            user_id,
        })
    }

    pub fn is_running(&self, user_id: i64) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&user_id)
    }
}

impl Drop for SyncPermit {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_refused_until_release() {
        let guard = SyncGuard::new();
        let permit = guard.try_acquire(1).unwrap();
        assert!(guard.try_acquire(1).is_none());
        assert!(guard.is_running(1));

        let other = guard.try_acquire(2);
        assert!(other.is_some());

        drop(permit);
        assert!(!guard.is_running(1));
        assert!(guard.try_acquire(1).is_some());
    }

    #[test]
    fn test_clones_share_state() {
        let guard = SyncGuard::new();
        let clone = guard.clone();
        let _permit = guard.try_acquire(7).unwrap();
        assert!(clone.try_acquire(7).is_none());
    }
}
