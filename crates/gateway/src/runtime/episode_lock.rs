//! Per-episode concurrency control.
//!
//! States within one episode are strictly ordered, so only one submit may
//! run per episode at a time. Concurrent submits for the same episode are
//! not an ordered scenario — the second caller is rejected as busy rather
//! than queued.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

/// Manages per-episode submit locks.
///
/// Each episode ID maps to a `Semaphore(1)`. Holding the permit grants
/// exclusive access for one submit; it auto-releases on drop.
pub struct EpisodeLockMap {
    locks: Mutex<HashMap<Uuid, Arc<Semaphore>>>,
}

impl Default for EpisodeLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl EpisodeLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the submit lock for an episode, or fail immediately if a
    /// submit is already in flight.
    pub fn try_acquire(&self, episode_id: Uuid) -> Result<OwnedSemaphorePermit, EpisodeBusy> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(episode_id)
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        sem.try_acquire_owned().map_err(|_| EpisodeBusy)
    }

    /// Number of tracked episodes (for monitoring).
    pub fn episode_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop lock entries that aren't actively held.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

/// Error returned when a submit is already in progress for the episode.
#[derive(Debug)]
pub struct EpisodeBusy;

impl std::fmt::Display for EpisodeBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "episode is busy — a submit is already in progress")
    }
}

impl std::error::Error for EpisodeBusy {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_access() {
        let map = EpisodeLockMap::new();
        let id = Uuid::new_v4();

        let permit1 = map.try_acquire(id).unwrap();
        drop(permit1);

        let permit2 = map.try_acquire(id).unwrap();
        drop(permit2);
    }

    #[test]
    fn concurrent_submit_rejected() {
        let map = EpisodeLockMap::new();
        let id = Uuid::new_v4();

        let _held = map.try_acquire(id).unwrap();
        assert!(map.try_acquire(id).is_err());
    }

    #[test]
    fn different_episodes_independent() {
        let map = EpisodeLockMap::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let _pa = map.try_acquire(a).unwrap();
        let _pb = map.try_acquire(b).unwrap();
        assert_eq!(map.episode_count(), 2);
    }

    #[test]
    fn prune_removes_only_idle() {
        let map = EpisodeLockMap::new();
        let held_id = Uuid::new_v4();
        let idle_id = Uuid::new_v4();

        let _held = map.try_acquire(held_id).unwrap();
        drop(map.try_acquire(idle_id).unwrap());

        map.prune_idle();
        assert_eq!(map.episode_count(), 1);
    }
}
