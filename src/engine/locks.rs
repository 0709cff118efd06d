//! Per-branch writer locks.
//!
//! Every write to a branch reads its tip, builds a commit on top of it and
//! moves the ref. Writers to the same (repository, branch) pair take the
//! same mutex for that whole sequence; writers to different pairs never
//! contend. The ref update itself is still compare-and-swap, so a second
//! process on the same storage root gets `ConcurrentModification` instead
//! of a lost update.
//!
//! Each location also has one repository-wide slot for operations whose
//! precondition spans every branch, such as seeding the first commit.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::storage::{BranchName, RepositoryLocation};

/// idle slots are swept once the table grows past this many entries
const SWEEP_THRESHOLD: usize = 1024;

/// `None` is the repository-wide slot of a location
type LockKey = (RepositoryLocation, Option<BranchName>);

/// Table of writer mutexes keyed by (location, branch).
#[derive(Default)]
pub struct BranchLocks {
    slots: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl BranchLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the mutex guarding `branch` in `location`.
    ///
    /// Callers hold the returned handle and lock it for the duration of the
    /// write:
    ///
    /// ```ignore
    /// let slot = locks.slot(&location, &branch);
    /// let _guard = slot.lock();
    /// ```
    pub fn slot(&self, location: &RepositoryLocation, branch: &BranchName) -> Arc<Mutex<()>> {
        self.slot_for((location.clone(), Some(branch.clone())))
    }

    /// Get the repository-wide mutex of `location`.
    ///
    /// Holders that also write a branch take this slot first, then the
    /// branch slot.
    pub fn repository(&self, location: &RepositoryLocation) -> Arc<Mutex<()>> {
        self.slot_for((location.clone(), None))
    }

    fn slot_for(&self, key: LockKey) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock();

        if slots.len() >= SWEEP_THRESHOLD {
            // only the table holds a reference: nobody is writing there
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        }

        slots
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop every slot of `location`, used when the repository is destroyed.
    pub fn forget(&self, location: &RepositoryLocation) {
        self.slots.lock().retain(|(loc, _), _| loc != location);
    }

    /// number of tracked slots
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn key(location: &str, branch: &str) -> (RepositoryLocation, BranchName) {
        (
            RepositoryLocation::new(location).unwrap(),
            BranchName::new(branch).unwrap(),
        )
    }

    #[test]
    fn test_same_key_same_slot() {
        let locks = BranchLocks::new();
        let (loc, main) = key("user_1/repository_1", "main");

        let a = locks.slot(&loc, &main);
        let b = locks.slot(&loc, &main);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_different_keys_do_not_contend() {
        let locks = BranchLocks::new();
        let (loc, main) = key("user_1/repository_1", "main");
        let (_, dev) = key("user_1/repository_1", "dev");
        let (other, _) = key("user_1/repository_2", "main");

        let main_slot = locks.slot(&loc, &main);
        let _held = main_slot.lock();

        assert!(locks.slot(&loc, &dev).try_lock().is_some());
        assert!(locks.slot(&other, &main).try_lock().is_some());
        assert!(locks.slot(&loc, &main).try_lock().is_none());
    }

    #[test]
    fn test_repository_slot_is_separate() {
        let locks = BranchLocks::new();
        let (loc, main) = key("user_1/repository_1", "main");
        let (other, _) = key("user_1/repository_2", "main");

        let repo_slot = locks.repository(&loc);
        assert!(Arc::ptr_eq(&repo_slot, &locks.repository(&loc)));
        assert!(!Arc::ptr_eq(&repo_slot, &locks.repository(&other)));

        let _held = repo_slot.lock();
        assert!(locks.slot(&loc, &main).try_lock().is_some());
        assert!(locks.repository(&loc).try_lock().is_none());

        locks.forget(&loc);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_writers_on_same_branch_are_serialized() {
        let locks = Arc::new(BranchLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let (loc, main) = key("user_1/repository_1", "main");

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let active = Arc::clone(&active);
                let (loc, main) = (loc.clone(), main.clone());
                thread::spawn(move || {
                    let slot = locks.slot(&loc, &main);
                    let _guard = slot.lock();
                    assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                    thread::sleep(Duration::from_millis(5));
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_forget_location() {
        let locks = BranchLocks::new();
        let (a, main) = key("user_1/repository_1", "main");
        let (b, _) = key("user_1/repository_2", "main");

        locks.slot(&a, &main);
        locks.slot(&b, &main);
        locks.forget(&a);
        assert_eq!(locks.len(), 1);
    }
}
