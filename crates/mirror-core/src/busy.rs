//! The reconciliation lock.
//!
//! A shared atomic flag that is true exactly while a pass runs. Readers only
//! observe it; the single writer holds a [`BusyGuard`] that clears the flag
//! on drop, so an early return or a panic cannot leave it stuck.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Observable busy/idle state shared between the reconciler and its callers.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Marks the flag busy if it is idle.
    ///
    /// Returns `None` when another pass already holds it.
    pub fn acquire(&self) -> Option<BusyGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(self.0.clone()))
    }
}

/// Holds the flag busy until dropped.
#[derive(Debug)]
pub struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_sets_and_clears() {
        let flag = BusyFlag::new();
        assert!(!flag.is_busy());
        {
            let _guard = flag.acquire().unwrap();
            assert!(flag.is_busy());
        }
        assert!(!flag.is_busy());
    }

    #[test]
    fn test_second_acquire_refused() {
        let flag = BusyFlag::new();
        let _guard = flag.acquire().unwrap();
        assert!(flag.clone().acquire().is_none());
    }

    #[test]
    fn test_cleared_after_panic() {
        let flag = BusyFlag::new();
        let observed = flag.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = flag.acquire().unwrap();
            panic!("walk blew up");
        });
        assert!(result.is_err());
        assert!(!observed.is_busy());
    }
}
