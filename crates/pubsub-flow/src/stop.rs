//! Cooperative stop request shared between the producer and the poll loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A one-way stop request. Starts cleared; once set it stays set.
///
/// Clones share the same flag. Writes use `Release` and reads use `Acquire`, so
/// the poll loop sees every write the producer made before requesting stop.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    requested: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests stop. Returns `true` only for the call that flipped the flag.
    pub fn request_stop(&self) -> bool {
        !self.requested.swap(true, Ordering::AcqRel)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_is_monotonic() {
        let flag = StopFlag::new();
        assert!(!flag.is_stop_requested());
        assert!(flag.request_stop());
        assert!(flag.is_stop_requested());
        assert!(!flag.request_stop());
        assert!(flag.is_stop_requested());
    }

    #[test]
    fn test_clones_share_state() {
        let flag = StopFlag::new();
        let observer = flag.clone();
        flag.request_stop();
        assert!(observer.is_stop_requested());
    }
}
