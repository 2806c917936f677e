//! Cooperative stop request

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable stop flag
///
/// Set from a signal handler or another thread; acquisition loops check it
/// between read cycles and close their sessions before returning.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let stop = StopSignal::new();
        let other = stop.clone();
        assert!(!stop.is_requested());

        other.request_stop();
        assert!(stop.is_requested());
    }

    #[test]
    fn test_visible_across_threads() {
        let stop = StopSignal::new();
        let remote = stop.clone();
        std::thread::spawn(move || remote.request_stop()).join().unwrap();
        assert!(stop.is_requested());
    }
}
