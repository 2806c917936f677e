//! Transport leases
//!
//! At most one session may hold a physical transport at a time. Sessions and
//! probes that must exclude each other share one [`TransportLeases`] registry;
//! an open session keeps a [`TransportLease`] guard and the transport is
//! released when the guard drops.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

/// Registry of transports currently held
#[derive(Debug, Clone, Default)]
pub struct TransportLeases {
    held: Arc<Mutex<HashSet<String>>>,
}

impl TransportLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the transport, or `None` if someone else holds it
    pub fn try_acquire(&self, path: &str) -> Option<TransportLease> {
        let mut held = self.held.lock();
        if !held.insert(path.to_string()) {
            return None;
        }
        trace!("Lease acquired: {}", path);
        Some(TransportLease {
            path: path.to_string(),
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_held(&self, path: &str) -> bool {
        self.held.lock().contains(path)
    }

    /// Number of transports currently held
    pub fn len(&self) -> usize {
        self.held.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive hold on one transport; released on drop
#[derive(Debug)]
pub struct TransportLease {
    path: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl TransportLease {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for TransportLease {
    fn drop(&mut self) {
        self.held.lock().remove(&self.path);
        trace!("Lease released: {}", self.path);
    }
}
