//! Last-write-wins bookkeeping for callers that may start a new analysis before
//! the previous one has finished.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunTicket(u64);

impl RunTicket {
    /// Rebuilds a ticket from an id handed across an FFI boundary.
    pub fn from_id(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// Hands out tickets; only the most recently issued one is current.
#[derive(Debug, Default)]
pub struct LatestRun {
    latest: AtomicU64,
}

impl LatestRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a run, superseding every earlier ticket.
    pub fn begin(&self) -> RunTicket {
        RunTicket(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn is_current(&self, ticket: RunTicket) -> bool {
        self.latest.load(Ordering::Acquire) == ticket.0
    }

    /// Passes `value` through if `ticket` is still current, drops it otherwise.
    pub fn settle<T>(&self, ticket: RunTicket, value: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(value)
        } else {
            debug!("Discarding result of superseded run {}", ticket.0);
            None
        }
    }
}
