//! The process-wide merged report.
//!
//! Readers take an immutable snapshot with [`Store::report`]; it never
//! changes underneath them. [`Store::submit`] merges into a new value and
//! publishes it with a compare-and-swap, retrying if another submission
//! won the race, so concurrent submissions are never lost. Every publish
//! bumps a version counter that [`Subscription`]s wait on.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;

use crate::report::Report;

pub struct Store {
    report: ArcSwap<Report>,
    version: watch::Sender<u64>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::with_report(Report::default())
    }

    pub fn with_report(report: Report) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            report: ArcSwap::from_pointee(report),
            version,
        }
    }

    /// Merge `report` into the shared state and wake every subscriber.
    pub fn submit(&self, report: &Report) {
        self.report.rcu(|current| current.merge(report));
        self.version.send_modify(|v| *v = v.wrapping_add(1));
        log::debug!(
            "merged report ({} nodes), {} subscribers",
            report.node_count(),
            self.version.receiver_count()
        );
    }

    /// Snapshot of the merged report.
    pub fn report(&self) -> Arc<Report> {
        self.report.load_full()
    }

    /// Number of merges published so far.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.version.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.version.receiver_count()
    }
}

/// Wake-up handle for one consumer. Dropping it unregisters.
pub struct Subscription {
    rx: watch::Receiver<u64>,
}

impl Subscription {
    /// Wait for the next merge. Returns `false` once the store is gone.
    ///
    /// Several merges between two calls are coalesced into one wake-up.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
