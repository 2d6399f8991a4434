//! Callback manager counters

use std::sync::atomic::{AtomicU64, Ordering};

use super::registry::CallState;

/// Snapshot of callback manager activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackMetrics {
    pub pending: usize,
    pub submitted: u64,
    pub resolved: u64,
    pub timed_out: u64,
    pub publish_failures: u64,
    pub shutdown_rejections: u64,
    pub unknown_correlations: u64,
    pub caller_gone: u64,
}

/// Thread-safe counters behind [`CallbackMetrics`]
#[derive(Debug, Default)]
pub(crate) struct Counters {
    submitted: AtomicU64,
    resolved: AtomicU64,
    timed_out: AtomicU64,
    publish_failures: AtomicU64,
    shutdown_rejections: AtomicU64,
    unknown_correlations: AtomicU64,
    caller_gone: AtomicU64,
}

impl Counters {
    /// Count a call reaching a state
    pub(crate) fn record(&self, state: CallState) {
        let counter = match state {
            CallState::Created => &self.submitted,
            CallState::Pending => return,
            CallState::Resolved => &self.resolved,
            CallState::TimedOut => &self.timed_out,
            CallState::PublishFailed => &self.publish_failures,
            CallState::ShutdownRejected => &self.shutdown_rejections,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unknown_correlation(&self) {
        self.unknown_correlations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn caller_gone(&self) {
        self.caller_gone.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, pending: usize) -> CallbackMetrics {
        CallbackMetrics {
            pending,
            submitted: self.submitted.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            shutdown_rejections: self.shutdown_rejections.load(Ordering::Relaxed),
            unknown_correlations: self.unknown_correlations.load(Ordering::Relaxed),
            caller_gone: self.caller_gone.load(Ordering::Relaxed),
        }
    }
}
