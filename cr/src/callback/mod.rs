//! Correlated request/reply over a one-way transport
//!
//! A request is published with a fresh correlation id and the caller waits on
//! a single-assignment slot. The inbound path resolves the slot by id, or the
//! wait runs out. Exactly one of the two wins.

mod manager;
mod metrics;
mod registry;

pub use manager::{CallbackManager, Resolution};
pub use metrics::CallbackMetrics;
pub use registry::{CallState, CorrelationRegistry, PendingCall};
