//! Heartbeat notifier
//!
//! Periodically announces the active provider record on a fixed-delay
//! schedule. Publish failures are logged and never stop the schedule.

mod config;
mod heartbeat;

pub use config::NotifierConfig;
pub use heartbeat::{HeartbeatNotifier, NotifierSchedule, TickOutcome};
