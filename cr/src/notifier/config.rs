//! Notifier configuration

use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Heartbeat schedule configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Delay before the first heartbeat in milliseconds
    #[serde(rename = "initial-delay-ms", default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Delay between the end of one heartbeat and the start of the next
    #[serde(rename = "period-ms", default = "default_period_ms")]
    pub period_ms: u64,

    /// How long `stop` waits for an in-flight heartbeat before cancelling it
    #[serde(rename = "shutdown-wait-ms", default = "default_shutdown_wait_ms")]
    pub shutdown_wait_ms: u64,
}

fn default_initial_delay_ms() -> u64 {
    0
}

fn default_period_ms() -> u64 {
    30_000
}

fn default_shutdown_wait_ms() -> u64 {
    2_000
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            period_ms: default_period_ms(),
            shutdown_wait_ms: default_shutdown_wait_ms(),
        }
    }
}

impl NotifierConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn shutdown_wait(&self) -> Duration {
        Duration::from_millis(self.shutdown_wait_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.period_ms == 0 {
            return Err(eyre!("notifier period-ms must be greater than zero"));
        }
        Ok(())
    }
}
