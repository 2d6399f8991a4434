//! HeartbeatNotifier implementation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::{CorrelationId, Message, MessageBody, ProviderRecord, ProviderSlot};
use crate::error::RegistryError;
use crate::transport::{Destination, Publisher};

/// Result of a single heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Heartbeat handed to the transport
    Published,

    /// No provider record set; nothing sent
    Skipped,

    /// The transport rejected the heartbeat; logged
    Failed,
}

/// Snapshot of the active schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifierSchedule {
    pub initial_delay: Duration,
    pub period: Duration,
    pub running: bool,
}

/// The part of the notifier the scheduled task needs
struct Ticker {
    publisher: Arc<dyn Publisher>,
    hostname: String,
    provider: ProviderSlot,
    ticks: AtomicU64,
}

impl Ticker {
    async fn tick(&self) -> TickOutcome {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        let Some(provider) = self.provider.get() else {
            warn!("No capability provider is registered, skipping heartbeat");
            return TickOutcome::Skipped;
        };

        let correlation_id = CorrelationId::new();
        let message = Message::new(
            &self.hostname,
            correlation_id.clone(),
            MessageBody::Pong {
                provider: provider.as_ref().clone(),
            },
        );

        match self.publisher.publish(&Destination::Registration, message).await {
            Ok(()) => {
                debug!(%correlation_id, identity = %provider.identity, "Heartbeat published");
                TickOutcome::Published
            }
            Err(e) => {
                error!(%correlation_id, error = %e, "Unexpected error on capability registry notification");
                TickOutcome::Failed
            }
        }
    }
}

struct Schedule {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
    initial_delay: Duration,
    period: Duration,
}

/// Fixed-delay loop: the next tick starts `period` after the previous one ends
async fn run_schedule(ticker: Arc<Ticker>, initial_delay: Duration, period: Duration, mut stop_rx: watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::time::sleep(initial_delay) => {}
        _ = stop_rx.changed() => return,
    }

    loop {
        if *stop_rx.borrow() {
            break;
        }
        ticker.tick().await;

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = stop_rx.changed() => break,
        }
    }
    debug!("run_schedule: exiting");
}

/// Periodically publishes the active provider record
pub struct HeartbeatNotifier {
    ticker: Arc<Ticker>,
    shutdown_wait: Duration,
    schedule: Mutex<Option<Schedule>>,

    /// Held for the whole of `stop` so every caller waits for the same teardown
    stopping: tokio::sync::Mutex<()>,
}

impl HeartbeatNotifier {
    /// Create a stopped notifier
    ///
    /// `shutdown_wait` bounds how long `stop` waits for an in-flight heartbeat.
    pub fn new(publisher: Arc<dyn Publisher>, hostname: impl Into<String>, shutdown_wait: Duration) -> Self {
        Self::with_slot(publisher, hostname, shutdown_wait, ProviderSlot::new())
    }

    /// Create a stopped notifier announcing whatever record `provider` holds
    pub fn with_slot(
        publisher: Arc<dyn Publisher>,
        hostname: impl Into<String>,
        shutdown_wait: Duration,
        provider: ProviderSlot,
    ) -> Self {
        let hostname = hostname.into();
        debug!(%hostname, ?shutdown_wait, "HeartbeatNotifier::with_slot: called");
        Self {
            ticker: Arc::new(Ticker {
                publisher,
                hostname,
                provider,
                ticks: AtomicU64::new(0),
            }),
            shutdown_wait,
            schedule: Mutex::new(None),
            stopping: tokio::sync::Mutex::new(()),
        }
    }

    /// Replace the record announced by subsequent heartbeats
    pub fn set_provider(&self, record: Arc<ProviderRecord>) {
        debug!(identity = %record.identity, "HeartbeatNotifier::set_provider: called");
        self.ticker.provider.set(record);
    }

    /// Forget the record; later heartbeats become no-ops
    pub fn clear_provider(&self) {
        debug!("HeartbeatNotifier::clear_provider: called");
        self.ticker.provider.clear();
    }

    pub fn provider(&self) -> Option<Arc<ProviderRecord>> {
        self.ticker.provider.get()
    }

    /// Begin the heartbeat schedule
    ///
    /// No-op if already running. Fails only if no Tokio runtime is available
    /// to drive the schedule, or the period is zero.
    pub fn start(&self, initial_delay: Duration, period: Duration) -> Result<(), RegistryError> {
        debug!(?initial_delay, ?period, "HeartbeatNotifier::start: called");
        let mut schedule = self.schedule.lock().unwrap_or_else(PoisonError::into_inner);
        if schedule.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            debug!("HeartbeatNotifier::start: already running");
            return Ok(());
        }
        if period.is_zero() {
            return Err(RegistryError::InvalidState("notifier period must be greater than zero".to_string()));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| RegistryError::Scheduler(e.to_string()))?;
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = runtime.spawn(run_schedule(self.ticker.clone(), initial_delay, period, stop_rx));

        *schedule = Some(Schedule {
            stop_tx,
            handle,
            initial_delay,
            period,
        });
        info!(
            initial_delay_ms = initial_delay.as_millis() as u64,
            period_ms = period.as_millis() as u64,
            "Notifier started"
        );
        Ok(())
    }

    /// Run one heartbeat now
    pub async fn tick(&self) -> TickOutcome {
        debug!("HeartbeatNotifier::tick: called");
        self.ticker.tick().await
    }

    /// Stop the schedule
    ///
    /// Idempotent. Waits up to the shutdown grace for an in-flight heartbeat,
    /// then cancels it. No heartbeat fires after this returns, including for
    /// callers that arrive while another `stop` is still waiting.
    pub async fn stop(&self) {
        debug!("HeartbeatNotifier::stop: called");
        let _stopping = self.stopping.lock().await;
        let taken = self.schedule.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(Schedule {
            stop_tx, mut handle, ..
        }) = taken
        else {
            debug!("HeartbeatNotifier::stop: not running");
            return;
        };

        info!("Shutting down the notifier schedule");
        let _ = stop_tx.send(true);

        if tokio::time::timeout(self.shutdown_wait, &mut handle).await.is_err() {
            warn!(
                shutdown_wait_ms = self.shutdown_wait.as_millis() as u64,
                "Heartbeat still running after grace period, cancelling"
            );
            handle.abort();
            let _ = handle.await;
        }
        debug!("HeartbeatNotifier::stop: stopped");
    }

    pub fn is_running(&self) -> bool {
        self.schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    pub fn schedule(&self) -> Option<NotifierSchedule> {
        self.schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| NotifierSchedule {
                initial_delay: s.initial_delay,
                period: s.period,
                running: !s.handle.is_finished(),
            })
    }

    /// Heartbeats attempted so far, including skipped ones
    pub fn tick_count(&self) -> u64 {
        self.ticker.ticks.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Capability, MessageType, ProviderIdentity};
    use crate::transport::mock::MockPublisher;

    fn record() -> Arc<ProviderRecord> {
        Arc::new(ProviderRecord::new(
            ProviderIdentity::new("node-a"),
            vec![Capability::new("inventory")],
        ))
    }

    fn notifier(publisher: Arc<MockPublisher>) -> HeartbeatNotifier {
        HeartbeatNotifier::new(publisher, "test-host", Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_tick_without_provider_skips() {
        let publisher = Arc::new(MockPublisher::new());
        let n = notifier(publisher.clone());

        assert_eq!(n.tick().await, TickOutcome::Skipped);
        assert_eq!(publisher.count(), 0);
    }

    #[tokio::test]
    async fn test_tick_publishes_pong_with_record() {
        let publisher = Arc::new(MockPublisher::new());
        let n = notifier(publisher.clone());
        n.set_provider(record());

        assert_eq!(n.tick().await, TickOutcome::Published);
        let (destination, message) = publisher.last().unwrap();
        assert_eq!(destination, Destination::Registration);
        assert_eq!(message.message_type(), MessageType::Pong);
        match message.payload {
            MessageBody::Pong { provider } => assert_eq!(provider.identity.name, "node-a"),
            other => panic!("Wrong payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_each_tick_uses_fresh_correlation_id() {
        let publisher = Arc::new(MockPublisher::new());
        let n = notifier(publisher.clone());
        n.set_provider(record());

        n.tick().await;
        n.tick().await;
        let sent = publisher.sent();
        assert_ne!(sent[0].1.correlation_id(), sent[1].1.correlation_id());
    }

    #[tokio::test]
    async fn test_tick_failure_is_absorbed() {
        let publisher = Arc::new(MockPublisher::failing());
        let n = notifier(publisher.clone());
        n.set_provider(record());

        assert_eq!(n.tick().await, TickOutcome::Failed);
    }

    #[tokio::test]
    async fn test_schedule_keeps_running_after_failures() {
        let publisher = Arc::new(MockPublisher::failing());
        let n = notifier(publisher.clone());
        n.set_provider(record());

        n.start(Duration::ZERO, Duration::from_millis(10)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(n.is_running());
        let failed_ticks = n.tick_count();
        assert!(failed_ticks >= 2, "expected repeated ticks, got {}", failed_ticks);

        // Once the transport recovers, heartbeats go through
        publisher.set_failing(false);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(publisher.count_of(MessageType::Pong) >= 1);

        n.stop().await;
    }

    #[tokio::test]
    async fn test_start_twice_yields_one_schedule() {
        let publisher = Arc::new(MockPublisher::new());
        let n = notifier(publisher.clone());
        n.set_provider(record());

        n.start(Duration::from_millis(30), Duration::from_secs(60)).unwrap();
        n.start(Duration::from_millis(30), Duration::from_secs(60)).unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        // One schedule means exactly one initial heartbeat within a long period
        assert_eq!(publisher.count(), 1);
        n.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_safe_unstarted() {
        let publisher = Arc::new(MockPublisher::new());
        let n = notifier(publisher.clone());

        n.stop().await;
        assert!(!n.is_running());

        n.start(Duration::ZERO, Duration::from_millis(10)).unwrap();
        n.stop().await;
        n.stop().await;
        assert!(!n.is_running());
        assert!(n.schedule().is_none());
    }

    #[tokio::test]
    async fn test_no_tick_after_stop() {
        let publisher = Arc::new(MockPublisher::new());
        let n = notifier(publisher.clone());
        n.set_provider(record());

        n.start(Duration::ZERO, Duration::from_millis(10)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        n.stop().await;

        let after_stop = publisher.count();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(publisher.count(), after_stop);
    }

    #[tokio::test]
    async fn test_stop_cancels_slow_tick_after_grace() {
        let publisher = Arc::new(MockPublisher::new());
        publisher.set_delay(Duration::from_secs(10));
        let n = HeartbeatNotifier::new(publisher.clone(), "test-host", Duration::from_millis(50));
        n.set_provider(record());

        n.start(Duration::ZERO, Duration::from_millis(10)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        n.stop().await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!n.is_running());
        assert_eq!(publisher.count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_stop_waits_for_in_flight_tick() {
        let publisher = Arc::new(MockPublisher::new());
        publisher.set_delay(Duration::from_millis(300));
        let n = Arc::new(HeartbeatNotifier::new(publisher.clone(), "test-host", Duration::from_secs(2)));
        n.set_provider(record());

        n.start(Duration::ZERO, Duration::from_secs(60)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let first = {
            let n = n.clone();
            tokio::spawn(async move { n.stop().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        n.stop().await;
        let at_second_return = publisher.count_of(MessageType::Pong);

        first.await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(at_second_return, 1);
        assert_eq!(publisher.count_of(MessageType::Pong), at_second_return);
        assert!(!n.is_running());
    }

    #[tokio::test]
    async fn test_shared_slot_is_seen_by_notifier() {
        let publisher = Arc::new(MockPublisher::new());
        let slot = ProviderSlot::new();
        let n = HeartbeatNotifier::with_slot(publisher.clone(), "test-host", Duration::from_millis(50), slot.clone());

        slot.set(record());
        assert_eq!(n.tick().await, TickOutcome::Published);
        slot.clear();
        assert_eq!(n.tick().await, TickOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let publisher = Arc::new(MockPublisher::new());
        let n = notifier(publisher.clone());
        n.set_provider(record());

        n.start(Duration::ZERO, Duration::from_secs(60)).unwrap();
        n.stop().await;
        n.start(Duration::ZERO, Duration::from_secs(60)).unwrap();

        let schedule = n.schedule().unwrap();
        assert!(schedule.running);
        assert_eq!(schedule.period, Duration::from_secs(60));
        n.stop().await;
    }

    #[tokio::test]
    async fn test_zero_period_rejected() {
        let n = notifier(Arc::new(MockPublisher::new()));
        let err = n.start(Duration::ZERO, Duration::ZERO).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidState(_)));
        assert!(!n.is_running());
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let n = notifier(Arc::new(MockPublisher::new()));
        let err = n.start(Duration::ZERO, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, RegistryError::Scheduler(_)));
    }

    #[tokio::test]
    async fn test_clear_provider_turns_ticks_into_skips() {
        let publisher = Arc::new(MockPublisher::new());
        let n = notifier(publisher.clone());
        n.set_provider(record());
        assert!(n.provider().is_some());

        n.clear_provider();
        assert_eq!(n.tick().await, TickOutcome::Skipped);
        assert_eq!(publisher.count(), 0);
    }
}
