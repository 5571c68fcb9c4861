use crate::channel::{Alert, AlertChannel};
use chrono::Utc;
use common::config::MonitorSettings;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Outcome of one processor invocation, as seen by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSignal {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Ok,
    Alarm,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub state: MonitorState,
    pub failures_in_window: usize,
    pub threshold: usize,
    pub window_secs: u64,
    pub total_successes: u64,
    pub total_failures: u64,
}

struct Window {
    failures: VecDeque<Instant>,
    state: MonitorState,
    total_successes: u64,
    total_failures: u64,
}

enum Delivery {
    Alert(Alert),
    Flush(oneshot::Sender<()>),
}

/// Counts invocation failures over a rolling window and alerts on
/// state changes.
///
/// Alerts are queued while the window lock is held and sent by a single
/// delivery task, so the channel sees them in transition order.
pub struct FailureMonitor {
    window: Duration,
    threshold: usize,
    inner: Mutex<Window>,
    outbox: mpsc::UnboundedSender<Delivery>,
}

impl FailureMonitor {
    /// Must be called within a tokio runtime: it spawns the delivery task.
    pub fn new(window: Duration, threshold: usize, channel: Arc<dyn AlertChannel>) -> Self {
        Self {
            window,
            threshold: threshold.max(1),
            inner: Mutex::new(Window {
                failures: VecDeque::new(),
                state: MonitorState::Ok,
                total_successes: 0,
                total_failures: 0,
            }),
            outbox: spawn_delivery(channel),
        }
    }

    pub fn from_settings(settings: &MonitorSettings, channel: Arc<dyn AlertChannel>) -> Self {
        Self::new(
            Duration::from_secs(settings.window_secs),
            settings.threshold,
            channel,
        )
    }

    pub async fn record(&self, signal: ErrorSignal) {
        self.observe(signal, Instant::now()).await;
    }

    /// Records a signal that happened at `now` and queues any resulting alert.
    pub async fn observe(&self, signal: ErrorSignal, now: Instant) -> Option<Alert> {
        let mut window = self.inner.lock().await;
        match signal {
            ErrorSignal::Success => window.total_successes += 1,
            ErrorSignal::Failure => {
                window.total_failures += 1;
                window.failures.push_back(now);
            }
        }
        self.transition(&mut window, now)
    }

    /// Re-evaluates the window without a new signal, so recovery is reported
    /// even when traffic stops.
    pub async fn evaluate(&self, now: Instant) -> Option<Alert> {
        let mut window = self.inner.lock().await;
        self.transition(&mut window, now)
    }

    /// Waits until every alert queued so far has been handed to the channel.
    pub async fn flush(&self) {
        let (done, delivered) = oneshot::channel();
        if self.outbox.send(Delivery::Flush(done)).is_ok() {
            let _ = delivered.await;
        }
    }

    pub async fn status(&self) -> MonitorStatus {
        self.status_at(Instant::now()).await
    }

    pub async fn status_at(&self, now: Instant) -> MonitorStatus {
        let mut window = self.inner.lock().await;
        self.prune(&mut window, now);
        MonitorStatus {
            state: window.state,
            failures_in_window: window.failures.len(),
            threshold: self.threshold,
            window_secs: self.window.as_secs(),
            total_successes: window.total_successes,
            total_failures: window.total_failures,
        }
    }

    /// Spawns a task that re-evaluates the window every `every`.
    pub fn spawn_evaluator(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                self.evaluate(Instant::now()).await;
            }
        })
    }

    fn prune(&self, window: &mut Window, now: Instant) {
        while let Some(oldest) = window.failures.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                window.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn transition(&self, window: &mut Window, now: Instant) -> Option<Alert> {
        self.prune(window, now);
        let failures = window.failures.len();

        let alert = match window.state {
            MonitorState::Ok if failures >= self.threshold => {
                window.state = MonitorState::Alarm;
                Some(Alert::Triggered {
                    failures,
                    threshold: self.threshold,
                    window_secs: self.window.as_secs(),
                    at: Utc::now(),
                })
            }
            MonitorState::Alarm if failures == 0 => {
                window.state = MonitorState::Ok;
                Some(Alert::Recovered {
                    window_secs: self.window.as_secs(),
                    at: Utc::now(),
                })
            }
            _ => None,
        }?;

        if self.outbox.send(Delivery::Alert(alert.clone())).is_err() {
            error!(subject = %alert.subject(), "Alert delivery task has stopped");
        }
        Some(alert)
    }
}

fn spawn_delivery(channel: Arc<dyn AlertChannel>) -> mpsc::UnboundedSender<Delivery> {
    let (outbox, mut queue) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(delivery) = queue.recv().await {
            match delivery {
                Delivery::Alert(alert) => {
                    debug!(subject = %alert.subject(), "Delivering alert");
                    // A broken alert channel must not fail the invocation being recorded.
                    if let Err(e) = channel.send(&alert).await {
                        error!(error = %e, subject = %alert.subject(), "Failed to deliver alert");
                    }
                }
                Delivery::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
    });
    outbox
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingChannel {
        sent: std::sync::Mutex<Vec<Alert>>,
    }

    #[async_trait]
    impl AlertChannel for RecordingChannel {
        async fn send(&self, alert: &Alert) -> common::Result<()> {
            self.sent.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    struct BrokenChannel;

    #[async_trait]
    impl AlertChannel for BrokenChannel {
        async fn send(&self, _alert: &Alert) -> common::Result<()> {
            Err(common::Error::Alert("channel down".into()))
        }
    }

    fn monitor(threshold: usize) -> (FailureMonitor, Arc<RecordingChannel>) {
        let channel = Arc::new(RecordingChannel::default());
        let monitor = FailureMonitor::new(Duration::from_secs(60), threshold, channel.clone());
        (monitor, channel)
    }

    #[tokio::test]
    async fn test_successes_never_alert() {
        let (monitor, channel) = monitor(1);
        let start = Instant::now();

        for i in 0..10 {
            let alert = monitor
                .observe(ErrorSignal::Success, start + Duration::from_secs(i))
                .await;
            assert!(alert.is_none());
        }

        monitor.flush().await;
        assert!(channel.sent.lock().unwrap().is_empty());
        let status = monitor.status_at(start).await;
        assert_eq!(status.state, MonitorState::Ok);
        assert_eq!(status.total_successes, 10);
    }

    #[tokio::test]
    async fn test_single_failure_triggers_at_threshold_one() {
        let (monitor, channel) = monitor(1);
        let start = Instant::now();

        let alert = monitor.observe(ErrorSignal::Failure, start).await;
        monitor.flush().await;

        assert!(matches!(alert, Some(Alert::Triggered { failures: 1, .. })));
        assert_eq!(channel.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_alarm_is_not_repeated_while_failing() {
        let (monitor, channel) = monitor(1);
        let start = Instant::now();

        monitor.observe(ErrorSignal::Failure, start).await;
        monitor
            .observe(ErrorSignal::Failure, start + Duration::from_secs(5))
            .await;
        monitor
            .observe(ErrorSignal::Failure, start + Duration::from_secs(10))
            .await;
        monitor.flush().await;

        assert_eq!(channel.sent.lock().unwrap().len(), 1);
        assert_eq!(monitor.status_at(start + Duration::from_secs(10)).await.failures_in_window, 3);
    }

    #[tokio::test]
    async fn test_threshold_counts_failures_within_window_only() {
        let (monitor, channel) = monitor(3);
        let start = Instant::now();

        monitor.observe(ErrorSignal::Failure, start).await;
        monitor
            .observe(ErrorSignal::Failure, start + Duration::from_secs(30))
            .await;
        // The first failure has aged out by now.
        let alert = monitor
            .observe(ErrorSignal::Failure, start + Duration::from_secs(61))
            .await;
        assert!(alert.is_none());

        let alert = monitor
            .observe(ErrorSignal::Failure, start + Duration::from_secs(62))
            .await;
        assert!(matches!(alert, Some(Alert::Triggered { failures: 3, threshold: 3, .. })));
        monitor.flush().await;
        assert_eq!(channel.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_recovers_when_window_drains() {
        let (monitor, channel) = monitor(1);
        let start = Instant::now();

        monitor.observe(ErrorSignal::Failure, start).await;
        assert!(monitor.evaluate(start + Duration::from_secs(59)).await.is_none());

        let alert = monitor.evaluate(start + Duration::from_secs(60)).await;
        assert!(matches!(alert, Some(Alert::Recovered { window_secs: 60, .. })));

        monitor.flush().await;
        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[1], Alert::Recovered { .. }));
    }

    #[tokio::test]
    async fn test_broken_channel_does_not_block_state_change() {
        let monitor = FailureMonitor::new(Duration::from_secs(60), 1, Arc::new(BrokenChannel));
        let start = Instant::now();

        let alert = monitor.observe(ErrorSignal::Failure, start).await;
        monitor.flush().await;

        assert!(alert.is_some());
        assert_eq!(monitor.status_at(start).await.state, MonitorState::Alarm);
    }

    /// Holds each delivery until released, so a later alert could overtake
    /// an earlier one if delivery were not serialised.
    struct SlowChannel {
        sent: std::sync::Mutex<Vec<Alert>>,
        gate: tokio::sync::Semaphore,
    }

    #[async_trait]
    impl AlertChannel for SlowChannel {
        async fn send(&self, alert: &Alert) -> common::Result<()> {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| common::Error::Alert(e.to_string()))?;
            permit.forget();
            self.sent.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_alerts_arrive_in_transition_order() {
        let channel = Arc::new(SlowChannel {
            sent: std::sync::Mutex::new(Vec::new()),
            gate: tokio::sync::Semaphore::new(0),
        });
        let monitor = FailureMonitor::new(Duration::from_secs(60), 1, channel.clone());
        let start = Instant::now();

        // Both transitions happen before the channel accepts anything.
        assert!(monitor.observe(ErrorSignal::Failure, start).await.is_some());
        assert!(monitor.evaluate(start + Duration::from_secs(60)).await.is_some());
        assert!(channel.sent.lock().unwrap().is_empty());

        channel.gate.add_permits(2);
        monitor.flush().await;

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[0], Alert::Triggered { .. }));
        assert!(matches!(sent[1], Alert::Recovered { .. }));
    }
}
