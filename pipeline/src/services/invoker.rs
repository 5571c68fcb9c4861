use crate::models::ObjectCreatedEvent;
use crate::processor::{FileProcessor, ProcessingOutcome};
use crate::utils::retry::retry_with_backoff;
use common::config::ProcessorSettings;
use common::{Error, Result};
use futures::future::join_all;
use notification::{ErrorSignal, FailureMonitor};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, Copy)]
pub struct InvocationPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl InvocationPolicy {
    pub fn from_settings(settings: &ProcessorSettings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.invocation_timeout_secs),
            max_attempts: settings.max_attempts,
            base_delay_ms: settings.retry_base_delay_ms,
        }
    }
}

/// Runs the processor the way a serverless substrate would: every attempt
/// is a fresh, time-boxed `process` call, failed attempts are retried with
/// backoff, and each attempt reports one signal to the failure monitor.
pub struct Invoker {
    processor: Arc<FileProcessor>,
    monitor: Arc<FailureMonitor>,
    policy: InvocationPolicy,
}

impl Invoker {
    pub fn new(
        processor: Arc<FileProcessor>,
        monitor: Arc<FailureMonitor>,
        policy: InvocationPolicy,
    ) -> Self {
        Self {
            processor,
            monitor,
            policy,
        }
    }

    pub async fn invoke(&self, event: &ObjectCreatedEvent) -> Result<ProcessingOutcome> {
        retry_with_backoff(self.policy.max_attempts, self.policy.base_delay_ms, |attempt| {
            self.attempt(event, attempt)
        })
        .await
    }

    /// Invokes every event independently and concurrently.
    pub async fn invoke_all(
        &self,
        events: Vec<ObjectCreatedEvent>,
    ) -> Vec<(ObjectCreatedEvent, Result<ProcessingOutcome>)> {
        let results = join_all(events.iter().map(|event| self.invoke(event))).await;
        events.into_iter().zip(results).collect()
    }

    async fn attempt(&self, event: &ObjectCreatedEvent, attempt: u32) -> Result<ProcessingOutcome> {
        info!(event = %event, attempt, "Processing object");

        let result = match tokio::time::timeout(self.policy.timeout, self.processor.process(event)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.policy.timeout.as_secs())),
        };

        match &result {
            Ok(_) => self.monitor.record(ErrorSignal::Success).await,
            Err(e) => {
                error!(event = %event, attempt, error = %e, "Invocation failed");
                self.monitor.record(ErrorSignal::Failure).await;
            }
        }

        result
    }
}
