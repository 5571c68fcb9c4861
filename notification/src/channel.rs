use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Result;
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    /// Failures in the window reached the threshold.
    Triggered {
        failures: usize,
        threshold: usize,
        window_secs: u64,
        at: DateTime<Utc>,
    },
    /// The window holds no failures anymore.
    Recovered { window_secs: u64, at: DateTime<Utc> },
}

impl Alert {
    pub fn subject(&self) -> String {
        match self {
            Alert::Triggered {
                failures,
                window_secs,
                ..
            } => format!(
                "ALARM: {} file processor failure(s) in the last {}s",
                failures, window_secs
            ),
            Alert::Recovered { window_secs, .. } => format!(
                "OK: no file processor failures in the last {}s",
                window_secs
            ),
        }
    }
}

#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<()>;
}

/// Writes alerts to the tracing output.
pub struct LogAlertChannel;

#[async_trait]
impl AlertChannel for LogAlertChannel {
    async fn send(&self, alert: &Alert) -> Result<()> {
        match alert {
            Alert::Triggered { .. } => error!(alert = ?alert, "{}", alert.subject()),
            Alert::Recovered { .. } => info!(alert = ?alert, "{}", alert.subject()),
        }
        Ok(())
    }
}

/// Posts alerts as JSON to an HTTP endpoint (chat webhook, pager bridge).
#[cfg(feature = "webhook")]
pub struct WebhookAlertChannel {
    client: rquest::Client,
    url: String,
}

#[cfg(feature = "webhook")]
impl WebhookAlertChannel {
    pub fn new(url: &str) -> Result<Self> {
        let client = rquest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| common::Error::Alert(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[cfg(feature = "webhook")]
#[async_trait]
impl AlertChannel for WebhookAlertChannel {
    async fn send(&self, alert: &Alert) -> Result<()> {
        let body = serde_json::to_vec(&serde_json::json!({
            "subject": alert.subject(),
            "alert": alert,
        }))?;

        let response = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| common::Error::Alert(e.to_string()))?;

        if !response.status().is_success() {
            error!(status = %response.status(), url = %self.url, "Alert webhook rejected notification");
            return Err(common::Error::Alert(format!(
                "webhook responded with {}",
                response.status()
            )));
        }

        Ok(())
    }
}
