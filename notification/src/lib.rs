//! Failure monitoring for the ingest pipeline.
//!
//! Every processor invocation reports an [`ErrorSignal`]. The
//! [`FailureMonitor`] keeps the failures of a rolling window and raises an
//! [`Alert`] on the configured [`AlertChannel`] when the window crosses its
//! threshold, then a recovery alert once the window is clean again.

pub mod channel;
pub mod monitor;
pub mod routes;

pub use channel::{Alert, AlertChannel, LogAlertChannel};
#[cfg(feature = "webhook")]
pub use channel::WebhookAlertChannel;
pub use monitor::{ErrorSignal, FailureMonitor, MonitorState, MonitorStatus};
pub use routes::routes;

use common::config::MonitorSettings;
use std::sync::Arc;

/// Picks the alert channel for the given settings.
///
/// A configured webhook is only honoured when the crate is built with the
/// `webhook` feature; otherwise alerts go to the log.
pub fn channel_from_settings(settings: &MonitorSettings) -> common::Result<Arc<dyn AlertChannel>> {
    match &settings.webhook_url {
        #[cfg(feature = "webhook")]
        Some(url) => Ok(Arc::new(WebhookAlertChannel::new(url)?)),
        #[cfg(not(feature = "webhook"))]
        Some(url) => {
            tracing::warn!(
                webhook_url = %url,
                "Webhook alerts need the `webhook` feature, falling back to log alerts"
            );
            Ok(Arc::new(LogAlertChannel))
        }
        None => Ok(Arc::new(LogAlertChannel)),
    }
}
