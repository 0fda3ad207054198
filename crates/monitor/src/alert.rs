//! Alert delivery.

use artguard_core::AlertEvent;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::AlertsConfig;
use crate::error::{MonitorError, Result};

/// Destination for alerts, in addition to the event bus.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Deliver one alert.
    async fn deliver(&self, alert: &AlertEvent) -> Result<()>;
}

/// Writes alerts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, alert: &AlertEvent) -> Result<()> {
        warn!(
            artifact_id = %alert.artifact_id,
            alert_id = %alert.id,
            reasons = %alert.triggering_reasons.join(", "),
            counts = %alert.severity_counts.summary(),
            "alert triggered"
        );
        Ok(())
    }
}

/// POSTs alerts as JSON to a URL.
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    client: Client,
    url: String,
}

impl WebhookAlertSink {
    /// Create a webhook sink.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: ClientBuilder::new().timeout(timeout).build()?,
            url: url.into(),
        })
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, alert: &AlertEvent) -> Result<()> {
        let response = self.client.post(&self.url).json(alert).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MonitorError::WebhookStatus {
                status: status.as_u16(),
                body,
            });
        }
        debug!(url = %self.url, alert_id = %alert.id, "alert delivered");
        Ok(())
    }
}

/// Sinks described by an alerts configuration.
pub fn sinks_from_config(config: &AlertsConfig) -> Result<Vec<Arc<dyn AlertSink>>> {
    let mut sinks: Vec<Arc<dyn AlertSink>> = Vec::new();
    if config.log {
        sinks.push(Arc::new(LogAlertSink));
    }
    if let Some(url) = &config.webhook_url {
        sinks.push(Arc::new(WebhookAlertSink::new(
            url.clone(),
            Duration::from_millis(config.webhook_timeout_ms),
        )?));
    }
    Ok(sinks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use artguard_core::{ArtifactId, Clock, SeverityCounts, SystemClock};

    #[test]
    fn test_sinks_from_config() {
        let sinks = sinks_from_config(&AlertsConfig::default()).unwrap();
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].name(), "log");

        let sinks = sinks_from_config(&AlertsConfig {
            log: false,
            webhook_url: Some("http://127.0.0.1:9/alerts".to_string()),
            webhook_timeout_ms: 100,
        })
        .unwrap();
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].name(), "webhook");
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_an_error() {
        let sink = WebhookAlertSink::new("http://127.0.0.1:9/alerts", Duration::from_millis(200)).unwrap();
        let alert = AlertEvent::new(
            ArtifactId::new("a"),
            SeverityCounts::default(),
            vec!["critical: 1".to_string()],
            SystemClock.now(),
        );
        assert!(sink.deliver(&alert).await.is_err());
        assert!(LogAlertSink.deliver(&alert).await.is_ok());
    }
}
