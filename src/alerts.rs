//! User-facing alert delivery with rate limiting.
//!
//! [`NotificationGate`] sits between the core and the platform alert
//! channel. Alerts that name a rate-limit key are suppressed (dropped, not
//! deferred) while an earlier delivery under that key is inside its window,
//! which bounds alert storms during flapping connections.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Delivery error: {0}")]
    DeliveryError(String),
}

/// The platform notification collaborator.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn deliver(&self, title: &str, body: &str) -> Result<(), AlertError>;
}

/// Suppression window attached to an [`Alert`].
#[derive(Debug, Clone)]
pub struct RateLimit {
    pub window_seconds: i64,
    pub key: String,
}

/// A single alert request.
#[derive(Debug, Clone)]
pub struct Alert {
    pub title: String,
    pub body: String,
    pub rate_limit: Option<RateLimit>,
}

impl Alert {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            rate_limit: None,
        }
    }

    /// Suppress repeat deliveries under `key` for `window_seconds`.
    pub fn rate_limited(mut self, window_seconds: i64, key: impl Into<String>) -> Self {
        self.rate_limit = Some(RateLimit {
            window_seconds,
            key: key.into(),
        });
        self
    }
}

/// Rate-limited gate in front of an [`AlertChannel`].
pub struct NotificationGate {
    channel: Arc<dyn AlertChannel>,
    recent: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl NotificationGate {
    pub fn new(channel: Arc<dyn AlertChannel>) -> Self {
        Self {
            channel,
            recent: Mutex::new(HashMap::new()),
        }
    }

    /// Deliver unless rate-limited. Returns whether delivery was attempted.
    pub async fn notify(&self, alert: Alert) -> bool {
        self.notify_at(Utc::now(), alert).await
    }

    /// Clock-explicit variant of [`notify`](Self::notify).
    pub async fn notify_at(&self, now: DateTime<Utc>, alert: Alert) -> bool {
        if let Some(limit) = &alert.rate_limit {
            let mut recent = self.recent.lock().expect("alert lock poisoned");
            if let Some(last) = recent.get(&limit.key) {
                if now - *last < Duration::seconds(limit.window_seconds) {
                    log::debug!("alert '{}' suppressed by rate limit '{}'", alert.title, limit.key);
                    return false;
                }
            }
            recent.insert(limit.key.clone(), now);
        }
        match self.channel.deliver(&alert.title, &alert.body).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("alert delivery failed: {}", e);
                false
            }
        }
    }
}

/// Alert channel that records deliveries, for tests and demos.
#[derive(Default)]
pub struct MemoryAlertChannel {
    delivered: Mutex<Vec<(String, String)>>,
}

impl MemoryAlertChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delivered(&self) -> Vec<(String, String)> {
        self.delivered.lock().expect("alert lock poisoned").clone()
    }
}

#[async_trait]
impl AlertChannel for MemoryAlertChannel {
    async fn deliver(&self, title: &str, body: &str) -> Result<(), AlertError> {
        self.delivered
            .lock()
            .expect("alert lock poisoned")
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_unlimited_alerts_always_deliver() {
        let channel = MemoryAlertChannel::new();
        let gate = NotificationGate::new(channel.clone());
        assert!(gate.notify_at(at(0), Alert::new("a", "b")).await);
        assert!(gate.notify_at(at(0), Alert::new("a", "b")).await);
        assert_eq!(channel.delivered().len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_suppresses_within_window() {
        let channel = MemoryAlertChannel::new();
        let gate = NotificationGate::new(channel.clone());

        let alert = || Alert::new("Sensor Disconnected", "body").rate_limited(60, "disc");

        assert!(gate.notify_at(at(0), alert()).await);
        assert!(!gate.notify_at(at(59), alert()).await);
        assert!(gate.notify_at(at(60), alert()).await);
        assert_eq!(channel.delivered().len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_keys_are_independent() {
        let channel = MemoryAlertChannel::new();
        let gate = NotificationGate::new(channel.clone());
        assert!(
            gate.notify_at(at(0), Alert::new("a", "b").rate_limited(60, "k1"))
                .await
        );
        assert!(
            gate.notify_at(at(1), Alert::new("c", "d").rate_limited(60, "k2"))
                .await
        );
        assert_eq!(channel.delivered().len(), 2);
    }
}
