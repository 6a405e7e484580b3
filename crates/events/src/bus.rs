//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` between the install supervisor
//! (publisher) and anything that wants to observe install progress.

use chrono::{DateTime, Utc};
use coderun_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub const INSTALL_STARTED: &str = "environment.install_started";
pub const INSTALLED: &str = "environment.installed";
pub const INSTALL_FAILED: &str = "environment.install_failed";
pub const INSTALL_SUPERSEDED: &str = "environment.install_superseded";

// ---------------------------------------------------------------------------
// EnvironmentEvent
// ---------------------------------------------------------------------------

/// Something that happened to a Python environment's install.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentEvent {
    /// Dot-separated event name, e.g. `"environment.installed"`.
    pub event_type: String,

    pub environment_id: DbId,

    /// Correlates every event emitted for one install job.
    pub job_id: Option<Uuid>,

    /// Event-specific data (package results, error text).
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl EnvironmentEvent {
    pub fn new(event_type: impl Into<String>, environment_id: DbId) -> Self {
        Self {
            event_type: event_type.into(),
            environment_id,
            job_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_job(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// ```rust
/// use coderun_events::bus::{EventBus, EnvironmentEvent, INSTALLED};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(EnvironmentEvent::new(INSTALLED, 1));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<EnvironmentEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// Slow receivers observe `RecvError::Lagged` once the buffer wraps.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Dropped when nobody
    /// is listening.
    pub fn publish(&self, event: EnvironmentEvent) {
        tracing::debug!(
            event_type = %event.event_type,
            environment_id = event.environment_id,
            "Publishing environment event",
        );
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EnvironmentEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let job = Uuid::new_v4();

        bus.publish(
            EnvironmentEvent::new(INSTALLED, 42)
                .with_job(job)
                .with_payload(serde_json::json!({"installedPackages": 3})),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, INSTALLED);
        assert_eq!(received.environment_id, 42);
        assert_eq!(received.job_id, Some(job));
        assert_eq!(received.payload["installedPackages"], 3);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(EnvironmentEvent::new(INSTALL_FAILED, 1));

        assert_eq!(rx1.recv().await.unwrap().event_type, INSTALL_FAILED);
        assert_eq!(rx2.recv().await.unwrap().event_type, INSTALL_FAILED);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(EnvironmentEvent::new(INSTALL_STARTED, 7));
    }
}
