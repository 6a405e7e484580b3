//! Structured logging of environment lifecycle events.
//!
//! [`EventLogger`] subscribes to the [`EventBus`](crate::bus::EventBus) and
//! writes one tracing record per event. It stops when the bus is dropped.

use tokio::sync::broadcast;

use crate::bus::{EnvironmentEvent, INSTALL_FAILED};

/// Background service that turns bus events into log lines.
pub struct EventLogger;

impl EventLogger {
    /// Run the logging loop until the channel closes. Returns how many events
    /// were logged.
    pub async fn run(mut receiver: broadcast::Receiver<EnvironmentEvent>) -> usize {
        let mut logged = 0;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    Self::log(&event);
                    logged += 1;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event logger lagged, some events were not logged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!(logged, "Event bus closed, event logger shutting down");
                    break;
                }
            }
        }
        logged
    }

    fn log(event: &EnvironmentEvent) {
        let job_id = event.job_id.map(|id| id.to_string()).unwrap_or_default();
        if event.event_type == INSTALL_FAILED {
            tracing::warn!(
                event_type = %event.event_type,
                environment_id = event.environment_id,
                job_id = %job_id,
                payload = %event.payload,
                "Environment event",
            );
        } else {
            tracing::info!(
                event_type = %event.event_type,
                environment_id = event.environment_id,
                job_id = %job_id,
                payload = %event.payload,
                "Environment event",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{EventBus, INSTALLED, INSTALL_STARTED};

    #[tokio::test]
    async fn logs_every_event_until_the_bus_is_dropped() {
        let bus = EventBus::default();
        let logger = tokio::spawn(EventLogger::run(bus.subscribe()));

        bus.publish(EnvironmentEvent::new(INSTALL_STARTED, 1).with_job(uuid::Uuid::new_v4()));
        bus.publish(EnvironmentEvent::new(INSTALL_FAILED, 1));
        bus.publish(EnvironmentEvent::new(INSTALLED, 2));
        drop(bus);

        assert_eq!(logger.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn lagging_does_not_stop_the_logger() {
        let bus = EventBus::new(2);
        let receiver = bus.subscribe();
        for id in 0..5 {
            bus.publish(EnvironmentEvent::new(INSTALLED, id));
        }
        drop(bus);

        // The two newest events survive the wrap.
        assert_eq!(EventLogger::run(receiver).await, 2);
    }
}
