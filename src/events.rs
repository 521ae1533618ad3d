/// Event routing
///
/// Unsolicited `heartbeat` and `report` envelopes are delivered to the
/// consumer registered for the sending device and event class. Consumers
/// run on their own task so a slow decoder never stalls a receive loop.
use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::contracts::{Envelope, EventClass};
use crate::registry::Registry;

/// Callback invoked with the raw event payload
pub type EventConsumer = Arc<dyn Fn(&str) + Send + Sync>;

pub struct EventRouter {
    heartbeat_consumers: Registry<EventConsumer>,
    report_consumers: Registry<EventConsumer>,
    tasks: TaskTracker,
}

impl EventRouter {
    /// `tasks` tracks the spawned consumer invocations
    pub fn new(tasks: TaskTracker) -> Self {
        Self {
            heartbeat_consumers: Registry::new(),
            report_consumers: Registry::new(),
            tasks,
        }
    }

    fn table(&self, class: EventClass) -> &Registry<EventConsumer> {
        match class {
            EventClass::Heartbeat => &self.heartbeat_consumers,
            EventClass::Report => &self.report_consumers,
        }
    }

    /// Register the consumer for `(identity, class)`; the latest registration wins
    pub fn register_consumer(&self, identity: &str, class: EventClass, consumer: EventConsumer) {
        if self.table(class).insert(identity, consumer).is_some() {
            debug!(sid = identity, class = class.as_str(), "Replaced event consumer");
        }
    }

    pub fn has_consumer(&self, identity: &str, class: EventClass) -> bool {
        self.table(class).contains(identity)
    }

    /// Dispatch an event envelope (command already stripped of any suffix)
    ///
    /// Returns true when a consumer was scheduled.
    pub fn process_event(&self, envelope: Envelope) -> bool {
        let Some(class) = EventClass::from_command(&envelope.command) else {
            warn!(cmd = %envelope.command, sid = envelope.identity_or_empty(), "Unknown event, dropping");
            return false;
        };

        let identity = envelope.identity_or_empty();
        let Some(consumer) = self.table(class).get(identity) else {
            return false;
        };

        let data = envelope.data.unwrap_or_default();
        self.tasks.spawn(async move {
            consumer(&data);
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn event(command: &str, sid: &str, data: &str) -> Envelope {
        Envelope {
            identity: Some(sid.to_string()),
            command: command.to_string(),
            data: Some(data.to_string()),
            ..Default::default()
        }
    }

    fn channel_consumer(tag: &'static str) -> (EventConsumer, mpsc::UnboundedReceiver<(String, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let consumer: EventConsumer = Arc::new(move |data: &str| {
            let _ = tx.send((tag.to_string(), data.to_string()));
        });
        (consumer, rx)
    }

    #[tokio::test]
    async fn test_report_reaches_registered_consumer() {
        let router = EventRouter::new(TaskTracker::new());
        let (report, mut report_rx) = channel_consumer("report");
        let (heartbeat, mut heartbeat_rx) = channel_consumer("heartbeat");
        router.register_consumer("158d0001", EventClass::Report, report);
        router.register_consumer("158d0001", EventClass::Heartbeat, heartbeat);

        assert!(router.process_event(event("report", "158d0001", r#"{"temperature":"220"}"#)));

        let received = tokio::time::timeout(Duration::from_secs(1), report_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, ("report".to_string(), r#"{"temperature":"220"}"#.to_string()));
        assert!(heartbeat_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregistered_identity_dropped() {
        let router = EventRouter::new(TaskTracker::new());
        let (report, mut report_rx) = channel_consumer("report");
        router.register_consumer("158d0001", EventClass::Report, report);

        assert!(!router.process_event(event("report", "158d0002", "{}")));
        tokio::task::yield_now().await;
        assert!(report_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_class_dropped() {
        let router = EventRouter::new(TaskTracker::new());
        let (report, _rx) = channel_consumer("report");
        router.register_consumer("158d0001", EventClass::Report, report);

        assert!(!router.process_event(event("write", "158d0001", "{}")));
    }

    #[tokio::test]
    async fn test_latest_registration_wins() {
        let router = EventRouter::new(TaskTracker::new());
        let (first, mut first_rx) = channel_consumer("first");
        let (second, mut second_rx) = channel_consumer("second");
        router.register_consumer("158d0001", EventClass::Heartbeat, first);
        router.register_consumer("158d0001", EventClass::Heartbeat, second);

        assert!(router.process_event(event("heartbeat", "158d0001", "{}")));

        let received = tokio::time::timeout(Duration::from_secs(1), second_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.0, "second");
        assert!(first_rx.try_recv().is_err());
    }
}
