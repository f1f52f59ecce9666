//! Event-driven communication between the coordinator, the control loops
//! and the D-Bus surface.

use anyhow::Result;
use log::debug;
use tokio::sync::broadcast;

use crate::gateways::DeviceChange;

/// Application events.
///
/// Control loops only publish; nothing a loop decides depends on another
/// loop's events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Performance mode change requested from outside the daemon.
    PerformanceModeRequested(bool),
    /// The supervisor replaced a dead worker.
    WorkerRestarted(String),
    /// A device control file was written with a new value.
    DeviceStateChanged { device: String, value: String },
    SystemShutdown,
}

impl From<DeviceChange> for Event {
    fn from(change: DeviceChange) -> Self {
        Self::DeviceStateChanged {
            device: change.device.to_string(),
            value: change.value,
        }
    }
}

/// Event bus for publish-subscribe messaging between services.
///
/// # Example
///
/// ```no_run
/// use tufd::event::{Event, EventBus};
///
/// let event_bus = EventBus::new();
/// let mut subscriber = event_bus.subscribe();
///
/// event_bus.publish(Event::PerformanceModeRequested(true)).unwrap();
///
/// // In async context, receive events:
/// // let event = subscriber.recv().await;
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a new EventBus with default capacity.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    #[cfg(test)]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns an error if there are no active subscribers.
    pub fn publish(&self, event: Event) -> Result<()> {
        self.sender.send(event)?;
        Ok(())
    }

    /// Publishes device changes; having nobody listening is not an error.
    pub fn announce(&self, changes: impl IntoIterator<Item = DeviceChange>) {
        for change in changes {
            if self.publish(change.into()).is_err() {
                debug!("No subscribers for device change event");
            }
        }
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each subscriber receives all events published after subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::{FanMode, PowerProfile};
    use pretty_assertions::assert_eq;
    use tokio::time::{Duration, sleep};

    #[test]
    fn event_bus_clone_creates_shared_channel() {
        let event_bus1 = EventBus::new();
        let event_bus2 = event_bus1.clone();

        let _receiver1 = event_bus1.subscribe();
        let _receiver2 = event_bus2.subscribe();

        assert_eq!(event_bus1.sender.receiver_count(), 2);
        assert_eq!(event_bus2.sender.receiver_count(), 2);
    }

    #[tokio::test]
    async fn publish_and_subscribe_basic_event() {
        let event_bus = EventBus::new();
        let mut receiver = event_bus.subscribe();

        event_bus.publish(Event::SystemShutdown).unwrap();

        assert_eq!(receiver.recv().await.unwrap(), Event::SystemShutdown);
    }

    #[tokio::test]
    async fn device_changes_become_events() {
        let event_bus = EventBus::new();
        let mut receiver = event_bus.subscribe();

        event_bus.announce([
            DeviceChange::of(FanMode::Silent),
            DeviceChange::of(PowerProfile::Powersave),
        ]);

        assert_eq!(
            receiver.recv().await.unwrap(),
            Event::DeviceStateChanged {
                device: "fan".to_string(),
                value: "silent".to_string()
            }
        );
        assert_eq!(
            receiver.recv().await.unwrap(),
            Event::DeviceStateChanged {
                device: "power profile".to_string(),
                value: "powersave".to_string()
            }
        );
    }

    #[test]
    fn announce_without_subscribers_is_silent() {
        EventBus::new().announce([DeviceChange::of(FanMode::Boost)]);
    }

    #[tokio::test]
    async fn publish_without_subscribers_returns_error() {
        let event_bus = EventBus::new();
        let result = event_bus.publish(Event::PerformanceModeRequested(true));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn sequential_events_received_in_order() {
        let event_bus = EventBus::with_capacity(8);
        let mut receiver = event_bus.subscribe();

        event_bus
            .publish(Event::PerformanceModeRequested(false))
            .unwrap();
        event_bus
            .publish(Event::WorkerRestarted("FanService".to_string()))
            .unwrap();
        event_bus.publish(Event::SystemShutdown).unwrap();

        assert_eq!(
            receiver.recv().await.unwrap(),
            Event::PerformanceModeRequested(false)
        );
        assert_eq!(
            receiver.recv().await.unwrap(),
            Event::WorkerRestarted("FanService".to_string())
        );
        assert_eq!(receiver.recv().await.unwrap(), Event::SystemShutdown);
    }

    #[tokio::test]
    async fn event_bus_works_across_async_tasks() {
        let event_bus = EventBus::new();
        let mut receiver = event_bus.subscribe();
        let publisher_bus = event_bus.clone();

        let publisher_handle = tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            publisher_bus.publish(Event::SystemShutdown).unwrap();
        });

        let receiver_handle = tokio::spawn(async move { receiver.recv().await.unwrap() });

        publisher_handle.await.unwrap();
        assert_eq!(receiver_handle.await.unwrap(), Event::SystemShutdown);
    }
}
