//! D-Bus control surface.

use std::sync::Arc;

use log::info;
use zbus::{fdo, interface, object_server::SignalEmitter};

use crate::{
    app_context::AppState,
    event::{Event, EventBus},
};

pub const BUS_NAME: &str = "io.github.tufd";
pub const OBJECT_PATH: &str = "/io/github/tufd";

pub struct DBusInterface {
    state: Arc<AppState>,
    event_bus: EventBus,
    version: String,
}

impl DBusInterface {
    pub fn new(state: Arc<AppState>, version: String, event_bus: EventBus) -> Self {
        Self {
            state,
            event_bus,
            version,
        }
    }

    fn publish(&self, event: Event) -> fdo::Result<()> {
        self.event_bus
            .publish(event)
            .map_err(|e| fdo::Error::Failed(e.to_string()))
    }
}

#[interface(name = "io.github.tufd1")]
impl DBusInterface {
    async fn set_performance_mode(&self, enabled: bool) -> fdo::Result<()> {
        info!("Performance mode {enabled} requested over D-Bus");
        self.publish(Event::PerformanceModeRequested(enabled))
    }

    async fn stop(&self) -> fdo::Result<()> {
        info!("Stop requested over D-Bus");
        self.publish(Event::SystemShutdown)
    }

    #[zbus(property)]
    async fn version(&self) -> String {
        self.version.clone()
    }

    #[zbus(property)]
    async fn performance_mode(&self) -> bool {
        self.state.performance_mode()
    }

    #[zbus(signal)]
    pub async fn worker_restarted(emitter: &SignalEmitter<'_>, name: &str) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn device_state_changed(
        emitter: &SignalEmitter<'_>,
        device: &str,
        value: &str,
    ) -> zbus::Result<()>;
}
