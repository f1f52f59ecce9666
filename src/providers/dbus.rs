use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use zbus::{Connection, object_server::InterfaceRef};

use crate::{
    app_context::AppState,
    config::BusKind,
    event::{Event, EventBus},
    interface::{BUS_NAME, DBusInterface, OBJECT_PATH},
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

/// Exposes the control surface and forwards daemon events as signals.
pub struct DBusServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
    connection: Connection,
}

impl DBusServiceProvider {
    pub async fn new(state: Arc<AppState>, event_bus: EventBus) -> Result<Self> {
        let connection = match state.config().dbus.bus {
            BusKind::System => Connection::system().await,
            BusKind::Session => Connection::session().await,
        }
        .context("Failed to connect to D-Bus")?;

        Ok(Self {
            state,
            event_bus,
            connection,
        })
    }
}

#[async_trait]
impl ServiceProvider for DBusServiceProvider {
    async fn initialize(&self) -> Result<()> {
        let interface = DBusInterface::new(
            self.state.clone(),
            env!("CARGO_PKG_VERSION").to_string(),
            self.event_bus.clone(),
        );
        self.connection
            .object_server()
            .at(OBJECT_PATH, interface)
            .await?;
        self.connection.request_name(BUS_NAME).await?;
        info!("D-Bus interface registered as {BUS_NAME}");
        Ok(())
    }

    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let interface = self
            .connection
            .object_server()
            .interface::<_, DBusInterface>(OBJECT_PATH)
            .await?;
        let events = self.event_bus.subscribe();

        task_manager
            .spawn_task(self.name().to_string(), move |cancel_token| async move {
                run_dbus_service(interface, events, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "DBusService"
    }

    fn priority(&self) -> i32 {
        2
    }
}

async fn run_dbus_service(
    interface: InterfaceRef<DBusInterface>,
    mut events: tokio::sync::broadcast::Receiver<Event>,
    cancel_token: CancellationToken,
) -> Result<()> {
    let emitter = interface.signal_emitter();

    loop {
        let event = tokio::select! {
            () = cancel_token.cancelled() => {
                info!("D-Bus service cancelled");
                break;
            }
            event = events.recv() => event,
        };

        let sent = match event {
            Ok(Event::WorkerRestarted(name)) => {
                DBusInterface::worker_restarted(emitter, &name).await
            }
            Ok(Event::DeviceStateChanged { device, value }) => {
                DBusInterface::device_state_changed(emitter, &device, &value).await
            }
            Ok(_) => Ok(()),
            Err(RecvError::Lagged(n)) => {
                warn!("D-Bus signal forwarding lagged by {n} events");
                Ok(())
            }
            Err(RecvError::Closed) => break,
        };
        if let Err(e) = sent {
            warn!("Failed to emit D-Bus signal: {e}");
        }
    }

    Ok(())
}
