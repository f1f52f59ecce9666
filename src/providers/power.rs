//! Power profile loop. Re-evaluates on every interval and immediately
//! whenever the performance mode changes.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::{
    sync::watch,
    time::{Duration, sleep},
};
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    event::EventBus,
    gateways::{PowerGateway, ThermalGateway},
    providers::traits::ServiceProvider,
    pseudo_file::StoreStats,
    task_manager::TaskManager,
};

pub struct PowerServiceProvider {
    state: Arc<AppState>,
    power: Arc<PowerGateway>,
    battery: Arc<ThermalGateway>,
    event_bus: EventBus,
}

impl PowerServiceProvider {
    pub fn new(state: Arc<AppState>, event_bus: EventBus) -> Self {
        Self {
            power: Arc::new(state.power_gateway()),
            battery: Arc::new(state.thermal_gateway()),
            state,
            event_bus,
        }
    }
}

#[async_trait]
impl ServiceProvider for PowerServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let power = self.power.clone();
        let battery = self.battery.clone();
        let event_bus = self.event_bus.clone();
        let performance_mode = self.state.watch_performance_mode();
        let interval = self.state.config().timing.power_interval();

        task_manager
            .spawn_task(self.name().to_string(), move |cancel_token| async move {
                run_power_service(
                    power,
                    battery,
                    event_bus,
                    performance_mode,
                    interval,
                    cancel_token,
                )
                .await
            })
            .await
    }

    async fn release(&self) -> usize {
        self.power.release().await + self.battery.release().await
    }

    fn stats(&self) -> StoreStats {
        self.power.stats() + self.battery.stats()
    }

    fn name(&self) -> &'static str {
        "PowerService"
    }

    fn priority(&self) -> i32 {
        6
    }
}

async fn run_power_service(
    power: Arc<PowerGateway>,
    battery: Arc<ThermalGateway>,
    event_bus: EventBus,
    mut performance_mode: watch::Receiver<bool>,
    interval: Duration,
    cancel_token: CancellationToken,
) -> Result<()> {
    loop {
        let performance = *performance_mode.borrow_and_update();
        let on_battery = battery.is_on_battery().await;
        debug!("Optimizing power: on_battery={on_battery} performance={performance}");
        event_bus.announce(power.optimize_power_settings(on_battery, performance).await);

        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Power service cancelled");
                break;
            }
            () = sleep(interval) => {}
            changed = performance_mode.changed() => {
                if changed.is_err() {
                    warn!("Performance mode source closed, stopping power service");
                    break;
                }
            }
        }
    }
    Ok(())
}
