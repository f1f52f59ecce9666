use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    event::EventBus,
    gateways::ThermalGateway,
    providers::traits::ServiceProvider,
    pseudo_file::StoreStats,
    task_manager::TaskManager,
};

pub struct ThermalServiceProvider {
    gateway: Arc<ThermalGateway>,
    event_bus: EventBus,
    interval: Duration,
}

impl ThermalServiceProvider {
    pub fn new(state: &AppState, event_bus: EventBus) -> Self {
        Self {
            gateway: Arc::new(state.thermal_gateway()),
            event_bus,
            interval: state.config().timing.thermal_interval(),
        }
    }

    #[cfg(test)]
    fn with_gateway(gateway: ThermalGateway, event_bus: EventBus, interval: Duration) -> Self {
        Self {
            gateway: Arc::new(gateway),
            event_bus,
            interval,
        }
    }
}

#[async_trait]
impl ServiceProvider for ThermalServiceProvider {
    /// Gamemode reset is best effort; the loop treats an unreadable flag as
    /// off.
    async fn initialize(&self) -> Result<()> {
        if let Err(e) = self.gateway.initialize_gamemode().await {
            warn!("Gamemode flag unavailable: {e}");
        }
        Ok(())
    }

    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let gateway = self.gateway.clone();
        let event_bus = self.event_bus.clone();
        let interval = self.interval;

        task_manager
            .spawn_task(self.name().to_string(), move |cancel_token| async move {
                run_thermal_service(gateway, event_bus, interval, cancel_token).await
            })
            .await
    }

    async fn release(&self) -> usize {
        self.gateway.release().await
    }

    fn stats(&self) -> StoreStats {
        self.gateway.stats()
    }

    fn name(&self) -> &'static str {
        "ThermalService"
    }

    fn priority(&self) -> i32 {
        8
    }
}

async fn run_thermal_service(
    gateway: Arc<ThermalGateway>,
    event_bus: EventBus,
    interval: Duration,
    cancel_token: CancellationToken,
) -> Result<()> {
    loop {
        let decision = gateway.update_thermal_policy().await;
        event_bus.announce(decision.change);

        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Thermal service cancelled");
                break;
            }
            () = sleep(interval) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::Event, test_support::SysfsFixture, tuning::MockSystemTuner,
        workload::MockWorkloadDetector,
    };
    use pretty_assertions::assert_eq;
    use tokio::time::timeout;

    #[tokio::test]
    async fn initialize_resets_gamemode_and_tolerates_failure() {
        let fx = SysfsFixture::new();
        fx.write("gamemode", "1");
        let state = AppState::new(crate::config::ConfigManager::new(fx.config(), None)).unwrap();
        let provider = ThermalServiceProvider::new(&state, EventBus::new());

        provider.initialize().await.unwrap();
        assert_eq!(fx.read("gamemode"), "0");

        fx.remove("gamemode");
        provider.initialize().await.unwrap();
        assert_eq!(fx.read("gamemode"), "0");

        fx.remove("gamemode");
        std::fs::create_dir(fx.path("gamemode")).unwrap();
        provider.initialize().await.unwrap();
    }

    #[tokio::test]
    async fn loop_publishes_transition() {
        let fx = SysfsFixture::new();
        fx.write("battery_status", "Discharging");

        let mut workload = MockWorkloadDetector::new();
        workload.expect_is_running().returning(|_| false);
        let mut tuner = MockSystemTuner::new();
        tuner.expect_apply().times(1).returning(|_| Ok(()));
        let gateway = ThermalGateway::new(
            &fx.paths(),
            Vec::new(),
            Arc::new(workload),
            Arc::new(tuner),
            fx.retry(),
        );

        let event_bus = EventBus::new();
        let mut events = event_bus.subscribe();
        let provider =
            ThermalServiceProvider::with_gateway(gateway, event_bus, Duration::from_millis(10));
        let mut task_manager = TaskManager::new();
        provider.start(&mut task_manager).await.unwrap();

        let event = timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            Event::DeviceStateChanged {
                device: "throttle policy".to_string(),
                value: "silent".to_string()
            }
        );

        // Steady state: later iterations do not write again.
        sleep(Duration::from_millis(50)).await;
        task_manager.shutdown_all().await.unwrap();
        assert_eq!(fx.read("throttle_thermal_policy"), "2");
        assert!(events.try_recv().is_err());
    }
}
