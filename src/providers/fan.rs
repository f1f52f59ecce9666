use anyhow::Result;
use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    event::EventBus,
    gateways::PowerGateway,
    providers::traits::ServiceProvider,
    pseudo_file::StoreStats,
    task_manager::TaskManager,
};

/// Automatic fan boost with hysteresis.
pub struct FanServiceProvider {
    gateway: Arc<PowerGateway>,
    event_bus: EventBus,
    interval: Duration,
}

impl FanServiceProvider {
    pub fn new(state: &AppState, event_bus: EventBus) -> Self {
        Self {
            gateway: Arc::new(state.power_gateway()),
            event_bus,
            interval: state.config().timing.fan_interval(),
        }
    }
}

#[async_trait]
impl ServiceProvider for FanServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let gateway = self.gateway.clone();
        let event_bus = self.event_bus.clone();
        let interval = self.interval;

        task_manager
            .spawn_task(self.name().to_string(), move |cancel_token| async move {
                run_fan_service(gateway, event_bus, interval, cancel_token).await
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
        "FanService"
    }

    fn priority(&self) -> i32 {
        4
    }
}

async fn run_fan_service(
    gateway: Arc<PowerGateway>,
    event_bus: EventBus,
    interval: Duration,
    cancel_token: CancellationToken,
) -> Result<()> {
    loop {
        event_bus.announce(gateway.auto_fan_control().await);

        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Fan service cancelled");
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
    use crate::{config::ConfigManager, test_support::SysfsFixture};
    use tokio::time::timeout;

    #[tokio::test]
    async fn boosts_when_hot_and_recovers() {
        let fx = SysfsFixture::new();
        fx.set_temperatures(90_000, 50_000);
        let state = AppState::new(ConfigManager::new(fx.config(), None)).unwrap();
        let provider = FanServiceProvider::new(&state, EventBus::new());
        let mut task_manager = TaskManager::new();

        provider.start(&mut task_manager).await.unwrap();
        for (cpu, expected) in [(90_000, "1"), (60_000, "0")] {
            fx.set_temperatures(cpu, 50_000);
            timeout(Duration::from_secs(2), async {
                while fx.read("fan_boost_mode") != expected {
                    sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .unwrap();
        }

        task_manager.shutdown_all().await.unwrap();
        assert!(provider.release().await > 0);
    }
}
