//! Keyboard backlight loop: colour follows CPU and GPU load, dimmed on
//! battery.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    gateways::{KeyboardGateway, ThermalGateway},
    providers::traits::ServiceProvider,
    pseudo_file::StoreStats,
    task_manager::TaskManager,
};

pub struct KeyboardServiceProvider {
    keyboard: Arc<KeyboardGateway>,
    battery: Arc<ThermalGateway>,
    ac_interval: Duration,
    battery_interval: Duration,
}

impl KeyboardServiceProvider {
    pub fn new(state: &AppState) -> Self {
        let timing = &state.config().timing;
        Self {
            keyboard: Arc::new(state.keyboard_gateway()),
            battery: Arc::new(state.thermal_gateway()),
            ac_interval: timing.keyboard_ac_interval(),
            battery_interval: timing.keyboard_battery_interval(),
        }
    }
}

#[async_trait]
impl ServiceProvider for KeyboardServiceProvider {
    /// LED control is pointless without a known controller state, so a
    /// failure here aborts startup.
    async fn initialize(&self) -> Result<()> {
        self.keyboard.initialize().await?;
        Ok(())
    }

    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let keyboard = self.keyboard.clone();
        let battery = self.battery.clone();
        let intervals = (self.ac_interval, self.battery_interval);

        task_manager
            .spawn_task(self.name().to_string(), move |cancel_token| async move {
                run_keyboard_service(keyboard, battery, intervals, cancel_token).await
            })
            .await
    }

    async fn release(&self) -> usize {
        self.keyboard.release().await + self.battery.release().await
    }

    fn stats(&self) -> StoreStats {
        self.keyboard.stats() + self.battery.stats()
    }

    fn name(&self) -> &'static str {
        "KeyboardService"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn is_critical(&self) -> bool {
        true
    }
}

async fn run_keyboard_service(
    keyboard: Arc<KeyboardGateway>,
    battery: Arc<ThermalGateway>,
    (ac_interval, battery_interval): (Duration, Duration),
    cancel_token: CancellationToken,
) -> Result<()> {
    loop {
        let cpu = keyboard.compute_cpu_utilization().await;
        let gpu = keyboard.read_gpu_utilization().await;
        let dimmed = battery.is_on_battery().await;
        let rgb = keyboard.update_leds(cpu, gpu, dimmed).await;
        debug!("CPU {cpu}% GPU {gpu}% -> {rgb:?}");

        let pause = if dimmed { battery_interval } else { ac_interval };
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Keyboard service cancelled");
                break;
            }
            () = sleep(pause) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ConfigManager, test_support::SysfsFixture};
    use tokio::time::timeout;

    fn provider(fx: &SysfsFixture) -> KeyboardServiceProvider {
        let state = AppState::new(ConfigManager::new(fx.config(), None)).unwrap();
        KeyboardServiceProvider::new(&state)
    }

    #[test]
    fn provider_metadata() {
        let fx = SysfsFixture::new();
        let provider = provider(&fx);
        assert_eq!(provider.name(), "KeyboardService");
        assert!(provider.is_critical());
    }

    #[tokio::test]
    async fn initialize_fails_without_controller() {
        let fx = SysfsFixture::new();
        fx.remove("kbbl_mode");
        assert!(provider(&fx).initialize().await.is_err());
    }

    #[tokio::test]
    async fn loop_paints_and_stops() {
        let fx = SysfsFixture::new();
        fx.write("gpu_utilization", "30");
        let provider = provider(&fx);
        let mut task_manager = TaskManager::new();

        provider.start(&mut task_manager).await.unwrap();
        timeout(Duration::from_secs(2), async {
            while fx.read("apply") != "1" {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(fx.read("green"), "30");

        task_manager.shutdown_all().await.unwrap();
        assert!(provider.release().await > 0);
        assert_eq!(provider.release().await, 0);
    }

    #[tokio::test]
    async fn battery_dims_colours() {
        let fx = SysfsFixture::new();
        fx.write("gpu_utilization", "50");
        fx.write("battery_status", "Discharging");
        let provider = provider(&fx);
        let mut task_manager = TaskManager::new();

        provider.start(&mut task_manager).await.unwrap();
        timeout(Duration::from_secs(2), async {
            while fx.read("green") != "40" {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        task_manager.shutdown_all().await.unwrap();
    }
}
