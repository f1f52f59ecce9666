//! Application state shared by the coordinator and the service providers.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use tokio::sync::watch;

use crate::{
    config::{Config, ConfigManager},
    control_path::ControlPaths,
    gateways::{KeyboardGateway, PowerGateway, ThermalGateway},
    tuning::{NoopTuner, SysctlTuner, SystemTuner},
    workload::{ProcScanner, WorkloadDetector},
};

/// Shared application state.
///
/// Holds configuration resolved once at startup and the daemon-wide
/// performance mode. Gateways are not shared: every provider builds its own
/// through the factory methods below, so no two control loops share a
/// handle cache.
pub struct AppState {
    pub config_manager: Arc<ConfigManager>,
    pub paths: ControlPaths,
    performance_mode: watch::Sender<bool>,
}

impl AppState {
    pub fn new(config_manager: ConfigManager) -> Result<Self> {
        let config = config_manager.get();
        config.validate().context("Invalid configuration")?;

        let paths = config.control_paths();
        let (performance_mode, _) = watch::channel(config.performance_mode);

        Ok(Self {
            paths,
            performance_mode,
            config_manager: Arc::new(config_manager),
        })
    }

    pub fn config(&self) -> &Config {
        self.config_manager.get()
    }

    pub fn performance_mode(&self) -> bool {
        *self.performance_mode.borrow()
    }

    /// Updates the performance mode. Returns `true` if the value changed.
    pub fn set_performance_mode(&self, enabled: bool) -> bool {
        let changed = self.performance_mode.send_if_modified(|current| {
            let changed = *current != enabled;
            *current = enabled;
            changed
        });
        if changed {
            info!("Performance mode {}", if enabled { "enabled" } else { "disabled" });
        }
        changed
    }

    /// Receiver notified on every performance mode change.
    pub fn watch_performance_mode(&self) -> watch::Receiver<bool> {
        self.performance_mode.subscribe()
    }

    pub fn keyboard_gateway(&self) -> KeyboardGateway {
        let config = self.config();
        KeyboardGateway::new(
            &self.paths,
            config.led.clone(),
            config.timing.cpu_sample_interval(),
            config.retry_policy(),
        )
    }

    pub fn power_gateway(&self) -> PowerGateway {
        let config = self.config();
        PowerGateway::new(&self.paths, config.fan.clone(), config.retry_policy())
    }

    pub fn thermal_gateway(&self) -> ThermalGateway {
        let config = self.config();
        ThermalGateway::new(
            &self.paths,
            config.thermal.compiler_processes.clone(),
            self.workload_detector(),
            self.system_tuner(),
            config.retry_policy(),
        )
    }

    fn workload_detector(&self) -> Arc<dyn WorkloadDetector> {
        Arc::new(ProcScanner::new(self.paths.proc_root.clone()))
    }

    fn system_tuner(&self) -> Arc<dyn SystemTuner> {
        let tuning = &self.config().thermal.sched_tuning;
        if tuning.enabled {
            Arc::new(SysctlTuner::new(&tuning.program, &tuning.key))
        } else {
            Arc::new(NoopTuner)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SysfsFixture;

    #[tokio::test]
    async fn performance_mode_notifies_watchers() {
        let fx = SysfsFixture::new();
        let state = AppState::new(ConfigManager::new(fx.config(), None)).unwrap();
        let mut rx = state.watch_performance_mode();

        assert!(!state.performance_mode());
        assert!(state.set_performance_mode(true));
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());

        assert!(!state.set_performance_mode(true));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let mut config = Config::default();
        config.timing.fan_interval_ms = 0;
        assert!(AppState::new(ConfigManager::new(config, None)).is_err());
    }

    #[tokio::test]
    async fn gateways_use_resolved_paths() {
        let fx = SysfsFixture::new();
        fx.set_temperatures(50_000, 60_000);
        let state = AppState::new(ConfigManager::new(fx.config(), None)).unwrap();

        assert_eq!(state.power_gateway().read_temperatures().await, (50.0, 60.0));
        assert!(!state.thermal_gateway().is_on_battery().await);
    }
}
