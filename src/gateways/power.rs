//! Fan, power profile and GPU power control.

use log::{debug, error};

use super::{DeviceChange, apply_enum, read_enum_or, write_enum};
use crate::{
    config::FanCfg,
    control_path::{ControlPath, ControlPaths},
    error::Result,
    modes::{FanMode, GpuMode, PowerProfile},
    policy::{self, PowerPlan},
    pseudo_file::{PseudoFileStore, StoreStats},
    retry::RetryPolicy,
};

/// Gateway for fan boost mode, power profile, GPU power and temperatures.
#[derive(Debug)]
pub struct PowerGateway {
    store: PseudoFileStore,
    fan_mode: ControlPath,
    power_profile: ControlPath,
    gpu_mode: ControlPath,
    cpu_temp: ControlPath,
    gpu_temp: ControlPath,
    fan: FanCfg,
}

impl PowerGateway {
    pub fn new(paths: &ControlPaths, fan: FanCfg, retry: RetryPolicy) -> Self {
        Self {
            store: PseudoFileStore::new(retry),
            fan_mode: paths.fan_mode.clone(),
            power_profile: paths.power_profile.clone(),
            gpu_mode: paths.gpu_mode.clone(),
            cpu_temp: paths.cpu_temp.clone(),
            gpu_temp: paths.gpu_temp.clone(),
            fan,
        }
    }

    /// CPU and GPU temperatures in °C; `(0.0, 0.0)` if either read fails.
    pub async fn read_temperatures(&self) -> (f32, f32) {
        match (
            self.read_celsius(&self.cpu_temp).await,
            self.read_celsius(&self.gpu_temp).await,
        ) {
            (Ok(cpu), Ok(gpu)) => (cpu, gpu),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to read temperatures: {e}");
                (0.0, 0.0)
            }
        }
    }

    async fn read_celsius(&self, control: &ControlPath) -> Result<f32> {
        let content = self.store.read(control).await?;
        control.decode_celsius(&content)
    }

    pub async fn get_fan_mode(&self) -> FanMode {
        read_enum_or(&self.store, &self.fan_mode, FanMode::Normal).await
    }

    pub async fn set_fan_mode(&self, mode: FanMode) -> Option<DeviceChange> {
        apply_enum(&self.store, &self.fan_mode, mode).await
    }

    pub async fn get_power_profile(&self) -> PowerProfile {
        read_enum_or(&self.store, &self.power_profile, PowerProfile::Balanced).await
    }

    pub async fn set_power_profile(&self, profile: PowerProfile) -> Option<DeviceChange> {
        apply_enum(&self.store, &self.power_profile, profile).await
    }

    pub async fn get_gpu_mode(&self) -> GpuMode {
        read_enum_or(&self.store, &self.gpu_mode, GpuMode::Standard).await
    }

    pub async fn set_gpu_mode(&self, mode: GpuMode) -> Option<DeviceChange> {
        apply_enum(&self.store, &self.gpu_mode, mode).await
    }

    /// One step of the automatic fan boost with hysteresis.
    pub async fn auto_fan_control(&self) -> Option<DeviceChange> {
        let (cpu, gpu) = self.read_temperatures().await;
        let max_temp = cpu.max(gpu);
        let current = self.get_fan_mode().await;

        let next = policy::fan_boost_step(
            max_temp,
            current,
            self.fan.temp_threshold,
            self.fan.hysteresis,
        )?;
        debug!("Max temperature {max_temp:.1}°C, fan {current} -> {next}");
        write_enum(&self.store, &self.fan_mode, next).await
    }

    /// Applies the power plan for the given power source and mode.
    pub async fn optimize_power_settings(
        &self,
        on_battery: bool,
        performance_mode: bool,
    ) -> Vec<DeviceChange> {
        let PowerPlan { profile, gpu, fan } = policy::power_plan(on_battery, performance_mode);

        let mut changes = Vec::with_capacity(3);
        changes.extend(self.set_power_profile(profile).await);
        changes.extend(self.set_gpu_mode(gpu).await);
        if let Some(fan) = fan {
            changes.extend(self.set_fan_mode(fan).await);
        }
        changes
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Closes every cached handle.
    pub async fn release(&self) -> usize {
        self.store.close_all().await
    }
}
