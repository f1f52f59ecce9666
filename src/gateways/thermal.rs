//! Battery, gamemode and thermal throttle policy.

use std::{fs::Permissions, io, os::unix::fs::PermissionsExt, sync::Arc};

use log::{debug, error, info, warn};

use super::{DeviceChange, apply_enum, read_enum_or, write_enum};
use crate::{
    control_path::{ControlPath, ControlPaths},
    error::{ControlError, Result},
    modes::ThrottlePolicy,
    policy::ThermalRule,
    pseudo_file::{PseudoFileStore, StoreStats},
    retry::RetryPolicy,
    tuning::SystemTuner,
    workload::WorkloadDetector,
};

/// Outcome of one thermal policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThermalDecision {
    pub rule: ThermalRule,
    pub target: ThrottlePolicy,
    /// Set when the policy file was actually written.
    pub change: Option<DeviceChange>,
}

/// Gateway for the throttle policy and its inputs.
pub struct ThermalGateway {
    store: PseudoFileStore,
    battery_status: ControlPath,
    gamemode: ControlPath,
    throttle_policy: ControlPath,
    compiler_processes: Vec<String>,
    workload: Arc<dyn WorkloadDetector>,
    tuner: Arc<dyn SystemTuner>,
}

impl ThermalGateway {
    pub fn new(
        paths: &ControlPaths,
        compiler_processes: Vec<String>,
        workload: Arc<dyn WorkloadDetector>,
        tuner: Arc<dyn SystemTuner>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store: PseudoFileStore::new(retry),
            battery_status: paths.battery_status.clone(),
            gamemode: paths.gamemode.clone(),
            throttle_policy: paths.throttle_policy.clone(),
            compiler_processes,
            workload,
            tuner,
        }
    }

    /// True while the battery reports `Discharging`. Unreadable status
    /// counts as mains power.
    pub async fn is_on_battery(&self) -> bool {
        match self.store.read(&self.battery_status).await {
            Ok(status) => status.contains("Discharging"),
            Err(e) => {
                error!("Failed to read battery status: {e}");
                false
            }
        }
    }

    pub async fn read_gamemode(&self) -> u8 {
        let result = match self.store.read(&self.gamemode).await {
            Ok(content) => self.gamemode.decode_u8(&content),
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            error!("Failed to read gamemode: {e}");
            0
        })
    }

    pub async fn read_throttle_policy(&self) -> ThrottlePolicy {
        read_enum_or(&self.store, &self.throttle_policy, ThrottlePolicy::Normal).await
    }

    pub async fn set_throttle_policy(&self, policy: ThrottlePolicy) -> Option<DeviceChange> {
        apply_enum(&self.store, &self.throttle_policy, policy).await
    }

    /// Writes `policy` without comparing against the current value.
    pub async fn force_throttle_policy(&self, policy: ThrottlePolicy) -> Option<DeviceChange> {
        write_enum(&self.store, &self.throttle_policy, policy).await
    }

    /// Picks the first matching rule: battery, gamemode, compiler, default.
    /// Later inputs are only read when earlier rules do not match.
    pub async fn select_rule(&self) -> ThermalRule {
        if self.is_on_battery().await {
            ThermalRule::OnBattery
        } else if self.read_gamemode().await == 1 {
            ThermalRule::Gamemode
        } else if self.workload.is_running(&self.compiler_processes).await {
            ThermalRule::CompilerWorkload
        } else {
            ThermalRule::Default
        }
    }

    /// Evaluates the rules afresh and applies the selected policy.
    ///
    /// Scheduler tuning follows only a policy write that actually happened.
    pub async fn update_thermal_policy(&self) -> ThermalDecision {
        let rule = self.select_rule().await;
        let target = rule.target();
        debug!("Thermal rule {rule:?} selects {target}");

        let change = if rule.skips_redundant_writes() {
            self.set_throttle_policy(target).await
        } else {
            self.force_throttle_policy(target).await
        };

        if change.is_some() {
            if let Some(value) = rule.sched_tuning() {
                if let Err(e) = self.tuner.apply(value).await {
                    warn!("Scheduler tuning {value} failed: {e:#}");
                }
            }
        }

        ThermalDecision {
            rule,
            target,
            change,
        }
    }

    /// Creates or resets the gamemode flag and opens it up to unprivileged
    /// writers. The flag usually lives on a fresh tmpfs, so it may not exist.
    pub async fn initialize_gamemode(&self) -> Result<()> {
        let path = self.gamemode.path();
        let io_error = |source: io::Error| ControlError::Io {
            path: path.to_path_buf(),
            attempts: 1,
            source,
        };

        tokio::fs::write(path, "0").await.map_err(io_error)?;
        tokio::fs::set_permissions(path, Permissions::from_mode(0o777))
            .await
            .map_err(io_error)?;

        info!("Gamemode flag reset at {}", path.display());
        Ok(())
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub async fn release(&self) -> usize {
        self.store.close_all().await
    }
}
