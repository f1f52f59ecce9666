//! Best-effort kernel scheduler tuning issued on thermal transitions.

use anyhow::{Result, bail};
use async_trait::async_trait;
use log::info;
use tokio::process::Command;

/// Applies a scheduler tuning value.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SystemTuner: Send + Sync {
    async fn apply(&self, value: u8) -> Result<()>;
}

/// Runs `<program> <key>=<value>`, e.g. `sysctl kernel.sched_tt_balancer_opt=3`.
#[derive(Debug, Clone)]
pub struct SysctlTuner {
    program: String,
    key: String,
}

impl SysctlTuner {
    pub fn new(program: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            key: key.into(),
        }
    }

    fn argument(&self, value: u8) -> String {
        format!("{}={value}", self.key)
    }
}

#[async_trait]
impl SystemTuner for SysctlTuner {
    async fn apply(&self, value: u8) -> Result<()> {
        let argument = self.argument(value);
        let output = Command::new(&self.program)
            .arg(&argument)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            bail!(
                "{} {argument} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        info!("Applied {argument}");
        Ok(())
    }
}

/// Tuner used when scheduler tuning is disabled in configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTuner;

#[async_trait]
impl SystemTuner for NoopTuner {
    async fn apply(&self, _value: u8) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_sysctl_argument() {
        let tuner = SysctlTuner::new("sysctl", "kernel.sched_tt_balancer_opt");
        assert_eq!(tuner.argument(3), "kernel.sched_tt_balancer_opt=3");
    }

    #[tokio::test]
    async fn reports_failing_command() {
        let tuner = SysctlTuner::new("false", "kernel.x");
        assert!(tuner.apply(1).await.is_err());
    }

    #[tokio::test]
    async fn reports_missing_program() {
        let tuner = SysctlTuner::new("/nonexistent/tufd-sysctl", "kernel.x");
        assert!(tuner.apply(1).await.is_err());
    }

    #[tokio::test]
    async fn succeeds_for_zero_exit() {
        let tuner = SysctlTuner::new("true", "kernel.x");
        assert!(tuner.apply(1).await.is_ok());
    }
}
