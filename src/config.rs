//! Configuration management for the tufd daemon.
//!
//! Handles loading, parsing, and validation of the YAML configuration file
//! that locates every control file and tunes every loop interval and
//! threshold. Every field has a default matching the faustus driver layout,
//! so an empty file (or no file at all) is a valid configuration.

use crate::{
    control_path::{Access, ControlPath, ControlPaths, Encoding, KeyboardPaths},
    retry::RetryPolicy,
};
use anyhow::{Context, Result};
use log::{LevelFilter, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

/// Main configuration structure for the tufd daemon.
///
/// # Example
///
/// ```yaml
/// version: 1
/// log_level: info
/// performance_mode: false
///
/// paths:
///   base: /sys/devices/platform/faustus
///   battery_status: /sys/class/power_supply/BAT1/status
///
/// timing:
///   thermal_interval_ms: 1000
///   monitor_interval_ms: 5000
///
/// fan:
///   temp_threshold: 75.0
///   hysteresis: 5.0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    #[serde(default = "defaults::version")]
    pub version: u8,

    /// Syslog verbosity (`error`, `warn`, `info`, `debug`, `trace`).
    #[serde(default = "defaults::log_level")]
    pub log_level: String,

    /// Performance mode in effect at startup.
    #[serde(default)]
    pub performance_mode: bool,

    #[serde(default)]
    pub paths: PathsCfg,

    #[serde(default)]
    pub timing: TimingCfg,

    #[serde(default)]
    pub retry: RetryCfg,

    #[serde(default)]
    pub fan: FanCfg,

    #[serde(default)]
    pub led: LedCfg,

    #[serde(default)]
    pub thermal: ThermalCfg,

    #[serde(default)]
    pub dbus: DBusCfg,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: defaults::version(),
            log_level: defaults::log_level(),
            performance_mode: false,
            paths: PathsCfg::default(),
            timing: TimingCfg::default(),
            retry: RetryCfg::default(),
            fan: FanCfg::default(),
            led: LedCfg::default(),
            thermal: ThermalCfg::default(),
            dbus: DBusCfg::default(),
        }
    }
}

/// Locations of the control files.
///
/// Driver files default to paths below `base`; any of them may be
/// overridden individually.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsCfg {
    /// Platform driver directory.
    pub base: Option<PathBuf>,
    pub keyboard_dir: Option<PathBuf>,
    pub fan_mode: Option<PathBuf>,
    pub power_profile: Option<PathBuf>,
    pub gpu_mode: Option<PathBuf>,
    pub throttle_policy: Option<PathBuf>,
    pub cpu_temp: Option<PathBuf>,
    pub gpu_temp: Option<PathBuf>,
    pub battery_status: Option<PathBuf>,
    pub gamemode: Option<PathBuf>,
    pub proc_stat: Option<PathBuf>,
    pub gpu_utilization: Option<PathBuf>,
    pub proc_root: Option<PathBuf>,
}

/// Loop and sampling intervals in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingCfg {
    pub keyboard_ac_interval_ms: u64,
    pub keyboard_battery_interval_ms: u64,
    pub thermal_interval_ms: u64,
    pub power_interval_ms: u64,
    pub fan_interval_ms: u64,
    pub monitor_interval_ms: u64,
    pub cpu_sample_interval_ms: u64,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            keyboard_ac_interval_ms: 1000,
            keyboard_battery_interval_ms: 100,
            thermal_interval_ms: 1000,
            power_interval_ms: 2000,
            fan_interval_ms: 2000,
            monitor_interval_ms: 5000,
            cpu_sample_interval_ms: 500,
        }
    }
}

/// Retry schedule for control file I/O.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryCfg {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
}

impl Default for RetryCfg {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
        }
    }
}

/// Automatic fan boost thresholds in °C.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FanCfg {
    pub temp_threshold: f32,
    pub hysteresis: f32,
}

impl Default for FanCfg {
    fn default() -> Self {
        Self {
            temp_threshold: 75.0,
            hysteresis: 5.0,
        }
    }
}

/// Keyboard backlight scaling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedCfg {
    pub brightness_normal: f32,
    pub brightness_dimmed: f32,
    pub max_value: u8,
}

impl Default for LedCfg {
    fn default() -> Self {
        Self {
            brightness_normal: 1.0,
            brightness_dimmed: 0.8,
            max_value: 255,
        }
    }
}

/// Thermal policy inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalCfg {
    /// Process names that force the boost policy while running.
    pub compiler_processes: Vec<String>,
    pub sched_tuning: SchedTuningCfg,
}

impl Default for ThermalCfg {
    fn default() -> Self {
        Self {
            compiler_processes: vec!["clang".to_string()],
            sched_tuning: SchedTuningCfg::default(),
        }
    }
}

/// External command run after thermal policy transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedTuningCfg {
    pub enabled: bool,
    pub program: String,
    pub key: String,
}

impl Default for SchedTuningCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "sysctl".to_string(),
            key: "kernel.sched_tt_balancer_opt".to_string(),
        }
    }
}

/// Which message bus the control surface registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BusKind {
    System,
    Session,
}

/// D-Bus control surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DBusCfg {
    pub enabled: bool,
    pub bus: BusKind,
}

impl Default for DBusCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            bus: BusKind::System,
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn version() -> u8 {
        1
    }

    pub fn log_level() -> String {
        "info".to_string()
    }

    pub fn base() -> PathBuf {
        PathBuf::from("/sys/devices/platform/faustus")
    }

    pub fn cpu_temp() -> PathBuf {
        PathBuf::from("/sys/class/thermal/thermal_zone0/temp")
    }

    pub fn gpu_temp() -> PathBuf {
        PathBuf::from("/sys/class/thermal/thermal_zone1/temp")
    }

    pub fn battery_status() -> PathBuf {
        PathBuf::from("/sys/class/power_supply/BAT1/status")
    }

    pub fn gamemode() -> PathBuf {
        PathBuf::from("/run/gamemode")
    }

    pub fn proc_stat() -> PathBuf {
        PathBuf::from("/proc/stat")
    }

    pub fn gpu_utilization() -> PathBuf {
        PathBuf::from("/run/nvidiautilization")
    }

    pub fn proc_root() -> PathBuf {
        PathBuf::from("/proc")
    }
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

impl TimingCfg {
    pub fn keyboard_ac_interval(&self) -> Duration {
        ms(self.keyboard_ac_interval_ms)
    }

    pub fn keyboard_battery_interval(&self) -> Duration {
        ms(self.keyboard_battery_interval_ms)
    }

    pub fn thermal_interval(&self) -> Duration {
        ms(self.thermal_interval_ms)
    }

    pub fn power_interval(&self) -> Duration {
        ms(self.power_interval_ms)
    }

    pub fn fan_interval(&self) -> Duration {
        ms(self.fan_interval_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        ms(self.monitor_interval_ms)
    }

    pub fn cpu_sample_interval(&self) -> Duration {
        ms(self.cpu_sample_interval_ms)
    }
}

impl Config {
    /// Validates the configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        let t = &self.timing;
        for (name, value) in [
            ("keyboard_ac_interval_ms", t.keyboard_ac_interval_ms),
            ("keyboard_battery_interval_ms", t.keyboard_battery_interval_ms),
            ("thermal_interval_ms", t.thermal_interval_ms),
            ("power_interval_ms", t.power_interval_ms),
            ("fan_interval_ms", t.fan_interval_ms),
            ("monitor_interval_ms", t.monitor_interval_ms),
        ] {
            if value == 0 {
                anyhow::bail!("timing.{name} must be greater than zero");
            }
        }

        if self.retry.max_retries == 0 {
            anyhow::bail!("retry.max_retries must be at least 1");
        }

        if self.fan.hysteresis < 0.0 || self.fan.hysteresis >= self.fan.temp_threshold {
            anyhow::bail!(
                "fan.hysteresis ({}) must be between 0 and temp_threshold ({})",
                self.fan.hysteresis,
                self.fan.temp_threshold
            );
        }

        for (name, value) in [
            ("brightness_normal", self.led.brightness_normal),
            ("brightness_dimmed", self.led.brightness_dimmed),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                anyhow::bail!("led.{name} ({value}) must be within (0, 1]");
            }
        }

        LevelFilter::from_str(&self.log_level)
            .map_err(|_| anyhow::anyhow!("Unknown log_level '{}'", self.log_level))?;

        Ok(())
    }

    /// Parsed log level, `Info` if the string is not recognised.
    pub fn log_level(&self) -> LevelFilter {
        LevelFilter::from_str(&self.log_level).unwrap_or(LevelFilter::Info)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            initial_delay: ms(self.retry.initial_delay_ms),
        }
    }

    /// Resolves every control file into a typed [`ControlPaths`].
    pub fn control_paths(&self) -> ControlPaths {
        let p = &self.paths;
        let base = p.base.clone().unwrap_or_else(defaults::base);
        let keyboard_dir = p.keyboard_dir.clone().unwrap_or_else(|| base.join("kbbl"));
        let pick = |value: &Option<PathBuf>, fallback: PathBuf| value.clone().unwrap_or(fallback);

        let kb = |name: &str, access: Access| {
            ControlPath::new(keyboard_dir.join(name), access, Encoding::Integer)
        };

        ControlPaths {
            keyboard: KeyboardPaths {
                mode: kb("kbbl_mode", Access::WriteOnly),
                speed: kb("kbbl_speed", Access::WriteOnly),
                flags: ControlPath::new(
                    keyboard_dir.join("kbbl_flags"),
                    Access::WriteOnly,
                    Encoding::Raw,
                ),
                red: kb("red", Access::WriteOnly),
                green: kb("green", Access::WriteOnly),
                blue: kb("blue", Access::WriteOnly),
                apply: kb("apply", Access::WriteOnly),
            },
            fan_mode: ControlPath::new(
                pick(&p.fan_mode, base.join("fan_boost_mode")),
                Access::ReadWrite,
                Encoding::Integer,
            ),
            power_profile: ControlPath::new(
                pick(&p.power_profile, base.join("power_profile")),
                Access::ReadWrite,
                Encoding::Integer,
            ),
            gpu_mode: ControlPath::new(
                pick(&p.gpu_mode, base.join("gpu_power")),
                Access::ReadWrite,
                Encoding::Integer,
            ),
            throttle_policy: ControlPath::new(
                pick(&p.throttle_policy, base.join("throttle_thermal_policy")),
                Access::ReadWrite,
                Encoding::Integer,
            ),
            cpu_temp: ControlPath::new(
                pick(&p.cpu_temp, defaults::cpu_temp()),
                Access::ReadOnly,
                Encoding::Millidegrees,
            ),
            gpu_temp: ControlPath::new(
                pick(&p.gpu_temp, defaults::gpu_temp()),
                Access::ReadOnly,
                Encoding::Millidegrees,
            ),
            battery_status: ControlPath::new(
                pick(&p.battery_status, defaults::battery_status()),
                Access::ReadOnly,
                Encoding::Raw,
            ),
            gamemode: ControlPath::new(
                pick(&p.gamemode, defaults::gamemode()),
                Access::ReadWrite,
                Encoding::Integer,
            ),
            proc_stat: ControlPath::new(
                pick(&p.proc_stat, defaults::proc_stat()),
                Access::ReadOnly,
                Encoding::Raw,
            ),
            gpu_utilization: ControlPath::new(
                pick(&p.gpu_utilization, defaults::gpu_utilization()),
                Access::ReadOnly,
                Encoding::Integer,
            ),
            proc_root: pick(&p.proc_root, defaults::proc_root()),
        }
    }
}

fn locate_config() -> Option<PathBuf> {
    // 1) ENV
    if let Ok(env_path) = env::var("TUFD_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    // 2) XDG_CONFIG_HOME or $HOME/.config
    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("tufd/config.yml");
        if cfg_dir.exists() {
            return Some(cfg_dir);
        }
    }

    // 3) /etc
    let etc = Path::new("/etc/tufd/config.yml");
    etc.exists().then(|| etc.to_path_buf())
}

/// Configuration loaded once at startup.
///
/// # Example
///
/// ```no_run
/// use tufd::config::ConfigManager;
/// use std::path::PathBuf;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config_manager = ConfigManager::load(Some(PathBuf::from("config.yml"))).await?;
/// let monitor = config_manager.get().timing.monitor_interval();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<Config>,
    path: Option<PathBuf>,
}

impl ConfigManager {
    pub fn new(config: Config, path: Option<PathBuf>) -> Self {
        Self {
            config: Arc::new(config),
            path,
        }
    }

    /// Loads configuration from file or standard locations.
    ///
    /// Searches in the following order:
    /// 1. Provided path parameter
    /// 2. TUFD_CONFIG environment variable
    /// 3. XDG_CONFIG_HOME/tufd/config.yml or ~/.config/tufd/config.yml
    /// 4. /etc/tufd/config.yml
    ///
    /// Falls back to built-in defaults when nothing is found.
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let Some(config_path) = path.or_else(locate_config) else {
            warn!("No configuration file found, using built-in defaults");
            return Ok(Self::new(Config::default(), None));
        };

        info!("Loading config from: {}", config_path.display());
        let config = Self::load_config_from_path(&config_path).await?;

        Ok(Self::new(config, Some(config_path)))
    }

    pub fn get(&self) -> &Config {
        &self.config
    }

    /// Path the configuration was read from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn load_config_from_path(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?
        };

        if config.version != 1 {
            anyhow::bail!(
                "Unsupported config version {} in file: {}",
                config.version,
                path.display()
            );
        }

        config
            .validate()
            .with_context(|| format!("Configuration validation failed for: {}", path.display()))?;

        Ok(config)
    }
}
