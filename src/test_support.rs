//! Fake sysfs tree for unit tests.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use tempfile::TempDir;

use crate::{
    config::{Config, PathsCfg},
    control_path::ControlPaths,
    retry::RetryPolicy,
};

/// Temporary directory laid out like the faustus driver plus the procfs and
/// runtime files the daemon reads. Every file starts as `"0"` except the
/// temperatures (45 °C), battery (`Charging`) and `/proc/stat`.
pub struct SysfsFixture {
    dir: TempDir,
    files: HashMap<&'static str, PathBuf>,
}

impl SysfsFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let base = root.join("faustus");
        let kbbl = base.join("kbbl");

        let mut files = HashMap::new();
        for name in [
            "kbbl_mode",
            "kbbl_speed",
            "kbbl_flags",
            "red",
            "green",
            "blue",
            "apply",
        ] {
            files.insert(name, kbbl.join(name));
        }
        for name in [
            "fan_boost_mode",
            "power_profile",
            "gpu_power",
            "throttle_thermal_policy",
        ] {
            files.insert(name, base.join(name));
        }
        files.insert("thermal_zone0", root.join("thermal_zone0/temp"));
        files.insert("thermal_zone1", root.join("thermal_zone1/temp"));
        files.insert("battery_status", root.join("BAT1/status"));
        files.insert("gpu_utilization", root.join("run/nvidiautilization"));
        files.insert("gamemode", root.join("run/gamemode"));
        files.insert("proc_stat", root.join("proc/stat"));

        let fixture = Self { dir, files };
        for (name, path) in &fixture.files {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            let content = match *name {
                "thermal_zone0" | "thermal_zone1" => "45000",
                "battery_status" => "Charging\n",
                "proc_stat" => "cpu  100 0 300 100 0 0 0 0 0 0\ncpu0 50 0 150 50 0 0 0 0 0 0\n",
                _ => "0",
            };
            std::fs::write(path, content).unwrap();
        }
        fixture
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, name: &str) -> &Path {
        self.files
            .get(name)
            .unwrap_or_else(|| panic!("unknown fixture file {name}"))
    }

    pub fn write(&self, name: &str, content: &str) {
        std::fs::write(self.path(name), content).unwrap();
    }

    pub fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.path(name)).unwrap()
    }

    pub fn remove(&self, name: &str) {
        std::fs::remove_file(self.path(name)).unwrap();
    }

    pub fn set_temperatures(&self, cpu_millidegrees: i64, gpu_millidegrees: i64) {
        self.write("thermal_zone0", &cpu_millidegrees.to_string());
        self.write("thermal_zone1", &gpu_millidegrees.to_string());
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
        }
    }

    /// Default configuration pointed at this tree, with short intervals and
    /// scheduler tuning switched off.
    pub fn config(&self) -> Config {
        let root = self.root();
        let mut config = Config {
            paths: PathsCfg {
                base: Some(root.join("faustus")),
                cpu_temp: Some(self.path("thermal_zone0").to_path_buf()),
                gpu_temp: Some(self.path("thermal_zone1").to_path_buf()),
                battery_status: Some(self.path("battery_status").to_path_buf()),
                gamemode: Some(self.path("gamemode").to_path_buf()),
                proc_stat: Some(self.path("proc_stat").to_path_buf()),
                gpu_utilization: Some(self.path("gpu_utilization").to_path_buf()),
                proc_root: Some(root.join("proc")),
                ..Default::default()
            },
            ..Default::default()
        };
        config.retry.max_retries = 2;
        config.retry.initial_delay_ms = 1;
        config.timing.keyboard_ac_interval_ms = 20;
        config.timing.keyboard_battery_interval_ms = 20;
        config.timing.thermal_interval_ms = 20;
        config.timing.power_interval_ms = 20;
        config.timing.fan_interval_ms = 20;
        config.timing.monitor_interval_ms = 50;
        config.timing.cpu_sample_interval_ms = 0;
        config.thermal.sched_tuning.enabled = false;
        config.dbus.enabled = false;
        config
    }

    pub fn paths(&self) -> ControlPaths {
        self.config().control_paths()
    }
}
