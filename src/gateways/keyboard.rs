//! Keyboard backlight and the utilisation readings that drive it.

use std::time::Duration;

use futures::future::join_all;
use log::{debug, error, info};
use tokio::{sync::Mutex, time::Instant};

use crate::{
    config::LedCfg,
    control_path::{ControlPath, ControlPaths, KeyboardPaths},
    error::{ControlError, Result},
    policy::{self, Rgb},
    pseudo_file::{PseudoFileStore, StoreStats},
    retry::RetryPolicy,
};

/// One colour channel of the backlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedChannel {
    Red,
    Green,
    Blue,
}

/// Idle and total jiffies from the aggregate `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtilizationSample {
    pub idle: u64,
    pub total: u64,
    pub at: Instant,
}

impl UtilizationSample {
    fn parse(control: &ControlPath, content: &str) -> Result<Self> {
        let line = content.lines().next().unwrap_or_default();
        let fields = line
            .split_whitespace()
            .skip(1)
            .map(str::parse::<u64>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ControlError::decode(control.path(), line, e))?;

        let idle = *fields
            .get(3)
            .ok_or_else(|| ControlError::decode(control.path(), line, "missing idle field"))?;

        Ok(Self {
            idle,
            total: fields.iter().sum(),
            at: Instant::now(),
        })
    }
}

#[derive(Debug, Default)]
struct CpuSampler {
    previous: Option<UtilizationSample>,
    last_percent: u8,
}

/// Gateway for the RGB keyboard backlight.
#[derive(Debug)]
pub struct KeyboardGateway {
    store: PseudoFileStore,
    keyboard: KeyboardPaths,
    proc_stat: ControlPath,
    gpu_utilization: ControlPath,
    led: LedCfg,
    sample_interval: Duration,
    sampler: Mutex<CpuSampler>,
}

impl KeyboardGateway {
    pub fn new(
        paths: &ControlPaths,
        led: LedCfg,
        sample_interval: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store: PseudoFileStore::new(retry),
            keyboard: paths.keyboard.clone(),
            proc_stat: paths.proc_stat.clone(),
            gpu_utilization: paths.gpu_utilization.clone(),
            led,
            sample_interval,
            sampler: Mutex::new(CpuSampler::default()),
        }
    }

    /// Puts the LED controller into static mode with all zones enabled.
    pub async fn initialize(&self) -> Result<()> {
        let kb = &self.keyboard;
        for (control, value) in [(&kb.mode, "0"), (&kb.speed, "0"), (&kb.flags, "ff")] {
            self.store
                .write(control, value)
                .await
                .map_err(|e| ControlError::initialization("keyboard backlight", e))?;
        }
        info!("Keyboard backlight initialized");
        Ok(())
    }

    /// CPU busy percentage since the previous sample.
    ///
    /// Recomputed at most once per sample interval; calls inside the window
    /// return the last value. The first call only records a baseline and
    /// returns 0.
    pub async fn compute_cpu_utilization(&self) -> u8 {
        let mut sampler = self.sampler.lock().await;

        if let Some(previous) = sampler.previous {
            if previous.at.elapsed() < self.sample_interval {
                return sampler.last_percent;
            }
        }

        let sample = match self.read_cpu_sample().await {
            Ok(sample) => sample,
            Err(e) => {
                error!("Failed to read CPU utilization: {e}");
                return 0;
            }
        };

        let percent = match sampler.previous.replace(sample) {
            Some(previous) => policy::cpu_busy_percent(
                sample.idle.saturating_sub(previous.idle),
                sample.total.saturating_sub(previous.total),
            ),
            None => 0,
        };
        sampler.last_percent = percent;
        percent
    }

    async fn read_cpu_sample(&self) -> Result<UtilizationSample> {
        let content = self.store.read(&self.proc_stat).await?;
        UtilizationSample::parse(&self.proc_stat, &content)
    }

    /// GPU utilisation clamped to 0..=100; 0 when unavailable.
    pub async fn read_gpu_utilization(&self) -> u8 {
        match self.read_gpu_value().await {
            Ok(value) => value.clamp(0, 100) as u8,
            Err(e) => {
                debug!("GPU utilization unavailable: {e}");
                0
            }
        }
    }

    async fn read_gpu_value(&self) -> Result<i64> {
        let content = self.store.read(&self.gpu_utilization).await?;
        self.gpu_utilization.decode_integer(&content)
    }

    pub async fn set_led(&self, channel: LedChannel, value: u8) -> Result<()> {
        let control = match channel {
            LedChannel::Red => &self.keyboard.red,
            LedChannel::Green => &self.keyboard.green,
            LedChannel::Blue => &self.keyboard.blue,
        };
        self.store.write(control, &value.to_string()).await
    }

    /// Latches the channel values written so far.
    pub async fn commit(&self) -> Result<()> {
        self.store.write(&self.keyboard.apply, "1").await
    }

    /// Writes the colour for the given utilisation, then commits once.
    pub async fn update_leds(&self, cpu_percent: u8, gpu_percent: u8, dimmed: bool) -> Rgb {
        let brightness = if dimmed {
            self.led.brightness_dimmed
        } else {
            self.led.brightness_normal
        };
        let rgb = policy::led_color(cpu_percent, gpu_percent, brightness, self.led.max_value);

        let writes = [
            (LedChannel::Red, rgb.red),
            (LedChannel::Green, rgb.green),
            (LedChannel::Blue, rgb.blue),
        ]
        .map(|(channel, value)| async move { (channel, self.set_led(channel, value).await) });

        for (channel, result) in join_all(writes).await {
            if let Err(e) = result {
                error!("Failed to set {channel:?} LED: {e}");
            }
        }

        if let Err(e) = self.commit().await {
            error!("Failed to commit LED colour: {e}");
        }
        rgb
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub async fn release(&self) -> usize {
        self.store.close_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SysfsFixture;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn gateway(fx: &SysfsFixture, sample_interval: Duration) -> KeyboardGateway {
        KeyboardGateway::new(&fx.paths(), LedCfg::default(), sample_interval, fx.retry())
    }

    #[tokio::test]
    async fn initialize_writes_static_mode() {
        let fx = SysfsFixture::new();
        fx.write("kbbl_flags", "00");
        gateway(&fx, Duration::ZERO).initialize().await.unwrap();

        assert_eq!(fx.read("kbbl_mode"), "0");
        assert_eq!(fx.read("kbbl_speed"), "0");
        assert_eq!(fx.read("kbbl_flags"), "ff");
    }

    #[tokio::test]
    async fn initialize_failure_is_fatal() {
        let fx = SysfsFixture::new();
        fx.remove("kbbl_speed");
        let err = gateway(&fx, Duration::ZERO).initialize().await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::Initialization {
                component: "keyboard backlight",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cpu_utilization_from_deltas() {
        let fx = SysfsFixture::new();
        let gw = gateway(&fx, Duration::ZERO);

        // idle=100 total=500
        assert_eq!(gw.compute_cpu_utilization().await, 0);
        // idle=150 total=600
        fx.write("proc_stat", "cpu  100 0 350 150 0 0 0 0 0 0\n");
        assert_eq!(gw.compute_cpu_utilization().await, 50);
    }

    #[tokio::test]
    async fn cpu_utilization_is_throttled() {
        let fx = SysfsFixture::new();
        let gw = gateway(&fx, Duration::from_secs(3600));

        assert_eq!(gw.compute_cpu_utilization().await, 0);
        fx.write("proc_stat", "cpu  100 0 350 150 0 0 0 0 0 0\n");
        assert_eq!(gw.compute_cpu_utilization().await, 0);
        assert_eq!(gw.stats().reads, 1);
    }

    #[tokio::test]
    async fn cpu_utilization_without_elapsed_ticks() {
        let fx = SysfsFixture::new();
        let gw = gateway(&fx, Duration::ZERO);
        gw.compute_cpu_utilization().await;
        assert_eq!(gw.compute_cpu_utilization().await, 0);
    }

    #[tokio::test]
    async fn malformed_proc_stat_yields_zero() {
        let fx = SysfsFixture::new();
        fx.write("proc_stat", "cpu 1 2\n");
        assert_eq!(gateway(&fx, Duration::ZERO).compute_cpu_utilization().await, 0);
    }

    #[tokio::test]
    async fn gpu_utilization_is_clamped() {
        let fx = SysfsFixture::new();
        let gw = gateway(&fx, Duration::ZERO);

        fx.write("gpu_utilization", "37\n");
        assert_eq!(gw.read_gpu_utilization().await, 37);
        fx.write("gpu_utilization", "140");
        assert_eq!(gw.read_gpu_utilization().await, 100);
        fx.write("gpu_utilization", "-3");
        assert_eq!(gw.read_gpu_utilization().await, 0);
        fx.write("gpu_utilization", "N/A");
        assert_eq!(gw.read_gpu_utilization().await, 0);
    }

    #[tokio::test]
    async fn update_leds_writes_channels_then_commits_once() {
        let fx = SysfsFixture::new();
        let gw = gateway(&fx, Duration::ZERO);

        let rgb = gw.update_leds(40, 70, false).await;
        assert_eq!(
            rgb,
            Rgb {
                red: 40,
                green: 70,
                blue: 185
            }
        );
        assert_eq!(fx.read("red"), "40");
        assert_eq!(fx.read("green"), "70");
        assert_eq!(fx.read("blue"), "185");
        assert_eq!(fx.read("apply"), "1");
        assert_eq!(gw.stats().writes, 4);
    }

    #[tokio::test]
    async fn commit_follows_failed_channel() {
        let fx = SysfsFixture::new();
        fx.remove("green");
        let gw = gateway(&fx, Duration::ZERO);

        gw.update_leds(10, 10, true).await;
        assert_eq!(fx.read("apply"), "1");
        assert_eq!(gw.stats().writes, 3);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn leds_match_mapping(cpu in 0u8..=100, gpu in 0u8..=100, dimmed in any::<bool>()) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let fx = SysfsFixture::new();
            let gw = gateway(&fx, Duration::ZERO);

            let rgb = runtime.block_on(gw.update_leds(cpu, gpu, dimmed));
            let coef = if dimmed { 0.8 } else { 1.0 };
            prop_assert_eq!(fx.read("red"), ((coef * f32::from(cpu)) as u8).to_string());
            prop_assert_eq!(fx.read("green"), ((coef * f32::from(gpu)) as u8).to_string());
            prop_assert_eq!(fx.read("blue"), rgb.blue.to_string());
            prop_assert_eq!(gw.stats().writes, 4);
        }
    }
}
