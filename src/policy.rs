//! Pure decision rules shared by the device gateways.
//!
//! Nothing in here touches a file; gateways feed observations in and apply
//! whatever comes out.

use crate::modes::{FanMode, GpuMode, PowerProfile, ThrottlePolicy};

/// Keyboard backlight colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// Maps utilisation percentages to a backlight colour.
///
/// Red follows the CPU, green the GPU and blue fades out as the busier of
/// the two climbs. Every channel is scaled by `brightness`.
pub fn led_color(cpu_percent: u8, gpu_percent: u8, brightness: f32, max_value: u8) -> Rgb {
    let cpu = cpu_percent.min(100);
    let gpu = gpu_percent.min(100);
    let scale = |value: u8| (brightness * f32::from(value)) as u8;

    Rgb {
        red: scale(cpu),
        green: scale(gpu),
        blue: scale(max_value.saturating_sub(cpu.max(gpu))),
    }
}

/// CPU busy percentage between two `/proc/stat` samples.
///
/// Returns 0 when no ticks elapsed instead of dividing by zero.
pub fn cpu_busy_percent(idle_delta: u64, total_delta: u64) -> u8 {
    if total_delta == 0 {
        return 0;
    }
    let idle_ratio = idle_delta as f64 / total_delta as f64;
    (100.0 * (1.0 - idle_ratio)).round().clamp(0.0, 100.0) as u8
}

/// One evaluation of the automatic fan boost.
///
/// Boost is entered at `threshold` and left only below
/// `threshold - hysteresis`; inside the band nothing changes.
pub fn fan_boost_step(
    max_temp: f32,
    current: FanMode,
    threshold: f32,
    hysteresis: f32,
) -> Option<FanMode> {
    if max_temp >= threshold && current != FanMode::Boost {
        Some(FanMode::Boost)
    } else if max_temp < threshold - hysteresis && current == FanMode::Boost {
        Some(FanMode::Normal)
    } else {
        None
    }
}

/// Target device state for a power-source / performance-mode pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerPlan {
    pub profile: PowerProfile,
    pub gpu: GpuMode,
    /// `None` leaves the fan untouched.
    pub fan: Option<FanMode>,
}

pub fn power_plan(on_battery: bool, performance_mode: bool) -> PowerPlan {
    match (on_battery, performance_mode) {
        (true, false) => PowerPlan {
            profile: PowerProfile::Powersave,
            gpu: GpuMode::Eco,
            fan: Some(FanMode::Silent),
        },
        (true, true) => PowerPlan {
            profile: PowerProfile::Powersave,
            gpu: GpuMode::Eco,
            fan: None,
        },
        (false, true) => PowerPlan {
            profile: PowerProfile::Performance,
            gpu: GpuMode::Boost,
            fan: Some(FanMode::Boost),
        },
        (false, false) => PowerPlan {
            profile: PowerProfile::Balanced,
            gpu: GpuMode::Standard,
            fan: Some(FanMode::Normal),
        },
    }
}

/// Which rule selected the thermal throttle policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermalRule {
    OnBattery,
    Gamemode,
    CompilerWorkload,
    Default,
}

impl ThermalRule {
    pub fn target(self) -> ThrottlePolicy {
        match self {
            Self::OnBattery => ThrottlePolicy::Silent,
            Self::Gamemode | Self::CompilerWorkload => ThrottlePolicy::Boost,
            Self::Default => ThrottlePolicy::Normal,
        }
    }

    /// Scheduler tuning value applied after a transition, if any.
    pub fn sched_tuning(self) -> Option<u8> {
        match self {
            Self::OnBattery => Some(3),
            Self::Gamemode | Self::Default => Some(1),
            Self::CompilerWorkload => None,
        }
    }

    /// The compiler rule rewrites boost on every evaluation.
    pub fn skips_redundant_writes(self) -> bool {
        !matches!(self, Self::CompilerWorkload)
    }
}
