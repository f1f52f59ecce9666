//! Closed sets of integer codes accepted by the platform control files.

use std::fmt;

/// A device state that is written to its control file as a small integer.
///
/// Control loops never write raw integers; every value goes through one of
/// these enums first.
pub trait DeviceEnum: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Human-readable device name used in logs and events.
    const DEVICE: &'static str;

    fn code(self) -> u8;

    fn from_code(code: u8) -> Option<Self>;
}

macro_rules! device_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $device:literal {
            $($variant:ident = $code:literal => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl DeviceEnum for $name {
            const DEVICE: &'static str = $device;

            fn code(self) -> u8 {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let label = match self {
                    $(Self::$variant => $label),+
                };
                f.write_str(label)
            }
        }
    };
}

device_enum! {
    /// Fan boost mode (`fan_boost_mode`).
    FanMode, "fan" {
        Normal = 0 => "normal",
        Boost = 1 => "boost",
        Silent = 2 => "silent",
    }
}

device_enum! {
    /// Platform power profile.
    PowerProfile, "power profile" {
        Balanced = 0 => "balanced",
        Performance = 1 => "performance",
        Powersave = 2 => "powersave",
    }
}

device_enum! {
    /// Discrete GPU power state.
    GpuMode, "gpu" {
        Eco = 0 => "eco",
        Standard = 1 => "standard",
        Boost = 2 => "boost",
    }
}

device_enum! {
    /// Thermal throttle policy (`throttle_thermal_policy`).
    ThrottlePolicy, "throttle policy" {
        Normal = 0 => "normal",
        Boost = 1 => "boost",
        Silent = 2 => "silent",
    }
}
