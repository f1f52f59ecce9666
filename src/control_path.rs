//! Typed descriptions of the pseudo-files the daemon reads and writes.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::error::{ControlError, Result};

/// How a control file may be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Access {
    pub fn readable(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }
}

/// Text encoding of the single value stored in a control file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Free text, compared or forwarded as-is.
    Raw,
    /// Decimal integer.
    Integer,
    /// Decimal integer in millidegrees Celsius.
    Millidegrees,
}

/// One kernel-exposed control file.
///
/// Defined once from configuration and never created or destroyed at
/// runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPath {
    path: PathBuf,
    access: Access,
    encoding: Encoding,
}

impl ControlPath {
    pub fn new(path: impl Into<PathBuf>, access: Access, encoding: Encoding) -> Self {
        Self {
            path: path.into(),
            access,
            encoding,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Parses an integer value from the file content.
    pub fn decode_integer(&self, content: &str) -> Result<i64> {
        debug_assert_ne!(self.encoding, Encoding::Raw, "{} is free text", self);
        content
            .trim()
            .parse::<i64>()
            .map_err(|e| ControlError::decode(&self.path, content, e))
    }

    /// Parses a millidegree reading and converts it to degrees Celsius.
    pub fn decode_celsius(&self, content: &str) -> Result<f32> {
        let millidegrees = self.decode_integer(content)?;
        match self.encoding {
            Encoding::Millidegrees => Ok(millidegrees as f32 / 1000.0),
            _ => Ok(millidegrees as f32),
        }
    }

    /// Parses a small unsigned code such as a mode or a percentage.
    pub fn decode_u8(&self, content: &str) -> Result<u8> {
        let value = self.decode_integer(content)?;
        u8::try_from(value).map_err(|e| ControlError::decode(&self.path, content, e))
    }
}

impl fmt::Display for ControlPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Keyboard backlight controller files.
#[derive(Debug, Clone)]
pub struct KeyboardPaths {
    pub mode: ControlPath,
    pub speed: ControlPath,
    pub flags: ControlPath,
    pub red: ControlPath,
    pub green: ControlPath,
    pub blue: ControlPath,
    pub apply: ControlPath,
}

/// Every control file the daemon touches, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ControlPaths {
    pub keyboard: KeyboardPaths,
    pub fan_mode: ControlPath,
    pub power_profile: ControlPath,
    pub gpu_mode: ControlPath,
    pub throttle_policy: ControlPath,
    pub cpu_temp: ControlPath,
    pub gpu_temp: ControlPath,
    pub battery_status: ControlPath,
    pub gamemode: ControlPath,
    pub proc_stat: ControlPath,
    pub gpu_utilization: ControlPath,
    /// Root of the procfs tree scanned for workload processes.
    pub proc_root: PathBuf,
}
