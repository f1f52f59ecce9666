//! Typed accessors for the platform's control files.
//!
//! Each gateway owns its own [`PseudoFileStore`]; handles are never shared
//! between gateways or control loops.

pub mod keyboard;
pub mod power;
pub mod thermal;

pub use keyboard::KeyboardGateway;
pub use power::PowerGateway;
pub use thermal::ThermalGateway;

use std::fmt;

use log::warn;

use crate::{
    control_path::ControlPath,
    error::{ControlError, Result},
    modes::DeviceEnum,
    pseudo_file::PseudoFileStore,
};

/// A device state transition that was written to hardware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceChange {
    pub device: &'static str,
    pub value: String,
}

impl DeviceChange {
    pub fn of<E: DeviceEnum>(value: E) -> Self {
        Self {
            device: E::DEVICE,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for DeviceChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.device, self.value)
    }
}

async fn read_enum<E: DeviceEnum>(store: &PseudoFileStore, control: &ControlPath) -> Result<E> {
    let content = store.read(control).await?;
    let code = control.decode_u8(&content)?;
    E::from_code(code).ok_or_else(|| {
        ControlError::decode(
            control.path(),
            &content,
            format!("unknown {} code {code}", E::DEVICE),
        )
    })
}

/// Reads an enum, falling back to `default` on any failure.
async fn read_enum_or<E: DeviceEnum>(
    store: &PseudoFileStore,
    control: &ControlPath,
    default: E,
) -> E {
    read_enum(store, control).await.unwrap_or_else(|e| {
        log::error!("Failed to read {}: {e}", E::DEVICE);
        default
    })
}

/// Unconditional write; failures are logged and dropped.
async fn write_enum<E: DeviceEnum>(
    store: &PseudoFileStore,
    control: &ControlPath,
    value: E,
) -> Option<DeviceChange> {
    match store.write(control, &value.code().to_string()).await {
        Ok(()) => {
            log::info!("{} set to: {value}", E::DEVICE);
            Some(DeviceChange::of(value))
        }
        Err(e) => {
            log::error!("Failed to set {} to {value}: {e}", E::DEVICE);
            None
        }
    }
}

/// Writes `target` unless the file already reports it.
///
/// An unreadable current value never suppresses the write.
async fn apply_enum<E: DeviceEnum>(
    store: &PseudoFileStore,
    control: &ControlPath,
    target: E,
) -> Option<DeviceChange> {
    match read_enum::<E>(store, control).await {
        Ok(current) if current == target => return None,
        Ok(_) => {}
        Err(e) => warn!("Current {} unknown ({e}), writing {target}", E::DEVICE),
    }
    write_enum(store, control, target).await
}
