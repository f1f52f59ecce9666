//! Error taxonomy for pseudo-file access and device gateways.

use std::{io, path::PathBuf};

/// Result type alias for store and gateway operations.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors raised while talking to kernel control files.
///
/// Gateways translate `Io` and `Decode` into safe defaults or dropped
/// writes; only `Initialization` is allowed to stop the daemon.
#[derive(thiserror::Error, Debug)]
pub enum ControlError {
    #[error("I/O failure on {path} after {attempts} attempt(s): {source}")]
    Io {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("Failed to decode {content:?} from {path}: {reason}")]
    Decode {
        path: PathBuf,
        content: String,
        reason: String,
    },

    #[error("Failed to initialize {component}: {source}")]
    Initialization {
        component: &'static str,
        #[source]
        source: Box<ControlError>,
    },
}

impl ControlError {
    pub(crate) fn decode(path: impl Into<PathBuf>, content: &str, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.into(),
            content: content.trim().to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn initialization(component: &'static str, source: ControlError) -> Self {
        Self::Initialization {
            component,
            source: Box::new(source),
        }
    }
}
