//! Error types for GPIO line handling

use std::path::PathBuf;
use thiserror::Error;
use trigger_core::EventLoopError;

/// GPIO errors
#[derive(Error, Debug)]
pub enum GpioError {
    /// The line's value file existed before we exported it
    #[error("gpio{0} already exported")]
    AlreadyExported(u32),

    #[error("gpio{0} did not appear after export")]
    ExportMissing(u32),

    #[error("gpio{0} is already open")]
    AlreadyOpen(u32),

    #[error("gpio{pin} value is empty")]
    EmptyValue { pin: u32 },

    #[error("gpio{pin} value starts with {byte:#04x}, expected '0' or '1'")]
    InvalidValue { pin: u32, byte: u8 },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    EventLoop(#[from] EventLoopError),

    #[error("failed to watch gpio{pin}: {source}")]
    Watch {
        pin: u32,
        #[source]
        source: EventLoopError,
    },
}

impl GpioError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for GPIO operations
pub type Result<T> = std::result::Result<T, GpioError>;
