//! Sysfs GPIO control files
//!
//! Layout under the root (`/sys/class/gpio` on a real system):
//! ```text
//! export
//! unexport
//! gpio<N>/
//!   direction
//!   edge
//!   value
//! ```

use crate::error::{GpioError, Result};
use nix::fcntl::OFlag;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default sysfs GPIO root
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Values accepted by a line's `direction` file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    /// Output, initially driven high
    High,
    /// Output, initially driven low
    Low,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::High => "high",
            Direction::Low => "low",
        }
    }
}

/// Values accepted by a line's `edge` file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    None,
    Rising,
    Falling,
    Both,
}

impl Edge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Edge::None => "none",
            Edge::Rising => "rising",
            Edge::Falling => "falling",
            Edge::Both => "both",
        }
    }
}

/// Claims, configures and releases lines
///
/// `SysfsControl` is the real implementation; tests substitute their own.
pub trait PinControl: Send + Sync {
    /// Claim the line. Fails if it is already claimed.
    fn export(&self, pin: u32) -> Result<()>;

    fn unexport(&self, pin: u32) -> Result<()>;

    fn write_direction(&self, pin: u32, direction: Direction) -> Result<()>;

    fn write_edge(&self, pin: u32, edge: Edge) -> Result<()>;

    fn value_path(&self, pin: u32) -> PathBuf;
}

/// Sysfs-backed line control
#[derive(Debug, Clone)]
pub struct SysfsControl {
    root: PathBuf,
}

impl SysfsControl {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }
}

impl Default for SysfsControl {
    fn default() -> Self {
        Self::new(SYSFS_GPIO_ROOT)
    }
}

impl PinControl for SysfsControl {
    fn export(&self, pin: u32) -> Result<()> {
        let value = self.value_path(pin);
        if value.exists() {
            return Err(GpioError::AlreadyExported(pin));
        }

        write_control(&self.root.join("export"), &pin.to_string())?;

        if !value.exists() {
            return Err(GpioError::ExportMissing(pin));
        }
        debug!(pin, "Exported");
        Ok(())
    }

    fn unexport(&self, pin: u32) -> Result<()> {
        write_control(&self.root.join("unexport"), &pin.to_string())?;
        debug!(pin, "Unexported");
        Ok(())
    }

    fn write_direction(&self, pin: u32, direction: Direction) -> Result<()> {
        write_control(&self.pin_dir(pin).join("direction"), direction.as_str())
    }

    fn write_edge(&self, pin: u32, edge: Edge) -> Result<()> {
        write_control(&self.pin_dir(pin).join("edge"), edge.as_str())
    }

    fn value_path(&self, pin: u32) -> PathBuf {
        self.pin_dir(pin).join("value")
    }
}

/// Write a control file synchronously. The file must already exist.
fn write_control(path: &Path, contents: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .custom_flags(OFlag::O_SYNC.bits())
        .open(path)
        .map_err(|e| GpioError::io(path, e))?;

    file.write_all(contents.as_bytes())
        .map_err(|e| GpioError::io(path, e))?;
    Ok(())
}
