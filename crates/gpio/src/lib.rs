//! GPIO line management over the sysfs interface
//!
//! This crate provides:
//! - The sysfs control layer (export, unexport, direction, edge)
//! - `LineHandle`: an opened, edge-configured input line
//! - `GpioLines`: the process-wide set of open lines and their watches

pub mod error;
pub mod line;
pub mod lines;
pub mod sysfs;

pub use error::{GpioError, Result};
pub use line::LineHandle;
pub use lines::GpioLines;
pub use sysfs::{Direction, Edge, PinControl, SysfsControl, SYSFS_GPIO_ROOT};
