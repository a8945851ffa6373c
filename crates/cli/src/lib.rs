//! gpiotrigger command-line application
//!
//! Split from `main.rs` so configuration and the run loop can be tested.

pub mod app;
pub mod config;

pub use app::{run, RunOutcome};
pub use config::{ConfigOverrides, WatchConfig};
