//! Watch configuration
//!
//! Values come from three layers: command-line flags override an optional
//! TOML file, which overrides the built-in defaults.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use watcher::DebouncePolicy;

pub const DEFAULT_COMMAND: &str = "echo hello, world";
pub const DEFAULT_HOLD_TICKS: u32 = 5;
pub const DEFAULT_PIN: u32 = 27;
pub const DEFAULT_TICK_MS: u64 = 1000;

const MAX_HOLD_TICKS: u32 = 86_400;
const MAX_TICK_MS: u64 = 60_000;

/// Everything one run needs
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Shell command run once the edge is confirmed
    pub command: String,
    /// Ticks the level must hold
    pub time: u32,
    /// Sysfs line number
    pub pin: u32,
    /// Tick length in milliseconds
    pub tick_ms: u64,
    pub sysfs_root: PathBuf,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_string(),
            time: DEFAULT_HOLD_TICKS,
            pin: DEFAULT_PIN,
            tick_ms: DEFAULT_TICK_MS,
            sysfs_root: PathBuf::from(gpio::SYSFS_GPIO_ROOT),
        }
    }
}

/// Values given on the command line; `None` keeps the lower layer
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub command: Option<String>,
    pub time: Option<u32>,
    pub pin: Option<u32>,
    pub tick_ms: Option<u64>,
    pub sysfs_root: Option<PathBuf>,
}

impl WatchConfig {
    /// Defaults, or the file at `path` layered over them
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(command) = overrides.command {
            self.command = command;
        }
        if let Some(time) = overrides.time {
            self.time = time;
        }
        if let Some(pin) = overrides.pin {
            self.pin = pin;
        }
        if let Some(tick_ms) = overrides.tick_ms {
            self.tick_ms = tick_ms;
        }
        if let Some(root) = overrides.sysfs_root {
            self.sysfs_root = root;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            bail!("command must not be empty");
        }
        if self.time > MAX_HOLD_TICKS {
            bail!("time must be at most {} ticks, got {}", MAX_HOLD_TICKS, self.time);
        }
        if self.tick_ms == 0 || self.tick_ms > MAX_TICK_MS {
            bail!("tick_ms must be between 1 and {}, got {}", MAX_TICK_MS, self.tick_ms);
        }
        Ok(())
    }

    pub fn policy(&self) -> DebouncePolicy {
        DebouncePolicy {
            hold_ticks: self.time,
            tick: Duration::from_millis(self.tick_ms),
            ..Default::default()
        }
    }
}
