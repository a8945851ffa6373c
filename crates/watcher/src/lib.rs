//! Debounced edge triggering for gpiotrigger
//!
//! This crate provides:
//! - `DebounceMonitor`: confirms an edge by sampling the line once per tick
//! - `TriggerGuard`: at most one confirmation attempt per line
//! - `Action` / `ShellAction`: what runs once an edge is confirmed
//! - `PinTrigger`: ties a watched line to the monitor and the action

pub mod action;
pub mod debounce;
pub mod trigger;

#[cfg(test)]
mod testing;

pub use action::{Action, ActionError, ActionOutput, ShellAction};
pub use debounce::{
    DebounceMonitor, DebouncePolicy, GuardPermit, LineSampler, Outcome, TriggerGuard,
};
pub use trigger::{PinSampler, PinTrigger};
