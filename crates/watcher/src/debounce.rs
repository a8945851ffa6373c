//! Debounce confirmation
//!
//! An edge only counts once the line holds the level it fell to for
//! `hold_ticks` consecutive samples. Every sample is compared against that
//! level; one that differs aborts the attempt as chatter. A failed read says
//! nothing either way and does not advance the count.
//!
//! With `hold_ticks = 3` and a one second tick, samples at t=0,1,2 are
//! compared against the level and the sample at t=3 confirms.

use crate::action::{Action, ActionError, ActionOutput};
use gpio::GpioError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Reads the current level of the watched line
pub trait LineSampler: Send + Sync {
    fn sample(&self) -> Result<u8, GpioError>;
}

/// How long a level must hold before an edge is confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebouncePolicy {
    /// Consecutive stable samples required
    pub hold_ticks: u32,
    /// Interval between samples
    pub tick: Duration,
    /// Level the line must hold; 0 after a falling edge
    pub level: u8,
}

impl Default for DebouncePolicy {
    fn default() -> Self {
        Self {
            hold_ticks: 5,
            tick: Duration::from_secs(1),
            level: 0,
        }
    }
}

/// Allows a single confirmation attempt per line at a time
#[derive(Debug, Default)]
pub struct TriggerGuard {
    active: AtomicBool,
}

impl TriggerGuard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the guard; `None` while another attempt holds it
    pub fn try_acquire(self: &Arc<Self>) -> Option<GuardPermit> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GuardPermit {
                guard: Arc::clone(self),
                retained: false,
            })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn release(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Held by a running attempt; releases the guard on drop
#[derive(Debug)]
pub struct GuardPermit {
    guard: Arc<TriggerGuard>,
    retained: bool,
}

impl GuardPermit {
    /// Keep the guard claimed for good: the line is done triggering
    pub fn retain(mut self) {
        self.retained = true;
    }
}

impl Drop for GuardPermit {
    fn drop(&mut self) {
        if !self.retained {
            self.guard.release();
        }
    }
}

/// How an attempt ended
#[derive(Debug)]
pub enum Outcome {
    /// The level held; the action ran once
    Confirmed(Result<ActionOutput, ActionError>),
    /// The level changed before the hold time elapsed
    Aborted { baseline: u8, observed: u8, elapsed: u32 },
}

impl Outcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Outcome::Confirmed(_))
    }
}

/// Decision after one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Confirm,
    Abort { baseline: u8, observed: u8 },
}

/// One confirmation attempt for one line
pub struct DebounceMonitor {
    pin: u32,
    policy: DebouncePolicy,
    sampler: Arc<dyn LineSampler>,
    action: Arc<dyn Action>,
    permit: GuardPermit,
    elapsed: u32,
}

impl DebounceMonitor {
    pub fn new(
        pin: u32,
        policy: DebouncePolicy,
        sampler: Arc<dyn LineSampler>,
        action: Arc<dyn Action>,
        permit: GuardPermit,
    ) -> Self {
        Self {
            pin,
            policy,
            sampler,
            action,
            permit,
            elapsed: 0,
        }
    }

    fn observe(&mut self, sample: Result<u8, GpioError>) -> Step {
        let value = match sample {
            Ok(value) => value,
            Err(e) => {
                debug!(pin = self.pin, error = %e, "Sample failed, inconclusive");
                return Step::Continue;
            }
        };

        let baseline = self.policy.level;
        if self.elapsed >= self.policy.hold_ticks {
            return Step::Confirm;
        }
        if value != baseline {
            return Step::Abort {
                baseline,
                observed: value,
            };
        }

        self.elapsed += 1;
        debug!(pin = self.pin, value, elapsed = self.elapsed, "Level held");
        Step::Continue
    }

    /// Sample until the attempt confirms or aborts
    pub async fn run(mut self) -> Outcome {
        debug!(pin = self.pin, hold_ticks = self.policy.hold_ticks, "Debounce started");

        loop {
            let sample = self.sampler.sample();
            match self.observe(sample) {
                Step::Continue => tokio::time::sleep(self.policy.tick).await,
                Step::Confirm => {
                    info!(pin = self.pin, elapsed = self.elapsed, "Edge confirmed");

                    let Self { permit, action, .. } = self;
                    permit.retain();
                    return Outcome::Confirmed(action.fire().await);
                }
                Step::Abort { baseline, observed } => {
                    debug!(
                        pin = self.pin,
                        baseline,
                        observed,
                        elapsed = self.elapsed,
                        "Level changed, treating edge as chatter"
                    );
                    // Dropping `self` releases the guard for the next edge.
                    return Outcome::Aborted {
                        baseline,
                        observed,
                        elapsed: self.elapsed,
                    };
                }
            }
        }
    }
}
