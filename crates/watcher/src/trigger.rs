//! Edge events to debounce attempts

use crate::action::Action;
use crate::debounce::{DebounceMonitor, DebouncePolicy, LineSampler, Outcome, TriggerGuard};
use gpio::{GpioError, GpioLines};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;
use trigger_core::EdgeEvent;

/// Samples one line through the shared line registry
pub struct PinSampler {
    lines: Arc<GpioLines>,
    pin: u32,
}

impl PinSampler {
    pub fn new(lines: Arc<GpioLines>, pin: u32) -> Self {
        Self { lines, pin }
    }
}

impl LineSampler for PinSampler {
    fn sample(&self) -> Result<u8, GpioError> {
        self.lines.read_value(self.pin)
    }
}

/// Debounced trigger for a single line
///
/// Edge callbacks arrive on the dispatch thread; each accepted edge spawns a
/// `DebounceMonitor` on the tokio runtime. Every finished attempt is sent on
/// the outcome channel returned by [`PinTrigger::new`].
pub struct PinTrigger {
    pin: u32,
    policy: DebouncePolicy,
    sampler: Arc<dyn LineSampler>,
    action: Arc<dyn Action>,
    guard: Arc<TriggerGuard>,
    runtime: Handle,
    outcomes: mpsc::UnboundedSender<Outcome>,
}

impl PinTrigger {
    pub fn new(
        pin: u32,
        policy: DebouncePolicy,
        sampler: Arc<dyn LineSampler>,
        action: Arc<dyn Action>,
        runtime: Handle,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Outcome>) {
        let (outcomes, outcome_rx) = mpsc::unbounded_channel();
        let trigger = Arc::new(Self {
            pin,
            policy,
            sampler,
            action,
            guard: TriggerGuard::new(),
            runtime,
            outcomes,
        });
        (trigger, outcome_rx)
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// Whether an attempt currently holds the guard
    pub fn is_sampling(&self) -> bool {
        self.guard.is_active()
    }

    /// Route the line's edge events into this trigger
    pub fn arm(self: &Arc<Self>, lines: &GpioLines) -> Result<(), GpioError> {
        let trigger = Arc::clone(self);
        lines.watch(
            self.pin,
            Arc::new(move |event: EdgeEvent| {
                trigger.on_edge(event);
            }),
        )
    }

    /// Start an attempt for `event` unless one is already running
    ///
    /// Returns whether an attempt was started. Edges during an attempt are
    /// dropped, not queued.
    pub fn on_edge(&self, event: EdgeEvent) -> bool {
        let Some(permit) = self.guard.try_acquire() else {
            debug!(pin = self.pin, fd = event.fd, "Edge ignored, attempt in progress");
            return false;
        };

        debug!(pin = self.pin, fd = event.fd, "Edge received, sampling");
        let monitor = DebounceMonitor::new(
            self.pin,
            self.policy,
            Arc::clone(&self.sampler),
            Arc::clone(&self.action),
            permit,
        );
        let outcomes = self.outcomes.clone();
        self.runtime.spawn(async move {
            let outcome = monitor.run().await;
            // A closed channel means the owner is already tearing down.
            let _ = outcomes.send(outcome);
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingAction, ScriptedLine};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::time::Instant;
    use trigger_core::EpollFlags;

    fn edge() -> EdgeEvent {
        EdgeEvent::new(3, EpollFlags::EPOLLPRI | EpollFlags::EPOLLERR)
    }

    fn trigger_for(
        line: &Arc<ScriptedLine>,
        action: &Arc<CountingAction>,
    ) -> (Arc<PinTrigger>, mpsc::UnboundedReceiver<Outcome>) {
        PinTrigger::new(
            27,
            DebouncePolicy {
                hold_ticks: 3,
                tick: Duration::from_secs(1),
                level: 0,
            },
            Arc::clone(line) as Arc<dyn LineSampler>,
            Arc::clone(action) as Arc<dyn Action>,
            Handle::current(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_edges_during_attempt_are_dropped() {
        let line = ScriptedLine::new(&[], 0);
        let action = Arc::new(CountingAction::default());
        let (trigger, mut outcomes) = trigger_for(&line, &action);

        assert!(trigger.on_edge(edge()));
        assert!(trigger.is_sampling());

        // Chatter faster than the tick
        for _ in 0..10 {
            assert!(!trigger.on_edge(edge()));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let outcome = outcomes.recv().await.unwrap();
        assert!(outcome.is_confirmed());
        assert_eq!(action.fired.load(Ordering::SeqCst), 1);

        // Only one attempt ever sampled: 4 reads for a 3 tick hold
        assert_eq!(line.reads.load(Ordering::SeqCst), 4);
        assert!(outcomes.try_recv().is_err());

        // A confirmed trigger stays closed
        assert!(!trigger.on_edge(edge()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_attempt_allows_next_edge() {
        let line = ScriptedLine::new(&[Some(0), Some(0), Some(1)], 0);
        let action = Arc::new(CountingAction::default());
        let (trigger, mut outcomes) = trigger_for(&line, &action);

        assert!(trigger.on_edge(edge()));
        let outcome = outcomes.recv().await.unwrap();
        assert!(matches!(outcome, Outcome::Aborted { .. }));
        assert_eq!(action.fired.load(Ordering::SeqCst), 0);
        assert!(!trigger.is_sampling());

        let start = Instant::now();
        assert!(trigger.on_edge(edge()));
        let outcome = outcomes.recv().await.unwrap();
        assert!(outcome.is_confirmed());
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(action.fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_arm_unopened_line_is_noop() {
        let lines = Arc::new(GpioLines::sysfs());
        lines.initialize().unwrap();

        let sampler = Arc::new(PinSampler::new(Arc::clone(&lines), 27));
        let action = Arc::new(CountingAction::default());
        let (trigger, _outcomes) = PinTrigger::new(
            27,
            DebouncePolicy::default(),
            sampler,
            action,
            Handle::current(),
        );

        trigger.arm(&lines).unwrap();
        assert_eq!(trigger.pin(), 27);
        assert!(lines.open_pins().is_empty());

        lines.finalize().unwrap();
    }

    #[test]
    fn test_pin_sampler_reads_sentinel_for_unopened_line() {
        let lines = Arc::new(GpioLines::sysfs());
        let sampler = PinSampler::new(lines, 99);
        assert_eq!(sampler.sample().unwrap(), 0);
    }
}
