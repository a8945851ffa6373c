//! Test doubles for lines and actions

use crate::action::{Action, ActionError, ActionOutput};
use crate::debounce::LineSampler;
use async_trait::async_trait;
use gpio::GpioError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Replays scripted samples (`None` is a failed read), then repeats `rest`
pub(crate) struct ScriptedLine {
    script: Mutex<VecDeque<Option<u8>>>,
    rest: u8,
    pub(crate) reads: AtomicUsize,
}

impl ScriptedLine {
    pub(crate) fn new(script: &[Option<u8>], rest: u8) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.iter().copied().collect()),
            rest,
            reads: AtomicUsize::new(0),
        })
    }
}

impl LineSampler for ScriptedLine {
    fn sample(&self) -> Result<u8, GpioError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().pop_front() {
            Some(Some(value)) => Ok(value),
            Some(None) => Err(GpioError::EmptyValue { pin: 27 }),
            None => Ok(self.rest),
        }
    }
}

#[derive(Default)]
pub(crate) struct CountingAction {
    pub(crate) fired: AtomicUsize,
}

#[async_trait]
impl Action for CountingAction {
    async fn fire(&self) -> Result<ActionOutput, ActionError> {
        self.fired.fetch_add(1, Ordering::SeqCst);
        Ok(ActionOutput {
            stdout: "fired\n".to_string(),
            status: Some(0),
            ..Default::default()
        })
    }
}
