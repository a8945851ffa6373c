//! Process-wide registry of open lines

use crate::error::{GpioError, Result};
use crate::line::LineHandle;
use crate::sysfs::{Direction, Edge, PinControl, SysfsControl};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::Arc;
use tracing::{debug, info, warn};
use trigger_core::{EventCallback, EventLoop};

/// Open lines and the event loop watching them
///
/// Lines are keyed by descriptor, the key the event loop reports. Lookups by
/// line number scan the map, which holds a handful of entries at most.
/// Lifecycle: [`GpioLines::initialize`] before watching,
/// [`GpioLines::finalize`] to release everything.
pub struct GpioLines {
    control: Arc<dyn PinControl>,
    events: EventLoop,
    lines: RwLock<HashMap<RawFd, Arc<LineHandle>>>,
}

impl GpioLines {
    pub fn new(control: Arc<dyn PinControl>) -> Self {
        Self {
            control,
            events: EventLoop::new(),
            lines: RwLock::new(HashMap::new()),
        }
    }

    /// Lines under the standard `/sys/class/gpio` tree
    pub fn sysfs() -> Self {
        Self::new(Arc::new(SysfsControl::default()))
    }

    /// Start the event loop. Idempotent.
    pub fn initialize(&self) -> Result<()> {
        self.events.initialize()?;
        Ok(())
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.events
    }

    fn find(&self, pin: u32) -> Option<Arc<LineHandle>> {
        self.lines
            .read()
            .values()
            .find(|line| line.number() == pin)
            .cloned()
    }

    fn take(&self, pin: u32) -> Option<Arc<LineHandle>> {
        let mut lines = self.lines.write();
        let fd = lines
            .iter()
            .find(|(_, line)| line.number() == pin)
            .map(|(fd, _)| *fd)?;
        lines.remove(&fd)
    }

    pub fn is_open(&self, pin: u32) -> bool {
        self.find(pin).is_some()
    }

    /// Pin numbers of every open line
    pub fn open_pins(&self) -> Vec<u32> {
        self.lines.read().values().map(|line| line.number()).collect()
    }

    /// Export and configure `pin` as a falling-edge input, then open its value
    ///
    /// Any failure after the export un-exports the line again.
    pub fn open(&self, pin: u32) -> Result<()> {
        if self.is_open(pin) {
            return Err(GpioError::AlreadyOpen(pin));
        }

        self.control.export(pin)?;

        let line = match self.configure(pin) {
            Ok(line) => line,
            Err(e) => {
                if let Err(cleanup) = self.control.unexport(pin) {
                    warn!(pin, error = %cleanup, "Failed to unexport after open error");
                }
                return Err(e);
            }
        };

        let fd = line.fd();
        self.lines.write().insert(fd, Arc::new(line));
        info!(pin, fd, "Opened gpio line");
        Ok(())
    }

    fn configure(&self, pin: u32) -> Result<LineHandle> {
        self.control.write_direction(pin, Direction::In)?;
        // TODO: confirm on hardware whether the "high" write is wanted. It
        // turns the line into an output driven high right after declaring it
        // an input.
        self.control.write_direction(pin, Direction::High)?;
        self.control.write_edge(pin, Edge::Falling)?;
        LineHandle::open(pin, &self.control.value_path(pin))
    }

    /// Close the value file and un-export `pin`. No-op if it is not open.
    ///
    /// The un-export is attempted even when dropping the watch fails.
    pub fn close(&self, pin: u32) -> Result<()> {
        let Some(line) = self.take(pin) else {
            return Ok(());
        };

        let fd = line.fd();
        if self.events.is_watched(fd) {
            if let Err(e) = line.with_fd(|borrowed| self.events.unwatch(borrowed)) {
                warn!(pin, fd, error = %e, "Failed to unwatch line during close");
            }
        }
        drop(line);

        self.control.unexport(pin)?;
        info!(pin, "Closed gpio line");
        Ok(())
    }

    /// Current level of `pin`; 0 if the line is not open
    pub fn read_value(&self, pin: u32) -> Result<u8> {
        match self.find(pin) {
            Some(line) => line.read_value(),
            None => {
                debug!(pin, "Read of unopened line");
                Ok(0)
            }
        }
    }

    /// Deliver edge events for `pin` to `callback`. No-op if it is not open.
    ///
    /// A failed registration closes (and so un-exports) the line.
    pub fn watch(&self, pin: u32, callback: EventCallback) -> Result<()> {
        let Some(line) = self.find(pin) else {
            debug!(pin, "Watch of unopened line ignored");
            return Ok(());
        };

        let fd = line.fd();
        let registered = line.with_fd(|borrowed| self.events.watch(borrowed, callback));
        drop(line);

        if let Err(source) = registered {
            if let Err(cleanup) = self.close(pin) {
                warn!(pin, error = %cleanup, "Failed to release line after watch error");
            }
            return Err(GpioError::Watch { pin, source });
        }

        info!(pin, fd, "Watching gpio line for falling edges");
        Ok(())
    }

    /// Stop delivering edge events for `pin`. No-op if it is not open.
    pub fn unwatch(&self, pin: u32) -> Result<()> {
        let Some(line) = self.find(pin) else {
            return Ok(());
        };

        line.with_fd(|borrowed| self.events.unwatch(borrowed))
            .map_err(|source| GpioError::Watch { pin, source })?;
        debug!(pin, "Unwatched gpio line");
        Ok(())
    }

    /// Close every open line, then shut the event loop down
    ///
    /// Every line is closed even if an earlier one fails; the first error is
    /// returned.
    pub fn finalize(&self) -> Result<()> {
        let mut first_error = None;
        for pin in self.open_pins() {
            if let Err(e) = self.close(pin) {
                warn!(pin, error = %e, "Failed to close line during finalize");
                first_error.get_or_insert(e);
            }
        }
        self.events.shutdown();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
