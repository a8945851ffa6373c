//! Edge-triggered readiness dispatch
//!
//! One epoll context, one dispatch thread. Every registration swallows its
//! first notification: arming an edge on a sysfs value file reports the
//! descriptor ready straight away, before any real transition happened.
//!
//! Shutdown wakes the dispatcher through a socket pair registered in the same
//! set, joins it, and the epoll descriptor closes with the last reference.

use crate::error::{EventLoopError, Result};
use dashmap::DashMap;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags};
use parking_lot::Mutex;
use std::io::Write;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace, warn};

/// Maximum events collected per `epoll_wait`
pub const MAX_EVENTS: usize = 32;

/// Callback invoked on the dispatch thread for every forwarded event
pub type EventCallback = Arc<dyn Fn(EdgeEvent) + Send + Sync>;

fn watch_flags() -> EpollFlags {
    EpollFlags::EPOLLIN | EpollFlags::EPOLLPRI | EpollFlags::EPOLLET
}

/// A readiness notification for one watched descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    /// Descriptor that became ready
    pub fd: RawFd,
    flags: EpollFlags,
}

impl EdgeEvent {
    pub fn new(fd: RawFd, flags: EpollFlags) -> Self {
        Self { fd, flags }
    }

    fn from_raw(event: &EpollEvent) -> Self {
        Self {
            fd: event.data() as RawFd,
            flags: event.events(),
        }
    }

    pub fn flags(&self) -> EpollFlags {
        self.flags
    }

    pub fn is_readable(&self) -> bool {
        self.flags.contains(EpollFlags::EPOLLIN)
    }

    /// Sysfs value files signal edges as priority data
    pub fn is_priority(&self) -> bool {
        self.flags.contains(EpollFlags::EPOLLPRI)
    }

    pub fn is_error(&self) -> bool {
        self.flags.contains(EpollFlags::EPOLLERR)
    }

    pub fn is_hangup(&self) -> bool {
        self.flags.contains(EpollFlags::EPOLLHUP)
    }
}

/// A descriptor bound to its callback
pub(crate) struct RegisteredWatch {
    fd: RawFd,
    /// Set from registration until the first notification is seen
    initial: AtomicBool,
    callback: EventCallback,
}

impl RegisteredWatch {
    fn new(fd: RawFd, callback: EventCallback) -> Self {
        Self {
            fd,
            initial: AtomicBool::new(true),
            callback,
        }
    }

    /// Clears the initial flag, returning whether it was still set
    fn take_initial(&self) -> bool {
        self.initial.swap(false, Ordering::AcqRel)
    }

    #[cfg(test)]
    pub(crate) fn is_initial(&self) -> bool {
        self.initial.load(Ordering::Acquire)
    }
}

/// State shared between the owning `EventLoop` and the dispatch thread
struct Shared {
    epoll: Epoll,
    registry: DashMap<RawFd, Arc<RegisteredWatch>>,
    closed: AtomicBool,
    /// Read end, registered in `epoll`; never handed to callbacks
    wake_rx: UnixStream,
    wake_tx: UnixStream,
}

impl Shared {
    fn new() -> Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)
            .map_err(|e| EventLoopError::io("epoll_create1", e))?;
        let (wake_rx, wake_tx) = UnixStream::pair().map_err(|source| EventLoopError::Io {
            op: "socketpair",
            source,
        })?;
        epoll
            .add(
                &wake_rx,
                EpollEvent::new(EpollFlags::EPOLLIN, wake_rx.as_raw_fd() as u64),
            )
            .map_err(|e| EventLoopError::io("epoll_ctl(ADD)", e))?;

        Ok(Self {
            epoll,
            registry: DashMap::new(),
            closed: AtomicBool::new(false),
            wake_rx,
            wake_tx,
        })
    }

    /// Mark closed and kick the dispatcher out of `epoll_wait`
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.registry.clear();
        if let Err(e) = (&self.wake_tx).write_all(&[1]) {
            warn!(error = %e, "Failed to wake dispatcher");
        }
    }

    fn dispatch(&self, events: &[EpollEvent]) {
        let wake_fd = self.wake_rx.as_raw_fd();
        for raw in events {
            let event = EdgeEvent::from_raw(raw);
            if event.fd == wake_fd {
                continue;
            }

            // Clone out of the map so the callback runs without a shard lock.
            let watch = match self.registry.get(&event.fd) {
                Some(entry) => Arc::clone(entry.value()),
                None => {
                    trace!(fd = event.fd, "Readiness for unregistered descriptor");
                    continue;
                }
            };

            if watch.take_initial() {
                debug!(fd = watch.fd, "Swallowed registration-time notification");
                continue;
            }

            (watch.callback)(event);
        }
    }
}

/// What the dispatcher does with one `epoll_wait` result
#[derive(Debug, PartialEq, Eq)]
enum WaitOutcome {
    Ready(usize),
    Retry,
    Fatal(Errno),
}

fn classify(result: nix::Result<usize>) -> WaitOutcome {
    match result {
        Ok(n) => WaitOutcome::Ready(n),
        // EINTR shows up whenever a signal lands on this thread, e.g. SIGCHLD
        // from the action's shell.
        Err(Errno::EAGAIN) | Err(Errno::EINTR) => WaitOutcome::Retry,
        Err(errno) => WaitOutcome::Fatal(errno),
    }
}

/// Dispatch until shutdown or a fatal wait error
///
/// `wait` fills the buffer like `epoll_wait` with an infinite timeout.
fn run_dispatcher(
    shared: &Shared,
    failure_tx: oneshot::Sender<EventLoopError>,
    mut wait: impl FnMut(&mut [EpollEvent]) -> nix::Result<usize>,
) {
    let mut events = [EpollEvent::empty(); MAX_EVENTS];

    loop {
        let outcome = classify(wait(&mut events));

        if shared.closed.load(Ordering::Acquire) {
            debug!("Event loop shut down, dispatcher exiting");
            return;
        }

        match outcome {
            WaitOutcome::Ready(n) => shared.dispatch(&events[..n]),
            WaitOutcome::Retry => continue,
            WaitOutcome::Fatal(errno) => {
                error!(%errno, "epoll_wait failed, dispatch stopped");
                if failure_tx.send(EventLoopError::Dispatch(errno)).is_err() {
                    error!("Nobody is listening for event loop failures");
                }
                return;
            }
        }
    }
}

fn set_nonblocking(fd: RawFd, nonblocking: bool) -> Result<()> {
    let bits = fcntl(fd, FcntlArg::F_GETFL).map_err(|e| EventLoopError::io("fcntl(F_GETFL)", e))?;
    let mut flags = OFlag::from_bits_truncate(bits);
    flags.set(OFlag::O_NONBLOCK, nonblocking);
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(|e| EventLoopError::io("fcntl(F_SETFL)", e))?;
    Ok(())
}

/// Edge-triggered event loop
///
/// Owns the epoll context and the watch registry for the lifetime between
/// [`EventLoop::initialize`] and [`EventLoop::shutdown`]. The dispatch thread
/// reads the registry concurrently with `watch`/`unwatch` on the owner's side.
#[derive(Default)]
pub struct EventLoop {
    shared: Mutex<Option<Arc<Shared>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    failure: Mutex<Option<oneshot::Receiver<EventLoopError>>>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the epoll context and start the dispatch thread
    ///
    /// No-op when already initialized.
    pub fn initialize(&self) -> Result<()> {
        let mut slot = self.shared.lock();
        if slot.is_some() {
            return Ok(());
        }

        let shared = Arc::new(Shared::new()?);

        let (failure_tx, failure_rx) = oneshot::channel();
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("edge-dispatch".to_string())
            .spawn(move || {
                run_dispatcher(&worker, failure_tx, |events| worker.epoll.wait(events, -1))
            })
            .map_err(|source| EventLoopError::Io {
                op: "spawn dispatch thread",
                source,
            })?;

        *self.dispatcher.lock() = Some(handle);
        *self.failure.lock() = Some(failure_rx);
        *slot = Some(shared);

        info!("Event loop initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.lock().is_some()
    }

    /// Drop every registration, stop the dispatch thread and close the
    /// epoll context
    ///
    /// Called from inside a callback, the dispatcher is woken but not
    /// joined; it exits as soon as the callback returns.
    pub fn shutdown(&self) {
        let Some(shared) = self.shared.lock().take() else {
            return;
        };
        shared.close();
        drop(shared);
        self.failure.lock().take();

        if let Some(handle) = self.dispatcher.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                error!("Dispatch thread panicked");
            }
        }
        info!("Event loop shut down");
    }

    fn current(&self) -> Result<Arc<Shared>> {
        self.shared.lock().clone().ok_or(EventLoopError::NotInitialized)
    }

    /// Register `fd` for edge-triggered read/priority readiness
    ///
    /// The descriptor is switched to non-blocking mode. The first
    /// notification after registration never reaches `callback`.
    pub fn watch(&self, fd: BorrowedFd<'_>, callback: EventCallback) -> Result<()> {
        let shared = self.current()?;
        let raw = fd.as_raw_fd();

        // Must be in the registry before EPOLL_CTL_ADD: the registration-time
        // event can be dispatched before `add` even returns.
        shared
            .registry
            .insert(raw, Arc::new(RegisteredWatch::new(raw, callback)));

        let armed = set_nonblocking(raw, true).and_then(|()| {
            shared
                .epoll
                .add(fd, EpollEvent::new(watch_flags(), raw as u64))
                .map_err(|e| EventLoopError::io("epoll_ctl(ADD)", e))
        });

        if let Err(e) = armed {
            shared.registry.remove(&raw);
            let _ = set_nonblocking(raw, false);
            return Err(e);
        }

        debug!(fd = raw, "Descriptor watched");
        Ok(())
    }

    /// Deregister `fd` and restore blocking mode
    pub fn unwatch(&self, fd: BorrowedFd<'_>) -> Result<()> {
        let shared = self.current()?;
        let raw = fd.as_raw_fd();

        shared
            .epoll
            .delete(fd)
            .map_err(|e| EventLoopError::io("epoll_ctl(DEL)", e))?;
        set_nonblocking(raw, false)?;
        shared.registry.remove(&raw);

        debug!(fd = raw, "Descriptor unwatched");
        Ok(())
    }

    pub fn is_watched(&self, fd: RawFd) -> bool {
        self.shared
            .lock()
            .as_ref()
            .is_some_and(|shared| shared.registry.contains_key(&fd))
    }

    /// Receiver for the dispatcher's fatal error, handed out once
    pub fn take_failure_signal(&self) -> Option<oneshot::Receiver<EventLoopError>> {
        self.failure.lock().take()
    }
}
