//! Error types for the event loop

use nix::errno::Errno;
use thiserror::Error;

/// Event loop errors
#[derive(Error, Debug)]
pub enum EventLoopError {
    /// A system call backing the loop failed
    #[error("{op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("event loop is not initialized")]
    NotInitialized,

    /// `epoll_wait` failed with something other than a retryable errno.
    /// Dispatch has stopped for good once this is reported.
    #[error("epoll wait failed: {0}")]
    Dispatch(Errno),
}

impl EventLoopError {
    pub(crate) fn io(op: &'static str, errno: Errno) -> Self {
        Self::Io {
            op,
            source: std::io::Error::from(errno),
        }
    }
}

/// Result type for event loop operations
pub type Result<T> = std::result::Result<T, EventLoopError>;
