//! Readiness dispatch core for gpiotrigger
//!
//! This crate provides:
//! - An edge-triggered epoll event loop on a dedicated dispatch thread
//! - Suppression of the registration-time notification, once per watch
//! - A failure channel so the owning task learns when dispatch died

pub mod error;
pub mod event_loop;

pub use error::{EventLoopError, Result};
pub use event_loop::{EdgeEvent, EventCallback, EventLoop, MAX_EVENTS};
pub use nix::errno::Errno;
pub use nix::sys::epoll::EpollFlags;
