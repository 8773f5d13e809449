//! Platform-specific readiness poller, selected at compile time.
//!
//! Both backends expose the same register/reregister/deregister/poll
//! surface; the dispatcher never needs to know which one it's driving.

pub(crate) mod common;

#[cfg(target_os = "linux")]
mod epoll;
#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(target_os = "macos")]
mod kqueue;
#[cfg(target_os = "macos")]
pub(crate) type Poller = kqueue::KqueuePoller;

pub(crate) use common::{Event, Interest};
