//! The readiness dispatcher (spec.md §4.4).
//!
//! A single-threaded, level-triggered event loop. Registrations are held by
//! [`Weak`] reference only — the registered object (a [`crate::bridge::Bridge`]
//! or the listener) is the sole strong owner of itself. This is what makes
//! the dispatcher "robust to a callback unregistering other tokens": if a
//! token's owner has already torn itself down by the time its event is
//! delivered, `upgrade()` fails and the dispatcher just drops the stale
//! registration instead of calling into freed state.

use crate::poller::{Event, Interest, Poller};
use crate::slab::Slab;

use std::io;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};

/// Opaque handle returned by [`Dispatcher::register`]. Tokens are only
/// ever compared for equality by their owner; the dispatcher treats them
/// as an index into its own bookkeeping.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct Token(usize);

/// Anything that can be driven by the dispatcher: a listener accepting
/// connections, or a bridge relaying one.
pub(crate) trait ReadinessSink {
    fn on_ready(self: Rc<Self>, dispatcher: &mut Dispatcher, token: Token, readable: bool, writable: bool);
}

struct Watch {
    fd: RawFd,
    interest: Interest,
    sink: Weak<dyn ReadinessSink>,
}

pub(crate) struct Dispatcher {
    poller: Poller,
    watches: Slab<Watch>,
}

impl Dispatcher {
    pub(crate) fn new() -> io::Result<Self> {
        Ok(Self {
            poller: Poller::new()?,
            watches: Slab::new(),
        })
    }

    /// Begins watching `fd` for the events in `interest`, associated with
    /// `sink`. The dispatcher keeps only a weak reference to `sink`.
    pub(crate) fn register(
        &mut self,
        fd: RawFd,
        interest: Interest,
        sink: &Rc<dyn ReadinessSink>,
    ) -> io::Result<Token> {
        let index = self.watches.insert(Watch {
            fd,
            interest,
            sink: Rc::downgrade(sink),
        });

        if let Err(e) = self.poller.register(fd, index, interest) {
            self.watches.remove(index);
            return Err(e);
        }

        Ok(Token(index))
    }

    /// Changes the watched events for an already-registered token.
    /// A no-op (and no syscall) if `new_interest` matches what's already
    /// registered.
    pub(crate) fn reset(&mut self, token: Token, new_interest: Interest) -> io::Result<()> {
        let fd = match self.watches.get(token.0) {
            Some(watch) if watch.interest == new_interest => return Ok(()),
            Some(watch) => watch.fd,
            None => return Ok(()),
        };

        self.poller.reregister(fd, token.0, new_interest)?;
        if let Some(watch) = self.watches.get_mut(token.0) {
            watch.interest = new_interest;
        }
        Ok(())
    }

    /// Stops watching `token`. Safe to call more than once for the same
    /// token (e.g. once per socket during teardown, or defensively when a
    /// dead weak reference is discovered).
    pub(crate) fn unregister(&mut self, token: Token) -> io::Result<()> {
        if let Some(watch) = self.watches.remove(token.0) {
            self.poller.deregister(watch.fd)?;
        }
        Ok(())
    }

    /// Runs until no descriptor remains registered.
    pub(crate) fn run(&mut self) -> io::Result<()> {
        let mut events: Vec<Event> = Vec::new();

        while !self.watches.is_empty() {
            self.poller.poll(&mut events, None)?;

            for ev in events.drain(..) {
                let token = Token(ev.token);

                let sink = match self.watches.get(token.0) {
                    Some(watch) => watch.sink.clone(),
                    None => continue,
                };

                match sink.upgrade() {
                    Some(sink) => sink.on_ready(self, token, ev.readable, ev.writable),
                    None => {
                        let _ = self.unregister(token);
                    }
                }
            }
        }

        Ok(())
    }
}
