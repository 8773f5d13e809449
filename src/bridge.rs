//! The per-connection bridging engine (spec.md §4.3).
//!
//! Grounded on the teacher's `src/reactor/core.rs`: a single object per
//! connection, registered with the dispatcher by raw fd, driving its own
//! state machine from inside `on_ready`. Unlike the teacher's `Connection`
//! (one fd, one echo buffer) a Bridge owns two fds, two journals and two
//! [`HalfDuplexPipe`]s, per spec.md §3.

use crate::addr;
use crate::dispatcher::{Dispatcher, ReadinessSink, Token};
use crate::journal::Journal;
use crate::pipe::HalfDuplexPipe;
use crate::poller::Interest;
use crate::sys;

use std::cell::RefCell;
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::path::Path;
use std::rc::Rc;

enum State {
    /// Outbound socket has an in-progress `connect`; watching for
    /// write-readiness to learn the outcome.
    Connecting,
    /// Both directions are live; `source_to_dest` and `dest_to_source`
    /// are run on every readiness event.
    Bridging {
        source_to_dest: HalfDuplexPipe,
        dest_to_source: HalfDuplexPipe,
    },
    /// Teardown has already happened; this variant exists only so `take`
    /// leaves something behind while `on_ready` finishes unwinding.
    Closed,
}

struct Inner {
    source_fd: RawFd,
    dest_fd: RawFd,
    source_peer: SocketAddr,
    source_token: Option<Token>,
    dest_token: Option<Token>,
    // Opened eagerly in `try_start`, right after `connect()` is issued —
    // TCP autobinds the outbound socket's local address synchronously even
    // when the connection itself is still in progress, so the destination
    // journal's name is already known (SPEC_FULL.md §4.3). Held here until
    // `enter_bridging` claims them for the two `HalfDuplexPipe`s.
    source_journal: Option<Journal>,
    dest_journal: Option<Journal>,
    state: State,
}

/// A single bridged connection. Registered with the dispatcher under two
/// tokens (source socket, destination socket); both point back at the same
/// `Rc<Bridge>` via a weak reference, per spec.md §3's ownership rule.
pub(crate) struct Bridge {
    inner: RefCell<Inner>,
}

impl Bridge {
    /// Accepts ownership of `inbound_fd` and attempts to start bridging it
    /// to `dest_addr`. On any failure, `inbound_fd` is closed and the
    /// error is returned; on success the Bridge has registered itself with
    /// `dispatcher` and owns `inbound_fd` for its entire lifetime.
    pub(crate) fn start(
        dispatcher: &mut Dispatcher,
        inbound_fd: RawFd,
        inbound_peer: SocketAddr,
        dest_addr: SocketAddr,
    ) -> io::Result<()> {
        match Self::try_start(dispatcher, inbound_fd, inbound_peer, dest_addr) {
            Ok(()) => Ok(()),
            Err(e) => {
                sys::close_fd(inbound_fd);
                Err(e)
            }
        }
    }

    fn try_start(
        dispatcher: &mut Dispatcher,
        inbound_fd: RawFd,
        inbound_peer: SocketAddr,
        dest_addr: SocketAddr,
    ) -> io::Result<()> {
        let domain = match dest_addr {
            SocketAddr::V4(_) => libc::AF_INET,
            SocketAddr::V6(_) => libc::AF_INET6,
        };
        let dest_fd = sys::socket_stream(domain)?;

        let connect_result = sys::connect_nonblocking(dest_fd, &dest_addr);
        let in_progress = match connect_result {
            Ok(()) => false,
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.raw_os_error() == Some(libc::EINPROGRESS)
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                true
            }
            Err(e) => {
                sys::close_fd(dest_fd);
                return Err(e);
            }
        };

        // Open both journals now: the outbound socket's local address is
        // already assigned by the kernel at this point even though the
        // connection itself may not have completed yet.
        let dest_local = match sys::local_addr(dest_fd) {
            Ok(a) => a,
            Err(e) => {
                sys::close_fd(dest_fd);
                return Err(e);
            }
        };
        let source_journal = match Journal::open(Path::new(&addr::canonical(&inbound_peer))) {
            Ok(j) => j,
            Err(e) => {
                sys::close_fd(dest_fd);
                return Err(e);
            }
        };
        let dest_journal = match Journal::open(Path::new(&addr::canonical(&dest_local))) {
            Ok(j) => j,
            Err(e) => {
                sys::close_fd(dest_fd);
                return Err(e);
            }
        };

        let bridge = Rc::new(Bridge {
            inner: RefCell::new(Inner {
                source_fd: inbound_fd,
                dest_fd,
                source_peer: inbound_peer,
                source_token: None,
                dest_token: None,
                source_journal: Some(source_journal),
                dest_journal: Some(dest_journal),
                state: State::Connecting,
            }),
        });

        let sink: Rc<dyn ReadinessSink> = bridge.clone();

        if in_progress {
            let dest_token = match dispatcher.register(
                dest_fd,
                Interest {
                    read: false,
                    write: true,
                },
                &sink,
            ) {
                Ok(t) => t,
                Err(e) => {
                    sys::close_fd(dest_fd);
                    return Err(e);
                }
            };
            bridge.inner.borrow_mut().dest_token = Some(dest_token);
            log::info!(
                "bridge {} -> {} connecting",
                addr::canonical(&inbound_peer),
                addr::canonical(&dest_addr)
            );
            return Ok(());
        }

        // Synchronous connect completion: move straight to Bridging.
        // `enter_bridging` unregisters anything it managed to register
        // with `dispatcher` before failing, so only `dest_fd` needs
        // closing here; `inbound_fd` is closed by `start`'s caller-facing
        // error path.
        if let Err(e) = bridge.enter_bridging(dispatcher) {
            sys::close_fd(dest_fd);
            return Err(e);
        }
        log::info!(
            "bridge {} -> {} established",
            addr::canonical(&inbound_peer),
            addr::canonical(&dest_addr)
        );
        Ok(())
    }

    /// Claims the journals opened eagerly in `try_start` (named per
    /// spec.md §6: source journal after the inbound peer address,
    /// destination journal after the outbound socket's *local* address)
    /// and transitions into `Bridging`.
    fn enter_bridging(self: &Rc<Self>, dispatcher: &mut Dispatcher) -> io::Result<()> {
        let (source_fd, dest_fd, source_journal, dest_journal) = {
            let mut inner = self.inner.borrow_mut();
            (
                inner.source_fd,
                inner.dest_fd,
                inner.source_journal.take().expect("journal opened in try_start"),
                inner.dest_journal.take().expect("journal opened in try_start"),
            )
        };

        let source_to_dest = HalfDuplexPipe::new(source_fd, dest_fd, source_journal);
        let dest_to_source = HalfDuplexPipe::new(dest_fd, source_fd, dest_journal);

        let sink: Rc<dyn ReadinessSink> = self.clone();
        let source_token = dispatcher.register(
            source_fd,
            Interest {
                read: true,
                write: false,
            },
            &sink,
        )?;
        let dest_token = match dispatcher.register(
            dest_fd,
            Interest {
                read: true,
                write: false,
            },
            &sink,
        ) {
            Ok(t) => t,
            Err(e) => {
                let _ = dispatcher.unregister(source_token);
                return Err(e);
            }
        };

        let mut inner = self.inner.borrow_mut();
        inner.source_token = Some(source_token);
        inner.dest_token = Some(dest_token);
        inner.state = State::Bridging {
            source_to_dest,
            dest_to_source,
        };
        drop(inner);

        self.run_and_reprogram(dispatcher);
        Ok(())
    }

    /// Runs both directions once, recomputes interest masks, and
    /// transitions to `Closing` if both masks are empty.
    fn run_and_reprogram(self: &Rc<Self>, dispatcher: &mut Dispatcher) {
        let mut fatal = None;
        let (source_interest, dest_interest, dead) = {
            let mut inner = self.inner.borrow_mut();
            let (source_to_dest, dest_to_source) = match &mut inner.state {
                State::Bridging {
                    source_to_dest,
                    dest_to_source,
                } => (source_to_dest, dest_to_source),
                _ => return,
            };

            if let Err(e) = source_to_dest.step() {
                fatal = Some(e);
            } else if let Err(e) = dest_to_source.step() {
                fatal = Some(e);
            }

            let source_interest = Interest {
                read: source_to_dest.wants_read(),
                write: dest_to_source.wants_write(),
            };
            let dest_interest = Interest {
                read: dest_to_source.wants_read(),
                write: source_to_dest.wants_write(),
            };
            let dead = source_interest.is_empty() && dest_interest.is_empty();

            (source_interest, dest_interest, dead)
        };

        if let Some(e) = fatal {
            log::warn!(
                "bridge {} failed: {}",
                addr::canonical(&self.inner.borrow().source_peer),
                e
            );
            self.close(dispatcher);
            return;
        }

        if dead {
            self.close(dispatcher);
            return;
        }

        let (source_token, dest_token) = {
            let inner = self.inner.borrow();
            (inner.source_token, inner.dest_token)
        };
        if let Some(t) = source_token {
            let _ = dispatcher.reset(t, source_interest);
        }
        if let Some(t) = dest_token {
            let _ = dispatcher.reset(t, dest_interest);
        }
    }

    fn close(self: &Rc<Self>, dispatcher: &mut Dispatcher) {
        let mut inner = self.inner.borrow_mut();
        if matches!(inner.state, State::Closed) {
            return;
        }

        if let Some(t) = inner.source_token.take() {
            let _ = dispatcher.unregister(t);
        }
        if let Some(t) = inner.dest_token.take() {
            let _ = dispatcher.unregister(t);
        }

        sys::close_fd(inner.source_fd);
        sys::close_fd(inner.dest_fd);
        inner.state = State::Closed;
        // Journals are dropped along with the dead pipes, closing their
        // file descriptors; the on-disk data is retained (spec.md §4.3).
    }
}

impl ReadinessSink for Bridge {
    fn on_ready(
        self: Rc<Self>,
        dispatcher: &mut Dispatcher,
        token: Token,
        _readable: bool,
        writable: bool,
    ) {
        let connecting = matches!(self.inner.borrow().state, State::Connecting);

        if connecting {
            let is_dest_token = self.inner.borrow().dest_token == Some(token);
            if !is_dest_token || !writable {
                return;
            }

            let dest_fd = self.inner.borrow().dest_fd;
            let source_peer = self.inner.borrow().source_peer;

            let err = match sys::socket_error(dest_fd) {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("bridge {} connect check failed: {}", addr::canonical(&source_peer), e);
                    self.close(dispatcher);
                    return;
                }
            };

            if err != 0 {
                log::warn!(
                    "bridge {} connect failed: {}",
                    addr::canonical(&source_peer),
                    io::Error::from_raw_os_error(err)
                );
                self.close(dispatcher);
                return;
            }

            // Destination became writable with no pending error: connect
            // has completed. Drop the connecting watch and move to
            // Bridging.
            if let Some(t) = self.inner.borrow_mut().dest_token.take() {
                let _ = dispatcher.unregister(t);
            }

            if let Err(e) = self.enter_bridging(dispatcher) {
                log::warn!("bridge {} failed to enter bridging: {}", addr::canonical(&source_peer), e);
                self.close(dispatcher);
            }
            return;
        }

        self.run_and_reprogram(dispatcher);
    }
}
