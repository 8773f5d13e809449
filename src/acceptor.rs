//! Listener/acceptor glue (spec.md §4.5).
//!
//! Grounded on the teacher's `src/reactor/socket.rs` accept-and-register
//! helper, generalized from "register a fresh echo Connection" to "start a
//! Bridge".

use crate::addr;
use crate::bridge::Bridge;
use crate::dispatcher::{Dispatcher, ReadinessSink, Token};
use crate::poller::Interest;
use crate::sys;

use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::rc::Rc;

/// A single bound, listening socket, registered for read-readiness.
pub(crate) struct Listener {
    fd: RawFd,
    dest_addr: SocketAddr,
}

impl Listener {
    /// Binds `local_addr` with address reuse and the given backlog, and
    /// registers it with `dispatcher`. Every accepted connection is
    /// bridged to `dest_addr`.
    pub(crate) fn start(
        dispatcher: &mut Dispatcher,
        local_addr: SocketAddr,
        dest_addr: SocketAddr,
        backlog: i32,
    ) -> io::Result<()> {
        let domain = match local_addr {
            SocketAddr::V4(_) => libc::AF_INET,
            SocketAddr::V6(_) => libc::AF_INET6,
        };

        let fd = sys::socket_stream(domain)?;

        if let Err(e) = sys::set_reuseaddr(fd) {
            sys::close_fd(fd);
            return Err(e);
        }
        if let Err(e) = sys::bind_addr(fd, &local_addr) {
            sys::close_fd(fd);
            return Err(e);
        }
        if let Err(e) = sys::listen_backlog(fd, backlog) {
            sys::close_fd(fd);
            return Err(e);
        }

        let listener = Rc::new(Listener { fd, dest_addr });
        let sink: Rc<dyn ReadinessSink> = listener.clone();

        if let Err(e) = dispatcher.register(
            fd,
            Interest {
                read: true,
                write: false,
            },
            &sink,
        ) {
            sys::close_fd(fd);
            return Err(e);
        }

        println!("Listener {} listening on {}", fd, addr::canonical(&local_addr));
        Ok(())
    }
}

impl ReadinessSink for Listener {
    fn on_ready(
        self: Rc<Self>,
        dispatcher: &mut Dispatcher,
        _token: Token,
        _readable: bool,
        _writable: bool,
    ) {
        loop {
            let (client_fd, peer) = match sys::accept_nonblocking(self.fd) {
                Ok(pair) => pair,
                Err(e) => {
                    if e.kind() != io::ErrorKind::WouldBlock && e.kind() != io::ErrorKind::Interrupted {
                        log::warn!("accept on listener {} failed: {}", self.fd, e);
                    }
                    break;
                }
            };

            if let Err(e) = Bridge::start(dispatcher, client_fd, peer, self.dest_addr) {
                log::warn!("bridge start for {} failed: {}", addr::canonical(&peer), e);
            }
        }
    }
}
