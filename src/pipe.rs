//! One direction of a [`crate::bridge::Bridge`] (spec.md §4.2).
//!
//! `producer_fd` is read into `journal`; `journal` is drained into
//! `consumer_fd`. The two journal cursors this relies on live entirely
//! inside [`crate::journal::Journal`] — this type only tracks the booleans
//! the Bridge needs to compute interest masks.

use crate::journal::{Drain, Journal};
use crate::sys;

use std::io;
use std::net::Shutdown;
use std::os::fd::RawFd;

const CHUNK: usize = 8192;

pub(crate) struct HalfDuplexPipe {
    producer_fd: RawFd,
    consumer_fd: RawFd,
    journal: Journal,
    eof_from_producer: bool,
    flushed: bool,
    consumer_half_closed: bool,
}

impl HalfDuplexPipe {
    pub(crate) fn new(producer_fd: RawFd, consumer_fd: RawFd, journal: Journal) -> Self {
        Self {
            producer_fd,
            consumer_fd,
            journal,
            eof_from_producer: false,
            flushed: true,
            consumer_half_closed: false,
        }
    }

    /// Runs one opportunistic step of this direction. Returns `Err` only
    /// for a fatal, unrecoverable failure — the caller tears the whole
    /// Bridge down in that case.
    pub(crate) fn step(&mut self) -> io::Result<()> {
        let mut produced = 0usize;

        if !self.eof_from_producer {
            loop {
                let mut buf = [0u8; CHUNK];
                let n = sys::raw_read(self.producer_fd, &mut buf);

                if n > 0 {
                    let n = n as usize;
                    self.journal.append(&buf[..n])?;
                    produced += n;
                    continue;
                }

                if n == 0 {
                    self.eof_from_producer = true;
                    let _ = sys::shutdown_socket(self.producer_fd, Shutdown::Read);
                    break;
                }

                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::Interrupted => continue,
                    io::ErrorKind::WouldBlock => break,
                    _ => {
                        self.eof_from_producer = true;
                        let _ = sys::shutdown_socket(self.producer_fd, Shutdown::Read);
                        break;
                    }
                }
            }
        }

        if !self.flushed || produced > 0 {
            match self.journal.drain_into(self.consumer_fd) {
                Drain::Done => self.flushed = true,
                Drain::WouldBlock => self.flushed = false,
                Drain::Error(e) => return Err(e),
            }
        }

        if self.eof_from_producer && self.flushed && !self.consumer_half_closed {
            let _ = sys::shutdown_socket(self.consumer_fd, Shutdown::Write);
            self.consumer_half_closed = true;
        }

        Ok(())
    }

    /// Whether the producer side still wants read-readiness.
    pub(crate) fn wants_read(&self) -> bool {
        !self.eof_from_producer
    }

    /// Whether the consumer side still wants write-readiness.
    pub(crate) fn wants_write(&self) -> bool {
        !self.flushed
    }
}
