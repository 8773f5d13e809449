//! Append-only per-direction journal (spec.md §3, §4.1).
//!
//! A journal is a single file descriptor used two ways at once: `append`
//! writes through the kernel's `O_APPEND` semantics (always landing at the
//! current end of file, atomically with respect to a single call), while
//! `drain_into` reads with `pread` at an explicitly tracked offset. The two
//! never interfere with each other because neither touches the shared
//! file-position cursor `O_APPEND` writes use internally.

use crate::sys;

use std::io;
use std::os::fd::RawFd;
use std::path::Path;

/// Bytes are moved between the file and the consumer socket in chunks of
/// this size (spec.md §4.1: "reference: 8192 bytes").
const CHUNK: usize = 8192;

/// Outcome of [`Journal::drain_into`].
pub(crate) enum Drain {
    /// The read cursor has caught up to the file's current end. This does
    /// not mean the logical stream is over — the producer may append more
    /// later — only that there is nothing to forward right now.
    Done,
    /// The consumer returned would-block partway through. The read cursor
    /// has already been advanced by whatever the consumer did accept.
    WouldBlock,
    /// Unrecoverable I/O failure, fatal to the owning bridge.
    Error(io::Error),
}

pub(crate) struct Journal {
    fd: RawFd,
    read_cursor: u64,
}

impl Journal {
    /// Opens (creating if necessary) the journal file named by `path`.
    /// If the file already has content, the read cursor starts at its
    /// current end so that content is never replayed.
    pub(crate) fn open(path: &Path) -> io::Result<Self> {
        let fd = sys::open_journal_file(path)?;
        let read_cursor = match sys::file_size(fd) {
            Ok(size) => size,
            Err(e) => {
                sys::close_fd(fd);
                return Err(e);
            }
        };

        Ok(Self { fd, read_cursor })
    }

    /// Appends `bytes` to the journal. Either all bytes are durably
    /// enqueued or an error is returned — there is no partial-success case
    /// visible to the caller, matching spec.md's atomicity requirement.
    pub(crate) fn append(&self, bytes: &[u8]) -> io::Result<()> {
        let mut written = 0;
        while written < bytes.len() {
            let n = sys::raw_write(self.fd, &bytes[written..]);
            if n > 0 {
                written += n as usize;
                continue;
            }
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "journal append wrote zero bytes",
                ));
            }

            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }

        Ok(())
    }

    /// Forwards as much of the outstanding backlog as possible to
    /// `consumer_fd`, starting at the read cursor.
    pub(crate) fn drain_into(&mut self, consumer_fd: RawFd) -> Drain {
        loop {
            let mut buf = [0u8; CHUNK];
            let n = sys::pread_at(self.fd, &mut buf, self.read_cursor);

            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Drain::Error(err);
            }

            if n == 0 {
                return Drain::Done;
            }

            let n = n as usize;
            let mut written = 0usize;

            loop {
                if written == n {
                    break;
                }

                let w = sys::raw_write(consumer_fd, &buf[written..n]);
                if w > 0 {
                    written += w as usize;
                    continue;
                }
                if w == 0 {
                    self.read_cursor += written as u64;
                    return Drain::WouldBlock;
                }

                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                self.read_cursor += written as u64;
                if err.kind() == io::ErrorKind::WouldBlock {
                    return Drain::WouldBlock;
                }
                return Drain::Error(err);
            }

            self.read_cursor += n as u64;
        }
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        sys::close_fd(self.fd);
    }
}
