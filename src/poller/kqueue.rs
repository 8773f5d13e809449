//! macOS/BSD `kqueue`-based poller.
//!
//! `kqueue` tracks read- and write-readiness as independent filters on the
//! same descriptor (unlike `epoll`'s single bitmask), so register/reregister
//! is expressed as an add-or-delete per filter rather than one combined
//! update.

use super::common::{Event, Interest};

use libc::{kevent, kqueue, EVFILT_READ, EVFILT_WRITE, EV_ADD, EV_DELETE, EV_ENABLE};
use std::ffi::c_void;
use std::io;
use std::os::unix::io::RawFd;
use std::ptr;
use std::time::Duration;

pub(crate) struct KqueuePoller {
    kq: RawFd,
    events: Vec<kevent>,
}

impl KqueuePoller {
    pub(crate) fn new() -> io::Result<Self> {
        let kq = unsafe { kqueue() };
        if kq < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            kq,
            events: Vec::with_capacity(64),
        })
    }

    pub(crate) fn register(&self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        self.apply(fd, token, interest)
    }

    pub(crate) fn reregister(
        &self,
        fd: RawFd,
        token: usize,
        interest: Interest,
    ) -> io::Result<()> {
        self.apply(fd, token, interest)
    }

    pub(crate) fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let _ = self.delete_filter(fd, EVFILT_READ);
        let _ = self.delete_filter(fd, EVFILT_WRITE);
        Ok(())
    }

    pub(crate) fn poll(&mut self, out: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<()> {
        let ts = timeout.map(|t| libc::timespec {
            tv_sec: t.as_secs() as _,
            tv_nsec: t.subsec_nanos() as _,
        });
        let ts_ptr = ts
            .as_ref()
            .map(|t| t as *const libc::timespec)
            .unwrap_or(ptr::null());

        unsafe {
            self.events.set_len(self.events.capacity());
        }

        let n = unsafe {
            kevent(
                self.kq,
                ptr::null(),
                0,
                self.events.as_mut_ptr(),
                self.events.capacity() as i32,
                ts_ptr,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            unsafe { self.events.set_len(0) };
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        unsafe {
            self.events.set_len(n as usize);
        }

        out.clear();
        for ev in &self.events {
            let token = ev.udata as usize;
            let readable = ev.filter == EVFILT_READ;
            let writable = ev.filter == EVFILT_WRITE;

            if let Some(existing) = out.iter_mut().find(|e| e.token == token) {
                existing.readable |= readable;
                existing.writable |= writable;
            } else {
                out.push(Event {
                    token,
                    readable,
                    writable,
                });
            }
        }

        Ok(())
    }

    fn apply(&self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        if interest.read {
            self.change(fd, EVFILT_READ, EV_ADD | EV_ENABLE, token)?;
        } else {
            self.delete_filter(fd, EVFILT_READ)?;
        }

        if interest.write {
            self.change(fd, EVFILT_WRITE, EV_ADD | EV_ENABLE, token)?;
        } else {
            self.delete_filter(fd, EVFILT_WRITE)?;
        }

        Ok(())
    }

    fn delete_filter(&self, fd: RawFd, filter: i16) -> io::Result<()> {
        match self.change(fd, filter, EV_DELETE, 0) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::ENOENT) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn change(&self, fd: RawFd, filter: i16, flags: u16, token: usize) -> io::Result<()> {
        let mut kev: kevent = unsafe { std::mem::zeroed() };
        kev.ident = fd as usize;
        kev.filter = filter;
        kev.flags = flags;
        kev.udata = token as *mut c_void;

        let rc = unsafe { kevent(self.kq, &kev, 1, ptr::null_mut(), 0, ptr::null()) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl Drop for KqueuePoller {
    fn drop(&mut self) {
        unsafe { libc::close(self.kq) };
    }
}
