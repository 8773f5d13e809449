//! Thin wrappers over the raw socket and file syscalls the bridge needs.
//!
//! Mirrors the shape of the teacher's `reactor/poller/unix.rs`: every
//! function returns `io::Result` built from `io::Error::last_os_error()`,
//! and non-blocking mode is applied at creation time rather than left to
//! the caller to remember.

use libc::{
    accept, bind, c_int, close, connect, fcntl, getsockname, getsockopt, listen, open, pread,
    read, setsockopt, shutdown, socket, sockaddr, sockaddr_in, sockaddr_in6, sockaddr_storage,
    socklen_t, write, O_APPEND, O_CREAT, O_RDWR, F_GETFL, F_SETFL, O_NONBLOCK, SHUT_RD,
    SHUT_RDWR, SHUT_WR, SOCK_STREAM, SOL_SOCKET, SO_ERROR, SO_REUSEADDR,
};
use std::ffi::CString;
use std::io;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Creates a non-blocking stream socket for the given address family.
pub(crate) fn socket_stream(domain: c_int) -> io::Result<RawFd> {
    let fd = unsafe { socket(domain, SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    if let Err(e) = set_nonblocking(fd) {
        unsafe { close(fd) };
        return Err(e);
    }

    Ok(fd)
}

/// Sets a file descriptor to non-blocking mode.
pub(crate) fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let rc = unsafe { fcntl(fd, F_SETFL, flags | O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Enables `SO_REUSEADDR` on a socket.
pub(crate) fn set_reuseaddr(fd: RawFd) -> io::Result<()> {
    let yes: c_int = 1;
    let rc = unsafe {
        setsockopt(
            fd,
            SOL_SOCKET,
            SO_REUSEADDR,
            &yes as *const _ as *const _,
            mem::size_of::<c_int>() as socklen_t,
        )
    };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Binds a socket to an address.
pub(crate) fn bind_addr(fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = socketaddr_to_storage(addr);
    let rc = unsafe { bind(fd, &storage as *const _ as *const sockaddr, len) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Marks a socket as a listening socket with the given backlog.
pub(crate) fn listen_backlog(fd: RawFd, backlog: c_int) -> io::Result<()> {
    let rc = unsafe { listen(fd, backlog) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Accepts a pending connection. The returned socket is non-blocking.
pub(crate) fn accept_nonblocking(fd: RawFd) -> io::Result<(RawFd, SocketAddr)> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    let client_fd = unsafe { accept(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) };
    if client_fd < 0 {
        return Err(io::Error::last_os_error());
    }

    if let Err(e) = set_nonblocking(client_fd) {
        unsafe { close(client_fd) };
        return Err(e);
    }

    let addr = storage_to_socketaddr(&storage)?;
    Ok((client_fd, addr))
}

/// Initiates a non-blocking connect. `Ok(())` means the connection
/// completed synchronously; `WouldBlock`/`Interrupted` mean it is in
/// progress and the caller should wait for write-readiness.
pub(crate) fn connect_nonblocking(fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = socketaddr_to_storage(addr);
    let rc = unsafe { connect(fd, &storage as *const _ as *const sockaddr, len) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Returns the pending error on a socket (the result of `SO_ERROR`),
/// used once a connecting socket becomes writable.
pub(crate) fn socket_error(fd: RawFd) -> io::Result<i32> {
    let mut err: c_int = 0;
    let mut len = mem::size_of::<c_int>() as socklen_t;

    let rc = unsafe {
        getsockopt(
            fd,
            SOL_SOCKET,
            SO_ERROR,
            &mut err as *mut _ as *mut _,
            &mut len,
        )
    };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(err)
    }
}

/// Returns the local address bound to a socket.
pub(crate) fn local_addr(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    let rc = unsafe { getsockname(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        storage_to_socketaddr(&storage)
    }
}

/// Shuts down one or both halves of a socket. Best-effort by convention —
/// callers should not treat failures here as fatal (spec.md §4.2, §9).
pub(crate) fn shutdown_socket(fd: RawFd, how: Shutdown) -> io::Result<()> {
    let how = match how {
        Shutdown::Read => SHUT_RD,
        Shutdown::Write => SHUT_WR,
        Shutdown::Both => SHUT_RDWR,
    };

    let rc = unsafe { shutdown(fd, how) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Closes a file descriptor.
pub(crate) fn close_fd(fd: RawFd) {
    unsafe { close(fd) };
}

/// Non-blocking read. Returns the raw `libc::read` result: positive byte
/// count, `0` for EOF, or `-1` with `errno` set on error/would-block.
pub(crate) fn raw_read(fd: RawFd, buf: &mut [u8]) -> isize {
    unsafe { read(fd, buf.as_mut_ptr() as *mut _, buf.len()) }
}

/// Non-blocking write. Same return convention as [`raw_read`].
pub(crate) fn raw_write(fd: RawFd, buf: &[u8]) -> isize {
    unsafe { write(fd, buf.as_ptr() as *const _, buf.len()) }
}

/// Positioned read from a regular file; does not disturb the file's
/// shared read/write offset, which is what lets the journal's append
/// cursor and read cursor move independently.
pub(crate) fn pread_at(fd: RawFd, buf: &mut [u8], offset: u64) -> isize {
    unsafe { pread(fd, buf.as_mut_ptr() as *mut _, buf.len(), offset as libc::off_t) }
}

/// Opens (creating if necessary) a file in combined append+read mode: all
/// writes land at the current end of file regardless of the descriptor's
/// read position, which is what lets the journal's append cursor and read
/// cursor move independently of one another.
pub(crate) fn open_journal_file(path: &Path) -> io::Result<RawFd> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))?;

    let fd = unsafe { open(c_path.as_ptr(), O_CREAT | O_RDWR | O_APPEND, 0o644) };
    if fd < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(fd)
    }
}

/// Returns the current size of an open file, used to seed the journal's
/// read cursor at the pre-existing end of file (spec.md §6: prior content
/// is never replayed).
pub(crate) fn file_size(fd: RawFd) -> io::Result<u64> {
    let mut st: libc::stat = unsafe { mem::zeroed() };
    let rc = unsafe { libc::fstat(fd, &mut st) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(st.st_size as u64)
    }
}

/// Converts a `sockaddr_storage` to a `std::net::SocketAddr`.
pub(crate) fn storage_to_socketaddr(storage: &sockaddr_storage) -> io::Result<SocketAddr> {
    match storage.ss_family as c_int {
        libc::AF_INET => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            let port = u16::from_be(addr.sin_port);
            Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }
        libc::AF_INET6 => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in6) };
            let ip = Ipv6Addr::from(addr.sin6_addr.s6_addr);
            let port = u16::from_be(addr.sin6_port);
            Ok(SocketAddr::V6(SocketAddrV6::new(
                ip,
                port,
                addr.sin6_flowinfo,
                addr.sin6_scope_id,
            )))
        }
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unsupported address family",
        )),
    }
}

/// Converts a `std::net::SocketAddr` to a `sockaddr_storage` plus its length.
pub(crate) fn socketaddr_to_storage(addr: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    match addr {
        SocketAddr::V4(v4) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in) };
            sa.sin_family = libc::AF_INET as _;
            sa.sin_port = v4.port().to_be();
            sa.sin_addr.s_addr = u32::from(*v4.ip()).to_be();
            (storage, mem::size_of::<sockaddr_in>() as socklen_t)
        }
        SocketAddr::V6(v6) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in6) };
            sa.sin6_family = libc::AF_INET6 as _;
            sa.sin6_port = v6.port().to_be();
            sa.sin6_addr.s6_addr = v6.ip().octets();
            sa.sin6_flowinfo = v6.flowinfo();
            sa.sin6_scope_id = v6.scope_id();
            (storage, mem::size_of::<sockaddr_in6>() as socklen_t)
        }
    }
}
