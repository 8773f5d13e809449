//! Name resolution (spec.md §6).
//!
//! Uses `getaddrinfo` directly via libc rather than `std::net::ToSocketAddrs`
//! so that named services (`"http"`, not just numeric ports) resolve the way
//! a real command-line bridge needs them to.

use std::ffi::CString;
use std::io;
use std::net::SocketAddr;
use std::ptr;

use libc::{addrinfo, c_int, freeaddrinfo, getaddrinfo, AF_UNSPEC, AI_V4MAPPED, AI_ALL, SOCK_STREAM};

use crate::sys;

/// Resolves `host:service` to every address `getaddrinfo` returns, hinting
/// for stream sockets, any address family, with IPv4-mapped IPv6 allowed
/// (spec.md §6).
pub(crate) fn resolve(host: &str, service: &str) -> io::Result<Vec<SocketAddr>> {
    let c_host = CString::new(host)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "host contains a NUL byte"))?;
    let c_service = CString::new(service)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "service contains a NUL byte"))?;

    let mut hints: addrinfo = unsafe { std::mem::zeroed() };
    hints.ai_family = AF_UNSPEC;
    hints.ai_socktype = SOCK_STREAM;
    hints.ai_flags = AI_V4MAPPED | AI_ALL;

    let mut result: *mut addrinfo = ptr::null_mut();
    let rc = unsafe {
        getaddrinfo(
            c_host.as_ptr(),
            c_service.as_ptr(),
            &hints,
            &mut result,
        )
    };

    if rc != 0 {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!(
                "resolution of {}:{} failed: {}",
                host,
                service,
                gai_strerror(rc)
            ),
        ));
    }

    let mut addrs = Vec::new();
    let mut cur = result;
    while !cur.is_null() {
        let info = unsafe { &*cur };
        if let Ok(addr) = sockaddr_to_socketaddr(info) {
            addrs.push(addr);
        }
        cur = info.ai_next;
    }

    unsafe { freeaddrinfo(result) };

    if addrs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("resolution of {}:{} yielded no addresses", host, service),
        ));
    }

    Ok(addrs)
}

fn sockaddr_to_socketaddr(info: &addrinfo) -> io::Result<SocketAddr> {
    let storage = unsafe {
        let mut storage: libc::sockaddr_storage = std::mem::zeroed();
        let len = (info.ai_addrlen as usize).min(std::mem::size_of::<libc::sockaddr_storage>());
        ptr::copy_nonoverlapping(
            info.ai_addr as *const u8,
            &mut storage as *mut _ as *mut u8,
            len,
        );
        storage
    };

    sys::storage_to_socketaddr(&storage)
}

fn gai_strerror(code: c_int) -> String {
    unsafe {
        let ptr = libc::gai_strerror(code);
        if ptr.is_null() {
            format!("unknown getaddrinfo error {}", code)
        } else {
            std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }
}
