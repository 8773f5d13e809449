//! Canonical textual form for endpoint addresses (spec.md §3).
//!
//! `std::net::SocketAddr`'s `Display` impl already produces exactly the
//! forms required — `A.B.C.D:P` for IPv4, `[addr]:P` for IPv6 — so this is
//! a one-line wrapper rather than a bespoke formatter.

use std::net::SocketAddr;

pub(crate) fn canonical(addr: &SocketAddr) -> String {
    addr.to_string()
}
