//! A transparent, journaling, single-threaded TCP bridge.
//!
//! See `SPEC_FULL.md` for the full requirements this crate implements; the
//! module layout below mirrors its component list (§2).

mod acceptor;
mod addr;
mod bridge;
mod cli;
mod dispatcher;
mod journal;
mod pipe;
mod poller;
mod resolve;
mod slab;
mod sys;

use dispatcher::Dispatcher;
use std::net::SocketAddr;

pub use cli::{parse as parse_args, Args};

/// Runs the bridge to completion: resolves both endpoints, starts one
/// listener per resolved source address, and drives the dispatcher until
/// no watched descriptor remains (spec.md §6's exit-code contract).
pub fn run(args: Args) -> Result<(), String> {
    let source_addrs = resolve::resolve(&args.source_host, &args.source_service)
        .map_err(|e| format!("resolving source: {}", e))?;
    let dest_addrs = resolve::resolve(&args.dest_host, &args.dest_service)
        .map_err(|e| format!("resolving destination: {}", e))?;

    let dest_addr: SocketAddr = dest_addrs[0];

    let mut dispatcher = Dispatcher::new().map_err(|e| format!("creating dispatcher: {}", e))?;

    for local_addr in &source_addrs {
        if let Err(e) = acceptor::Listener::start(&mut dispatcher, *local_addr, dest_addr, 1024) {
            log::error!("failed to start listener on {}: {}", local_addr, e);
        }
    }

    // If every listener failed to start, the dispatcher has nothing
    // registered and its run loop returns immediately: exit cleanly
    // rather than treating that as a startup failure (spec.md §6, §7).
    dispatcher.run().map_err(|e| format!("dispatcher: {}", e))
}
