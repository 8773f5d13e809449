//! End-to-end tests driving the real `tcpbridge` binary against loopback
//! sockets, in the spirit of the teacher's `tests/tcp_stream.rs`: real
//! `std::net` sockets, plain `assert_eq!`/`assert!`, no test framework.
//!
//! Each test launches the compiled binary as a child process (its stdout
//! carries the bound listener address per spec.md §6), so there is no need
//! to reach into the crate's internal (crate-private) dispatcher API.

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

fn unique_workdir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tcpbridge-test-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("create test workdir");
    dir
}

/// Starts the bridge binary with an ephemeral source port, returning the
/// child process (kept alive for the duration of the test) and the
/// address clients should connect to.
fn start_bridge(workdir: &Path, dest: SocketAddr) -> (Child, SocketAddr) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_tcpbridge"))
        .args([
            "127.0.0.1",
            "0",
            &dest.ip().to_string(),
            &dest.port().to_string(),
        ])
        .current_dir(workdir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn tcpbridge");

    let stdout = child.stdout.take().expect("captured stdout");
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    reader.read_line(&mut line).expect("read listener line");

    let addr_str = line
        .trim()
        .strip_prefix("Listener ")
        .and_then(|s| s.split(" listening on ").nth(1))
        .unwrap_or_else(|| panic!("unexpected listener line: {:?}", line));
    let bridge_addr: SocketAddr = addr_str.parse().expect("parse bridge address");

    // Keep draining stdout in the background so the child never blocks on
    // a full pipe buffer for the rest of the test.
    thread::spawn(move || {
        let mut buf = String::new();
        loop {
            buf.clear();
            if reader.read_line(&mut buf).unwrap_or(0) == 0 {
                break;
            }
        }
    });

    (child, bridge_addr)
}

/// Reads a destination connection fully, then writes `reply` back and
/// half-closes for writing.
fn echo_once(listener: TcpListener, reply: Option<&'static [u8]>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept on destination");
        let mut received = Vec::new();
        stream
            .read_to_end(&mut received)
            .expect("read from bridge");

        let out = reply.unwrap_or(&received);
        stream.write_all(out).expect("write reply");
        stream.shutdown(std::net::Shutdown::Write).ok();
        received
    })
}

fn journal_path(workdir: &Path, addr: SocketAddr) -> PathBuf {
    workdir.join(addr.to_string())
}

#[test]
fn echo_forwarding_round_trips_and_journals() {
    let workdir = unique_workdir("s1");

    let dest_listener = TcpListener::bind("127.0.0.1:0").expect("bind destination");
    let dest_addr = dest_listener.local_addr().expect("destination addr");
    let echo = echo_once(dest_listener, None);

    let (mut child, bridge_addr) = start_bridge(&workdir, dest_addr);

    let mut client = TcpStream::connect(bridge_addr).expect("connect to bridge");
    client.write_all(b"hello world").expect("client write");
    client.shutdown(std::net::Shutdown::Write).expect("client half-close");

    let mut received = Vec::new();
    client
        .read_to_end(&mut received)
        .expect("client read echo");
    assert_eq!(received, b"hello world");

    let forwarded = echo.join().expect("echo thread");
    assert_eq!(forwarded, b"hello world");

    // Give the bridge a moment to flush its journal writes before reading
    // them back from disk.
    thread::sleep(Duration::from_millis(100));

    let source_journal = journal_path(&workdir, client.local_addr().expect("client local addr"));
    let contents = fs::read(&source_journal).expect("read source journal");
    assert_eq!(contents, b"hello world");

    let _ = child.kill();
    let _ = child.wait();
    let _ = fs::remove_dir_all(&workdir);
}

#[test]
fn asymmetric_close_delivers_each_direction_independently() {
    let workdir = unique_workdir("s2");

    let dest_listener = TcpListener::bind("127.0.0.1:0").expect("bind destination");
    let dest_addr = dest_listener.local_addr().expect("destination addr");
    let echo = echo_once(dest_listener, Some(b"pong-reply"));

    let (mut child, bridge_addr) = start_bridge(&workdir, dest_addr);

    let mut client = TcpStream::connect(bridge_addr).expect("connect to bridge");
    client.write_all(b"ping").expect("client write");
    client.shutdown(std::net::Shutdown::Write).expect("client half-close");

    let mut received = Vec::new();
    client
        .read_to_end(&mut received)
        .expect("client read reply");
    assert_eq!(received, b"pong-reply");

    let forwarded = echo.join().expect("echo thread");
    assert_eq!(forwarded, b"ping");

    let _ = child.kill();
    let _ = child.wait();
    let _ = fs::remove_dir_all(&workdir);
}

#[test]
fn destination_unreachable_tears_down_connection_but_not_listener() {
    let workdir = unique_workdir("s4");

    // Grab a port and immediately release it: nothing will be listening
    // there, so connect() should fail promptly with connection-refused.
    let probe = TcpListener::bind("127.0.0.1:0").expect("bind probe");
    let dead_addr = probe.local_addr().expect("probe addr");
    drop(probe);

    let (mut child, bridge_addr) = start_bridge(&workdir, dead_addr);

    let mut client = TcpStream::connect(bridge_addr).expect("connect to bridge");
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set read timeout");

    let mut buf = [0u8; 16];
    let n = client.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0, "bridge should close the client side after a failed connect");

    // The listener itself must still be accepting new connections.
    let second = TcpStream::connect(bridge_addr);
    assert!(second.is_ok(), "listener should survive one failed bridge");

    let _ = child.kill();
    let _ = child.wait();
    let _ = fs::remove_dir_all(&workdir);
}

#[test]
fn simultaneous_connections_all_complete() {
    let workdir = unique_workdir("s5");

    let dest_listener = TcpListener::bind("127.0.0.1:0").expect("bind destination");
    let dest_addr = dest_listener.local_addr().expect("destination addr");

    let server = thread::spawn(move || {
        let mut handles = Vec::new();
        for _ in 0..20 {
            let (mut stream, _) = dest_listener.accept().expect("accept");
            handles.push(thread::spawn(move || {
                let mut buf = Vec::new();
                stream.read_to_end(&mut buf).expect("read");
                stream.write_all(&buf).expect("write");
                stream.shutdown(std::net::Shutdown::Write).ok();
                buf
            }));
        }
        handles
    });

    let (mut child, bridge_addr) = start_bridge(&workdir, dest_addr);

    let mut clients = Vec::new();
    for _ in 0..20 {
        let mut stream = TcpStream::connect(bridge_addr).expect("connect");
        stream.write_all(b"hello world").expect("write");
        stream.shutdown(std::net::Shutdown::Write).expect("half-close");
        clients.push(stream);
    }

    for mut stream in clients {
        let mut received = Vec::new();
        stream.read_to_end(&mut received).expect("read echo");
        assert_eq!(received, b"hello world");
    }

    for handle in server.join().expect("server thread") {
        let bytes = handle.join().expect("echo worker");
        assert_eq!(bytes, b"hello world");
    }

    let _ = child.kill();
    let _ = child.wait();
    let _ = fs::remove_dir_all(&workdir);
}
