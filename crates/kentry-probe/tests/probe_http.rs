//! Probes against a throwaway local HTTP responder.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use assert_cmd::cargo::cargo_bin_cmd;
use kentry_probe::{ProbeOutcome, normalise_url, probe};
use rstest::rstest;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Serves a single request with the given status line, then closes.
fn serve_once(status_line: &'static str) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind responder");
    let address = listener.local_addr().expect("responder address");
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept probe connection");
        answer(stream, status_line);
    });
    (format!("{address}/health"), handle)
}

fn answer(stream: TcpStream, status_line: &str) {
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader.read_line(&mut line).expect("read request");
        if read == 0 || line == "\r\n" {
            break;
        }
    }
    let mut writer = stream;
    write!(
        writer,
        "HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    )
    .expect("write response");
    writer.flush().expect("flush response");
}

#[test]
fn ok_status_is_healthy() {
    let (address, server) = serve_once("200 OK");
    let url = normalise_url(&address).expect("local url");
    assert_eq!(probe(&url, TIMEOUT), ProbeOutcome::Healthy);
    server.join().expect("responder thread");
}

#[rstest]
#[case("503 Service Unavailable")]
#[case("404 Not Found")]
#[case("204 No Content")]
fn other_statuses_are_unhealthy(#[case] status_line: &'static str) {
    let (address, server) = serve_once(status_line);
    let url = normalise_url(&address).expect("local url");
    assert!(!probe(&url, TIMEOUT).is_healthy());
    server.join().expect("responder thread");
}

#[test]
fn refused_connection_is_unhealthy() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let address = listener.local_addr().expect("address");
    drop(listener);
    let url = normalise_url(&format!("{address}/")).expect("local url");
    assert!(!probe(&url, TIMEOUT).is_healthy());
}

#[test]
fn binary_exit_status_follows_the_verdict() {
    let (address, server) = serve_once("200 OK");
    cargo_bin_cmd!("kentry-probe").arg(&address).assert().success();
    server.join().expect("responder thread");

    let (failing, failing_server) = serve_once("500 Internal Server Error");
    cargo_bin_cmd!("kentry-probe")
        .arg(&failing)
        .assert()
        .code(1);
    failing_server.join().expect("responder thread");
}
