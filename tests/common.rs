//! Test utilities & fixtures.
//! Spins up a real server on an ephemeral port with a temp-dir checkpoint file
//! and provides small socket helpers for driving the line protocol.
#![allow(dead_code)] // each test binary uses a subset of these helpers

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use linebbs::config::Config;
use linebbs::server::LineServer;

pub struct TestServer {
    pub addr: SocketAddr,
    pub checkpoint_file: PathBuf,
    _tmp: Option<tempfile::TempDir>,
}

/// Start a server with a fresh temp checkpoint path; the temp dir lives as
/// long as the returned fixture.
pub async fn spawn_server() -> TestServer {
    let tmp = tempfile::tempdir().expect("tempdir");
    let checkpoint_file = tmp.path().join("checkpoint.bin");
    let mut server = spawn_server_at(&checkpoint_file).await;
    server._tmp = Some(tmp);
    server
}

/// Start a server against an explicit checkpoint path (restart tests share
/// one path across two instances).
pub async fn spawn_server_at(checkpoint_file: &Path) -> TestServer {
    let mut config = Config::default();
    config.server.bind = "127.0.0.1:0".to_string();
    config.storage.checkpoint_file = checkpoint_file.display().to_string();
    config.logging.file = None;

    let server = LineServer::bind(config).await.expect("bind test server");
    let addr = server.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    TestServer {
        addr,
        checkpoint_file: checkpoint_file.to_path_buf(),
        _tmp: None,
    }
}

pub async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.expect("connect")
}

/// Read until the collected bytes (lossily decoded; the banner starts with an
/// IAC sequence) contain `needle`. Returns everything read so far.
pub async fn read_until(stream: &mut TcpStream, needle: &str) -> String {
    read_until_any(stream, &[needle]).await
}

/// Read until any of `needles` appears; panics after five seconds.
pub async fn read_until_any(stream: &mut TcpStream, needles: &[&str]) -> String {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut collected: Vec<u8> = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let text = String::from_utf8_lossy(&collected).into_owned();
        if needles.iter().any(|n| text.contains(n)) {
            return text;
        }
        let n = tokio::time::timeout_at(deadline, stream.read(&mut buf))
            .await
            .unwrap_or_else(|_| panic!("timeout waiting for {:?}; got {:?}", needles, text))
            .expect("socket read");
        assert!(n > 0, "peer closed while waiting for {:?}; got {:?}", needles, text);
        collected.extend_from_slice(&buf[..n]);
    }
}

/// Read until the peer closes; returns everything received.
pub async fn read_to_eof(stream: &mut TcpStream) -> String {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut collected: Vec<u8> = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = tokio::time::timeout_at(deadline, stream.read(&mut buf))
            .await
            .expect("timeout waiting for EOF")
            .expect("socket read");
        if n == 0 {
            return String::from_utf8_lossy(&collected).into_owned();
        }
        collected.extend_from_slice(&buf[..n]);
    }
}

pub async fn send_line(stream: &mut TcpStream, line: &str) {
    stream.write_all(line.as_bytes()).await.expect("write line");
    stream.write_all(b"\r\n").await.expect("write terminator");
    stream.flush().await.expect("flush");
}

/// Connect and complete the LOGIN handshake for `username`.
pub async fn login(addr: SocketAddr, username: &str) -> TcpStream {
    let mut stream = connect(addr).await;
    read_until(&mut stream, "Please login with the LOGIN command.").await;
    send_line(&mut stream, &format!("LOGIN {}", username)).await;
    read_until(&mut stream, &format!("User {} logged in.", username)).await;
    stream
}

/// Wait for a file to appear (checkpoints are written by a background worker).
pub async fn wait_for_file(path: &Path) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !path.exists() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timeout waiting for {} to exist",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
