//! Per-connection protocol state machine.
//!
//! Each accepted connection gets one tokio task running [`run`], plus a writer
//! task draining an unbounded byte channel into the socket. The sending half
//! of that channel doubles as the user's live connection handle in the
//! directory, so cross-session delivery is a channel send and liveness is
//! `is_closed()` on the handle.
//!
//! States: handshake (banner + `IAC WILL ECHO` + login prompt), awaiting
//! login (one scrubbed, echoed line validated as `LOGIN <username>`), then the
//! authenticated command loop until QUIT, peer disconnect, transport failure
//! or server shutdown. Echoing is naive byte echo of the scrubbed input, not
//! a line-edit model.

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use crate::config::Config;
use crate::directory::{ClientHandle, LoginOutcome, UserDirectory};
use crate::logutil::escape_log;
use crate::server::commands::{CommandOutcome, CommandProcessor};
use crate::server::listener::CheckpointReason;
use crate::server::telnet::{self, ECHO, WILL};
use crate::server::ticks::TickScheduler;
use crate::server::{LoginError, MIN_USERNAME_LEN};

/// Shared handles every session needs; cloned per connection.
#[derive(Clone)]
pub struct SessionContext {
    pub config: Arc<Config>,
    pub directory: UserDirectory,
    pub ticks: TickScheduler,
    pub checkpoint_tx: mpsc::UnboundedSender<CheckpointReason>,
    pub shutdown: watch::Receiver<bool>,
}

/// Drive one connection from accept to close. Transport failures are logged
/// here, never propagated: one dead session must not affect the server.
pub async fn run(stream: TcpStream, peer: SocketAddr, mut ctx: SessionContext) {
    let (mut reader, mut writer) = stream.into_split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if writer.write_all(&frame).await.is_err() {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    match handshake(&mut reader, &outbound, &mut ctx).await {
        Ok(Some(username)) => {
            if let Err(e) = command_loop(&mut reader, &outbound, &username, &mut ctx).await {
                warn!("Session for {} ({}) ended abnormally: {:#}", escape_log(&username), peer, e);
            }
            // The socket is effectively dead whichever way the loop ended.
            ctx.directory.disconnect(&username);
            info!("Session for {} ({}) closed", escape_log(&username), peer);
        }
        Ok(None) => {
            info!("Connection from {} closed before login", peer);
        }
        Err(e) => {
            warn!("Handshake with {} failed: {:#}", peer, e);
        }
    }

    // Closing our sender lets the writer drain any goodbye frame and exit.
    // The directory handle, if one was stored, was cleared above.
    drop(outbound);
    let _ = writer_task.await;
}

/// Banner, login prompt, and validation of the first line. Returns the
/// authenticated username, or `None` when the connection was rejected or the
/// peer went away.
async fn handshake(
    reader: &mut OwnedReadHalf,
    outbound: &ClientHandle,
    ctx: &mut SessionContext,
) -> Result<Option<String>> {
    let meta = &ctx.config.metadata;
    send_raw(outbound, telnet::iac(WILL, ECHO).to_vec());
    send_text(outbound, format!("Welcome to the {}.\r\n", meta.server_name));
    send_text(outbound, format!("Server license: {}\r\n", meta.server_license));
    send_text(outbound, format!("License URL: {}\r\n", meta.server_license_url));
    send_text(
        outbound,
        format!("Alternative commercial licensing: {}\r\n", meta.commercial_license),
    );
    send_text(
        outbound,
        format!("Alternative commercial licensing URL: {}\r\n", meta.commercial_license_url),
    );
    send_text(outbound, "\r\nPlease login with the LOGIN command.\r\n");

    let Some(line) = read_line(reader, outbound, ctx).await? else {
        return Ok(None);
    };

    let username = match validate_login_line(line.trim()) {
        Ok(name) => name.to_string(),
        Err(e) => {
            send_text(outbound, format!("ERROR: {} Bye.\r\n", e));
            return Ok(None);
        }
    };

    match ctx.directory.attach(&username, outbound.clone()) {
        LoginOutcome::AlreadyOnline => {
            send_text(outbound, format!("ERROR: {} Bye.\r\n", LoginError::AlreadyOnline));
            Ok(None)
        }
        LoginOutcome::Created => {
            info!("New user {} registered", escape_log(&username));
            // New accounts are checkpointed right away.
            let _ = ctx.checkpoint_tx.send(CheckpointReason::NewUser);
            Ok(Some(username))
        }
        LoginOutcome::Resumed => {
            info!("User {} reconnected", escape_log(&username));
            Ok(Some(username))
        }
    }
}

/// First-failure-wins validation of the login line.
fn validate_login_line(line: &str) -> Result<&str, LoginError> {
    let mut parts = line.split_whitespace();
    if parts.next() != Some("LOGIN") {
        return Err(LoginError::NotLogin);
    }
    match parts.next() {
        Some(name) if name.chars().count() >= MIN_USERNAME_LEN => Ok(name),
        _ => Err(LoginError::UsernameTooShort),
    }
}

/// The authenticated read-dispatch-respond loop. Strictly sequential: one
/// command is fully handled before the next line is read.
async fn command_loop(
    reader: &mut OwnedReadHalf,
    outbound: &ClientHandle,
    username: &str,
    ctx: &mut SessionContext,
) -> Result<()> {
    send_text(outbound, format!("\r\nUser {} logged in.\r\n", username));
    let processor = CommandProcessor::new();

    loop {
        ctx.ticks.tick();
        let Some(line) = read_line(reader, outbound, ctx).await? else {
            break;
        };

        // Audit first: even blank or unknown lines are part of the record.
        ctx.directory.record_command(username, &line, Utc::now());

        match processor.process(username, line.trim(), &ctx.directory, &ctx.ticks, &ctx.config)? {
            CommandOutcome::Reply(text) => send_text(outbound, text),
            CommandOutcome::Silent => {}
            CommandOutcome::Disconnect(text) => {
                ctx.directory.disconnect(username);
                send_text(outbound, text);
                break;
            }
        }
    }
    Ok(())
}

/// Assemble one newline-terminated line: read raw bytes, tick once per read
/// and once per scanned byte, scrub option sequences, echo the cleaned bytes
/// back, accumulate. `None` means the peer closed or the server is shutting
/// down — no line was produced.
async fn read_line(
    reader: &mut OwnedReadHalf,
    outbound: &ClientHandle,
    ctx: &mut SessionContext,
) -> Result<Option<String>> {
    let mut assembled: Vec<u8> = Vec::new();
    let mut buf = [0u8; 1024];

    while !assembled.ends_with(b"\n") {
        ctx.ticks.tick();
        let n = tokio::select! {
            read = reader.read(&mut buf) => read.context("socket read")?,
            _ = ctx.shutdown.changed() => {
                send_text(outbound, "SYSTEM-MESSAGE: Server shutting down.\r\n");
                return Ok(None);
            }
        };
        if n == 0 {
            return Ok(None);
        }

        ctx.ticks.advance(n);
        let cleaned = telnet::scrub(&buf[..n]);
        if !cleaned.is_empty() {
            send_raw(outbound, cleaned.clone());
            assembled.extend_from_slice(&cleaned);
        }
    }

    let line = String::from_utf8(assembled).context("received line is not valid UTF-8")?;
    Ok(Some(line))
}

fn send_text(outbound: &ClientHandle, text: impl Into<String>) {
    // A closed channel means the writer is gone; the next read observes EOF.
    let _ = outbound.send(text.into().into_bytes());
}

fn send_raw(outbound: &ClientHandle, bytes: Vec<u8>) {
    let _ = outbound.send(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_line_validation_order() {
        assert_eq!(validate_login_line("LOGIN alice"), Ok("alice"));
        assert_eq!(validate_login_line("  LOGIN   alice  "), Ok("alice"));
        assert_eq!(validate_login_line("HELLO alice"), Err(LoginError::NotLogin));
        assert_eq!(validate_login_line(""), Err(LoginError::NotLogin));
        assert_eq!(validate_login_line("LOGIN abc"), Err(LoginError::UsernameTooShort));
        assert_eq!(validate_login_line("LOGIN"), Err(LoginError::UsernameTooShort));
    }

    #[test]
    fn login_name_length_counts_chars_not_bytes() {
        // Four characters, more than four bytes.
        assert_eq!(validate_login_line("LOGIN héllo"), Ok("héllo"));
        assert_eq!(validate_login_line("LOGIN héé"), Err(LoginError::UsernameTooShort));
    }
}
