//! # User Directory - Shared Session/Account State
//!
//! The directory is the single shared mapping of username to [`UserRecord`],
//! mutated by every session task and the acceptor, and read by the checkpoint
//! worker and the `status` command. All access goes through one directory-wide
//! mutex; critical sections never block on I/O (delivery is an unbounded
//! channel send), so a single lock is sufficient at this scale.
//!
//! ## Record Lifecycle
//!
//! A record is created on the first successful `LOGIN` of a new username and is
//! never destroyed. Reconnects reuse the record; only the transient
//! `connection` handle changes. `commands` and `messages_received` are
//! append-only.
//!
//! ## Connection Liveness
//!
//! The live connection handle is the sending half of the session's writer
//! channel. When the peer disconnects, the writer task drops the receiving
//! half and the handle reports closed. Liveness checks are self-healing: a
//! closed handle is cleared as a side effect of observing it.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::logutil::escape_log;

/// Outbound byte-channel into one connection's writer task.
pub type ClientHandle = mpsc::UnboundedSender<Vec<u8>>;

/// One entry of the per-user command audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandEntry {
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

/// One delivered direct message in a user's inbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboxEntry {
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub message: String,
}

/// Per-username state. Everything except `connection` is persisted by the
/// checkpoint store; `connection` is derived, transient state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(skip)]
    pub connection: Option<ClientHandle>,
    pub first_login: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub commands: Vec<CommandEntry>,
    pub messages_received: Vec<InboxEntry>,
}

impl UserRecord {
    fn new(handle: ClientHandle, now: DateTime<Utc>) -> Self {
        UserRecord {
            connection: Some(handle),
            first_login: now,
            last_active: now,
            commands: Vec::new(),
            messages_received: Vec::new(),
        }
    }

    /// Field-for-field equality over the persisted fields only. Used by the
    /// checkpoint store to diff live records against the re-read blob.
    pub fn persisted_eq(&self, other: &UserRecord) -> bool {
        self.first_login == other.first_login
            && self.last_active == other.last_active
            && self.commands == other.commands
            && self.messages_received == other.messages_received
    }
}

/// Result of a login attempt against the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// New username: record created, immediate checkpoint warranted.
    Created,
    /// Existing username with no live connection: record reattached.
    Resumed,
    /// Existing username with a live connection: login must be rejected.
    AlreadyOnline,
}

/// Result of a `SEND` delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverOutcome {
    Delivered,
    Offline,
    Unknown,
}

/// Cloneable handle to the shared directory.
#[derive(Clone, Default)]
pub struct UserDirectory {
    inner: Arc<Mutex<HashMap<String, UserRecord>>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, UserRecord>> {
        self.inner.lock().expect("user directory lock poisoned")
    }

    /// Check-and-create login in one critical section. This is what makes two
    /// concurrent `LOGIN` attempts for the same new username yield exactly one
    /// record and exactly one accepted connection.
    pub fn attach(&self, username: &str, handle: ClientHandle) -> LoginOutcome {
        let now = Utc::now();
        let mut map = self.lock();
        match map.get_mut(username) {
            Some(record) => {
                if handle_is_live(&mut record.connection) {
                    LoginOutcome::AlreadyOnline
                } else {
                    record.connection = Some(handle);
                    record.last_active = now;
                    LoginOutcome::Resumed
                }
            }
            None => {
                map.insert(username.to_string(), UserRecord::new(handle, now));
                LoginOutcome::Created
            }
        }
    }

    /// True only if the user exists and its connection handle is still open.
    /// Self-healing: a closed handle is cleared before returning false.
    pub fn is_connected(&self, username: &str) -> bool {
        let mut map = self.lock();
        match map.get_mut(username) {
            Some(record) => handle_is_live(&mut record.connection),
            None => false,
        }
    }

    /// Append a raw line to the user's audit log and bump `last_active`.
    pub fn record_command(&self, username: &str, raw_line: &str, timestamp: DateTime<Utc>) {
        let mut map = self.lock();
        if let Some(record) = map.get_mut(username) {
            record.last_active = timestamp;
            record.commands.push(CommandEntry {
                timestamp,
                line: raw_line.to_string(),
            });
        }
    }

    /// Deliver a direct message: append to the recipient's inbox, then push the
    /// formatted line into the recipient's connection. The inbox append happens
    /// before the sender sees a confirmation.
    pub fn deliver(
        &self,
        sender: &str,
        recipient: &str,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> DeliverOutcome {
        let mut map = self.lock();
        let Some(record) = map.get_mut(recipient) else {
            return DeliverOutcome::Unknown;
        };
        if !handle_is_live(&mut record.connection) {
            return DeliverOutcome::Offline;
        }
        record.messages_received.push(InboxEntry {
            timestamp,
            sender: sender.to_string(),
            message: message.to_string(),
        });
        let wire = format!("[{}] {}: {}\r\n", timestamp.to_rfc3339(), sender, message);
        if let Some(handle) = &record.connection {
            if handle.send(wire.into_bytes()).is_err() {
                // Writer raced us and went away; the inbox entry stays.
                record.connection = None;
                debug!("delivery to {} lost its connection mid-send", escape_log(recipient));
            }
        }
        DeliverOutcome::Delivered
    }

    /// Clear the connection handle (QUIT, transport failure, shutdown).
    pub fn disconnect(&self, username: &str) {
        let mut map = self.lock();
        if let Some(record) = map.get_mut(username) {
            record.connection = None;
        }
    }

    /// Best-effort send of one text frame to every currently-connected user.
    pub fn broadcast(&self, text: &str) {
        let mut map = self.lock();
        for record in map.values_mut() {
            if handle_is_live(&mut record.connection) {
                if let Some(handle) = &record.connection {
                    let _ = handle.send(text.as_bytes().to_vec());
                }
            }
        }
    }

    /// Consistent point-in-time copy of every record, for checkpointing and the
    /// read-only status view. Holds the lock for the duration of the clone so a
    /// torn state can never be captured.
    pub fn snapshot(&self) -> HashMap<String, UserRecord> {
        self.lock().clone()
    }

    /// Replace the directory contents from a loaded checkpoint. Startup only.
    pub fn restore(&self, records: HashMap<String, UserRecord>) {
        let mut map = self.lock();
        *map = records;
    }

    /// `(username, last_active)` for every user, sorted by name. Backs `WHO`.
    pub fn listing(&self) -> Vec<(String, DateTime<Utc>)> {
        let map = self.lock();
        let mut rows: Vec<(String, DateTime<Utc>)> = map
            .iter()
            .map(|(name, record)| (name.clone(), record.last_active))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Liveness check with the self-healing side effect: a handle whose channel is
/// closed is cleared in place.
fn handle_is_live(connection: &mut Option<ClientHandle>) -> bool {
    match connection {
        Some(handle) if !handle.is_closed() => true,
        Some(_) => {
            *connection = None;
            false
        }
        None => false,
    }
}
