//! Command dispatch for authenticated sessions.
//!
//! The processor is deliberately pure protocol logic: it takes one trimmed
//! line, performs the intended directory mutation through [`UserDirectory`],
//! and returns a [`CommandOutcome`] carrying the exact text frame to send.
//! The session loop owns the socket; nothing here does I/O, which keeps the
//! whole command surface testable without a connection.
//!
//! Command names are case-sensitive and space-delimited: `SEND`, `WHO`,
//! `HELP [CONTRIBUTING|ABOUT]`, `TICKS`, `TASKS`, `QUIT`. A blank line is a
//! no-op, not an error. An unknown command gets a one-line `ERROR:` reply and
//! the session continues.

use anyhow::{anyhow, Result};
use chrono::Utc;

use crate::config::Config;
use crate::directory::{DeliverOutcome, UserDirectory};
use crate::server::ticks::TickScheduler;

/// What the session loop should do with the processed command.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Send this frame, keep the session open.
    Reply(String),
    /// Blank line: send nothing.
    Silent,
    /// Send this frame, then clear the connection and close (QUIT).
    Disconnect(String),
}

/// Processes command lines from logged-in users.
pub struct CommandProcessor;

impl Default for CommandProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandProcessor {
    pub fn new() -> Self {
        CommandProcessor
    }

    /// Dispatch one line for `username`. A multi-line response is still one
    /// returned frame. Errors bubble only for malformed lines the session
    /// loop treats as transport-level failures (e.g. `SEND` with no
    /// recipient).
    pub fn process(
        &self,
        username: &str,
        line: &str,
        directory: &UserDirectory,
        ticks: &TickScheduler,
        config: &Config,
    ) -> Result<CommandOutcome> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = parts.first() else {
            return Ok(CommandOutcome::Silent);
        };

        match command {
            "SEND" => {
                let recipient = *parts
                    .get(1)
                    .ok_or_else(|| anyhow!("malformed SEND: missing recipient"))?;
                let message = parts[2..].join(" ");
                let reply = match directory.deliver(username, recipient, &message, Utc::now()) {
                    DeliverOutcome::Delivered => {
                        format!("OK: Message sent to {}.\r\n", recipient)
                    }
                    DeliverOutcome::Offline => {
                        format!("ERROR: User `{}` is not online.\r\n", recipient)
                    }
                    DeliverOutcome::Unknown => {
                        format!("ERROR: User `{}` does not exist.\r\n", recipient)
                    }
                };
                Ok(CommandOutcome::Reply(reply))
            }
            "WHO" => {
                let mut response = String::from("Online users:\r\n");
                for (num, (name, last_active)) in directory.listing().iter().enumerate() {
                    response.push_str(&format!(
                        "#{} - {} - Last active: {}\r\n",
                        num + 1,
                        name,
                        last_active.to_rfc3339()
                    ));
                }
                Ok(CommandOutcome::Reply(response))
            }
            "HELP" => Ok(CommandOutcome::Reply(self.help(parts.get(1).copied(), config)?)),
            "TICKS" => Ok(CommandOutcome::Reply(format!(
                "OK: Server ticks: {}\r\n",
                ticks.value()
            ))),
            "TASKS" => {
                let mut response = String::from("Periodic tasks:\r\n");
                for task in ticks.status() {
                    let last_run = task.last_run.map(i64::from).unwrap_or(-1);
                    response.push_str(&format!(
                        "{} - Interval: {}, Last run: {}\r\n",
                        task.name, task.interval, last_run
                    ));
                }
                Ok(CommandOutcome::Reply(response))
            }
            "QUIT" => Ok(CommandOutcome::Disconnect("OK: Goodbye.\r\n".to_string())),
            _ => Ok(CommandOutcome::Reply(
                "ERROR: Command was not understood. Type HELP for available commands.\r\n"
                    .to_string(),
            )),
        }
    }

    fn help(&self, topic: Option<&str>, config: &Config) -> Result<String> {
        match topic {
            None => Ok(concat!(
                "Available commands:\r\n",
                "SEND <username> <message> - Send a message to a user\r\n",
                "WHO - List all online users\r\n",
                "HELP - Display this help message\r\n",
                "HELP ABOUT - Display information about the server\r\n",
                "QUIT - Disconnect from the server\r\n",
                "TICKS - Display the current server tick count\r\n",
                "TASKS - Display the current periodic tasks and their last run times\r\n",
            )
            .to_string()),
            Some("CONTRIBUTING") => Ok(format!(
                concat!(
                    "Contributions to this project are welcome. Please read the CONTRIBUTING.md file for more information.\r\n",
                    "You can also visit the source code repository at: {}\r\n",
                    "If you have any questions, please contact us at {}\r\n",
                ),
                config.metadata.server_source, config.metadata.server_author_email
            )),
            Some("ABOUT") => Ok(serde_json::to_string(&config.metadata)?),
            Some(_) => Ok(
                "ERROR: HELP topic not found. Some commands do not have additional documentation beyond the command definition in the HELP output. Type HELP for available commands and topics.\r\n"
                    .to_string(),
            ),
        }
    }
}
