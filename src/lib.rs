//! # LineBBS - A Minimal Multi-User Line-Protocol Server
//!
//! LineBBS is a small message server for plain telnet clients. Users connect over
//! raw TCP, log in with `LOGIN <username>`, and exchange single-line commands:
//! direct messaging (`SEND`), presence listing (`WHO`), help (`HELP`), server
//! diagnostics (`TICKS`, `TASKS`) and logout (`QUIT`).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use linebbs::config::Config;
//! use linebbs::server::listener::LineServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let server = LineServer::bind(config).await?;
//!     server.run().await
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`server`] - Acceptor, session state machine, command dispatch, telnet
//!   scrubbing and the tick scheduler
//! - [`directory`] - The shared username -> [`directory::UserRecord`] map
//! - [`storage`] - Checkpoint persistence with post-write verification
//! - [`config`] - TOML configuration and server metadata
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   LineServer    │ ← accept loop + login handshake
//! └─────────────────┘
//!          │ one task per connection
//! ┌─────────────────┐
//! │   Session       │ ← read / scrub / echo / dispatch
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  UserDirectory  │ ← shared state, checkpointed to disk
//! └─────────────────┘
//! ```
//!
//! Every blocking-read loop also drives the shared tick counter; periodic tasks
//! (currently only the checkpoint) fire when their interval divides the counter.

pub mod config;
pub mod directory;
pub mod logutil;
pub mod server;
pub mod storage;
