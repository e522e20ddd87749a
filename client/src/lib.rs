//! # Capture-the-Flag Controller Library
//!
//! This library lets external agents play the capture-the-flag game through a
//! small set of high-level commands. It owns the connection to the game server,
//! keeps a local copy of the world, and turns fire-and-forget wire messages into
//! commands with observable outcomes.
//!
//! ## Architecture Overview
//!
//! The game server is authoritative and speaks JSON over two channels: a
//! websocket that pushes full world snapshots and carries player actions, and
//! an HTTP endpoint that answers with the current snapshot on request. The
//! controller uses both.
//!
//! ### Push Ingestion
//! A background task per session reads every frame from the websocket. Full
//! snapshots replace the local mirror wholesale; error frames are remembered so
//! a join can be rejected after the fact.
//!
//! ### Pull Queries
//! Movement needs to know where the player really is, so the executor asks the
//! HTTP endpoint for a fresh snapshot at every poll and only falls back to the
//! mirror when that request fails.
//!
//! ### Admission Control
//! Every command passes a shared sliding-window rate limiter before it runs,
//! so a misbehaving agent cannot flood the server.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! Connection lifecycle for a single player:
//! - Join handshake with a grace window for asynchronous rejections
//! - Writer and ingestion tasks around one websocket
//! - Snapshot queries over HTTP
//! - Idempotent teardown
//!
//! ### Executor Module (`executor`)
//! Player actions on top of a session:
//! - Target validation, step clamping and wall checks
//! - Polling movement until arrival, block, death, loss or timeout
//! - Attack and team chat
//!
//! ### Controller Module (`controller`)
//! The command surface: a table of sessions keyed by agent, the rate-limit
//! middleware, event recording and reply formatting.
//!
//! ### Driver Module (`driver`)
//! Newline-delimited JSON over stdin and stdout for the binary.
//!
//! ## Supporting Modules
//!
//! - `config`: runtime settings built once from the command line
//! - `error`: the error taxonomy shared by every layer
//! - `event_log`: append-only record of commands and connections
//! - `mirror`: atomically swapped copy of the latest pushed snapshot
//! - `rate_limiter`: sliding-window admission control
//! - `report`: the textual status block attached to replies

pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod event_log;
pub mod executor;
pub mod mirror;
pub mod rate_limiter;
pub mod report;
pub mod session;

pub use config::{ControllerConfig, MovementTuning, RateLimitConfig, SessionConfig};
pub use controller::{Controller, ToolReply};
pub use error::{ArgumentError, ControllerError, StateError, TransportError};
pub use executor::{ActionExecutor, MoveOutcome, MoveReport};
pub use session::{ConnectionSession, GameLink, Identity, Phase};
