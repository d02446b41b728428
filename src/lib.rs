//! PiKV - a small key-value store served over fixed-size TCP frames
//!
//! This library provides:
//! - A record table indexed by key (unique) and by value (non-unique)
//! - A thread-safe storage engine with per-verb success/failure statistics
//! - A TCP server with a per-connection request/response session
//! - A client with connect-with-retry and a free-order command-line grammar
//! - A periodic statistics ticker and a JSON-lines snapshot file

pub mod cli;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod server;
pub mod session;
pub mod snapshot;
pub mod stats;
pub mod table;

pub use client::{execute_once, Client};
pub use config::{AcceptMode, RetryPolicy, ServerConfig, DEFAULT_PORT};
pub use engine::{Engine, Outcome, Status};
pub use error::{PikvError, Result};
pub use frame::{Frame, FRAME_SIZE};
pub use protocol::{Command, Verb};
pub use server::Server;
pub use stats::{Statistics, StatsSnapshot};
pub use table::{Record, RecordTable};

/// Current version of PiKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
