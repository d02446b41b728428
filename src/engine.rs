//! Storage engine
//!
//! Owns the record table and the statistics behind one mutex. Every command
//! runs start to finish inside a single lock acquisition, so commands from
//! different sessions are linearizable. No I/O happens while the lock is
//! held.

use crate::error::{PikvError, Result};
use crate::frame::payload_of;
use crate::protocol::{split_fields, validate_fields, Command, Verb};
use crate::snapshot::SnapshotFile;
use crate::stats::{Statistics, StatsSnapshot};
use crate::table::{Record, RecordTable};
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info, warn};

/// Result class of one command. Never sent on the wire; only the message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    KeyExists,
    KeyNotFound,
    InvalidField,
    UnknownCommand,
}

impl Status {
    pub fn code(self) -> i32 {
        match self {
            Status::Success => 0,
            Status::KeyExists => 1,
            Status::KeyNotFound => 2,
            Status::InvalidField => 3,
            Status::UnknownCommand => 4,
        }
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

/// What an executed command produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// `None` when the request named no known verb
    pub verb: Option<Verb>,
    pub status: Status,
    pub message: String,
}

/// Table and counters; only reachable through [`Engine::with_state`]
#[derive(Debug, Default)]
pub struct EngineState {
    table: RecordTable,
    stats: Statistics,
}

impl EngineState {
    pub fn table(&self) -> &RecordTable {
        &self.table
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records: self.table.len(),
            stats: self.stats,
        }
    }

    /// Run one command against the table and count it
    pub fn apply(&mut self, command: &Command) -> Outcome {
        let verb = command.verb;
        let (status, message) = match command.validate() {
            Ok(()) => self.dispatch(command),
            Err(e) => (Status::InvalidField, e.to_string()),
        };

        self.stats.record(verb, status.is_success());
        Outcome {
            verb: Some(verb),
            status,
            message,
        }
    }

    fn dispatch(&mut self, command: &Command) -> (Status, String) {
        let key = command.key.as_str();

        match command.verb {
            Verb::Insert => {
                let record = Record::new(key, command.value_or_empty());
                if self.table.insert(record) {
                    (Status::Success, "INSERT successful".to_string())
                } else {
                    (
                        Status::KeyExists,
                        format!("key already exists: \"{}\"", key),
                    )
                }
            }
            Verb::Update => {
                if self
                    .table
                    .modify_value(key, command.value_or_empty().to_string())
                {
                    (Status::Success, "UPDATE successful".to_string())
                } else {
                    key_not_found(key)
                }
            }
            Verb::Delete => {
                if self.table.erase(key) {
                    (Status::Success, "DELETE successful".to_string())
                } else {
                    key_not_found(key)
                }
            }
            Verb::Get => match self.table.get(key) {
                Some(value) => (
                    Status::Success,
                    format!("GET successful: key = \"{}\" value = \"{}\"", key, value),
                ),
                None => key_not_found(key),
            },
        }
    }

    fn reject_unknown(&mut self, verb: &str) -> Outcome {
        self.stats.record_unknown();
        Outcome {
            verb: None,
            status: Status::UnknownCommand,
            message: format!("unknown command: \"{}\"", verb),
        }
    }
}

fn key_not_found(key: &str) -> (Status, String) {
    (Status::KeyNotFound, format!("key not found: \"{}\"", key))
}

/// Thread-safe storage engine shared by all sessions and the ticker
#[derive(Debug, Default)]
pub struct Engine {
    state: Mutex<EngineState>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the engine state.
    ///
    /// The lock is released when `f` returns; nothing borrowed from the
    /// state can outlive the call.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let mut state = self.state.lock();
        f(&mut state)
    }

    /// Execute one raw request frame.
    ///
    /// The payload ends at the first NUL. Requests with an unknown or empty
    /// verb produce [`Status::UnknownCommand`] and bump only the
    /// `unknown_command` counter.
    pub fn execute(&self, raw: &[u8]) -> Outcome {
        let payload = String::from_utf8_lossy(payload_of(raw));

        let fields = split_fields(&payload);

        let outcome = match Verb::from_wire(fields.verb) {
            Some(verb) => {
                let command = fields.into_command(verb);
                self.with_state(|state| state.apply(&command))
            }
            None => {
                warn!(verb = %fields.verb, "Unknown command");
                self.with_state(|state| state.reject_unknown(fields.verb))
            }
        };

        debug!(
            verb = ?outcome.verb,
            status = ?outcome.status,
            "Executed command"
        );
        outcome
    }

    /// Execute an already parsed command
    pub fn apply(&self, command: &Command) -> Outcome {
        self.with_state(|state| state.apply(command))
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.with_state(|state| state.snapshot())
    }

    pub fn record_count(&self) -> usize {
        self.with_state(|state| state.table.len())
    }

    pub fn find(&self, key: &str) -> Option<Record> {
        self.with_state(|state| state.table.find_by_key(key))
    }

    /// Replace the table with the snapshot at `path`.
    ///
    /// A missing file leaves an empty table. Duplicate keys or out-of-bound
    /// fields fail the load and leave the current table untouched.
    /// Statistics are not part of the snapshot and keep counting.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let snapshot = SnapshotFile::new(path)?;
        let records = snapshot.load()?;

        let mut table = RecordTable::new();
        for record in records {
            validate_fields(&record.key, Some(&record.value)).map_err(|e| {
                PikvError::Persistence(format!("record {:?} rejected: {}", record.key, e))
            })?;
            let key = record.key.clone();
            if !table.insert(record) {
                return Err(PikvError::Persistence(format!(
                    "duplicate key {:?} in {}",
                    key,
                    snapshot.path().display()
                )));
            }
        }

        let count = table.len();
        self.with_state(|state| state.table = table);
        info!(records = count, path = %snapshot.path().display(), "Loaded storage");
        Ok(count)
    }

    /// Write the current table to `path`. The lock is held only while the
    /// records are copied out.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let snapshot = SnapshotFile::new(path)?;
        let records = self.with_state(|state| state.table.records());

        snapshot.save(&records)?;
        info!(records = records.len(), path = %snapshot.path().display(), "Saved storage");
        Ok(records.len())
    }
}
