//! Operation statistics and the periodic reporter
//!
//! Counters live next to the table inside the engine lock and are bumped
//! exactly once per executed command. The ticker copies them out on a fixed
//! schedule and hands the copy to a reporter.

use crate::engine::Engine;
use crate::protocol::Verb;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Success/failure counters per verb, plus requests with no known verb
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub success_insert: u64,
    pub fail_insert: u64,
    pub success_update: u64,
    pub fail_update: u64,
    pub success_delete: u64,
    pub fail_delete: u64,
    pub success_get: u64,
    pub fail_get: u64,
    pub unknown_command: u64,
}

impl Statistics {
    /// Count one completed command
    pub fn record(&mut self, verb: Verb, success: bool) {
        let counter = match (verb, success) {
            (Verb::Insert, true) => &mut self.success_insert,
            (Verb::Insert, false) => &mut self.fail_insert,
            (Verb::Update, true) => &mut self.success_update,
            (Verb::Update, false) => &mut self.fail_update,
            (Verb::Delete, true) => &mut self.success_delete,
            (Verb::Delete, false) => &mut self.fail_delete,
            (Verb::Get, true) => &mut self.success_get,
            (Verb::Get, false) => &mut self.fail_get,
        };
        *counter += 1;
    }

    pub fn record_unknown(&mut self) {
        self.unknown_command += 1;
    }

    pub fn successes(&self, verb: Verb) -> u64 {
        match verb {
            Verb::Insert => self.success_insert,
            Verb::Update => self.success_update,
            Verb::Delete => self.success_delete,
            Verb::Get => self.success_get,
        }
    }

    pub fn failures(&self, verb: Verb) -> u64 {
        match verb {
            Verb::Insert => self.fail_insert,
            Verb::Update => self.fail_update,
            Verb::Delete => self.fail_delete,
            Verb::Get => self.fail_get,
        }
    }
}

/// Counters and record count taken under one lock acquisition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub records: usize,
    pub stats: Statistics,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " ----------- Server statistics ----------")?;
        writeln!(f, "           {:>11}{:>11}", "Successful", "Fail")?;
        writeln!(f, " ----------------------------------------")?;
        for verb in Verb::ALL {
            let label = format!("{}:", verb);
            writeln!(
                f,
                " {:<9} {:>11}{:>11}",
                label,
                self.stats.successes(verb),
                self.stats.failures(verb)
            )?;
        }
        writeln!(f, " {:<9} {:>22}", "Unknown:", self.stats.unknown_command)?;
        writeln!(f, " {:<9} {:>22}", "Records:", self.records)?;
        write!(f, " ----------------------------------------")
    }
}

/// Spawn the statistics ticker.
///
/// The first report fires one `period` after the call and every following
/// one exactly `period` after the previous deadline; late ticks are caught
/// up rather than pushing the schedule back. The task ends when `shutdown`
/// fires. `period` must be non-zero.
pub fn spawn_stats_ticker<F>(
    engine: Arc<Engine>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
    mut report: F,
) -> JoinHandle<()>
where
    F: FnMut(StatsSnapshot) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        info!(interval_ms = period.as_millis() as u64, "Statistics ticker started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("Statistics ticker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    report(engine.stats_snapshot());
                }
            }
        }
    })
}

/// Reporter used by the server: one structured log line per tick
pub fn log_report(snapshot: StatsSnapshot) {
    let s = &snapshot.stats;
    info!(
        records = snapshot.records,
        success_insert = s.success_insert,
        fail_insert = s.fail_insert,
        success_update = s.success_update,
        fail_update = s.fail_update,
        success_delete = s.success_delete,
        fail_delete = s.fail_delete,
        success_get = s.success_get,
        fail_get = s.fail_get,
        unknown_command = s.unknown_command,
        "Server statistics\n{}",
        snapshot
    );
}
