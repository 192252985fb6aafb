//! Interval and final run reports.

use std::fmt;
use std::fs;
use std::path::Path;

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};

use crate::error::ReportError;
use crate::stats::{StatisticsSnapshot, TerminationCause};

/// What the supervisor saw at the end of one tick, before consuming energy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalReport {
    pub tick: u64,
    pub elapsed_ms: u64,
    pub stats: StatisticsSnapshot,
}

impl fmt::Display for IntervalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "=== Simulation Statistics (tick {}, elapsed {:.1} s) ===",
            self.tick,
            self.elapsed_ms as f64 / 1_000.0
        )?;
        writeln!(f, "{}", self.stats)?;
        write!(f, "==========================================")
    }
}

/// Receives every interval report as the supervisor produces it.
pub trait ReportSink {
    fn interval(&mut self, report: &IntervalReport);
}

/// Prints interval reports to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ReportSink for ConsoleSink {
    fn interval(&mut self, report: &IntervalReport) {
        println!("{report}");
    }
}

impl ReportSink for Vec<IntervalReport> {
    fn interval(&mut self, report: &IntervalReport) {
        self.push(*report);
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub cause: TerminationCause,
    pub elapsed_ms: u64,
    pub ticks: u64,
    pub final_stats: StatisticsSnapshot,
    pub atoms_created: u64,
    /// Actors still alive after the forced teardown phase.
    pub stragglers: usize,
    /// Split requests still queued when the channel was closed.
    pub discarded_requests: usize,
}

impl RunReport {
    /// Writes the report as bincode.
    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        let bytes = encode_to_vec(self, standard())?;
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let bytes = fs::read(path)?;
        let (report, _) = decode_from_slice(&bytes, standard())?;
        Ok(report)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Simulation Terminated ===")?;
        writeln!(f, "Cause: {}", self.cause.describe())?;
        writeln!(
            f,
            "Elapsed: {:.1} s over {} ticks",
            self.elapsed_ms as f64 / 1_000.0,
            self.ticks
        )?;
        writeln!(f, "Atoms created: {}", self.atoms_created)?;
        if self.stragglers > 0 {
            writeln!(f, "Detached stragglers: {}", self.stragglers)?;
        }
        writeln!(f, "{}", self.final_stats)?;
        write!(f, "=============================")
    }
}
