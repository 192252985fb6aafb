//! Per-tick reporting, energy draw and termination decisions.

use std::time::{Duration, Instant};

use tracing::info;

use crate::config::SimulationConfig;
use crate::report::{IntervalReport, ReportSink};
use crate::roster::ActorContext;
use crate::stats::{Counters, TerminationCause};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationPolicy {
    pub duration: Duration,
    pub explode_threshold: i64,
}

impl TerminationPolicy {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            duration: config.duration(),
            explode_threshold: config.explode_threshold,
        }
    }

    /// When both limits trip on the same tick the explosion is reported.
    pub fn evaluate(&self, elapsed: Duration, totals: &Counters) -> Option<TerminationCause> {
        if totals.net_energy() >= self.explode_threshold {
            Some(TerminationCause::Explode)
        } else if elapsed >= self.duration {
            Some(TerminationCause::Timeout)
        } else {
            None
        }
    }
}

pub struct Supervisor {
    ctx: ActorContext,
    policy: TerminationPolicy,
    started: Instant,
    ticks: u64,
}

impl Supervisor {
    pub fn new(ctx: ActorContext, started: Instant) -> Self {
        let policy = TerminationPolicy::from_config(&ctx.config);
        Self {
            ctx,
            policy,
            started,
            ticks: 0,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Ticks until the run flag drops, then returns the recorded cause.
    pub fn run(&mut self, sink: &mut dyn ReportSink) -> TerminationCause {
        let tick = self.ctx.config.supervisor_tick();
        while self.ctx.pause(tick) {
            self.tick(sink);
            if !self.ctx.stats.is_running() {
                break;
            }
        }
        self.ctx.stats.termination_cause()
    }

    /// One supervisor step: report and reset the interval, draw the demand,
    /// then evaluate the limits.
    pub fn tick(&mut self, sink: &mut dyn ReportSink) -> TerminationCause {
        self.ticks += 1;
        let elapsed = self.started.elapsed();
        let stats = &self.ctx.stats;

        let snapshot = stats.take_interval();
        let report = IntervalReport {
            tick: self.ticks,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            stats: snapshot,
        };
        info!(
            tick = report.tick,
            elapsed_ms = report.elapsed_ms,
            activations = snapshot.interval.activations,
            splits = snapshot.interval.splits,
            produced = snapshot.interval.energy_produced,
            waste = snapshot.interval.waste,
            energy = snapshot.current_energy,
            atoms = snapshot.num_atoms,
            "interval report"
        );
        sink.interval(&report);

        stats.consume_energy(self.ctx.config.energy_demand);
        let policy = self.policy;
        let cause = stats.evaluate_termination(|totals| policy.evaluate(elapsed, totals));

        self.ctx.roster.reap_finished();
        cause
    }
}
