//! Owns one run: creates the shared resources, populates the actors, drives
//! the supervisor and tears everything down again.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::activator::ActivatorActor;
use crate::atom::seed_atoms;
use crate::channel::SplitChannel;
use crate::config::SimulationConfig;
use crate::error::{ReactorError, SpawnError};
use crate::feeder::FeederActor;
use crate::report::{ReportSink, RunReport};
use crate::roster::{ActorContext, CappedSpawner, Roster, Spawner, ThreadSpawner};
use crate::stats::{RunPhase, StatisticsStore};
use crate::supervisor::Supervisor;

/// Actors besides the initial atoms that must pass the startup barrier.
const SUPPORT_ACTORS: u32 = 2;
const BARRIER_POLL: Duration = Duration::from_millis(10);
/// How long stragglers get after the channel is closed on them.
const FORCE_WINDOW: Duration = Duration::from_millis(250);

/// Ends a run from outside without recording a termination cause.
#[derive(Clone)]
pub struct StopHandle {
    stats: Arc<StatisticsStore>,
}

impl StopHandle {
    /// Returns `false` if the run had already stopped.
    pub fn stop(&self) -> bool {
        let stopped = self.stats.set_running(false);
        if stopped {
            info!("external stop requested");
        }
        stopped
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Teardown {
    stragglers: usize,
    discarded: usize,
}

pub struct Reactor {
    ctx: ActorContext,
}

impl Reactor {
    /// Builds a reactor on plain OS threads, capped at `max_actors` when set.
    pub fn new(config: SimulationConfig) -> Result<Self, ReactorError> {
        let spawner: Arc<dyn Spawner> = match config.max_actors {
            Some(limit) => Arc::new(CappedSpawner::new(ThreadSpawner::default(), limit)),
            None => Arc::new(ThreadSpawner::default()),
        };
        Self::with_spawner(config, spawner)
    }

    pub fn with_spawner(
        config: SimulationConfig,
        spawner: Arc<dyn Spawner>,
    ) -> Result<Self, ReactorError> {
        config.validate()?;

        let init_target = config
            .initial_atoms
            .checked_add(SUPPORT_ACTORS)
            .ok_or_else(|| ReactorError::StartupResource {
                resource: "statistics store",
                reason: format!(
                    "barrier target overflows for {} initial atoms",
                    config.initial_atoms
                ),
            })?;
        let stats = Arc::new(StatisticsStore::new(init_target));

        let channel = SplitChannel::bounded(config.split_queue_capacity).map_err(|err| {
            ReactorError::StartupResource {
                resource: "split channel",
                reason: err.to_string(),
            }
        })?;

        Ok(Self {
            ctx: ActorContext {
                config: Arc::new(config),
                stats,
                channel: Arc::new(channel),
                roster: Arc::new(Roster::new(spawner)),
            },
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stats: Arc::clone(&self.ctx.stats),
        }
    }

    pub fn statistics(&self) -> Arc<StatisticsStore> {
        Arc::clone(&self.ctx.stats)
    }

    /// Runs the reaction to completion. Errors are returned only for startup
    /// failures; every termination cause ends in a report.
    pub fn run(self, sink: &mut dyn ReportSink) -> Result<RunReport, ReactorError> {
        let config = &self.ctx.config;
        info!(
            initial_atoms = config.initial_atoms,
            max_atomic_number = config.max_atomic_number,
            min_atomic_number = config.min_atomic_number,
            energy_demand = config.energy_demand,
            explode_threshold = config.explode_threshold,
            duration_secs = config.duration_secs,
            feed_period_ns = config.feed_period_ns,
            atoms_per_feed = config.atoms_per_feed,
            "starting chain reaction"
        );

        if let Err(err) = self.populate() {
            error!(error = %err, "failed to populate the reactor");
            self.teardown();
            return Err(err.into());
        }
        if let Err(err) = self.await_barrier() {
            error!(error = %err, "actors never became ready");
            self.teardown();
            return Err(err);
        }

        let mut elapsed = Duration::ZERO;
        let mut ticks = 0;
        if self.ctx.stats.set_running(true) {
            info!("all actors ready, reaction running");
            let started = Instant::now();
            let mut supervisor = Supervisor::new(self.ctx.clone(), started);
            let cause = supervisor.run(sink);
            self.ctx.stats.set_running(false);
            elapsed = started.elapsed();
            ticks = supervisor.ticks();
            info!(cause = %cause, ticks, "reaction stopped");
        } else {
            info!("stopped before the reaction started");
        }

        let teardown = self.teardown();
        let final_stats = self.ctx.stats.snapshot();
        Ok(RunReport {
            cause: final_stats.cause,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            ticks,
            final_stats,
            atoms_created: self.ctx.stats.atoms_created(),
            stragglers: teardown.stragglers,
            discarded_requests: teardown.discarded,
        })
    }

    fn populate(&self) -> Result<(), SpawnError> {
        let mut rng = rand::rng();
        let atoms = seed_atoms(&self.ctx, &mut rng, self.ctx.config.initial_atoms)?;
        debug!(atoms = atoms.len(), "initial atoms launched");
        ActivatorActor::spawn(&self.ctx)?;
        FeederActor::spawn(&self.ctx)?;
        Ok(())
    }

    /// Waits until every startup actor has checked in. An external stop
    /// during the wait ends it early; the run flag then refuses to rise.
    fn await_barrier(&self) -> Result<(), ReactorError> {
        let started = Instant::now();
        let deadline = started + self.ctx.config.barrier_timeout();
        loop {
            let (ready, target) = self.ctx.stats.barrier();
            if ready >= target || self.ctx.stats.phase() == RunPhase::Stopped {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ReactorError::BarrierTimeout {
                    ready,
                    target,
                    waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                });
            }
            thread::sleep(BARRIER_POLL);
        }
    }

    /// Stops the run, waits out the grace period, then closes the channel on
    /// anyone still blocked and detaches whatever is left.
    fn teardown(&self) -> Teardown {
        let stats = &self.ctx.stats;
        let roster = &self.ctx.roster;
        let poll = self.ctx.config.poll_interval();

        stats.set_running(false);
        roster.seal();

        let mut remaining =
            roster.reap_until(Instant::now() + self.ctx.config.grace_period(), poll);
        if remaining > 0 {
            warn!(remaining, "grace period over, forcing teardown");
        }

        let discarded = self.ctx.channel.close();
        if remaining > 0 {
            remaining = roster.reap_until(Instant::now() + FORCE_WINDOW, poll);
        }
        let stragglers = if remaining > 0 {
            roster.detach_remaining()
        } else {
            0
        };

        debug!(discarded, stragglers, "shared resources released");
        Teardown {
            stragglers,
            discarded,
        }
    }
}
