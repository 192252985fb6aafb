use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Flat run configuration. Every field can be set by flag or by environment
/// variable and falls back to the documented default.
#[derive(Debug, Clone, PartialEq, Eq, Args, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Atoms created before the run starts
    #[arg(long, env = "N_ATOMI_INIT", default_value_t = 10)]
    pub initial_atoms: u32,

    /// Upper bound for randomly drawn atomic numbers
    #[arg(long, env = "N_ATOM_MAX", default_value_t = 100)]
    pub max_atomic_number: u32,

    /// Atoms at or below this atomic number turn into waste instead of splitting
    #[arg(long, env = "MIN_N_ATOMICO", default_value_t = 5)]
    pub min_atomic_number: u32,

    /// Energy drawn by the supervisor on every tick
    #[arg(long, env = "ENERGY_DEMAND", default_value_t = 50)]
    pub energy_demand: i64,

    /// Net energy at which the reaction explodes
    #[arg(long, env = "ENERGY_EXPLODE_THRESHOLD", default_value_t = 10_000)]
    pub explode_threshold: i64,

    /// Run length in seconds
    #[arg(long, env = "SIM_DURATION", default_value_t = 30)]
    pub duration_secs: u64,

    /// Nanoseconds between feeder ticks
    #[arg(long = "step", env = "STEP", default_value_t = 1_000_000_000)]
    pub feed_period_ns: u64,

    /// Atoms injected by the feeder on every tick
    #[arg(long, env = "N_NUOVI_ATOMI", default_value_t = 2)]
    pub atoms_per_feed: u32,

    /// Milliseconds between activator bursts
    #[arg(long, env = "ACTIVATOR_PERIOD_MS", default_value_t = 100)]
    pub activator_period_ms: u64,

    /// Milliseconds between supervisor reports
    #[arg(long, env = "SUPERVISOR_TICK_MS", default_value_t = 1_000)]
    pub supervisor_tick_ms: u64,

    /// Upper bound on any wait for the run flag or a split request
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 10)]
    pub poll_interval_ms: u64,

    /// Time actors get to leave voluntarily before teardown is forced
    #[arg(long, env = "GRACE_PERIOD_MS", default_value_t = 1_000)]
    pub grace_period_ms: u64,

    /// Give up on startup if not every actor reports ready in time
    #[arg(long, env = "BARRIER_TIMEOUT_MS", default_value_t = 10_000)]
    pub barrier_timeout_ms: u64,

    /// Pending split requests the channel holds before rejecting sends
    #[arg(long, env = "SPLIT_QUEUE_CAPACITY", default_value_t = 4_096)]
    pub split_queue_capacity: usize,

    /// Cap on concurrently live actor threads; spawns past it fail
    #[arg(long, env = "MAX_ACTORS")]
    pub max_actors: Option<usize>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_atoms: 10,
            max_atomic_number: 100,
            min_atomic_number: 5,
            energy_demand: 50,
            explode_threshold: 10_000,
            duration_secs: 30,
            feed_period_ns: 1_000_000_000,
            atoms_per_feed: 2,
            activator_period_ms: 100,
            supervisor_tick_ms: 1_000,
            poll_interval_ms: 10,
            grace_period_ms: 1_000,
            barrier_timeout_ms: 10_000,
            split_queue_capacity: 4_096,
            max_actors: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_atomic_number == 0 {
            return Err(ConfigError::ZeroMaxAtomicNumber);
        }
        if self.energy_demand < 0 {
            return Err(ConfigError::NegativeDemand(self.energy_demand));
        }
        if self.split_queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.max_actors == Some(0) {
            return Err(ConfigError::ZeroActorLimit);
        }

        let periods = [
            ("feed period", self.feed_period_ns),
            ("activator period", self.activator_period_ms),
            ("supervisor tick", self.supervisor_tick_ms),
            ("poll interval", self.poll_interval_ms),
            ("barrier timeout", self.barrier_timeout_ms),
        ];
        match periods.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(ConfigError::ZeroPeriod(*name)),
            None => Ok(()),
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn feed_period(&self) -> Duration {
        Duration::from_nanos(self.feed_period_ns)
    }

    pub fn activator_period(&self) -> Duration {
        Duration::from_millis(self.activator_period_ms)
    }

    pub fn supervisor_tick(&self) -> Duration {
        Duration::from_millis(self.supervisor_tick_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_millis(self.barrier_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        config: SimulationConfig,
    }

    #[test]
    fn defaults_pass_validation() {
        let config = SimulationConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.feed_period(), Duration::from_secs(1));
        assert_eq!(config.duration(), Duration::from_secs(30));
    }

    #[test]
    fn flags_override_defaults() {
        let harness = Harness::try_parse_from([
            "chain-reaction",
            "--initial-atoms",
            "3",
            "--min-atomic-number",
            "7",
            "--step",
            "500000000",
        ])
        .unwrap();

        assert_eq!(harness.config.initial_atoms, 3);
        assert_eq!(harness.config.min_atomic_number, 7);
        assert_eq!(harness.config.feed_period(), Duration::from_millis(500));
    }

    #[test]
    fn zero_periods_are_rejected() {
        let config = SimulationConfig {
            poll_interval_ms: 0,
            ..SimulationConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroPeriod("poll interval"))
        );

        let config = SimulationConfig {
            feed_period_ns: 0,
            ..SimulationConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroPeriod("feed period")));
    }

    #[test]
    fn degenerate_limits_are_rejected() {
        let config = SimulationConfig {
            max_atomic_number: 0,
            ..SimulationConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroMaxAtomicNumber));

        let config = SimulationConfig {
            energy_demand: -1,
            ..SimulationConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NegativeDemand(-1)));

        let config = SimulationConfig {
            max_actors: Some(0),
            ..SimulationConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroActorLimit));
    }
}
