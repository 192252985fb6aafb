//! Periodic split stimulus.

use rand::Rng;
use tracing::{debug, trace};

use crate::channel::Target;
use crate::error::{ChannelError, SpawnError};
use crate::roster::{ActorContext, ActorId, ActorKind};

/// Largest number of split requests sent in one burst.
pub const MAX_BURST: u32 = 3;

pub struct ActivatorActor {
    id: ActorId,
    ctx: ActorContext,
}

impl ActivatorActor {
    pub fn spawn(ctx: &ActorContext) -> Result<ActorId, SpawnError> {
        let actor = Self {
            id: ActorId::next(),
            ctx: ctx.clone(),
        };
        let id = actor.id;
        ctx.roster
            .launch(id, ActorKind::Activator, Box::new(move || actor.run()))
    }

    fn run(self) {
        self.ctx.stats.mark_initialized();
        if !self.ctx.wait_for_run() {
            return;
        }

        let period = self.ctx.config.activator_period();
        let mut rng = rand::rng();
        loop {
            if self.ctx.stats.num_atoms() > 0 {
                let burst = rng.random_range(1..=MAX_BURST);
                let sent = self.fire(burst);
                trace!(actor_id = %self.id, burst, sent, "activation burst");
            }
            if !self.ctx.pause(period) {
                break;
            }
        }
        debug!(actor_id = %self.id, "activator exited");
    }

    /// Sends up to `burst` requests to any atom, recording one activation per
    /// accepted request. Returns how many were accepted.
    fn fire(&self, burst: u32) -> u32 {
        let mut sent = 0;
        for _ in 0..burst {
            match self.ctx.channel.send(Target::Any, 0) {
                Ok(()) => {
                    self.ctx.stats.record_activation();
                    sent += 1;
                }
                Err(ChannelError::Full { capacity }) => {
                    trace!(actor_id = %self.id, capacity, "split queue full");
                    break;
                }
                Err(_) => break,
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::channel::SplitChannel;
    use crate::config::SimulationConfig;
    use crate::roster::{Roster, ThreadSpawner};
    use crate::stats::{AtomSlot, StatisticsStore};

    fn context(capacity: usize) -> ActorContext {
        ActorContext {
            config: Arc::new(SimulationConfig {
                activator_period_ms: 5,
                poll_interval_ms: 1,
                ..SimulationConfig::default()
            }),
            stats: Arc::new(StatisticsStore::new(1)),
            channel: Arc::new(SplitChannel::bounded(capacity).unwrap()),
            roster: Arc::new(Roster::new(Arc::new(ThreadSpawner::default()))),
        }
    }

    fn stop(ctx: &ActorContext) {
        ctx.stats.set_running(false);
        let remaining = ctx
            .roster
            .reap_until(Instant::now() + Duration::from_secs(5), Duration::from_millis(1));
        assert_eq!(remaining, 0);
    }

    #[test]
    fn stays_quiet_without_atoms() {
        let ctx = context(64);
        ActivatorActor::spawn(&ctx).unwrap();
        while ctx.stats.barrier().0 < 1 {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(ctx.stats.set_running(true));

        thread::sleep(Duration::from_millis(40));
        assert!(ctx.channel.is_empty());
        assert_eq!(ctx.stats.snapshot().total.activations, 0);
        stop(&ctx);
    }

    #[test]
    fn activations_match_enqueued_requests() {
        let ctx = context(4);
        let _atom = AtomSlot::acquire(&ctx.stats);
        ActivatorActor::spawn(&ctx).unwrap();
        while ctx.stats.barrier().0 < 1 {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(ctx.stats.set_running(true));

        // Nothing consumes, so the queue fills and further sends are refused.
        let deadline = Instant::now() + Duration::from_secs(5);
        while ctx.channel.len() < 4 {
            assert!(Instant::now() < deadline, "queue never filled");
            thread::sleep(Duration::from_millis(2));
        }
        thread::sleep(Duration::from_millis(30));
        stop(&ctx);

        assert_eq!(ctx.channel.len(), 4);
        assert_eq!(ctx.stats.snapshot().total.activations, 4);
    }
}
