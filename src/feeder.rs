//! Periodic injection of fresh atoms.

use tracing::{debug, error};

use crate::atom::seed_atoms;
use crate::error::SpawnError;
use crate::roster::{ActorContext, ActorId, ActorKind};
use crate::stats::TerminationCause;

pub struct FeederActor {
    id: ActorId,
    ctx: ActorContext,
}

impl FeederActor {
    pub fn spawn(ctx: &ActorContext) -> Result<ActorId, SpawnError> {
        let actor = Self {
            id: ActorId::next(),
            ctx: ctx.clone(),
        };
        let id = actor.id;
        ctx.roster
            .launch(id, ActorKind::Feeder, Box::new(move || actor.run()))
    }

    fn run(self) {
        self.ctx.stats.mark_initialized();
        if !self.ctx.wait_for_run() {
            return;
        }

        let period = self.ctx.config.feed_period();
        let per_feed = self.ctx.config.atoms_per_feed;
        let mut rng = rand::rng();
        while self.ctx.pause(period) {
            match seed_atoms(&self.ctx, &mut rng, per_feed) {
                Ok(fed) => debug!(actor_id = %self.id, fed = fed.len(), "fed atoms"),
                Err(SpawnError::ShuttingDown) => break,
                Err(err) => {
                    if self
                        .ctx
                        .stats
                        .set_termination_cause_if_unset(TerminationCause::Meltdown)
                    {
                        error!(actor_id = %self.id, error = %err, "feeding failed, meltdown");
                    }
                    break;
                }
            }
        }
        debug!(actor_id = %self.id, "feeder exited");
    }
}
