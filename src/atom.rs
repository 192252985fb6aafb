//! Atom actors and the fission rule they follow.

use tracing::{debug, error, trace};

use crate::channel::SplitRequest;
use crate::error::{ChannelError, SpawnError};
use crate::roster::{ActorContext, ActorId, ActorKind};
use crate::stats::{AtomSlot, TerminationCause};

/// Splits `n` as evenly as possible; the second half takes the odd nucleon.
pub fn split_atomic_number(n: u32) -> (u32, u32) {
    let low = n / 2;
    (low, n - low)
}

/// Energy released by a split into `n1` and `n2`: `n1·n2 − max(n1, n2)`.
pub fn fission_energy(n1: u32, n2: u32) -> i64 {
    i64::from(n1) * i64::from(n2) - i64::from(n1.max(n2))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fission {
    /// The atom keeps `keep` and emits a new atom carrying `emit`.
    Split { keep: u32, emit: u32, energy: i64 },
    Waste,
}

/// Atoms at or below `min_atomic_number` are waste. An atom of 1 has nothing
/// to split into, so it is waste whatever the minimum.
pub fn fission(atomic_number: u32, min_atomic_number: u32) -> Fission {
    if atomic_number <= min_atomic_number.max(1) {
        return Fission::Waste;
    }
    let (keep, emit) = split_atomic_number(atomic_number);
    Fission::Split {
        keep,
        emit,
        energy: fission_energy(keep, emit),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomState {
    Starting,
    WaitingForRun,
    Active,
    Splitting,
    Waste,
    Terminated,
}

enum Step {
    Continue,
    Exit,
}

pub struct AtomActor {
    id: ActorId,
    atomic_number: u32,
    state: AtomState,
    slot: Option<AtomSlot>,
    ctx: ActorContext,
}

impl AtomActor {
    /// Launches a fresh atom. It counts itself into `num_atoms` once its
    /// thread is up.
    pub fn spawn(ctx: &ActorContext, atomic_number: u32) -> Result<ActorId, SpawnError> {
        Self::launch(ctx, atomic_number, None)
    }

    /// Launches an atom already counted by its parent through `slot`.
    fn spawn_counted(
        ctx: &ActorContext,
        atomic_number: u32,
        slot: AtomSlot,
    ) -> Result<ActorId, SpawnError> {
        Self::launch(ctx, atomic_number, Some(slot))
    }

    fn launch(
        ctx: &ActorContext,
        atomic_number: u32,
        slot: Option<AtomSlot>,
    ) -> Result<ActorId, SpawnError> {
        let actor = Self {
            id: ActorId::next(),
            atomic_number,
            state: AtomState::Starting,
            slot,
            ctx: ctx.clone(),
        };
        let id = actor.id;
        ctx.roster
            .launch(id, ActorKind::Atom, Box::new(move || actor.run()))
    }

    fn transition(&mut self, next: AtomState) {
        trace!(actor_id = %self.id, from = ?self.state, to = ?next, "atom transition");
        self.state = next;
    }

    fn run(mut self) {
        if self.slot.is_none() {
            self.slot = Some(AtomSlot::acquire(&self.ctx.stats));
        }
        self.ctx.stats.mark_initialized();
        self.transition(AtomState::WaitingForRun);

        if self.ctx.wait_for_run() {
            self.transition(AtomState::Active);
            self.react();
        }
        self.terminate();
    }

    fn react(&mut self) {
        let poll = self.ctx.config.poll_interval();
        let id = self.id;
        while self.ctx.stats.is_running() {
            match self
                .ctx
                .channel
                .try_receive(poll, |request| request.addressed_to(id))
            {
                Ok(Some(request)) => {
                    if let Step::Exit = self.on_split_request(request) {
                        return;
                    }
                }
                Ok(None) => {}
                Err(ChannelError::Closed) => return,
                Err(err) => {
                    debug!(actor_id = %id, error = %err, "unexpected channel error");
                    return;
                }
            }
        }
    }

    fn on_split_request(&mut self, request: SplitRequest) -> Step {
        let min = self.ctx.config.min_atomic_number;
        match fission(self.atomic_number, min) {
            Fission::Waste => {
                self.transition(AtomState::Waste);
                self.slot = None;
                self.ctx.stats.record_waste();
                debug!(
                    actor_id = %self.id,
                    atomic_number = self.atomic_number,
                    "atom became waste"
                );
                Step::Exit
            }
            Fission::Split { keep, emit, energy } => {
                self.transition(AtomState::Splitting);
                let slot = AtomSlot::acquire(&self.ctx.stats);
                match Self::spawn_counted(&self.ctx, emit, slot) {
                    Ok(child) => {
                        self.ctx.stats.record_split(energy);
                        debug!(
                            actor_id = %self.id,
                            child_id = %child,
                            parent = self.atomic_number,
                            keep,
                            emit,
                            energy,
                            payload = request.payload,
                            "atom split"
                        );
                        self.atomic_number = keep;
                        self.transition(AtomState::Active);
                        Step::Continue
                    }
                    Err(SpawnError::ShuttingDown) => Step::Exit,
                    Err(err) => {
                        if self
                            .ctx
                            .stats
                            .set_termination_cause_if_unset(TerminationCause::Meltdown)
                        {
                            error!(actor_id = %self.id, error = %err, "split failed, meltdown");
                        }
                        Step::Exit
                    }
                }
            }
        }
    }

    fn terminate(mut self) {
        self.transition(AtomState::Terminated);
        self.slot = None;
        trace!(actor_id = %self.id, atomic_number = self.atomic_number, "atom exited");
    }
}

/// Random atomic number in `[1, max]`.
pub fn random_atomic_number(rng: &mut impl rand::Rng, max: u32) -> u32 {
    rng.random_range(1..=max.max(1))
}

/// Launches `count` atoms with random atomic numbers, stopping at the first
/// spawn failure.
pub fn seed_atoms(
    ctx: &ActorContext,
    rng: &mut impl rand::Rng,
    count: u32,
) -> Result<Vec<ActorId>, SpawnError> {
    let max = ctx.config.max_atomic_number;
    (0..count)
        .map(|_| AtomActor::spawn(ctx, random_atomic_number(rng, max)))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::channel::{SplitChannel, Target};
    use crate::config::SimulationConfig;
    use crate::roster::{CappedSpawner, Roster, ThreadSpawner};
    use crate::stats::StatisticsStore;

    fn running_context(min_atomic_number: u32) -> ActorContext {
        let ctx = ActorContext {
            config: Arc::new(SimulationConfig {
                min_atomic_number,
                poll_interval_ms: 2,
                ..SimulationConfig::default()
            }),
            stats: Arc::new(StatisticsStore::new(0)),
            channel: Arc::new(SplitChannel::bounded(64).unwrap()),
            roster: Arc::new(Roster::new(Arc::new(ThreadSpawner::default()))),
        };
        assert!(ctx.stats.set_running(true));
        ctx
    }

    fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !check() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn shut_down(ctx: &ActorContext) {
        ctx.stats.set_running(false);
        ctx.roster.seal();
        ctx.channel.close();
        let remaining = ctx
            .roster
            .reap_until(Instant::now() + Duration::from_secs(5), Duration::from_millis(2));
        assert_eq!(remaining, 0);
    }

    #[test]
    fn even_split_of_twelve() {
        assert_eq!(
            fission(12, 5),
            Fission::Split {
                keep: 6,
                emit: 6,
                energy: 30
            }
        );
    }

    #[test]
    fn odd_split_of_seven() {
        assert_eq!(
            fission(7, 5),
            Fission::Split {
                keep: 3,
                emit: 4,
                energy: 8
            }
        );
    }

    #[test]
    fn at_or_below_minimum_is_waste() {
        assert_eq!(fission(5, 5), Fission::Waste);
        assert_eq!(fission(1, 5), Fission::Waste);
    }

    #[test]
    fn single_nucleon_is_waste_even_without_a_minimum() {
        assert_eq!(fission(1, 0), Fission::Waste);
        assert_eq!(fission(0, 0), Fission::Waste);
        assert_eq!(
            fission(2, 0),
            Fission::Split {
                keep: 1,
                emit: 1,
                energy: 0
            }
        );
    }

    #[test]
    fn random_numbers_stay_in_range() {
        let mut rng = rand::rng();
        for _ in 0..1_000 {
            let n = random_atomic_number(&mut rng, 7);
            assert!((1..=7).contains(&n));
        }
        assert_eq!(random_atomic_number(&mut rng, 1), 1);
    }

    #[test]
    fn atom_at_minimum_becomes_waste() {
        let ctx = running_context(5);
        AtomActor::spawn(&ctx, 5).unwrap();
        wait_until("atom registration", || ctx.stats.num_atoms() == 1);

        ctx.channel.send(Target::Any, 0).unwrap();
        wait_until("waste", || ctx.stats.snapshot().total.waste == 1);
        wait_until("atom exit", || ctx.stats.num_atoms() == 0);

        let snapshot = ctx.stats.snapshot();
        assert_eq!(snapshot.total.splits, 0);
        assert_eq!(snapshot.interval.waste, 1);
        shut_down(&ctx);
    }

    #[test]
    fn split_spawns_a_counted_child() {
        let ctx = running_context(5);
        AtomActor::spawn(&ctx, 12).unwrap();
        wait_until("atom registration", || ctx.stats.num_atoms() == 1);

        ctx.channel.send(Target::Any, 0).unwrap();
        wait_until("split", || ctx.stats.snapshot().total.splits == 1);

        let snapshot = ctx.stats.snapshot();
        assert_eq!(snapshot.total.energy_produced, 30);
        assert_eq!(snapshot.current_energy, 30);
        assert_eq!(snapshot.num_atoms, 2);

        shut_down(&ctx);
        assert_eq!(ctx.stats.num_atoms(), 0);
    }

    #[test]
    fn atom_leaves_when_the_run_stops() {
        let ctx = running_context(5);
        AtomActor::spawn(&ctx, 40).unwrap();
        wait_until("atom registration", || ctx.stats.num_atoms() == 1);

        ctx.stats.set_running(false);
        wait_until("atom exit", || ctx.stats.num_atoms() == 0);
        shut_down(&ctx);
    }

    #[test]
    fn failed_child_spawn_is_a_meltdown() {
        let mut ctx = running_context(5);
        // The atom itself takes the only slot, so its child cannot start.
        ctx.roster = Arc::new(Roster::new(Arc::new(CappedSpawner::new(
            ThreadSpawner::default(),
            1,
        ))));
        AtomActor::spawn(&ctx, 12).unwrap();
        wait_until("atom registration", || ctx.stats.num_atoms() == 1);

        ctx.channel.send(Target::Any, 0).unwrap();
        wait_until("meltdown", || !ctx.stats.is_running());

        assert_eq!(ctx.stats.termination_cause(), TerminationCause::Meltdown);
        assert_eq!(ctx.stats.snapshot().total.splits, 0);
        shut_down(&ctx);
        assert_eq!(ctx.stats.num_atoms(), 0);
    }
}
