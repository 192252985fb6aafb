//! Shared statistics store.
//!
//! Every actor holds an `Arc<StatisticsStore>` and mutates it only through the
//! named operations below. Fields are split into two lock groups: run state
//! (counters, energy, barrier, run phase, termination cause) and the live atom
//! count. Each operation takes exactly one of the two locks, applies its update
//! and releases it, so there is no cross-group ordering.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Why the run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TerminationCause {
    /// No cause recorded. After a stop this means an external interrupt.
    #[default]
    None,
    Timeout,
    Explode,
    Blackout,
    Meltdown,
}

impl TerminationCause {
    pub fn is_set(self) -> bool {
        self != Self::None
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::None => "UNCLASSIFIED - stopped without a recorded cause",
            Self::Timeout => "TIMEOUT - simulation duration reached",
            Self::Explode => "EXPLODE - energy threshold exceeded",
            Self::Blackout => "BLACKOUT - insufficient energy",
            Self::Meltdown => "MELTDOWN - actor spawn failure",
        }
    }
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::None => "NONE",
            Self::Timeout => "TIMEOUT",
            Self::Explode => "EXPLODE",
            Self::Blackout => "BLACKOUT",
            Self::Meltdown => "MELTDOWN",
        };
        f.write_str(label)
    }
}

/// One-shot run flag: `Pending -> Running -> Stopped`, or `Pending -> Stopped`
/// when startup is aborted. Nothing leaves `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunPhase {
    #[default]
    Pending,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counters {
    pub activations: u64,
    pub splits: u64,
    pub energy_produced: i64,
    pub energy_consumed: i64,
    pub waste: u64,
}

impl Counters {
    pub fn net_energy(&self) -> i64 {
        self.energy_produced - self.energy_consumed
    }
}

/// Point-in-time copy of the whole store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub total: Counters,
    pub interval: Counters,
    pub current_energy: i64,
    pub phase: RunPhase,
    pub cause: TerminationCause,
    pub init_count: u32,
    pub init_target: u32,
    pub num_atoms: u64,
}

impl StatisticsSnapshot {
    pub fn is_running(&self) -> bool {
        self.phase == RunPhase::Running
    }
}

impl fmt::Display for StatisticsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (total, interval) = (&self.total, &self.interval);
        writeln!(
            f,
            "Activations:     {} (last interval: {})",
            total.activations, interval.activations
        )?;
        writeln!(
            f,
            "Splits:          {} (last interval: {})",
            total.splits, interval.splits
        )?;
        writeln!(
            f,
            "Energy produced: {} (last interval: {})",
            total.energy_produced, interval.energy_produced
        )?;
        writeln!(
            f,
            "Energy consumed: {} (last interval: {})",
            total.energy_consumed, interval.energy_consumed
        )?;
        writeln!(f, "Current energy:  {}", self.current_energy)?;
        writeln!(
            f,
            "Waste:           {} (last interval: {})",
            total.waste, interval.waste
        )?;
        write!(f, "Active atoms:    {}", self.num_atoms)
    }
}

#[derive(Debug, Default)]
struct RunState {
    total: Counters,
    interval: Counters,
    current_energy: i64,
    phase: RunPhase,
    cause: TerminationCause,
    init_count: u32,
    init_target: u32,
}

impl RunState {
    fn produce(&mut self, energy: i64) {
        self.total.energy_produced += energy;
        self.interval.energy_produced += energy;
        self.current_energy += energy;
    }

    fn consume(&mut self, energy: i64) {
        self.total.energy_consumed += energy;
        self.interval.energy_consumed += energy;
        self.current_energy -= energy;
    }

    /// First cause wins, and only while the run has not been stopped already.
    fn conclude(&mut self, cause: TerminationCause) -> bool {
        if !cause.is_set() || self.cause.is_set() || self.phase == RunPhase::Stopped {
            return false;
        }
        self.cause = cause;
        self.phase = RunPhase::Stopped;
        true
    }
}

#[derive(Debug, Default)]
struct AtomCount {
    live: u64,
    created: u64,
}

#[derive(Debug)]
pub struct StatisticsStore {
    run: Mutex<RunState>,
    atoms: Mutex<AtomCount>,
}

impl StatisticsStore {
    /// Creates a zeroed store in the `Pending` phase. The run cannot start
    /// until `init_target` actors have called [`mark_initialized`].
    ///
    /// [`mark_initialized`]: StatisticsStore::mark_initialized
    pub fn new(init_target: u32) -> Self {
        Self {
            run: Mutex::new(RunState {
                init_target,
                ..RunState::default()
            }),
            atoms: Mutex::new(AtomCount::default()),
        }
    }

    pub fn record_activation(&self) {
        let mut run = self.run.lock();
        run.total.activations += 1;
        run.interval.activations += 1;
    }

    /// Counts one split and credits its energy yield.
    pub fn record_split(&self, energy: i64) {
        let mut run = self.run.lock();
        run.total.splits += 1;
        run.interval.splits += 1;
        run.produce(energy);
    }

    pub fn record_waste(&self) {
        let mut run = self.run.lock();
        run.total.waste += 1;
        run.interval.waste += 1;
    }

    /// Positive deltas count as produced energy, negative ones as consumed.
    pub fn adjust_energy(&self, delta: i64) {
        let mut run = self.run.lock();
        if delta >= 0 {
            run.produce(delta);
        } else {
            run.consume(delta.saturating_neg());
        }
    }

    /// Draws `demand` from the pool. A negative balance ends the run with
    /// `Blackout` unless another cause got there first. Returns the balance.
    pub fn consume_energy(&self, demand: i64) -> i64 {
        let mut run = self.run.lock();
        run.consume(demand);
        if run.current_energy < 0 {
            run.conclude(TerminationCause::Blackout);
        }
        run.current_energy
    }

    pub fn increment_atom_count(&self) {
        let mut atoms = self.atoms.lock();
        atoms.live += 1;
        atoms.created += 1;
    }

    pub fn decrement_atom_count(&self) {
        let mut atoms = self.atoms.lock();
        debug_assert!(atoms.live > 0, "atom count released more often than acquired");
        atoms.live = atoms.live.saturating_sub(1);
    }

    pub fn num_atoms(&self) -> u64 {
        self.atoms.lock().live
    }

    pub fn atoms_created(&self) -> u64 {
        self.atoms.lock().created
    }

    /// Barrier check-in. Returns the updated ready count.
    pub fn mark_initialized(&self) -> u32 {
        let mut run = self.run.lock();
        run.init_count = run.init_count.saturating_add(1);
        run.init_count
    }

    /// Returns `(init_count, init_target)`.
    pub fn barrier(&self) -> (u32, u32) {
        let run = self.run.lock();
        (run.init_count, run.init_target)
    }

    pub fn phase(&self) -> RunPhase {
        self.run.lock().phase
    }

    pub fn is_running(&self) -> bool {
        self.phase() == RunPhase::Running
    }

    /// `true` starts a pending run once the barrier is full; `false` stops the
    /// run for good without recording a cause. Returns whether the phase
    /// changed, so repeated calls are harmless.
    pub fn set_running(&self, running: bool) -> bool {
        let mut run = self.run.lock();
        match (running, run.phase) {
            (true, RunPhase::Pending) if run.init_count >= run.init_target => {
                run.phase = RunPhase::Running;
                true
            }
            (false, RunPhase::Pending | RunPhase::Running) => {
                run.phase = RunPhase::Stopped;
                true
            }
            _ => false,
        }
    }

    /// Records `cause` and stops the run in one step, if no cause has been
    /// recorded and the run has not already been stopped. Returns whether this
    /// call won.
    pub fn set_termination_cause_if_unset(&self, cause: TerminationCause) -> bool {
        self.run.lock().conclude(cause)
    }

    /// Runs `policy` against the running totals and, if it names a cause,
    /// records it as in [`set_termination_cause_if_unset`]. Any recorded cause
    /// also forces the run flag off. Returns the cause now on record.
    ///
    /// [`set_termination_cause_if_unset`]: StatisticsStore::set_termination_cause_if_unset
    pub fn evaluate_termination(
        &self,
        policy: impl FnOnce(&Counters) -> Option<TerminationCause>,
    ) -> TerminationCause {
        let mut run = self.run.lock();
        if let Some(cause) = policy(&run.total) {
            run.conclude(cause);
        }
        if run.cause.is_set() {
            run.phase = RunPhase::Stopped;
        }
        run.cause
    }

    pub fn termination_cause(&self) -> TerminationCause {
        self.run.lock().cause
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let mut snapshot = {
            let run = self.run.lock();
            Self::copy_run(&run)
        };
        snapshot.num_atoms = self.num_atoms();
        snapshot
    }

    /// Copies everything and zeroes the interval counters under the same lock,
    /// so no update can land between the read and the reset.
    pub fn take_interval(&self) -> StatisticsSnapshot {
        let mut snapshot = {
            let mut run = self.run.lock();
            let snapshot = Self::copy_run(&run);
            run.interval = Counters::default();
            snapshot
        };
        snapshot.num_atoms = self.num_atoms();
        snapshot
    }

    fn copy_run(run: &RunState) -> StatisticsSnapshot {
        StatisticsSnapshot {
            total: run.total,
            interval: run.interval,
            current_energy: run.current_energy,
            phase: run.phase,
            cause: run.cause,
            init_count: run.init_count,
            init_target: run.init_target,
            num_atoms: 0,
        }
    }
}

/// One unit of `num_atoms`, released exactly once when dropped.
///
/// A splitting atom acquires the slot for its child before spawning it, so the
/// count already includes the child when control passes to it. If the spawn
/// fails the slot is dropped with the rejected closure.
#[derive(Debug)]
pub struct AtomSlot {
    store: Arc<StatisticsStore>,
}

impl AtomSlot {
    pub fn acquire(store: &Arc<StatisticsStore>) -> Self {
        store.increment_atom_count();
        Self {
            store: Arc::clone(store),
        }
    }
}

impl Drop for AtomSlot {
    fn drop(&mut self) {
        self.store.decrement_atom_count();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn started(store: &StatisticsStore) {
        let (_, target) = store.barrier();
        for _ in 0..target {
            store.mark_initialized();
        }
        assert!(store.set_running(true));
    }

    #[test]
    fn run_flag_waits_for_the_barrier() {
        let store = StatisticsStore::new(3);
        store.mark_initialized();
        store.mark_initialized();
        assert!(!store.set_running(true));
        assert_eq!(store.phase(), RunPhase::Pending);

        store.mark_initialized();
        assert!(store.set_running(true));
        assert!(store.is_running());
    }

    #[test]
    fn stopping_is_one_shot_and_idempotent() {
        let store = StatisticsStore::new(0);
        assert!(store.set_running(true));
        assert!(store.set_running(false));
        assert!(!store.set_running(false));
        assert!(!store.set_running(true));
        assert_eq!(store.phase(), RunPhase::Stopped);
        assert_eq!(store.termination_cause(), TerminationCause::None);
    }

    #[test]
    fn first_cause_wins() {
        let store = StatisticsStore::new(0);
        started(&store);

        assert!(store.set_termination_cause_if_unset(TerminationCause::Meltdown));
        assert!(!store.set_termination_cause_if_unset(TerminationCause::Timeout));
        assert_eq!(store.termination_cause(), TerminationCause::Meltdown);
        assert!(!store.is_running());
    }

    #[test]
    fn external_stop_blocks_later_causes() {
        let store = StatisticsStore::new(0);
        started(&store);
        store.set_running(false);

        assert!(!store.set_termination_cause_if_unset(TerminationCause::Meltdown));
        assert_eq!(store.termination_cause(), TerminationCause::None);
    }

    #[test]
    fn energy_bookkeeping_balances() {
        let store = StatisticsStore::new(0);
        store.record_split(30);
        store.record_split(8);
        store.adjust_energy(-10);
        store.adjust_energy(5);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.total.splits, 2);
        assert_eq!(snapshot.total.energy_produced, 43);
        assert_eq!(snapshot.total.energy_consumed, 10);
        assert_eq!(snapshot.current_energy, snapshot.total.net_energy());
    }

    #[test]
    fn most_negative_adjustment_saturates() {
        let store = StatisticsStore::new(0);
        store.adjust_energy(i64::MIN);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.total.energy_consumed, i64::MAX);
        assert_eq!(snapshot.total.energy_produced, 0);
        assert_eq!(snapshot.current_energy, -i64::MAX);
    }

    #[test]
    fn negative_balance_is_a_blackout() {
        let store = StatisticsStore::new(0);
        started(&store);
        store.record_split(40);

        assert_eq!(store.consume_energy(40), 0);
        assert!(store.is_running());

        assert_eq!(store.consume_energy(1), -1);
        assert_eq!(store.termination_cause(), TerminationCause::Blackout);
        assert!(!store.is_running());
    }

    #[test]
    fn take_interval_resets_only_interval_counters() {
        let store = StatisticsStore::new(0);
        store.record_activation();
        store.record_waste();
        store.record_split(12);

        let first = store.take_interval();
        assert_eq!(first.interval.activations, 1);
        assert_eq!(first.interval.waste, 1);
        assert_eq!(first.interval.energy_produced, 12);

        let second = store.take_interval();
        assert_eq!(second.interval, Counters::default());
        assert_eq!(second.total, first.total);
    }

    #[test]
    fn evaluate_termination_honors_existing_cause() {
        let store = StatisticsStore::new(0);
        started(&store);
        store.set_termination_cause_if_unset(TerminationCause::Meltdown);

        let cause = store.evaluate_termination(|_| Some(TerminationCause::Timeout));
        assert_eq!(cause, TerminationCause::Meltdown);
    }

    #[test]
    fn atom_slots_release_exactly_once() {
        let store = Arc::new(StatisticsStore::new(0));
        let first = AtomSlot::acquire(&store);
        let second = AtomSlot::acquire(&store);
        assert_eq!(store.num_atoms(), 2);

        drop(first);
        assert_eq!(store.num_atoms(), 1);
        drop(second);
        assert_eq!(store.num_atoms(), 0);
        assert_eq!(store.atoms_created(), 2);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "released more often than acquired")]
    fn double_release_is_caught() {
        let store = Arc::new(StatisticsStore::new(0));
        drop(AtomSlot::acquire(&store));
        store.decrement_atom_count();
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let store = Arc::new(StatisticsStore::new(0));
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        store.record_split(3);
                        store.record_activation();
                        let _slot = AtomSlot::acquire(&store);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.total.splits, 8_000);
        assert_eq!(snapshot.total.activations, 8_000);
        assert_eq!(snapshot.current_energy, 24_000);
        assert_eq!(snapshot.num_atoms, 0);
    }
}
