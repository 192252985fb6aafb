//! Actor threads: identity, spawning and reaping.
//!
//! Every actor runs on its own named OS thread. The [`Roster`] keeps the join
//! handles so the reactor can reap finished actors during the run and account
//! for stragglers at teardown.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::channel::SplitChannel;
use crate::config::SimulationConfig;
use crate::error::SpawnError;
use crate::stats::{RunPhase, StatisticsStore};

static NEXT_ACTOR_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(u64);

impl ActorId {
    pub fn next() -> Self {
        Self(NEXT_ACTOR_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorKind {
    Atom,
    Activator,
    Feeder,
}

impl ActorKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Atom => "atom",
            Self::Activator => "activator",
            Self::Feeder => "feeder",
        }
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub type ActorBody = Box<dyn FnOnce() + Send + 'static>;

/// Brings an actor body up on a thread of its own.
///
/// On failure the body is dropped without running, which releases anything it
/// captured.
pub trait Spawner: Send + Sync {
    fn spawn(
        &self,
        id: ActorId,
        kind: ActorKind,
        body: ActorBody,
    ) -> Result<JoinHandle<()>, SpawnError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

impl Spawner for ThreadSpawner {
    fn spawn(
        &self,
        id: ActorId,
        kind: ActorKind,
        body: ActorBody,
    ) -> Result<JoinHandle<()>, SpawnError> {
        thread::Builder::new()
            .name(format!("{}-{}", kind.label(), id.raw()))
            .spawn(body)
            .map_err(|source| SpawnError::Os { kind, source })
    }
}

/// Refuses spawns once `limit` actors spawned through it are alive at the
/// same time, the way a process table runs out of slots.
pub struct CappedSpawner<S> {
    inner: S,
    limit: usize,
    live: Arc<AtomicUsize>,
}

struct LiveSlot(Arc<AtomicUsize>);

impl Drop for LiveSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<S: Spawner> CappedSpawner<S> {
    pub fn new(inner: S, limit: usize) -> Self {
        Self {
            inner,
            limit,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

impl<S: Spawner> Spawner for CappedSpawner<S> {
    fn spawn(
        &self,
        id: ActorId,
        kind: ActorKind,
        body: ActorBody,
    ) -> Result<JoinHandle<()>, SpawnError> {
        let reserved = self
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < self.limit).then_some(live + 1)
            });
        if reserved.is_err() {
            return Err(SpawnError::LimitReached { limit: self.limit });
        }

        let slot = LiveSlot(Arc::clone(&self.live));
        self.inner.spawn(
            id,
            kind,
            Box::new(move || {
                let _slot = slot;
                body();
            }),
        )
    }
}

struct Member {
    id: ActorId,
    kind: ActorKind,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Members {
    list: Vec<Member>,
    sealed: bool,
}

/// Join handles of every actor launched during a run.
pub struct Roster {
    spawner: Arc<dyn Spawner>,
    members: Mutex<Members>,
}

impl Roster {
    pub fn new(spawner: Arc<dyn Spawner>) -> Self {
        Self {
            spawner,
            members: Mutex::new(Members::default()),
        }
    }

    /// Spawns `body` and tracks its thread. Fails once the roster is sealed.
    pub fn launch(
        &self,
        id: ActorId,
        kind: ActorKind,
        body: ActorBody,
    ) -> Result<ActorId, SpawnError> {
        // Held across the spawn so nothing slips in after `seal`.
        let mut members = self.members.lock();
        if members.sealed {
            return Err(SpawnError::ShuttingDown);
        }
        let handle = self.spawner.spawn(id, kind, body)?;
        members.list.push(Member { id, kind, handle });
        debug!(actor_id = %id, kind = %kind, "actor launched");
        Ok(id)
    }

    /// Stops accepting launches.
    pub fn seal(&self) {
        self.members.lock().sealed = true;
    }

    /// Number of launched actors not yet reaped.
    pub fn tracked(&self) -> usize {
        self.members.lock().list.len()
    }

    /// Joins every actor whose thread has already returned.
    pub fn reap_finished(&self) -> usize {
        let finished: Vec<Member> = {
            let mut members = self.members.lock();
            let (finished, alive) = members
                .list
                .drain(..)
                .partition(|member| member.handle.is_finished());
            members.list = alive;
            finished
        };

        let reaped = finished.len();
        for member in finished {
            if member.handle.join().is_err() {
                warn!(actor_id = %member.id, kind = %member.kind, "actor panicked");
            }
        }
        reaped
    }

    /// Reaps until nothing is left or `deadline` passes, checking every
    /// `poll`. Returns how many actors are still running.
    pub fn reap_until(&self, deadline: Instant, poll: Duration) -> usize {
        loop {
            self.reap_finished();
            let remaining = self.tracked();
            if remaining == 0 || Instant::now() >= deadline {
                return remaining;
            }
            thread::sleep(poll);
        }
    }

    /// Gives up on whatever is still running. The threads are detached and
    /// left to exit on their own.
    pub fn detach_remaining(&self) -> usize {
        let stragglers: Vec<Member> = self.members.lock().list.drain(..).collect();
        for member in &stragglers {
            warn!(actor_id = %member.id, kind = %member.kind, "detaching straggler");
        }
        stragglers.len()
    }
}

/// Everything an actor needs: the shared store, the split channel, the roster
/// for spawning further actors, and the run configuration.
#[derive(Clone)]
pub struct ActorContext {
    pub config: Arc<SimulationConfig>,
    pub stats: Arc<StatisticsStore>,
    pub channel: Arc<SplitChannel>,
    pub roster: Arc<Roster>,
}

impl ActorContext {
    /// Per-actor half of the startup barrier. Polls until the run starts
    /// (`true`) or is stopped before starting (`false`).
    pub fn wait_for_run(&self) -> bool {
        let poll = self.config.poll_interval();
        loop {
            match self.stats.phase() {
                RunPhase::Running => return true,
                RunPhase::Stopped => return false,
                RunPhase::Pending => thread::sleep(poll),
            }
        }
    }

    /// Sleeps for `period` in poll-sized slices. Returns `false` as soon as
    /// the run is no longer running.
    pub fn pause(&self, period: Duration) -> bool {
        let poll = self.config.poll_interval();
        let deadline = Instant::now() + period;
        loop {
            if !self.stats.is_running() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(poll.min(deadline - now));
        }
    }
}
