//! Addressed split-request queue.
//!
//! A single FIFO shared by every atom. Receivers pass a predicate and take the
//! first pending request it accepts, so each request is delivered at most once.
//! Waits are bounded: `try_receive` returns `Ok(None)` when nothing matching
//! arrives in time, which lets the caller re-check the run flag.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::roster::ActorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Any,
    Actor(ActorId),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Actor(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRequest {
    pub target: Target,
    pub payload: i64,
}

impl SplitRequest {
    pub fn addressed_to(&self, actor: ActorId) -> bool {
        match self.target {
            Target::Any => true,
            Target::Actor(id) => id == actor,
        }
    }
}

#[derive(Debug, Default)]
struct Queue {
    pending: VecDeque<SplitRequest>,
    closed: bool,
}

#[derive(Debug)]
pub struct SplitChannel {
    queue: Mutex<Queue>,
    arrivals: Condvar,
    capacity: usize,
}

impl SplitChannel {
    pub fn bounded(capacity: usize) -> Result<Self, ChannelError> {
        if capacity == 0 {
            return Err(ChannelError::ZeroCapacity);
        }
        Ok(Self {
            queue: Mutex::new(Queue {
                pending: VecDeque::with_capacity(capacity.min(1_024)),
                closed: false,
            }),
            arrivals: Condvar::new(),
            capacity,
        })
    }

    /// Enqueues without blocking. A full queue rejects the request.
    pub fn send(&self, target: Target, payload: i64) -> Result<(), ChannelError> {
        {
            let mut queue = self.queue.lock();
            if queue.closed {
                return Err(ChannelError::Closed);
            }
            if queue.pending.len() >= self.capacity {
                return Err(ChannelError::Full {
                    capacity: self.capacity,
                });
            }
            queue.pending.push_back(SplitRequest { target, payload });
        }
        // Receivers filter by target, so a single wake-up could land on one
        // that rejects the request.
        self.arrivals.notify_all();
        Ok(())
    }

    /// Takes the oldest pending request accepted by `accept`, waiting at most
    /// `wait` for one to arrive. Fails only once the channel is closed.
    pub fn try_receive(
        &self,
        wait: Duration,
        mut accept: impl FnMut(&SplitRequest) -> bool,
    ) -> Result<Option<SplitRequest>, ChannelError> {
        let deadline = Instant::now() + wait;
        let mut queue = self.queue.lock();
        loop {
            if queue.closed {
                return Err(ChannelError::Closed);
            }
            if let Some(index) = queue.pending.iter().position(&mut accept) {
                return Ok(queue.pending.remove(index));
            }
            if self.arrivals.wait_until(&mut queue, deadline).timed_out() {
                // One last look: a send may have raced the timeout.
                if queue.closed {
                    return Err(ChannelError::Closed);
                }
                let index = queue.pending.iter().position(&mut accept);
                return Ok(index.and_then(|index| queue.pending.remove(index)));
            }
        }
    }

    /// Rejects further traffic, drops anything pending and wakes every
    /// waiting receiver. Returns the number of discarded requests.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut queue = self.queue.lock();
            queue.closed = true;
            let discarded = queue.pending.len();
            queue.pending.clear();
            discarded
        };
        self.arrivals.notify_all();
        discarded
    }

    pub fn len(&self) -> usize {
        self.queue.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
