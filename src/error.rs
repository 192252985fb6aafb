use std::io;

use thiserror::Error;

use crate::roster::ActorKind;

/// Raised when an actor thread could not be brought up.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to spawn {kind} thread: {source}")]
    Os {
        kind: ActorKind,
        #[source]
        source: io::Error,
    },
    #[error("actor limit of {limit} live threads reached")]
    LimitReached { limit: usize },
    #[error("roster is sealed for shutdown")]
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("split channel is closed")]
    Closed,
    #[error("split channel is full ({capacity} pending requests)")]
    Full { capacity: usize },
    #[error("split channel capacity must be non-zero")]
    ZeroCapacity,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max atomic number must be at least 1")]
    ZeroMaxAtomicNumber,
    #[error("{0} must be non-zero")]
    ZeroPeriod(&'static str),
    #[error("split queue capacity must be non-zero")]
    ZeroQueueCapacity,
    #[error("energy demand must not be negative (got {0})")]
    NegativeDemand(i64),
    #[error("actor limit must be non-zero")]
    ZeroActorLimit,
}

#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("could not create {resource}: {reason}")]
    StartupResource {
        resource: &'static str,
        reason: String,
    },
    #[error("startup spawn failed: {0}")]
    Spawn(#[from] SpawnError),
    #[error("startup barrier timed out after {waited_ms} ms ({ready}/{target} actors ready)")]
    BarrierTimeout {
        ready: u32,
        target: u32,
        waited_ms: u64,
    },
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("report encoding failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("report decoding failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}
