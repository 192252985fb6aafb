//! A chain reaction simulated with one OS thread per actor.
//!
//! Atoms split on request from the activator, the feeder keeps injecting new
//! atoms, and the supervisor draws energy every tick until the run times out,
//! explodes, blacks out or melts down.

pub mod activator;
pub mod atom;
pub mod channel;
pub mod config;
pub mod error;
pub mod feeder;
pub mod reactor;
pub mod report;
pub mod roster;
pub mod stats;
pub mod supervisor;

pub use config::SimulationConfig;
pub use error::{ReactorError, ReportError};
pub use reactor::{Reactor, StopHandle};
pub use report::{ConsoleSink, IntervalReport, ReportSink, RunReport};
pub use stats::{StatisticsSnapshot, TerminationCause};
