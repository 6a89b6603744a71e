//! Kernel Events - append-only observability log.
//!
//! Unlike the branching event DAG this crate is descended from, the
//! kernel's event log is strictly linear: `seq(i) = i`, no gaps, no forks.
//! Every state-changing action and every rejection appends exactly one
//! [`kernel_core::Event`].

mod builder;
mod log;

pub use builder::EventBuilder;
pub use log::{EventLog, EventLogExt, InMemoryEventLog};
