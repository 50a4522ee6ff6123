//! Clocked simulation kernel.
//!
//! This module provides the pieces the bus agents are built on:
//! - [`BitVector`]: fixed-width values with a byte-order attribute
//! - [`SignalTable`]: named wires with deferred (non-blocking) assignment
//! - [`Simulator`]: a single-threaded cooperative scheduler with two
//!   suspension points per cycle, the clock edge and the read-only window
//! - [`ChannelLock`]: a FIFO lock for serializing drivers of one channel
//!
//! # Architecture
//!
//! There are no threads. Every agent task is a [`Process`] state machine
//! that the [`Simulator`] resumes at the phase it asked to wait for.
//! Signal drives become visible only after the settle step that follows the
//! edge phase, so all read-only samplers of a cycle observe the same values.

pub mod lock;
pub mod scheduler;
pub mod signal;
pub mod value;

pub use lock::{ChannelLock, LockStats, Ticket};
pub use scheduler::{Phase, Process, ProcessId, SimContext, Simulator, Wait};
pub use signal::{SignalId, SignalTable};
pub use value::BitVector;

use thiserror::Error;

/// Simulation kernel errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// No signal with this name exists.
    #[error("Unknown signal '{0}'")]
    UnknownSignal(String),

    /// A signal with this name already exists.
    #[error("Signal '{0}' already exists")]
    DuplicateSignal(String),

    /// The harness cycle budget ran out before the awaited condition.
    #[error("Cycle limit of {limit} reached at cycle {cycle}")]
    CycleLimit { limit: u64, cycle: u64 },

    /// A lock was released by a ticket that does not own it.
    #[error("Lock '{lock}' is not held by ticket {ticket}")]
    LockNotHeld { lock: String, ticket: u64 },
}
