//! Harnesses for driving the agents from tests and the demo binary.
//!
//! - [`LiteBench`]: an AXI4-Lite master and slave on one bus, with blocking
//!   write/read helpers.
//! - [`BurstDriver`]: a one-shot AXI4 burst initiator for the burst slave.
//! - [`SignalRecorder`]: samples signals in every read-only window for
//!   timing assertions.

pub mod bench;
pub mod burst_driver;
pub mod recorder;

pub use bench::LiteBench;
pub use burst_driver::{BurstDriver, BurstRequest, ReadBeat};
pub use recorder::{Sample, SignalRecorder};
