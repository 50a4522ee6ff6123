//! AXI4 and AXI4-Lite bus agents.
//!
//! This module provides:
//! - [`AxiLiteMaster`]: issues single-beat reads and writes
//! - [`Axi4Slave`]: burst-capable slave over a [`Memory`](crate::memory::Memory) image
//! - [`AxiLiteSlave`]: single-beat slave with configurable response codes
//!
//! All agents are sets of [`Process`](crate::sim::Process) state machines
//! running on a [`Simulator`](crate::sim::Simulator). They drive signals at
//! the clock edge and decide only on values sampled in the read-only window.
//!
//! # Handshake Timing
//!
//! ```text
//!            edge N        read-only N        edge N+1
//! sender:    VALID <= 1    sees READY=1  ───► VALID <= 0 (or next beat)
//! receiver:  READY <= 1    sees VALID=1  ───► transfer accepted
//! ```
//!
//! A transfer happens when VALID and READY are both observed high in the
//! same read-only window. Both sides change their signals at the following
//! edge, so a transfer is never counted twice.

pub mod burst;
pub mod bus;
pub mod lite_master;
pub mod lite_slave;
pub mod slave;

pub use burst::{beat_range, bytes_in_beat, BurstGeometry};
pub use bus::{Axi4Bus, AxiLiteBus};
pub use lite_master::{AxiLiteMaster, OpId, ReadRequest, WriteRequest};
pub use lite_slave::{AddressLatch, AxiLiteSlave, DataLatch, WriteState};
pub use slave::Axi4Slave;

use std::fmt;

use crate::error::ConfigError;

/// Two-bit transaction response code (BRESP / RRESP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Response {
    /// Normal access success.
    #[default]
    Okay = 0,
    /// Exclusive access success.
    ExOkay = 1,
    /// Slave error.
    SlvErr = 2,
    /// Decode error.
    DecErr = 3,
}

impl Response {
    /// Decode a response code. Values above 3 are rejected.
    pub fn from_bits(bits: u64) -> Result<Self, ConfigError> {
        match bits {
            0 => Ok(Self::Okay),
            1 => Ok(Self::ExOkay),
            2 => Ok(Self::SlvErr),
            3 => Ok(Self::DecErr),
            other => Err(ConfigError::InvalidResponse(other)),
        }
    }

    /// Raw encoding.
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// True only for OKAY. Lite masters treat every other code as a failure.
    pub fn is_okay(self) -> bool {
        self == Self::Okay
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Okay => "OKAY",
            Self::ExOkay => "EXOKAY",
            Self::SlvErr => "SLVERR",
            Self::DecErr => "DECERR",
        };
        f.write_str(name)
    }
}

/// Burst address rule (AxBURST).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BurstType {
    /// Same address for every beat.
    Fixed,
    /// Address increments by the beat size.
    Incr,
    /// Incrementing burst that wraps at an aligned boundary.
    Wrap,
    /// Encoding 0b11.
    Reserved,
}

impl BurstType {
    /// Decode the two-bit AxBURST field.
    pub fn from_bits(bits: u64) -> Self {
        match bits & 0b11 {
            0 => Self::Fixed,
            1 => Self::Incr,
            2 => Self::Wrap,
            _ => Self::Reserved,
        }
    }

    /// Raw encoding.
    pub fn bits(self) -> u8 {
        match self {
            Self::Fixed => 0,
            Self::Incr => 1,
            Self::Wrap => 2,
            Self::Reserved => 3,
        }
    }
}

/// Direction of a transaction, used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Write,
    Read,
}

impl Access {
    /// Name of the response signal for this direction.
    pub fn response_signal(self) -> &'static str {
        match self {
            Self::Write => "BRESP",
            Self::Read => "RRESP",
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write => f.write_str("Write"),
            Self::Read => f.write_str("Read"),
        }
    }
}
