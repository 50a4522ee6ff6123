//! Crate-wide error types.
//!
//! Errors fall into three groups:
//! - **Protocol** failures: a completed transaction returned a non-OKAY
//!   response. Raised to the caller of the master operation, never retried.
//! - **Configuration** errors: invalid response codes, unsupported bus
//!   widths, undefined burst size encodings. Raised synchronously.
//! - Memory and simulation errors bubbled up from the collaborators.
//!
//! A stalled handshake is not an error: the waiting task simply stays
//! suspended.

use thiserror::Error;

use crate::axi::{Access, Response};
use crate::memory::MemoryError;
use crate::sim::SimError;

/// Invalid agent configuration or request geometry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Response codes are two bits wide.
    #[error("Valid response values range from 0b00 to 0b11, got {0}")]
    InvalidResponse(u64),

    /// AXI4-Lite data buses are 32 or 64 bits.
    #[error("Bus data width of {0} is not valid. AXI4-Lite protocol only supports bit widths of 32 or 64")]
    UnsupportedDataWidth(u32),

    /// AxSIZE encodings of 7 and above have no defined beat width.
    #[error("Burst size encoding {0} is undefined")]
    UndefinedBurstSize(u64),

    /// The requested beat does not fit on the data bus.
    #[error("Beat of {beat_bytes} bytes does not fit a {bus_bytes}-byte data bus")]
    BeatWiderThanBus { beat_bytes: usize, bus_bytes: usize },
}

/// Any failure surfaced by the bus agents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AxiError {
    /// A completed transaction carried a failing response code.
    #[error("{access} at address 0x{address:08x} failed with {}: {} ({code})", .access.response_signal(), .code.bits())]
    Protocol {
        access: Access,
        address: u64,
        code: Response,
    },

    /// A result was requested for an operation that has not completed.
    #[error("Operation {0} has no result yet")]
    Pending(u64),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Sim(#[from] SimError),
}

impl AxiError {
    /// Response code of a protocol failure.
    pub fn response(&self) -> Option<Response> {
        match self {
            Self::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result alias for agent operations.
pub type AxiResult<T> = Result<T, AxiError>;
