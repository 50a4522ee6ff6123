//! axi-emu library
//!
//! Cycle-stepped AXI4 and AXI4-Lite bus agents on a small cooperative
//! clocked simulator: an AXI4-Lite master, an AXI4-Lite slave and a
//! burst-capable AXI4 slave, each backed by a byte-addressable memory.

pub mod axi;
pub mod config;
pub mod error;
pub mod memory;
pub mod sim;
pub mod testing;
