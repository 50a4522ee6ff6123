//! AXI4-Lite master wired to an AXI4-Lite slave.
//!
//! [`LiteBench`] owns one [`Simulator`] with an [`AxiLiteMaster`] and an
//! [`AxiLiteSlave`] sharing a single bus, and offers blocking helpers that
//! submit an operation and step the clock until it completes. The cycle
//! budget per operation comes from [`Config::cycle_limit`]; running out of
//! it is reported as [`SimError::CycleLimit`](crate::sim::SimError).
//!
//! # Example
//!
//! ```
//! use axi_emu::config::Config;
//! use axi_emu::testing::LiteBench;
//!
//! let mut bench = LiteBench::new(&Config::default()).unwrap();
//! bench.write(0x40, 0xCAFE_F00D).unwrap();
//! assert_eq!(bench.read(0x40).unwrap().to_u64(), 0xCAFE_F00D);
//! ```

use crate::axi::{AxiLiteBus, AxiLiteMaster, AxiLiteSlave, OpId, ReadRequest, Response, WriteRequest};
use crate::config::Config;
use crate::error::{AxiError, AxiResult};
use crate::memory::Memory;
use crate::sim::{BitVector, Simulator};

/// Signal prefix of the bench bus.
pub const BUS_PREFIX: &str = "s_axil";

/// Master and slave on one AXI4-Lite bus.
pub struct LiteBench {
    pub sim: Simulator,
    pub bus: AxiLiteBus,
    pub master: AxiLiteMaster,
    pub slave: AxiLiteSlave,
    cycle_limit: u64,
}

impl LiteBench {
    /// Bench with a zeroed memory of `config.memory_size()` bytes.
    pub fn new(config: &Config) -> AxiResult<Self> {
        Self::with_memory(config, Memory::new(config.memory_size()))
    }

    /// Bench over a preloaded memory image.
    pub fn with_memory(config: &Config, memory: Memory) -> AxiResult<Self> {
        let mut sim = Simulator::new();
        let bus = AxiLiteBus::new(sim.signals_mut(), BUS_PREFIX, config.address_width(), config.data_width())?;
        let slave = AxiLiteSlave::new(&mut sim, BUS_PREFIX, bus, memory, config.big_endian())?;
        let master = AxiLiteMaster::new(&mut sim, "m_axil", bus);
        Ok(Self {
            sim,
            bus,
            master,
            slave,
            cycle_limit: config.cycle_limit(),
        })
    }

    /// Cycle budget per operation.
    pub fn cycle_limit(&self) -> u64 {
        self.cycle_limit
    }

    /// Full-strobe write, blocking until the response.
    pub fn write(&mut self, address: u64, value: u64) -> AxiResult<Response> {
        self.write_with(WriteRequest::new(address, value))
    }

    /// Write with explicit options, blocking until the response.
    pub fn write_with(&mut self, request: WriteRequest) -> AxiResult<Response> {
        let op = self.master.write_with(&mut self.sim, request);
        self.wait(op)?;
        match self.master.take_write_result(op) {
            Some(result) => result,
            None => Err(AxiError::Pending(op.raw())),
        }
    }

    /// Read, blocking until the data arrives.
    pub fn read(&mut self, address: u64) -> AxiResult<BitVector> {
        self.read_with(ReadRequest::new(address))
    }

    /// Read with explicit options.
    pub fn read_with(&mut self, request: ReadRequest) -> AxiResult<BitVector> {
        let op = self.master.read_with(&mut self.sim, request);
        self.wait(op)?;
        match self.master.take_read_result(op) {
            Some(result) => result,
            None => Err(AxiError::Pending(op.raw())),
        }
    }

    /// Step until `op` has a result. Returns the cycles it took.
    pub fn wait(&mut self, op: OpId) -> AxiResult<u64> {
        let master = &self.master;
        Ok(self.sim.run_until(self.cycle_limit, |_| master.is_done(op))?)
    }

    /// Step until every operation in `ops` has a result.
    pub fn wait_all(&mut self, ops: &[OpId]) -> AxiResult<u64> {
        let master = &self.master;
        Ok(self
            .sim
            .run_until(self.cycle_limit, |_| ops.iter().all(|op| master.is_done(*op)))?)
    }
}
