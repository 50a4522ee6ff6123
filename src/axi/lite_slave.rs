//! AXI4-Lite slave backed by a [`Memory`] image.
//!
//! Three perpetual processes serve the bus:
//!
//! | Process | Channels  | Ready while                               |
//! |---------|-----------|-------------------------------------------|
//! | address | AW        | no address is latched                     |
//! | data    | W, B      | no data is latched and no response is up  |
//! | read    | AR, R     | no read response is being offered         |
//!
//! The address and data processes share one [`WriteState`]. A write
//! completes on whichever transition supplies the second half of the
//! address/data pair, so the address may arrive before, after, or in the
//! same cycle as the data. Only one write is ever outstanding: AWREADY stays
//! low from the moment an address is latched until the response has been
//! accepted.
//!
//! ```text
//!            AW             W
//!   Idle ──────► AddressLatched ──────┐
//!     │                               ▼
//!     │ W              AW        Responding ──BREADY──► Idle
//!     └────► DataLatched ─────────────┘
//! ```

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::{AxiLiteBus, Response};
use crate::error::{AxiError, ConfigError};
use crate::memory::Memory;
use crate::sim::{BitVector, Phase, Process, SimContext, Simulator, Wait};

/// Latched write address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressLatch {
    pub address: u64,
    pub prot: u64,
}

/// Latched write data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLatch {
    pub data: u64,
    pub strobe: u64,
}

/// Progress of the single outstanding write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteState {
    #[default]
    Idle,
    /// Address accepted, waiting for data.
    AddressLatched(AddressLatch),
    /// Data accepted, waiting for an address.
    DataLatched(DataLatch),
    /// Memory updated; BVALID is offered until BREADY.
    Responding { address: u64, code: Response },
}

impl WriteState {
    /// Whether a new write address may be accepted.
    pub fn accepts_address(&self) -> bool {
        matches!(self, Self::Idle | Self::DataLatched(_))
    }

    /// Whether new write data may be accepted.
    pub fn accepts_data(&self) -> bool {
        matches!(self, Self::Idle | Self::AddressLatched(_))
    }
}

/// Transaction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiteSlaveStats {
    pub writes: u64,
    pub reads: u64,
    /// Edges on which AWREADY was held low by an outstanding write.
    pub address_stalls: u64,
}

struct SlaveShared {
    name: String,
    bus: AxiLiteBus,
    memory: Memory,
    big_endian: bool,
    data_bytes: usize,
    wr_response: Response,
    rd_response: Response,
    state: WriteState,
    stats: LiteSlaveStats,
}

impl SlaveShared {
    fn accept_address(&mut self, latch: AddressLatch) -> Result<(), AxiError> {
        log::debug!("{}: write address 0x{:08x} prot={}", self.name, latch.address, latch.prot);
        match self.state {
            WriteState::Idle => {
                self.state = WriteState::AddressLatched(latch);
                Ok(())
            }
            WriteState::DataLatched(data) => self.complete_write(latch, data),
            state => {
                log::warn!("{}: write address ignored in state {:?}", self.name, state);
                Ok(())
            }
        }
    }

    fn accept_data(&mut self, data: DataLatch) -> Result<(), AxiError> {
        log::debug!("{}: write data 0x{:x} strobe=0b{:b}", self.name, data.data, data.strobe);
        match self.state {
            WriteState::Idle => {
                self.state = WriteState::DataLatched(data);
                Ok(())
            }
            WriteState::AddressLatched(address) => self.complete_write(address, data),
            state => {
                log::warn!("{}: write data ignored in state {:?}", self.name, state);
                Ok(())
            }
        }
    }

    /// Apply the strobe-masked write and start responding.
    fn complete_write(&mut self, address: AddressLatch, data: DataLatch) -> Result<(), AxiError> {
        let mut image = [0u8; 8];
        let image = &mut image[..self.data_bytes];
        match (self.big_endian, self.data_bytes) {
            (false, 4) => LittleEndian::write_u32(image, data.data as u32),
            (true, 4) => BigEndian::write_u32(image, data.data as u32),
            (false, _) => LittleEndian::write_u64(image, data.data),
            (true, _) => BigEndian::write_u64(image, data.data),
        }
        let written = self.memory.write_masked(address.address, image, data.strobe)?;
        log::trace!("{}: {} bytes written at 0x{:08x}", self.name, written, address.address);
        self.stats.writes += 1;
        self.state = WriteState::Responding {
            address: address.address,
            code: self.wr_response,
        };
        Ok(())
    }

    fn finish_write(&mut self) {
        if let WriteState::Responding { address, code } = self.state {
            log::debug!("{}: write 0x{:08x} responded {}", self.name, address, code);
            self.state = WriteState::Idle;
        }
    }

    fn fetch(&mut self, address: u64) -> Result<BitVector, AxiError> {
        let value = match self.data_bytes {
            4 => self.memory.read_u32(address, self.big_endian)? as u64,
            _ => self.memory.read_u64(address, self.big_endian)?,
        };
        self.stats.reads += 1;
        Ok(BitVector::from_u64(value, self.bus.data_width()).with_endianness(self.big_endian))
    }
}

/// AXI4-Lite slave agent.
///
/// Cloning yields another handle to the same slave.
#[derive(Clone)]
pub struct AxiLiteSlave {
    shared: Rc<RefCell<SlaveShared>>,
}

impl AxiLiteSlave {
    /// Attach a slave to `bus` and start its processes.
    ///
    /// The data bus must be 32 or 64 bits wide; nothing is spawned or
    /// driven otherwise.
    pub fn new(
        sim: &mut Simulator,
        name: &str,
        bus: AxiLiteBus,
        memory: Memory,
        big_endian: bool,
    ) -> Result<Self, ConfigError> {
        let data_width = bus.data_width();
        if data_width != 32 && data_width != 64 {
            return Err(ConfigError::UnsupportedDataWidth(data_width));
        }

        let signals = sim.signals_mut();
        signals.set_immediate_u64(bus.awready, 1);
        signals.set_immediate_u64(bus.wready, 1);
        signals.set_immediate_u64(bus.arready, 1);
        signals.set_immediate_u64(bus.bvalid, 0);
        signals.set_immediate_u64(bus.rvalid, 0);

        let shared = Rc::new(RefCell::new(SlaveShared {
            name: name.to_string(),
            bus,
            memory,
            big_endian,
            data_bytes: (data_width / 8) as usize,
            wr_response: Response::Okay,
            rd_response: Response::Okay,
            state: WriteState::Idle,
            stats: LiteSlaveStats::default(),
        }));

        // Address before data: in a cycle where both arrive, the data
        // process sees the address already latched.
        sim.spawn(AddressTask {
            name: format!("{} aw", name),
            shared: shared.clone(),
        });
        sim.spawn(DataTask {
            name: format!("{} w", name),
            shared: shared.clone(),
            responding: false,
        });
        sim.spawn(ReadTask {
            name: format!("{} r", name),
            shared: shared.clone(),
            stage: ReadStage::Offer,
        });

        Ok(Self { shared })
    }

    /// Response code for subsequent writes.
    pub fn set_wr_response(&self, code: u64) -> Result<(), ConfigError> {
        let code = Response::from_bits(code)?;
        self.shared.borrow_mut().wr_response = code;
        Ok(())
    }

    /// Response code for subsequent reads.
    pub fn set_rd_response(&self, code: u64) -> Result<(), ConfigError> {
        let code = Response::from_bits(code)?;
        self.shared.borrow_mut().rd_response = code;
        Ok(())
    }

    pub fn wr_response(&self) -> Response {
        self.shared.borrow().wr_response
    }

    pub fn rd_response(&self) -> Response {
        self.shared.borrow().rd_response
    }

    /// Current write state.
    pub fn write_state(&self) -> WriteState {
        self.shared.borrow().state
    }

    /// Backing memory.
    pub fn memory(&self) -> Ref<'_, Memory> {
        Ref::map(self.shared.borrow(), |s| &s.memory)
    }

    /// Backing memory, mutably (for preloading and inspection between cycles).
    pub fn memory_mut(&self) -> RefMut<'_, Memory> {
        RefMut::map(self.shared.borrow_mut(), |s| &mut s.memory)
    }

    pub fn stats(&self) -> LiteSlaveStats {
        self.shared.borrow().stats
    }
}

/// Write-address channel.
struct AddressTask {
    name: String,
    shared: Rc<RefCell<SlaveShared>>,
}

impl Process for AddressTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, phase: Phase, ctx: &mut SimContext<'_>) -> Result<Wait, AxiError> {
        let mut shared = self.shared.borrow_mut();
        let bus = shared.bus;
        match phase {
            Phase::Edge => {
                let ready = shared.state.accepts_address();
                if !ready && ctx.signals.is_high(bus.awvalid) {
                    shared.stats.address_stalls += 1;
                }
                ctx.signals.drive_bool(bus.awready, ready);
                Ok(Wait::ReadOnly)
            }
            Phase::ReadOnly => {
                if ctx.signals.is_high(bus.awvalid) && ctx.signals.is_high(bus.awready) {
                    shared.accept_address(AddressLatch {
                        address: ctx.signals.get_u64(bus.awaddr),
                        prot: ctx.signals.get_u64(bus.awprot),
                    })?;
                }
                Ok(Wait::NextEdge)
            }
        }
    }
}

/// Write-data and write-response channels.
struct DataTask {
    name: String,
    shared: Rc<RefCell<SlaveShared>>,
    /// BVALID was raised at the last edge.
    responding: bool,
}

impl Process for DataTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, phase: Phase, ctx: &mut SimContext<'_>) -> Result<Wait, AxiError> {
        let mut shared = self.shared.borrow_mut();
        let bus = shared.bus;
        match phase {
            Phase::Edge => {
                match shared.state {
                    WriteState::Responding { code, .. } => {
                        ctx.signals.drive_bool(bus.wready, false);
                        ctx.signals.drive_u64(bus.bresp, code.bits() as u64);
                        ctx.signals.drive_bool(bus.bvalid, true);
                        self.responding = true;
                    }
                    state => {
                        ctx.signals.drive_bool(bus.wready, state.accepts_data());
                        ctx.signals.drive_bool(bus.bvalid, false);
                        self.responding = false;
                    }
                }
                Ok(Wait::ReadOnly)
            }
            Phase::ReadOnly => {
                if self.responding {
                    if ctx.signals.is_high(bus.bvalid) && ctx.signals.is_high(bus.bready) {
                        shared.finish_write();
                    }
                } else if ctx.signals.is_high(bus.wvalid) && ctx.signals.is_high(bus.wready) {
                    shared.accept_data(DataLatch {
                        data: ctx.signals.get_u64(bus.wdata),
                        strobe: ctx.signals.get_u64(bus.wstrb),
                    })?;
                }
                Ok(Wait::NextEdge)
            }
        }
    }
}

#[derive(Debug, Clone)]
enum ReadStage {
    /// ARREADY up, RVALID down.
    Offer,
    /// Address accepted; drive the response at the next edge.
    Respond { data: BitVector, code: Response },
    /// RVALID up until RREADY.
    AwaitReady,
}

/// Read-address and read-data channels.
struct ReadTask {
    name: String,
    shared: Rc<RefCell<SlaveShared>>,
    stage: ReadStage,
}

impl Process for ReadTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, phase: Phase, ctx: &mut SimContext<'_>) -> Result<Wait, AxiError> {
        let mut shared = self.shared.borrow_mut();
        let bus = shared.bus;
        match (self.stage.clone(), phase) {
            (ReadStage::Offer, Phase::Edge) => {
                ctx.signals.drive_bool(bus.arready, true);
                ctx.signals.drive_bool(bus.rvalid, false);
                Ok(Wait::ReadOnly)
            }
            (ReadStage::Offer, Phase::ReadOnly) => {
                if ctx.signals.is_high(bus.arvalid) && ctx.signals.is_high(bus.arready) {
                    let address = ctx.signals.get_u64(bus.araddr);
                    let data = shared.fetch(address)?;
                    log::debug!(
                        "{}: read 0x{:08x} prot={} -> {}",
                        self.name,
                        address,
                        ctx.signals.get_u64(bus.arprot),
                        data
                    );
                    self.stage = ReadStage::Respond {
                        data,
                        code: shared.rd_response,
                    };
                }
                Ok(Wait::NextEdge)
            }
            (ReadStage::Respond { data, code }, _) => {
                ctx.signals.drive_bool(bus.arready, false);
                ctx.signals.drive(bus.rdata, data);
                ctx.signals.drive_u64(bus.rresp, code.bits() as u64);
                ctx.signals.drive_bool(bus.rvalid, true);
                self.stage = ReadStage::AwaitReady;
                Ok(Wait::ReadOnly)
            }
            (ReadStage::AwaitReady, _) => {
                if ctx.signals.is_high(bus.rvalid) && ctx.signals.is_high(bus.rready) {
                    self.stage = ReadStage::Offer;
                    return Ok(Wait::NextEdge);
                }
                Ok(Wait::ReadOnly)
            }
        }
    }
}
