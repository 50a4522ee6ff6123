//! Test-side AXI4 burst initiator.
//!
//! [`BurstDriver`] issues exactly one burst on an [`Axi4Bus`]: either the
//! address phase followed by every write beat (WLAST on the final one), or
//! the address phase followed by collecting read beats together with their
//! RLAST flag. It is the counterpart used to exercise
//! [`Axi4Slave`](crate::axi::Axi4Slave).

use std::cell::RefCell;
use std::rc::Rc;

use crate::axi::{Axi4Bus, BurstType};
use crate::error::AxiError;
use crate::sim::{BitVector, Phase, Process, ProcessId, SimContext, SimError, Simulator, Wait};

/// Raw address-phase fields plus write data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstRequest {
    pub address: u64,
    pub len: u64,
    pub size: u64,
    pub burst: BurstType,
    pub prot: u64,
    /// One value per beat for writes. Missing beats are sent as zero.
    pub data: Vec<u64>,
    /// WSTRB for every beat.
    pub strobe: u64,
}

impl BurstRequest {
    /// Incrementing burst of `len + 1` beats of `2^size` bytes.
    pub fn incr(address: u64, len: u64, size: u64) -> Self {
        Self {
            address,
            len,
            size,
            burst: BurstType::Incr,
            prot: 0,
            data: Vec::new(),
            strobe: u64::MAX,
        }
    }

    pub fn data(mut self, data: Vec<u64>) -> Self {
        self.data = data;
        self
    }

    pub fn strobe(mut self, strobe: u64) -> Self {
        self.strobe = strobe;
        self
    }

    pub fn burst(mut self, burst: BurstType) -> Self {
        self.burst = burst;
        self
    }

    fn beats(&self) -> u64 {
        self.len + 1
    }
}

/// One collected read beat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBeat {
    pub data: BitVector,
    pub last: bool,
}

/// Handle to a running burst.
pub struct BurstDriver {
    process: ProcessId,
    beats: Rc<RefCell<Vec<ReadBeat>>>,
}

impl BurstDriver {
    /// Start a write burst.
    pub fn write_burst(sim: &mut Simulator, bus: Axi4Bus, request: BurstRequest) -> Self {
        Self::start(sim, bus, request, Direction::Write)
    }

    /// Start a read burst.
    pub fn read_burst(sim: &mut Simulator, bus: Axi4Bus, request: BurstRequest) -> Self {
        Self::start(sim, bus, request, Direction::Read)
    }

    fn start(sim: &mut Simulator, bus: Axi4Bus, request: BurstRequest, direction: Direction) -> Self {
        let beats = Rc::new(RefCell::new(Vec::new()));
        let process = sim.spawn(BurstInitiator {
            name: format!("burst {:?} 0x{:08x}", direction, request.address),
            bus,
            request,
            direction,
            stage: Stage::Address,
            beats: beats.clone(),
        });
        Self { process, beats }
    }

    pub fn process(&self) -> ProcessId {
        self.process
    }

    /// Whether every beat has been transferred.
    pub fn is_done(&self, sim: &Simulator) -> bool {
        sim.is_finished(self.process)
    }

    /// Step until the burst completes.
    pub fn run(&self, sim: &mut Simulator, limit: u64) -> Result<u64, SimError> {
        sim.run_until(limit, |s| s.is_finished(self.process))
    }

    /// Beats collected by a read burst so far.
    pub fn read_beats(&self) -> Vec<ReadBeat> {
        self.beats.borrow().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Write,
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Address,
    WriteBeat(u64),
    Collect,
    Finish,
}

struct BurstInitiator {
    name: String,
    bus: Axi4Bus,
    request: BurstRequest,
    direction: Direction,
    stage: Stage,
    beats: Rc<RefCell<Vec<ReadBeat>>>,
}

impl BurstInitiator {
    fn drive_address(&self, ctx: &mut SimContext<'_>) {
        let bus = &self.bus;
        let req = &self.request;
        let (valid, addr, len, size, burst, prot) = match self.direction {
            Direction::Write => (bus.awvalid, bus.awaddr, bus.awlen, bus.awsize, bus.awburst, bus.awprot),
            Direction::Read => (bus.arvalid, bus.araddr, bus.arlen, bus.arsize, bus.arburst, bus.arprot),
        };
        ctx.signals.drive_u64(addr, req.address);
        ctx.signals.drive_u64(len, req.len);
        ctx.signals.drive_u64(size, req.size);
        ctx.signals.drive_u64(burst, req.burst.bits() as u64);
        ctx.signals.drive_u64(prot, req.prot);
        ctx.signals.drive_bool(valid, true);
    }

    fn address_accepted(&self, ctx: &SimContext<'_>) -> bool {
        match self.direction {
            Direction::Write => ctx.signals.is_high(self.bus.awready),
            Direction::Read => ctx.signals.is_high(self.bus.arready),
        }
    }
}

impl Process for BurstInitiator {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, phase: Phase, ctx: &mut SimContext<'_>) -> Result<Wait, AxiError> {
        let bus = self.bus;
        match (self.stage, phase) {
            (Stage::Address, Phase::Edge) => {
                self.drive_address(ctx);
                Ok(Wait::ReadOnly)
            }
            (Stage::Address, Phase::ReadOnly) => {
                if !self.address_accepted(ctx) {
                    return Ok(Wait::ReadOnly);
                }
                self.stage = match self.direction {
                    Direction::Write => Stage::WriteBeat(0),
                    Direction::Read => Stage::Collect,
                };
                Ok(Wait::NextEdge)
            }
            (Stage::WriteBeat(beat), Phase::Edge) => {
                let value = self.request.data.get(beat as usize).copied().unwrap_or(0);
                ctx.signals.drive_bool(bus.awvalid, false);
                ctx.signals.drive_u64(bus.wdata, value);
                ctx.signals.drive_u64(bus.wstrb, self.request.strobe);
                ctx.signals.drive_bool(bus.wlast, beat == self.request.len);
                ctx.signals.drive_bool(bus.wvalid, true);
                Ok(Wait::ReadOnly)
            }
            (Stage::WriteBeat(beat), Phase::ReadOnly) => {
                if !ctx.signals.is_high(bus.wready) {
                    return Ok(Wait::ReadOnly);
                }
                self.stage = if beat + 1 == self.request.beats() {
                    Stage::Finish
                } else {
                    Stage::WriteBeat(beat + 1)
                };
                Ok(Wait::NextEdge)
            }
            (Stage::Collect, Phase::Edge) => {
                ctx.signals.drive_bool(bus.arvalid, false);
                ctx.signals.drive_bool(bus.rready, true);
                Ok(Wait::ReadOnly)
            }
            (Stage::Collect, Phase::ReadOnly) => {
                if !(ctx.signals.is_high(bus.rvalid) && ctx.signals.is_high(bus.rready)) {
                    return Ok(Wait::ReadOnly);
                }
                let mut beats = self.beats.borrow_mut();
                beats.push(ReadBeat {
                    data: ctx.signals.get(bus.rdata).clone(),
                    last: ctx.signals.is_high(bus.rlast),
                });
                if beats.len() as u64 == self.request.beats() {
                    self.stage = Stage::Finish;
                }
                Ok(Wait::NextEdge)
            }
            (Stage::Finish, _) => {
                match self.direction {
                    Direction::Write => {
                        ctx.signals.drive_bool(bus.wvalid, false);
                        ctx.signals.drive_bool(bus.wlast, false);
                    }
                    Direction::Read => ctx.signals.drive_bool(bus.rready, false),
                }
                log::debug!("{}: done at cycle {}", self.name, ctx.cycle());
                Ok(Wait::Done)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axi::Axi4Slave;
    use crate::error::ConfigError;
    use crate::memory::Memory;

    fn fixture(data_width: u32, big_endian: bool) -> (Simulator, Axi4Bus, Axi4Slave) {
        let mut sim = Simulator::new();
        let bus = Axi4Bus::new(sim.signals_mut(), "s_axi", 32, data_width).unwrap();
        let slave = Axi4Slave::new(&mut sim, "s_axi", bus, Memory::new(0x2000), big_endian);
        (sim, bus, slave)
    }

    #[test]
    fn test_eight_beat_write_then_read() {
        let (mut sim, bus, slave) = fixture(32, false);
        let data: Vec<u64> = (0..8).map(|i| 0xA000_0000 + i).collect();

        let write = BurstDriver::write_burst(&mut sim, bus, BurstRequest::incr(0x1000, 7, 2).data(data.clone()));
        write.run(&mut sim, 100).unwrap();

        {
            let memory = slave.memory();
            for (beat, value) in data.iter().enumerate() {
                let start = 0x1000 + beat as u64 * 4;
                let bytes = memory.peek(start, 4).unwrap();
                assert_eq!(bytes, &(*value as u32).to_le_bytes(), "beat {}", beat);
            }
            // Nothing outside [0x1000, 0x1020)
            assert!(memory.peek(0xFFC, 4).unwrap().iter().all(|b| *b == 0));
            assert!(memory.peek(0x1020, 4).unwrap().iter().all(|b| *b == 0));
        }

        let read = BurstDriver::read_burst(&mut sim, bus, BurstRequest::incr(0x1000, 7, 2));
        read.run(&mut sim, 100).unwrap();
        let beats = read.read_beats();
        assert_eq!(beats.len(), 8);
        for (index, beat) in beats.iter().enumerate() {
            assert_eq!(beat.data.to_u64(), data[index]);
            assert_eq!(beat.last, index == 7, "RLAST on beat {}", index);
        }

        let stats = slave.stats();
        assert_eq!(stats.write_bursts, 1);
        assert_eq!(stats.write_beats, 8);
        assert_eq!(stats.read_beats, 8);
        assert_eq!(stats.wlast_mismatches, 0);
        assert!(sim.faults().is_empty());
    }

    #[test]
    fn test_rlast_drops_after_burst() {
        let (mut sim, bus, _slave) = fixture(32, false);
        let read = BurstDriver::read_burst(&mut sim, bus, BurstRequest::incr(0x0, 1, 2));
        read.run(&mut sim, 50).unwrap();
        sim.run(2);
        assert!(!sim.signals().is_high(bus.rlast));
        assert!(!sim.signals().is_high(bus.rvalid));
        assert!(sim.signals().is_high(bus.arready));
    }

    #[test]
    fn test_narrow_beats_on_wide_bus() {
        let (mut sim, bus, slave) = fixture(32, false);
        let request = BurstRequest::incr(0x10, 3, 0).data(vec![0x11, 0x22, 0x33, 0x44]);
        BurstDriver::write_burst(&mut sim, bus, request).run(&mut sim, 50).unwrap();
        assert_eq!(slave.memory().peek(0x10, 5).unwrap(), &[0x11, 0x22, 0x33, 0x44, 0x00]);

        let read = BurstDriver::read_burst(&mut sim, bus, BurstRequest::incr(0x11, 1, 0));
        read.run(&mut sim, 50).unwrap();
        let values: Vec<u64> = read.read_beats().iter().map(|b| b.data.to_u64()).collect();
        assert_eq!(values, vec![0x22, 0x33]);
    }

    #[test]
    fn test_write_strobe_per_beat() {
        let (mut sim, bus, slave) = fixture(32, false);
        slave.memory_mut().write(0x100, &[0xEE; 8]).unwrap();
        let request = BurstRequest::incr(0x100, 1, 2)
            .data(vec![0x0403_0201, 0x0807_0605])
            .strobe(0b0011);
        BurstDriver::write_burst(&mut sim, bus, request).run(&mut sim, 50).unwrap();
        assert_eq!(
            slave.memory().peek(0x100, 8).unwrap(),
            &[0x01, 0x02, 0xEE, 0xEE, 0x05, 0x06, 0xEE, 0xEE]
        );
    }

    #[test]
    fn test_big_endian_read() {
        let (mut sim, bus, slave) = fixture(32, true);
        slave.memory_mut().write(0x0, &[0x01, 0x02, 0x03, 0x04]).unwrap();
        let read = BurstDriver::read_burst(&mut sim, bus, BurstRequest::incr(0x0, 0, 2));
        read.run(&mut sim, 50).unwrap();
        let beats = read.read_beats();
        assert_eq!(beats[0].data.to_u64(), 0x0102_0304);
        assert!(beats[0].last);
    }

    #[test]
    fn test_wrap_burst_walked_as_incr() {
        let (mut sim, bus, slave) = fixture(32, false);
        let request = BurstRequest::incr(0x8, 3, 2)
            .burst(BurstType::Wrap)
            .data(vec![1, 2, 3, 4]);
        BurstDriver::write_burst(&mut sim, bus, request).run(&mut sim, 50).unwrap();
        assert_eq!(slave.memory_mut().read_u32(0x14, false).unwrap(), 4);
        assert_eq!(slave.memory_mut().read_u32(0x8, false).unwrap(), 1);
    }

    #[test]
    fn test_undefined_size_terminates_read_path() {
        let (mut sim, bus, _slave) = fixture(32, false);
        let read = BurstDriver::read_burst(&mut sim, bus, BurstRequest::incr(0x0, 0, 7));
        sim.run(20);

        assert!(!read.is_done(&sim));
        let faults = sim.faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].1, "s_axi read");
        assert_eq!(*faults[0].2, AxiError::Config(ConfigError::UndefinedBurstSize(7)));

        // Write path is unaffected
        let write = BurstDriver::write_burst(&mut sim, bus, BurstRequest::incr(0x40, 0, 2).data(vec![9]));
        write.run(&mut sim, 20).unwrap();
    }

    #[test]
    fn test_stalled_read_holds_beat() {
        let (mut sim, bus, slave) = fixture(32, false);
        slave.memory_mut().write_u32(0x0, 0xFEED, false).unwrap();

        // Address phase by hand, RREADY never raised
        {
            let signals = sim.signals_mut();
            signals.set_immediate_u64(bus.arsize, 2);
            signals.set_immediate_u64(bus.arburst, 1);
            signals.set_immediate_u64(bus.arvalid, 1);
        }
        sim.run(1);
        sim.signals_mut().set_immediate_u64(bus.arvalid, 0);
        sim.run(5);

        assert!(sim.signals().is_high(bus.rvalid));
        assert!(sim.signals().is_high(bus.rlast));
        assert_eq!(sim.signals().get_u64(bus.rdata), 0xFEED);
        assert_eq!(slave.stats().read_beats, 0);
    }
}
