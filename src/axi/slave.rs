//! Burst-capable AXI4 slave backed by a [`Memory`] image.
//!
//! Two perpetual processes, one per direction:
//!
//! - **write path**: accepts one AW request, then one W beat per handshake
//!   until `AWLEN + 1` beats have landed. Beat `i` covers
//!   `[AWADDR + i * 2^AWSIZE, AWADDR + (i + 1) * 2^AWSIZE)`.
//! - **read path**: accepts one AR request, then offers one R beat per
//!   cycle, holding it until RREADY. RLAST is raised on the final beat only.
//!
//! No write-response or read-response channel is modeled. Only incrementing
//! bursts are implemented; FIXED and WRAP requests are walked as INCR and
//! logged.
//!
//! An undefined AxSIZE encoding or a beat wider than the data bus terminates
//! the affected path.

use std::cell::{Ref, RefCell, RefMut};
use std::ops::Range;
use std::rc::Rc;

use super::{Axi4Bus, BurstGeometry, BurstType};
use crate::error::{AxiError, ConfigError};
use crate::memory::{Memory, MemoryError};
use crate::sim::{BitVector, Phase, Process, SignalId, SignalTable, SimContext, Simulator, Wait};

/// Transfer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlaveStats {
    pub write_bursts: u64,
    pub write_beats: u64,
    pub read_bursts: u64,
    pub read_beats: u64,
    /// Beats whose WLAST disagreed with the burst length.
    pub wlast_mismatches: u64,
}

struct SlaveShared {
    name: String,
    bus: Axi4Bus,
    memory: Memory,
    big_endian: bool,
    stats: SlaveStats,
}

/// Latch and validate the address-phase fields of one burst.
fn latch_burst(
    shared: &SlaveShared,
    signals: &SignalTable,
    fields: [SignalId; 5],
    direction: &str,
) -> Result<BurstGeometry, AxiError> {
    let [addr, len, size, burst, prot] = fields.map(|id| signals.get_u64(id));
    let geometry = BurstGeometry::new(addr, len, size, BurstType::from_bits(burst), prot)?;

    log::debug!(
        "{}: {} burst addr=0x{:08x} len={} size={} burst={:?} prot={} beats={} bytes_per_beat={}",
        shared.name,
        direction,
        addr,
        len,
        size,
        geometry.burst,
        prot,
        geometry.beats(),
        geometry.bytes_per_beat()
    );

    let bus_bytes = shared.bus.data_bytes();
    if geometry.bytes_per_beat() > bus_bytes {
        return Err(ConfigError::BeatWiderThanBus {
            beat_bytes: geometry.bytes_per_beat(),
            bus_bytes,
        }
        .into());
    }
    if !geometry.is_incrementing() {
        log::warn!(
            "{}: {:?} {} burst at 0x{:08x} treated as INCR",
            shared.name,
            geometry.burst,
            direction,
            addr
        );
    }
    Ok(geometry)
}

/// Strobe bits covering the low `bytes` lanes.
fn lane_mask(bytes: usize) -> u64 {
    if bytes >= 64 {
        u64::MAX
    } else {
        (1u64 << bytes) - 1
    }
}

/// AXI4 slave agent.
///
/// Cloning yields another handle to the same slave.
#[derive(Clone)]
pub struct Axi4Slave {
    shared: Rc<RefCell<SlaveShared>>,
}

impl Axi4Slave {
    /// Attach a slave to `bus` and start its write and read processes.
    pub fn new(sim: &mut Simulator, name: &str, bus: Axi4Bus, memory: Memory, big_endian: bool) -> Self {
        let signals = sim.signals_mut();
        signals.set_immediate_u64(bus.arready, 1);
        signals.set_immediate_u64(bus.rvalid, 0);
        signals.set_immediate_u64(bus.rlast, 0);
        signals.set_immediate_u64(bus.awready, 1);

        let shared = Rc::new(RefCell::new(SlaveShared {
            name: name.to_string(),
            bus,
            memory,
            big_endian,
            stats: SlaveStats::default(),
        }));

        sim.spawn(WritePath {
            name: format!("{} write", name),
            shared: shared.clone(),
            burst: None,
        });
        sim.spawn(ReadPath {
            name: format!("{} read", name),
            shared: shared.clone(),
            burst: None,
        });

        Self { shared }
    }

    /// Backing memory.
    pub fn memory(&self) -> Ref<'_, Memory> {
        Ref::map(self.shared.borrow(), |s| &s.memory)
    }

    /// Backing memory, mutably.
    pub fn memory_mut(&self) -> RefMut<'_, Memory> {
        RefMut::map(self.shared.borrow_mut(), |s| &mut s.memory)
    }

    pub fn stats(&self) -> SlaveStats {
        self.shared.borrow().stats
    }
}

/// A burst in progress and the index of the next beat.
#[derive(Debug, Clone, Copy)]
struct ActiveBurst {
    geometry: BurstGeometry,
    beat: u64,
}

impl ActiveBurst {
    /// Byte range of the current beat. A beat past the top of the address
    /// space is reported like any other access outside the image.
    fn range(&self, capacity: usize) -> Result<Range<u64>, MemoryError> {
        self.geometry.beat_range(self.beat).ok_or(MemoryError::OutOfRange {
            address: self.geometry.address,
            len: self.geometry.bytes_per_beat(),
            capacity,
        })
    }
}

struct WritePath {
    name: String,
    shared: Rc<RefCell<SlaveShared>>,
    burst: Option<ActiveBurst>,
}

impl WritePath {
    fn write_beat(&self, shared: &mut SlaveShared, signals: &SignalTable, active: &ActiveBurst) -> Result<(), AxiError> {
        let bus = shared.bus;
        let geometry = &active.geometry;
        let bytes = geometry.bytes_per_beat();
        let range = active.range(shared.memory.capacity())?;

        let data = signals
            .get(bus.wdata)
            .resized((bytes * 8) as u32)
            .with_endianness(shared.big_endian)
            .to_bytes();
        let strobe = signals.get_u64(bus.wstrb) & lane_mask(bytes);
        shared.memory.write_masked(range.start, &data, strobe)?;

        let last = signals.is_high(bus.wlast);
        if last != geometry.is_last(active.beat) {
            shared.stats.wlast_mismatches += 1;
            log::warn!(
                "{}: WLAST={} on beat {} of {}",
                self.name,
                last as u8,
                active.beat,
                geometry.beats()
            );
        }
        log::trace!(
            "{}: beat {} [0x{:08x}, 0x{:08x}) strobe=0b{:b}",
            self.name,
            active.beat,
            range.start,
            range.end,
            strobe
        );
        shared.stats.write_beats += 1;
        Ok(())
    }
}

impl Process for WritePath {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, phase: Phase, ctx: &mut SimContext<'_>) -> Result<Wait, AxiError> {
        let mut shared = self.shared.borrow_mut();
        let bus = shared.bus;
        match (self.burst, phase) {
            (None, Phase::Edge) => {
                ctx.signals.drive_bool(bus.awready, true);
                ctx.signals.drive_bool(bus.wready, false);
                Ok(Wait::ReadOnly)
            }
            (None, Phase::ReadOnly) => {
                if ctx.signals.is_high(bus.awvalid) && ctx.signals.is_high(bus.awready) {
                    let fields = [bus.awaddr, bus.awlen, bus.awsize, bus.awburst, bus.awprot];
                    let geometry = latch_burst(&shared, ctx.signals, fields, "write")?;
                    shared.stats.write_bursts += 1;
                    self.burst = Some(ActiveBurst { geometry, beat: 0 });
                }
                Ok(Wait::NextEdge)
            }
            (Some(_), Phase::Edge) => {
                ctx.signals.drive_bool(bus.awready, false);
                ctx.signals.drive_bool(bus.wready, true);
                Ok(Wait::ReadOnly)
            }
            (Some(mut active), Phase::ReadOnly) => {
                if ctx.signals.is_high(bus.wvalid) && ctx.signals.is_high(bus.wready) {
                    self.write_beat(&mut shared, ctx.signals, &active)?;
                    active.beat += 1;
                    self.burst = (active.beat < active.geometry.beats()).then_some(active);
                }
                Ok(Wait::NextEdge)
            }
        }
    }
}

struct ReadPath {
    name: String,
    shared: Rc<RefCell<SlaveShared>>,
    burst: Option<ActiveBurst>,
}

impl Process for ReadPath {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, phase: Phase, ctx: &mut SimContext<'_>) -> Result<Wait, AxiError> {
        let mut shared = self.shared.borrow_mut();
        let bus = shared.bus;
        match (self.burst, phase) {
            (None, Phase::Edge) => {
                ctx.signals.drive_bool(bus.arready, true);
                ctx.signals.drive_bool(bus.rvalid, false);
                ctx.signals.drive_bool(bus.rlast, false);
                Ok(Wait::ReadOnly)
            }
            (None, Phase::ReadOnly) => {
                if ctx.signals.is_high(bus.arvalid) && ctx.signals.is_high(bus.arready) {
                    let fields = [bus.araddr, bus.arlen, bus.arsize, bus.arburst, bus.arprot];
                    let geometry = latch_burst(&shared, ctx.signals, fields, "read")?;
                    shared.stats.read_bursts += 1;
                    self.burst = Some(ActiveBurst { geometry, beat: 0 });
                }
                Ok(Wait::NextEdge)
            }
            (Some(active), Phase::Edge) => {
                let range = active.range(shared.memory.capacity())?;
                let big_endian = shared.big_endian;
                let bytes = shared.memory.read(range.start, active.geometry.bytes_per_beat())?;
                let word = BitVector::from_bytes(bytes, big_endian);
                let last = active.geometry.is_last(active.beat);
                log::trace!("{}: beat {} = {} last={}", self.name, active.beat, word, last);

                ctx.signals.drive_bool(bus.arready, false);
                ctx.signals.drive(bus.rdata, word);
                ctx.signals.drive_bool(bus.rvalid, true);
                ctx.signals.drive_bool(bus.rlast, last);
                Ok(Wait::ReadOnly)
            }
            (Some(mut active), Phase::ReadOnly) => {
                if !(ctx.signals.is_high(bus.rvalid) && ctx.signals.is_high(bus.rready)) {
                    // Beat stays on the bus until accepted
                    return Ok(Wait::ReadOnly);
                }
                shared.stats.read_beats += 1;
                active.beat += 1;
                self.burst = (active.beat < active.geometry.beats()).then_some(active);
                Ok(Wait::NextEdge)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_mask() {
        assert_eq!(lane_mask(1), 0b1);
        assert_eq!(lane_mask(4), 0xF);
        assert_eq!(lane_mask(64), u64::MAX);
    }

    fn fixture() -> (Simulator, Axi4Bus) {
        let mut sim = Simulator::new();
        let bus = Axi4Bus::new(sim.signals_mut(), "s_axi", 32, 32).unwrap();
        (sim, bus)
    }

    #[test]
    fn test_idle_defaults() {
        let (mut sim, bus) = fixture();
        let slave = Axi4Slave::new(&mut sim, "s_axi", bus, Memory::new(64), false);
        assert!(sim.signals().is_high(bus.arready));
        assert!(sim.signals().is_high(bus.awready));
        sim.run(3);
        assert!(sim.signals().is_high(bus.awready));
        assert!(!sim.signals().is_high(bus.wready));
        assert!(!sim.signals().is_high(bus.rvalid));
        assert_eq!(slave.stats(), SlaveStats::default());
    }

    #[test]
    fn test_beat_wider_than_bus_faults_write_path() {
        let (mut sim, bus) = fixture();
        Axi4Slave::new(&mut sim, "s_axi", bus, Memory::new(64), false);
        {
            let signals = sim.signals_mut();
            signals.set_immediate_u64(bus.awsize, 3);
            signals.set_immediate_u64(bus.awburst, 1);
            signals.set_immediate_u64(bus.awvalid, 1);
        }
        sim.run(2);
        let faults = sim.faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].1, "s_axi write");
        assert!(matches!(
            faults[0].2,
            AxiError::Config(ConfigError::BeatWiderThanBus { beat_bytes: 8, bus_bytes: 4 })
        ));
    }

    #[test]
    fn test_read_past_top_of_address_space_faults_read_path() {
        let mut sim = Simulator::new();
        let bus = Axi4Bus::new(sim.signals_mut(), "s_axi", 64, 32).unwrap();
        Axi4Slave::new(&mut sim, "s_axi", bus, Memory::new(64), false);
        {
            let signals = sim.signals_mut();
            signals.set_immediate_u64(bus.araddr, u64::MAX - 1);
            signals.set_immediate_u64(bus.arsize, 2);
            signals.set_immediate_u64(bus.arburst, 1);
            signals.set_immediate_u64(bus.arvalid, 1);
        }
        sim.run(3);

        let faults = sim.faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].1, "s_axi read");
        assert!(matches!(
            faults[0].2,
            AxiError::Memory(MemoryError::OutOfRange { address, len: 4, capacity: 64 }) if *address == u64::MAX - 1
        ));
        // Write path keeps running
        assert!(sim.signals().is_high(bus.awready));
    }

    #[test]
    fn test_write_past_top_of_address_space_faults_write_path() {
        let mut sim = Simulator::new();
        let bus = Axi4Bus::new(sim.signals_mut(), "s_axi", 64, 32).unwrap();
        Axi4Slave::new(&mut sim, "s_axi", bus, Memory::new(64), false);
        {
            let signals = sim.signals_mut();
            signals.set_immediate_u64(bus.awaddr, u64::MAX - 1);
            signals.set_immediate_u64(bus.awsize, 2);
            signals.set_immediate_u64(bus.awburst, 1);
            signals.set_immediate_u64(bus.awvalid, 1);
            signals.set_immediate_u64(bus.wvalid, 1);
        }
        sim.run(4);

        let faults = sim.faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].1, "s_axi write");
        assert!(matches!(faults[0].2, AxiError::Memory(MemoryError::OutOfRange { .. })));
    }
}
