//! Signal bindings for AXI4-Lite and AXI4 buses.
//!
//! A bus binding is a plain set of [`SignalId`]s. Master and slave share the
//! same binding, so they read and drive the same wires. Signal names follow
//! the `<prefix>_<SIGNAL>` convention, e.g. `s_axil_AWVALID`.
//!
//! | Channel        | Signals                                      |
//! |----------------|----------------------------------------------|
//! | Write address  | AWVALID AWREADY AWADDR AWPROT (+AWLEN AWSIZE AWBURST) |
//! | Write data     | WVALID WREADY WDATA WSTRB (+WLAST)           |
//! | Write response | BVALID BREADY BRESP (Lite only)              |
//! | Read address   | ARVALID ARREADY ARADDR ARPROT (+ARLEN ARSIZE ARBURST) |
//! | Read data      | RVALID RREADY RDATA RRESP (Lite) / RLAST (AXI4) |

use crate::sim::{SignalId, SignalTable, SimError};

/// Protection field width (AxPROT).
pub const PROT_WIDTH: u32 = 3;
/// Response field width (BRESP/RRESP).
pub const RESP_WIDTH: u32 = 2;
/// Burst length field width (AxLEN).
pub const LEN_WIDTH: u32 = 8;
/// Burst size field width (AxSIZE).
pub const SIZE_WIDTH: u32 = 3;
/// Burst type field width (AxBURST).
pub const BURST_WIDTH: u32 = 2;

/// Add a signal named `<prefix>_<name>`.
fn add(signals: &mut SignalTable, prefix: &str, name: &str, width: u32) -> Result<SignalId, SimError> {
    signals.add(format!("{}_{}", prefix, name), width)
}

/// Look up a signal named `<prefix>_<name>`.
fn find(signals: &SignalTable, prefix: &str, name: &str) -> Result<SignalId, SimError> {
    signals.lookup(&format!("{}_{}", prefix, name))
}

/// AXI4-Lite signal set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxiLiteBus {
    pub awvalid: SignalId,
    pub awready: SignalId,
    pub awaddr: SignalId,
    pub awprot: SignalId,

    pub wvalid: SignalId,
    pub wready: SignalId,
    pub wdata: SignalId,
    pub wstrb: SignalId,

    pub bvalid: SignalId,
    pub bready: SignalId,
    pub bresp: SignalId,

    pub arvalid: SignalId,
    pub arready: SignalId,
    pub araddr: SignalId,
    pub arprot: SignalId,

    pub rvalid: SignalId,
    pub rready: SignalId,
    pub rresp: SignalId,
    pub rdata: SignalId,

    addr_width: u32,
    data_width: u32,
}

impl AxiLiteBus {
    /// Create the wires of an AXI4-Lite bus.
    pub fn new(
        signals: &mut SignalTable,
        prefix: &str,
        addr_width: u32,
        data_width: u32,
    ) -> Result<Self, SimError> {
        let strb_width = data_width.div_ceil(8);
        Ok(Self {
            awvalid: add(signals, prefix, "AWVALID", 1)?,
            awready: add(signals, prefix, "AWREADY", 1)?,
            awaddr: add(signals, prefix, "AWADDR", addr_width)?,
            awprot: add(signals, prefix, "AWPROT", PROT_WIDTH)?,

            wvalid: add(signals, prefix, "WVALID", 1)?,
            wready: add(signals, prefix, "WREADY", 1)?,
            wdata: add(signals, prefix, "WDATA", data_width)?,
            wstrb: add(signals, prefix, "WSTRB", strb_width)?,

            bvalid: add(signals, prefix, "BVALID", 1)?,
            bready: add(signals, prefix, "BREADY", 1)?,
            bresp: add(signals, prefix, "BRESP", RESP_WIDTH)?,

            arvalid: add(signals, prefix, "ARVALID", 1)?,
            arready: add(signals, prefix, "ARREADY", 1)?,
            araddr: add(signals, prefix, "ARADDR", addr_width)?,
            arprot: add(signals, prefix, "ARPROT", PROT_WIDTH)?,

            rvalid: add(signals, prefix, "RVALID", 1)?,
            rready: add(signals, prefix, "RREADY", 1)?,
            rresp: add(signals, prefix, "RRESP", RESP_WIDTH)?,
            rdata: add(signals, prefix, "RDATA", data_width)?,

            addr_width,
            data_width,
        })
    }

    /// Bind to wires that already exist in the table. Widths are taken
    /// from ARADDR and WDATA.
    pub fn bind(signals: &SignalTable, prefix: &str) -> Result<Self, SimError> {
        let araddr = find(signals, prefix, "ARADDR")?;
        let wdata = find(signals, prefix, "WDATA")?;
        Ok(Self {
            awvalid: find(signals, prefix, "AWVALID")?,
            awready: find(signals, prefix, "AWREADY")?,
            awaddr: find(signals, prefix, "AWADDR")?,
            awprot: find(signals, prefix, "AWPROT")?,

            wvalid: find(signals, prefix, "WVALID")?,
            wready: find(signals, prefix, "WREADY")?,
            wdata,
            wstrb: find(signals, prefix, "WSTRB")?,

            bvalid: find(signals, prefix, "BVALID")?,
            bready: find(signals, prefix, "BREADY")?,
            bresp: find(signals, prefix, "BRESP")?,

            arvalid: find(signals, prefix, "ARVALID")?,
            arready: find(signals, prefix, "ARREADY")?,
            araddr,
            arprot: find(signals, prefix, "ARPROT")?,

            rvalid: find(signals, prefix, "RVALID")?,
            rready: find(signals, prefix, "RREADY")?,
            rresp: find(signals, prefix, "RRESP")?,
            rdata: find(signals, prefix, "RDATA")?,

            addr_width: signals.width(araddr),
            data_width: signals.width(wdata),
        })
    }

    /// Address bus width in bits.
    pub fn addr_width(&self) -> u32 {
        self.addr_width
    }

    /// Data bus width in bits.
    pub fn data_width(&self) -> u32 {
        self.data_width
    }

    /// Number of WSTRB bits.
    pub fn strobe_width(&self) -> u32 {
        self.data_width.div_ceil(8)
    }
}

/// AXI4 (burst) signal set, without the response channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Axi4Bus {
    pub awvalid: SignalId,
    pub awready: SignalId,
    pub awaddr: SignalId,
    pub awlen: SignalId,
    pub awsize: SignalId,
    pub awburst: SignalId,
    pub awprot: SignalId,

    pub wvalid: SignalId,
    pub wready: SignalId,
    pub wdata: SignalId,
    pub wstrb: SignalId,
    pub wlast: SignalId,

    pub arvalid: SignalId,
    pub arready: SignalId,
    pub araddr: SignalId,
    pub arlen: SignalId,
    pub arsize: SignalId,
    pub arburst: SignalId,
    pub arprot: SignalId,

    pub rvalid: SignalId,
    pub rready: SignalId,
    pub rdata: SignalId,
    pub rlast: SignalId,

    addr_width: u32,
    data_width: u32,
}

impl Axi4Bus {
    /// Create the wires of an AXI4 bus.
    pub fn new(
        signals: &mut SignalTable,
        prefix: &str,
        addr_width: u32,
        data_width: u32,
    ) -> Result<Self, SimError> {
        let strb_width = data_width.div_ceil(8);
        Ok(Self {
            awvalid: add(signals, prefix, "AWVALID", 1)?,
            awready: add(signals, prefix, "AWREADY", 1)?,
            awaddr: add(signals, prefix, "AWADDR", addr_width)?,
            awlen: add(signals, prefix, "AWLEN", LEN_WIDTH)?,
            awsize: add(signals, prefix, "AWSIZE", SIZE_WIDTH)?,
            awburst: add(signals, prefix, "AWBURST", BURST_WIDTH)?,
            awprot: add(signals, prefix, "AWPROT", PROT_WIDTH)?,

            wvalid: add(signals, prefix, "WVALID", 1)?,
            wready: add(signals, prefix, "WREADY", 1)?,
            wdata: add(signals, prefix, "WDATA", data_width)?,
            wstrb: add(signals, prefix, "WSTRB", strb_width)?,
            wlast: add(signals, prefix, "WLAST", 1)?,

            arvalid: add(signals, prefix, "ARVALID", 1)?,
            arready: add(signals, prefix, "ARREADY", 1)?,
            araddr: add(signals, prefix, "ARADDR", addr_width)?,
            arlen: add(signals, prefix, "ARLEN", LEN_WIDTH)?,
            arsize: add(signals, prefix, "ARSIZE", SIZE_WIDTH)?,
            arburst: add(signals, prefix, "ARBURST", BURST_WIDTH)?,
            arprot: add(signals, prefix, "ARPROT", PROT_WIDTH)?,

            rvalid: add(signals, prefix, "RVALID", 1)?,
            rready: add(signals, prefix, "RREADY", 1)?,
            rdata: add(signals, prefix, "RDATA", data_width)?,
            rlast: add(signals, prefix, "RLAST", 1)?,

            addr_width,
            data_width,
        })
    }

    /// Address bus width in bits.
    pub fn addr_width(&self) -> u32 {
        self.addr_width
    }

    /// Data bus width in bits.
    pub fn data_width(&self) -> u32 {
        self.data_width
    }

    /// Data bus width in bytes.
    pub fn data_bytes(&self) -> usize {
        self.data_width.div_ceil(8) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lite_bus_names_and_widths() {
        let mut signals = SignalTable::new();
        let bus = AxiLiteBus::new(&mut signals, "s_axil", 32, 64).unwrap();

        assert_eq!(signals.name(bus.awvalid), "s_axil_AWVALID");
        assert_eq!(signals.width(bus.awaddr), 32);
        assert_eq!(signals.width(bus.wdata), 64);
        assert_eq!(signals.width(bus.wstrb), 8);
        assert_eq!(signals.width(bus.bresp), 2);
        assert_eq!(bus.strobe_width(), 8);
        assert_eq!(signals.len(), 19);
    }

    #[test]
    fn test_lite_bus_bind() {
        let mut signals = SignalTable::new();
        let created = AxiLiteBus::new(&mut signals, "m", 16, 32).unwrap();
        let bound = AxiLiteBus::bind(&signals, "m").unwrap();
        assert_eq!(created, bound);
        assert_eq!(bound.addr_width(), 16);

        assert!(matches!(
            AxiLiteBus::bind(&signals, "other"),
            Err(SimError::UnknownSignal(_))
        ));
    }

    #[test]
    fn test_prefix_collision() {
        let mut signals = SignalTable::new();
        AxiLiteBus::new(&mut signals, "m", 32, 32).unwrap();
        assert!(AxiLiteBus::new(&mut signals, "m", 32, 32).is_err());
    }

    #[test]
    fn test_axi4_bus() {
        let mut signals = SignalTable::new();
        let bus = Axi4Bus::new(&mut signals, "s_axi", 32, 128).unwrap();
        assert_eq!(signals.name(bus.rlast), "s_axi_RLAST");
        assert_eq!(signals.width(bus.awlen), 8);
        assert_eq!(signals.width(bus.arsize), 3);
        assert_eq!(signals.width(bus.wstrb), 16);
        assert_eq!(bus.data_bytes(), 16);
    }
}
