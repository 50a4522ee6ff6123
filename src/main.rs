//! axi-emu: cycle-stepped AXI4 / AXI4-Lite agents
//!
//! Runs a short demonstration against the in-crate simulator and prints what
//! happened on the bus.

use std::env;

use anyhow::{bail, Context};
use axi_emu::axi::{Axi4Bus, Axi4Slave, WriteRequest};
use axi_emu::config::Config;
use axi_emu::memory::Memory;
use axi_emu::sim::Simulator;
use axi_emu::testing::{BurstDriver, BurstRequest, LiteBench};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }
    if args.iter().any(|a| a == "--sample-config") {
        print!("{}", Config::sample_config());
        return Ok(());
    }

    let mut config = Config::get().clone();
    config.merge(parse_overrides(&args[1..])?);

    println!("axi-emu demonstration");
    println!("=====================");
    println!(
        "Bus: {}-bit address, {}-bit data, {}",
        config.address_width(),
        config.data_width(),
        if config.big_endian() { "big-endian" } else { "little-endian" }
    );
    println!("Cycle limit per operation: {}", config.cycle_limit());
    if let Some(path) = Config::user_config_path() {
        println!("User config: {}", path.display());
    }

    run_lite(&config)?;
    run_burst(&config)?;

    Ok(())
}

/// Command-line overrides layered on top of the loaded configuration.
fn parse_overrides(args: &[String]) -> anyhow::Result<Config> {
    let mut overrides = Config::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--big-endian" => overrides.big_endian = Some(true),
            "--data-width" => {
                let value = iter.next().context("--data-width needs a value")?;
                overrides.data_width = Some(value.parse().with_context(|| format!("bad data width '{}'", value))?);
            }
            "--cycles" => {
                let value = iter.next().context("--cycles needs a value")?;
                overrides.cycle_limit = Some(value.parse().with_context(|| format!("bad cycle limit '{}'", value))?);
            }
            other => bail!("Unknown argument '{}' (try --help)", other),
        }
    }
    Ok(overrides)
}

fn print_usage() {
    println!("Usage: axi-emu [--big-endian] [--data-width N] [--cycles N]");
    println!("       axi-emu --sample-config");
    println!();
    println!("Environment: AXI_EMU_CYCLE_LIMIT, AXI_EMU_BIG_ENDIAN, RUST_LOG");
}

/// AXI4-Lite master against the Lite slave.
fn run_lite(config: &Config) -> anyhow::Result<()> {
    let mut bench = LiteBench::new(config)?;

    println!();
    println!("AXI4-Lite");
    println!("---------");

    // Round trip
    let value = 0x1234_5678 & data_mask(config.data_width());
    bench.write(0x40, value)?;
    let data = bench.read(0x40)?;
    println!("  write 0x{:08x} -> 0x40, read back {}", value, data);
    if data.to_u64() != value {
        bail!("Round trip mismatch at 0x40: wrote 0x{:x}, read {}", value, data);
    }

    // Strobe write over a known pattern
    bench.write(0x80, 0x4433_2211)?;
    bench.write_with(WriteRequest::new(0x80, 0xDDCC_BBAA).byte_enable(0b0101))?;
    let data = bench.read(0x80)?;
    println!("  strobe 0b0101 over 0x44332211 with 0xDDCCBBAA: {}", data);

    // Error response
    bench.slave.set_wr_response(2)?;
    match bench.write(0xC0, 1) {
        Ok(code) => println!("  unexpected success: {}", code),
        Err(e) => println!("  error response: {}", e),
    }
    bench.slave.set_wr_response(0)?;

    let master = bench.master.stats();
    let slave = bench.slave.stats();
    println!(
        "  {} writes ({} failed), {} reads, {} address stalls, {} cycles",
        master.writes_issued,
        master.writes_failed,
        master.reads_issued,
        slave.address_stalls,
        bench.sim.cycle()
    );
    Ok(())
}

/// Eight-beat INCR burst into the AXI4 slave and back.
fn run_burst(config: &Config) -> anyhow::Result<()> {
    let mut sim = Simulator::new();
    let bus = Axi4Bus::new(sim.signals_mut(), "s_axi", config.address_width(), config.data_width())?;
    let slave = Axi4Slave::new(&mut sim, "s_axi", bus, Memory::new(config.memory_size()), config.big_endian());

    println!();
    println!("AXI4 burst");
    println!("----------");

    let data: Vec<u64> = (0..8).map(|i| 0xA5A5_0000 | i).collect();
    let write = BurstDriver::write_burst(&mut sim, bus, BurstRequest::incr(0x1000, 7, 2).data(data));
    write.run(&mut sim, config.cycle_limit())?;

    let read = BurstDriver::read_burst(&mut sim, bus, BurstRequest::incr(0x1000, 7, 2));
    read.run(&mut sim, config.cycle_limit())?;
    for (i, beat) in read.read_beats().iter().enumerate() {
        println!("  [{}] {}{}", i, beat.data, if beat.last { " RLAST" } else { "" });
    }

    let stats = slave.stats();
    println!(
        "  {} write beats, {} read beats, {} WLAST mismatches, {} cycles",
        stats.write_beats,
        stats.read_beats,
        stats.wlast_mismatches,
        sim.cycle()
    );
    for (id, name, error) in sim.faults() {
        println!("  Warning: process {} ({}) faulted: {}", id, name, error);
    }
    Ok(())
}

fn data_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}
