//! Single-threaded cooperative scheduler.
//!
//! Each clock cycle is split into two phases:
//!
//! ```text
//! cycle N:  Edge ──► settle (commit) ──► ReadOnly ──► cycle N+1: Edge ...
//! ```
//!
//! - **Edge**: processes waiting for the clock edge run and *drive* signals.
//!   Drives are deferred: they only land in the pending slot.
//! - **Settle**: all pending values are committed at once.
//! - **ReadOnly**: processes waiting for the read-only window run and
//!   *sample* the settled values. Every sampler in the same window sees the
//!   same values. A drive made here is pending until the next settle.
//!
//! A process is an explicit state machine implementing [`Process`]. It runs
//! until it reaches a suspension point and returns what it waits for next
//! ([`Wait`]). Logic between suspension points is atomic with respect to
//! other processes. Within a phase, processes run in spawn order; a process
//! spawned during a phase gets its first run in that same phase, and a
//! process joined on another is woken in the phase its child finishes.
//!
//! A process returning an error is terminated; the error is logged and kept
//! in the simulator for inspection. Other processes are not affected.
//!
//! Terminated processes are reaped at the end of every phase, so the work
//! done per phase depends only on the processes still running. Process ids
//! are never reused: a reaped id still reports as finished, and a faulted
//! one keeps its error.

use std::fmt;

use super::signal::SignalTable;
use super::SimError;
use crate::error::AxiError;

/// Scheduler phase within a clock cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Just after the rising clock edge. Drive phase.
    Edge,
    /// After all drives of the cycle have settled. Sample phase.
    ReadOnly,
}

/// Suspension point returned by [`Process::resume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Resume after the next clock edge.
    NextEdge,
    /// Resume in the next read-only window that has not started yet.
    ReadOnly,
    /// Resume in the phase in which the given process terminates.
    Join(ProcessId),
    /// The process has finished.
    Done,
}

impl Wait {
    /// What the slot waits on next, or `None` once the process is done.
    fn pending(self) -> Option<Pending> {
        match self {
            Wait::NextEdge => Some(Pending::Edge),
            Wait::ReadOnly => Some(Pending::ReadOnly),
            Wait::Join(child) => Some(Pending::Join(child)),
            Wait::Done => None,
        }
    }
}

/// Handle to a spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(usize);

impl ProcessId {
    /// Raw index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A cooperatively scheduled task.
pub trait Process {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Run until the next suspension point.
    fn resume(&mut self, phase: Phase, ctx: &mut SimContext<'_>) -> Result<Wait, AxiError>;
}

/// Point in simulated time at which a wait was armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Instant {
    cycle: u64,
    phase: Phase,
}

/// What a suspended slot is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    /// Never run yet: runnable in any phase.
    Start,
    Edge,
    ReadOnly,
    Join(ProcessId),
}

/// Lifecycle of a slot.
#[derive(Debug, Clone)]
enum Status {
    Running,
    Done,
    Faulted(AxiError),
}

struct Slot {
    id: ProcessId,
    name: String,
    process: Option<Box<dyn Process>>,
    pending: Pending,
    armed: Instant,
    status: Status,
}

impl Slot {
    fn is_terminated(&self) -> bool {
        !matches!(self.status, Status::Running)
    }
}

/// A reaped process that terminated with an error.
struct Fault {
    id: ProcessId,
    name: String,
    error: AxiError,
}

/// Slot of `id` if it has not been reaped. Slots are kept in id order.
fn find_slot(slots: &[Slot], id: ProcessId) -> Option<&Slot> {
    slots.binary_search_by_key(&id, |s| s.id).ok().map(|i| &slots[i])
}

fn is_finished(slots: &[Slot], next_id: usize, id: ProcessId) -> bool {
    match find_slot(slots, id) {
        Some(slot) => slot.is_terminated(),
        // Reaped, or not spawned yet
        None => id.0 < next_id,
    }
}

fn fault_of<'a>(slots: &'a [Slot], faults: &'a [Fault], id: ProcessId) -> Option<&'a AxiError> {
    match find_slot(slots, id) {
        Some(Slot { status: Status::Faulted(e), .. }) => Some(e),
        Some(_) => None,
        None => faults.iter().find(|f| f.id == id).map(|f| &f.error),
    }
}

/// View of the simulator handed to a running process.
pub struct SimContext<'a> {
    /// The shared wires.
    pub signals: &'a mut SignalTable,
    slots: &'a [Slot],
    faults: &'a [Fault],
    next_id: usize,
    cycle: u64,
    phase: Phase,
    spawned: Vec<(String, Box<dyn Process>)>,
}

impl SimContext<'_> {
    /// Current cycle number (first cycle is 1).
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Spawn a child process. It first runs later in the current phase.
    pub fn spawn(&mut self, process: impl Process + 'static) -> ProcessId {
        let id = ProcessId(self.next_id + self.spawned.len());
        self.spawned.push((process.name().to_string(), Box::new(process)));
        id
    }

    /// Whether a process has terminated (normally or with an error).
    pub fn is_finished(&self, id: ProcessId) -> bool {
        is_finished(self.slots, self.next_id, id)
    }

    /// Error a terminated process failed with, if any.
    pub fn fault(&self, id: ProcessId) -> Option<&AxiError> {
        fault_of(self.slots, self.faults, id)
    }
}

/// Clocked cooperative simulator.
///
/// # Example
///
/// ```
/// use axi_emu::sim::{Phase, Process, SimContext, Simulator, Wait};
/// use axi_emu::error::AxiError;
///
/// struct Toggle { sig: axi_emu::sim::SignalId }
///
/// impl Process for Toggle {
///     fn name(&self) -> &str { "toggle" }
///     fn resume(&mut self, _: Phase, ctx: &mut SimContext<'_>) -> Result<Wait, AxiError> {
///         let v = ctx.signals.is_high(self.sig);
///         ctx.signals.drive_bool(self.sig, !v);
///         Ok(Wait::NextEdge)
///     }
/// }
///
/// let mut sim = Simulator::new();
/// let sig = sim.signals_mut().add("clk_div", 1).unwrap();
/// sim.spawn(Toggle { sig });
/// sim.run(3);
/// assert!(sim.signals().is_high(sig));
/// ```
pub struct Simulator {
    signals: SignalTable,
    /// Unreaped processes, in id order.
    slots: Vec<Slot>,
    faults: Vec<Fault>,
    next_id: usize,
    cycle: u64,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    /// Create a simulator with an empty signal table.
    pub fn new() -> Self {
        Self::with_signals(SignalTable::new())
    }

    /// Create a simulator over an existing signal table.
    pub fn with_signals(signals: SignalTable) -> Self {
        Self {
            signals,
            slots: Vec::new(),
            faults: Vec::new(),
            next_id: 0,
            cycle: 0,
        }
    }

    /// Shared wires.
    pub fn signals(&self) -> &SignalTable {
        &self.signals
    }

    /// Shared wires, mutably (for binding buses and setting defaults).
    pub fn signals_mut(&mut self) -> &mut SignalTable {
        &mut self.signals
    }

    /// Number of completed cycles.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Spawn a process. It first runs in the next phase executed.
    pub fn spawn(&mut self, process: impl Process + 'static) -> ProcessId {
        let name = process.name().to_string();
        self.push_slot(name, Box::new(process))
    }

    fn push_slot(&mut self, name: String, process: Box<dyn Process>) -> ProcessId {
        let id = ProcessId(self.next_id);
        self.next_id += 1;
        log::trace!("spawn {} {}", id, name);
        self.slots.push(Slot {
            id,
            name,
            process: Some(process),
            pending: Pending::Start,
            armed: Instant { cycle: self.cycle, phase: Phase::ReadOnly },
            status: Status::Running,
        });
        id
    }

    /// Whether a process has terminated.
    pub fn is_finished(&self, id: ProcessId) -> bool {
        is_finished(&self.slots, self.next_id, id)
    }

    /// Error a process terminated with.
    pub fn fault(&self, id: ProcessId) -> Option<&AxiError> {
        fault_of(&self.slots, &self.faults, id)
    }

    /// All processes that terminated with an error, in spawn order.
    pub fn faults(&self) -> Vec<(ProcessId, &str, &AxiError)> {
        let unreaped = self.slots.iter().filter_map(|s| match &s.status {
            Status::Faulted(e) => Some((s.id, s.name.as_str(), e)),
            _ => None,
        });
        let mut faults: Vec<_> = self
            .faults
            .iter()
            .map(|f| (f.id, f.name.as_str(), &f.error))
            .chain(unreaped)
            .collect();
        faults.sort_by_key(|f| f.0);
        faults
    }

    /// Number of processes still running.
    pub fn live_processes(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_terminated()).count()
    }

    /// Process slots held, running or awaiting reaping. Between steps this
    /// equals [`live_processes`](Self::live_processes).
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Advance one full clock cycle.
    pub fn step(&mut self) {
        self.cycle += 1;
        self.run_phase(Phase::Edge);
        let changed = self.signals.commit();
        log::trace!("cycle {} settled, {} signals changed", self.cycle, changed);
        self.run_phase(Phase::ReadOnly);
    }

    /// Advance `cycles` clock cycles.
    pub fn run(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.step();
        }
    }

    /// Step until `done` holds, checking before every cycle.
    ///
    /// Returns the number of cycles stepped. Fails with
    /// [`SimError::CycleLimit`] if `done` still does not hold after `limit`
    /// cycles.
    pub fn run_until<F>(&mut self, limit: u64, mut done: F) -> Result<u64, SimError>
    where
        F: FnMut(&Simulator) -> bool,
    {
        let start = self.cycle;
        loop {
            if done(self) {
                return Ok(self.cycle - start);
            }
            if self.cycle - start >= limit {
                return Err(SimError::CycleLimit { limit, cycle: self.cycle });
            }
            self.step();
        }
    }

    fn is_runnable(&self, index: usize, now: Instant) -> bool {
        let slot = &self.slots[index];
        if slot.is_terminated() || slot.process.is_none() {
            return false;
        }
        match slot.pending {
            Pending::Start => true,
            Pending::Edge => now.phase == Phase::Edge && slot.armed < now,
            Pending::ReadOnly => now.phase == Phase::ReadOnly && slot.armed < now,
            Pending::Join(child) => self.is_finished(child),
        }
    }

    fn run_phase(&mut self, phase: Phase) {
        let now = Instant { cycle: self.cycle, phase };
        loop {
            let mut progressed = false;
            let mut index = 0;
            // Length is re-read every iteration so that processes spawned
            // during this phase also run in it.
            while index < self.slots.len() {
                if self.is_runnable(index, now) {
                    self.resume_slot(index, now);
                    progressed = true;
                }
                index += 1;
            }
            if !progressed {
                break;
            }
        }
        self.reap();
    }

    /// Drop terminated slots, keeping the errors of faulted ones.
    fn reap(&mut self) {
        if !self.slots.iter().any(Slot::is_terminated) {
            return;
        }
        let mut live = Vec::with_capacity(self.slots.len());
        for slot in self.slots.drain(..) {
            match slot.status {
                Status::Running => live.push(slot),
                Status::Done => {}
                Status::Faulted(error) => self.faults.push(Fault {
                    id: slot.id,
                    name: slot.name,
                    error,
                }),
            }
        }
        self.slots = live;
    }

    fn resume_slot(&mut self, index: usize, now: Instant) {
        let Some(mut process) = self.slots[index].process.take() else {
            return;
        };

        let (result, spawned) = {
            let mut ctx = SimContext {
                signals: &mut self.signals,
                slots: &self.slots,
                faults: &self.faults,
                next_id: self.next_id,
                cycle: now.cycle,
                phase: now.phase,
                spawned: Vec::new(),
            };
            let result = process.resume(now.phase, &mut ctx);
            (result, ctx.spawned)
        };

        let slot = &mut self.slots[index];
        match result.map(Wait::pending) {
            Ok(Some(pending)) => {
                slot.pending = pending;
                slot.armed = now;
                slot.process = Some(process);
            }
            Ok(None) => {
                log::trace!("{} {} done at cycle {}", slot.id, slot.name, now.cycle);
                slot.status = Status::Done;
            }
            Err(e) => {
                log::error!(
                    "process {} {} terminated at cycle {}: {}",
                    slot.id,
                    slot.name,
                    now.cycle,
                    e
                );
                slot.status = Status::Faulted(e);
            }
        }

        for (name, child) in spawned {
            self.push_slot(name, child);
        }
    }
}
