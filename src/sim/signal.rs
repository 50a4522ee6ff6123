//! Named wires with deferred (non-blocking) assignment.
//!
//! Every signal holds a committed value and an optional pending value.
//! [`SignalTable::drive`] only writes the pending slot; the value becomes
//! visible to readers after the scheduler calls [`SignalTable::commit`] at
//! the settle boundary. Within one phase the last drive wins, exactly like
//! repeated `<=` assignments in an HDL process.
//!
//! ```
//! use axi_emu::sim::SignalTable;
//!
//! let mut signals = SignalTable::new();
//! let valid = signals.add("s_axil_AWVALID", 1).unwrap();
//!
//! signals.drive_bool(valid, true);
//! assert!(!signals.is_high(valid)); // not yet settled
//!
//! signals.commit();
//! assert!(signals.is_high(valid));
//! ```

use std::collections::HashMap;

use super::value::BitVector;
use super::SimError;

/// Handle to a signal in a [`SignalTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(usize);

impl SignalId {
    /// Index into the owning table.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A single wire.
#[derive(Debug, Clone)]
struct Signal {
    name: String,
    width: u32,
    current: BitVector,
    pending: Option<BitVector>,
}

/// Arena of named signals shared by all agents on a bus.
#[derive(Debug, Default)]
pub struct SignalTable {
    signals: Vec<Signal>,
    by_name: HashMap<String, SignalId>,
    /// Number of commits that changed at least one value.
    commits: u64,
}

impl SignalTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a zero-initialized signal.
    pub fn add(&mut self, name: impl Into<String>, width: u32) -> Result<SignalId, SimError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(SimError::DuplicateSignal(name));
        }
        let id = SignalId(self.signals.len());
        self.signals.push(Signal {
            name: name.clone(),
            width,
            current: BitVector::zero(width),
            pending: None,
        });
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// Resolve a signal by name.
    pub fn lookup(&self, name: &str) -> Result<SignalId, SimError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| SimError::UnknownSignal(name.to_string()))
    }

    /// Whether a signal with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Number of signals.
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    /// True if the table has no signals.
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Signal name.
    pub fn name(&self, id: SignalId) -> &str {
        &self.signals[id.0].name
    }

    /// Signal width in bits.
    pub fn width(&self, id: SignalId) -> u32 {
        self.signals[id.0].width
    }

    /// Committed value.
    #[inline]
    pub fn get(&self, id: SignalId) -> &BitVector {
        &self.signals[id.0].current
    }

    /// Committed value as an integer (lowest 64 bits).
    #[inline]
    pub fn get_u64(&self, id: SignalId) -> u64 {
        self.signals[id.0].current.to_u64()
    }

    /// Whether the committed value is non-zero.
    #[inline]
    pub fn is_high(&self, id: SignalId) -> bool {
        self.signals[id.0].current.is_true()
    }

    /// Schedule a value, visible after the next commit.
    pub fn drive(&mut self, id: SignalId, value: BitVector) {
        let signal = &mut self.signals[id.0];
        let value = if value.width() == signal.width {
            value
        } else {
            value.resized(signal.width)
        };
        signal.pending = Some(value);
    }

    /// Schedule an integer value.
    pub fn drive_u64(&mut self, id: SignalId, value: u64) {
        let width = self.signals[id.0].width;
        self.drive(id, BitVector::from_u64(value, width));
    }

    /// Schedule a boolean value.
    pub fn drive_bool(&mut self, id: SignalId, value: bool) {
        self.drive_u64(id, value as u64);
    }

    /// Overwrite the committed value directly, discarding any pending value.
    ///
    /// Only meant for construction-time defaults, before any phase has run.
    pub fn set_immediate(&mut self, id: SignalId, value: BitVector) {
        let signal = &mut self.signals[id.0];
        signal.current = value.resized(signal.width);
        signal.pending = None;
    }

    /// Overwrite the committed value with an integer.
    pub fn set_immediate_u64(&mut self, id: SignalId, value: u64) {
        let width = self.signals[id.0].width;
        self.set_immediate(id, BitVector::from_u64(value, width));
    }

    /// Move all pending values to committed.
    ///
    /// Returns the number of signals whose committed value changed.
    pub fn commit(&mut self) -> usize {
        let mut changed = 0;
        for signal in &mut self.signals {
            if let Some(value) = signal.pending.take() {
                if value != signal.current {
                    changed += 1;
                }
                signal.current = value;
            }
        }
        if changed > 0 {
            self.commits += 1;
        }
        changed
    }

    /// Whether any signal has a pending value.
    pub fn has_pending(&self) -> bool {
        self.signals.iter().any(|s| s.pending.is_some())
    }

    /// Number of value-changing commits so far.
    pub fn commit_count(&self) -> u64 {
        self.commits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_lookup() {
        let mut table = SignalTable::new();
        let a = table.add("AWVALID", 1).unwrap();
        let b = table.add("AWADDR", 32).unwrap();
        assert_ne!(a, b);
        assert_eq!(table.lookup("AWADDR").unwrap(), b);
        assert_eq!(table.width(b), 32);
        assert_eq!(table.name(a), "AWVALID");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_duplicate_and_unknown() {
        let mut table = SignalTable::new();
        table.add("X", 1).unwrap();
        assert!(matches!(table.add("X", 1), Err(SimError::DuplicateSignal(_))));
        assert!(matches!(table.lookup("Y"), Err(SimError::UnknownSignal(_))));
    }

    #[test]
    fn test_drive_is_deferred() {
        let mut table = SignalTable::new();
        let data = table.add("WDATA", 32).unwrap();

        table.drive_u64(data, 0xDEAD_BEEF);
        assert_eq!(table.get_u64(data), 0);
        assert!(table.has_pending());

        assert_eq!(table.commit(), 1);
        assert_eq!(table.get_u64(data), 0xDEAD_BEEF);
        assert!(!table.has_pending());
    }

    #[test]
    fn test_last_drive_wins() {
        let mut table = SignalTable::new();
        let valid = table.add("VALID", 1).unwrap();

        table.drive_bool(valid, true);
        table.drive_bool(valid, false);
        table.commit();
        assert!(!table.is_high(valid));
    }

    #[test]
    fn test_drive_truncates_to_width() {
        let mut table = SignalTable::new();
        let resp = table.add("BRESP", 2).unwrap();
        table.drive_u64(resp, 0b111);
        table.commit();
        assert_eq!(table.get_u64(resp), 0b11);
    }

    #[test]
    fn test_set_immediate() {
        let mut table = SignalTable::new();
        let ready = table.add("READY", 1).unwrap();
        table.drive_bool(ready, false);
        table.set_immediate_u64(ready, 1);
        assert!(table.is_high(ready));
        // Pending value was discarded
        table.commit();
        assert!(table.is_high(ready));
    }

    #[test]
    fn test_commit_counts_changes_only() {
        let mut table = SignalTable::new();
        let a = table.add("A", 8).unwrap();
        table.drive_u64(a, 0);
        assert_eq!(table.commit(), 0);
        assert_eq!(table.commit_count(), 0);
        table.drive_u64(a, 5);
        assert_eq!(table.commit(), 1);
        assert_eq!(table.commit_count(), 1);
    }
}
