//! Read-only window sampler for timing assertions.
//!
//! A [`SignalRecorder`] runs as an ordinary process and captures a fixed set
//! of signals in every read-only window, i.e. exactly what every agent
//! observed when it made its decisions in that cycle.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::AxiError;
use crate::sim::{Phase, Process, SignalId, SimContext, Simulator, Wait};

/// Values of the recorded signals in one read-only window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub cycle: u64,
    pub values: Vec<u64>,
}

/// Handle to a recording process.
#[derive(Clone)]
pub struct SignalRecorder {
    signals: Vec<SignalId>,
    samples: Rc<RefCell<Vec<Sample>>>,
}

impl SignalRecorder {
    /// Start recording `signals` from the next cycle on.
    pub fn spawn(sim: &mut Simulator, signals: &[SignalId]) -> Self {
        let samples = Rc::new(RefCell::new(Vec::new()));
        sim.spawn(Recorder {
            signals: signals.to_vec(),
            samples: samples.clone(),
        });
        Self {
            signals: signals.to_vec(),
            samples,
        }
    }

    /// All samples so far, oldest first.
    pub fn samples(&self) -> Vec<Sample> {
        self.samples.borrow().clone()
    }

    /// History of one recorded signal as `(cycle, value)` pairs.
    ///
    /// Empty if the signal is not recorded.
    pub fn column(&self, signal: SignalId) -> Vec<(u64, u64)> {
        let Some(index) = self.signals.iter().position(|s| *s == signal) else {
            return Vec::new();
        };
        self.samples
            .borrow()
            .iter()
            .map(|s| (s.cycle, s.values[index]))
            .collect()
    }

    /// Cycles in which every signal in `signals` was non-zero.
    pub fn cycles_where_high(&self, signals: &[SignalId]) -> Vec<u64> {
        let indices: Vec<usize> = signals
            .iter()
            .filter_map(|id| self.signals.iter().position(|s| s == id))
            .collect();
        if indices.len() != signals.len() {
            return Vec::new();
        }
        self.samples
            .borrow()
            .iter()
            .filter(|s| indices.iter().all(|&i| s.values[i] != 0))
            .map(|s| s.cycle)
            .collect()
    }
}

struct Recorder {
    signals: Vec<SignalId>,
    samples: Rc<RefCell<Vec<Sample>>>,
}

impl Process for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn resume(&mut self, phase: Phase, ctx: &mut SimContext<'_>) -> Result<Wait, AxiError> {
        if phase == Phase::ReadOnly {
            let values = self.signals.iter().map(|id| ctx.signals.get_u64(*id)).collect();
            self.samples.borrow_mut().push(Sample {
                cycle: ctx.cycle(),
                values,
            });
        }
        Ok(Wait::ReadOnly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        sig: SignalId,
        next: u64,
    }

    impl Process for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn resume(&mut self, _: Phase, ctx: &mut SimContext<'_>) -> Result<Wait, AxiError> {
            ctx.signals.drive_u64(self.sig, self.next);
            self.next += 1;
            Ok(Wait::NextEdge)
        }
    }

    #[test]
    fn test_records_settled_values() {
        let mut sim = Simulator::new();
        let count = sim.signals_mut().add("count", 8).unwrap();
        let flag = sim.signals_mut().add("flag", 1).unwrap();
        sim.spawn(Counter { sig: count, next: 1 });
        let recorder = SignalRecorder::spawn(&mut sim, &[count, flag]);
        sim.run(3);

        assert_eq!(recorder.column(count), vec![(1, 1), (2, 2), (3, 3)]);
        assert_eq!(recorder.column(flag), vec![(1, 0), (2, 0), (3, 0)]);
        assert!(recorder.cycles_where_high(&[count, flag]).is_empty());
        assert_eq!(recorder.cycles_where_high(&[count]), vec![1, 2, 3]);
    }
}
