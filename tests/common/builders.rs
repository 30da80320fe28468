//! Recorder kernels for integration tests
//!
//! A recorder notes every compute in a shared log, counts its computes and
//! can be told to fail, panic or dawdle. Its `out` is one plus the sum of
//! its connected scalar inputs, so values visibly move through a chain.

use fieldnet::graph::{Arguments, ComputeError, Kernel, Outcome, SlotMap};
use fieldnet::{Buffer, DataKind, GraphResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared, ordered record of which recorders computed
#[derive(Debug, Clone, Default)]
pub struct ComputeLog(Arc<Mutex<Vec<String>>>);

impl ComputeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, label: &str) {
        self.0.lock().push(label.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, label: &str) -> usize {
        self.0.lock().iter().filter(|l| *l == label).count()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// Handles kept by the test after the recorder moved into the network
#[derive(Debug, Clone, Default)]
pub struct RecorderHandle {
    pub computes: Arc<AtomicU64>,
    pub fail: Arc<AtomicBool>,
}

impl RecorderHandle {
    pub fn computes(&self) -> u64 {
        self.computes.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

pub struct Recorder {
    label: String,
    inputs: Vec<(String, bool)>,
    log: Option<ComputeLog>,
    handle: RecorderHandle,
    panics: bool,
    delay: Duration,
}

impl Kernel for Recorder {
    fn type_name(&self) -> &'static str {
        "Recorder"
    }

    fn declare(&self, slots: &mut SlotMap) -> GraphResult<()> {
        for (name, mandatory) in &self.inputs {
            if *mandatory {
                slots.declare_input(name.as_str(), DataKind::Scalar)?;
            } else {
                slots.declare_optional_input(name.as_str(), DataKind::Scalar)?;
            }
        }
        slots.declare_output("out", Buffer::Scalar(0.0))
    }

    fn compute(&mut self, args: &mut Arguments<'_, '_>) -> Result<Outcome, ComputeError> {
        if let Some(log) = &self.log {
            log.push(&self.label);
        }
        self.handle.computes.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.panics {
            panic!("recorder '{}' panicked", self.label);
        }
        if self.handle.fail.load(Ordering::SeqCst) {
            return Err(ComputeError::failed(format!("recorder '{}' failed", self.label)));
        }

        let mut total = 1.0;
        for (name, _) in &self.inputs {
            if let Some(value) = args.optional_input(name).and_then(Buffer::as_scalar) {
                total += value;
            }
        }
        *args.output("out")? = Buffer::Scalar(total);
        Ok(Outcome::Valid)
    }
}

/// Builder for test recorders
pub struct RecorderBuilder {
    label: String,
    inputs: Vec<(String, bool)>,
    log: Option<ComputeLog>,
    panics: bool,
    delay: Duration,
}

impl RecorderBuilder {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            inputs: Vec::new(),
            log: None,
            panics: false,
            delay: Duration::ZERO,
        }
    }

    pub fn input(mut self, name: &str) -> Self {
        self.inputs.push((name.to_string(), true));
        self
    }

    pub fn optional_input(mut self, name: &str) -> Self {
        self.inputs.push((name.to_string(), false));
        self
    }

    pub fn log(mut self, log: &ComputeLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub fn panics(mut self) -> Self {
        self.panics = true;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn build(self) -> (Recorder, RecorderHandle) {
        let handle = RecorderHandle::default();
        let recorder = Recorder {
            label: self.label,
            inputs: self.inputs,
            log: self.log,
            handle: handle.clone(),
            panics: self.panics,
            delay: self.delay,
        };
        (recorder, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_log() {
        let log = ComputeLog::new();
        log.push("a");
        log.push("b");
        log.push("a");
        assert_eq!(log.count("a"), 2);
        assert_eq!(log.entries(), vec!["a", "b", "a"]);
        log.clear();
        assert!(log.entries().is_empty());
    }
}
