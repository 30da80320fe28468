//! Kernel abstraction: the computation a step performs.
//!
//! Concrete computation units are supplied as [`Kernel`] implementations.
//! The engine only relies on the slots they declare and on `compute()`;
//! scheduling, locking and validity bookkeeping happen in
//! [`Step`](crate::graph::Step).
//!
//! During `compute()` every declared slot is already locked. [`Arguments`]
//! hands out shared references to inputs and mutable references to outputs
//! and buffers straight from those locks.

use crate::graph::connectable::SlotMap;
use crate::graph::data::Data;
use crate::graph::error::{ComputeError, GraphResult};
use crate::graph::lockable::LockSet;
use crate::graph::slot::DataRole;
use crate::graph::validity::Validity;
use crate::types::Buffer;
use std::time::Duration;

/// Timing information for the wave a compute belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaveTime {
    /// Monotonic wave counter of the originating trigger.
    pub wave: u64,
    /// Integration step for this wave.
    pub dt: Duration,
    /// Time since the originating trigger started.
    pub elapsed: Duration,
}

/// Result of a successful compute.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Outcome {
    #[default]
    Valid,
    /// Outputs were written but should be flagged as questionable.
    Warning(String),
}

/// Trait implemented by every concrete computation unit.
pub trait Kernel: Send {
    /// Stable type name, used by the registry and in configurations.
    fn type_name(&self) -> &'static str;

    /// Declare slots. Called once when the step is added.
    fn declare(&self, slots: &mut SlotMap) -> GraphResult<()>;

    /// Perform one computation with all slots locked.
    fn compute(&mut self, args: &mut Arguments<'_, '_>) -> Result<Outcome, ComputeError>;

    /// Return internal state and buffers to their initial values.
    fn reset(&mut self, _args: &mut Arguments<'_, '_>) -> Result<(), ComputeError> {
        Ok(())
    }

    /// Parameters written into a network configuration.
    fn parameters(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Apply parameters read from a network configuration.
    fn set_parameters(&mut self, _parameters: &serde_json::Value) -> GraphResult<()> {
        Ok(())
    }
}

/// View over a step's locked slots for one compute call.
pub struct Arguments<'a, 'g> {
    slots: &'g SlotMap,
    locks: &'a mut LockSet<'g>,
    time: WaveTime,
}

impl<'a, 'g> Arguments<'a, 'g> {
    pub(crate) fn new(slots: &'g SlotMap, locks: &'a mut LockSet<'g>, time: WaveTime) -> Self {
        Self { slots, locks, time }
    }

    pub fn time(&self) -> WaveTime {
        self.time
    }

    pub fn dt(&self) -> Duration {
        self.time.dt
    }

    /// Integration step in seconds.
    pub fn dt_secs(&self) -> f64 {
        self.time.dt.as_secs_f64()
    }

    pub fn wave(&self) -> u64 {
        self.time.wave
    }

    fn data(&self, role: DataRole, name: &str) -> Result<&'g Data, ComputeError> {
        self.slots
            .get(role, name)
            .ok()
            .and_then(|slot| slot.data())
            .map(|data| &**data)
            .ok_or_else(|| ComputeError::MissingSlot {
                role,
                name: name.to_string(),
            })
    }

    fn read(&self, role: DataRole, name: &str) -> Result<&Buffer, ComputeError> {
        let data = self.data(role, name)?;
        self.locks
            .get(data.id())
            .ok_or_else(|| ComputeError::MissingSlot {
                role,
                name: name.to_string(),
            })
    }

    fn write(&mut self, role: DataRole, name: &str) -> Result<&mut Buffer, ComputeError> {
        let data = self.data(role, name)?;
        self.locks
            .get_mut(data.id())
            .ok_or_else(|| ComputeError::MissingSlot {
                role,
                name: name.to_string(),
            })
    }

    /// Content of a connected input.
    pub fn input(&self, name: &str) -> Result<&Buffer, ComputeError> {
        self.read(DataRole::Input, name)
    }

    /// Content of an input, or `None` if it is unconnected.
    pub fn optional_input(&self, name: &str) -> Option<&Buffer> {
        self.read(DataRole::Input, name).ok()
    }

    /// Validity published by the producer of an input.
    pub fn input_validity(&self, name: &str) -> Validity {
        self.slots
            .get(DataRole::Input, name)
            .map(|slot| slot.validity())
            .unwrap_or(Validity::Unknown)
    }

    pub fn output(&mut self, name: &str) -> Result<&mut Buffer, ComputeError> {
        self.write(DataRole::Output, name)
    }

    pub fn buffer(&mut self, name: &str) -> Result<&mut Buffer, ComputeError> {
        self.write(DataRole::Buffer, name)
    }

    /// Read-only view of a buffer slot.
    pub fn buffer_ref(&self, name: &str) -> Result<&Buffer, ComputeError> {
        self.read(DataRole::Buffer, name)
    }

    /// Borrow one slot for reading and another for writing at the same time.
    pub fn read_write(
        &mut self,
        read: (DataRole, &str),
        write: (DataRole, &str),
    ) -> Result<(&Buffer, &mut Buffer), ComputeError> {
        let source = self.data(read.0, read.1)?;
        let target = self.data(write.0, write.1)?;
        if source.id() == target.id() {
            return Err(ComputeError::Aliased(
                read.1.to_string(),
                write.1.to_string(),
            ));
        }
        self.locks
            .pair_mut(source.id(), target.id())
            .ok_or_else(|| ComputeError::MissingSlot {
                role: write.0,
                name: write.1.to_string(),
            })
    }

    /// Shorthand for reading an input while writing an output.
    pub fn input_output(
        &mut self,
        input: &str,
        output: &str,
    ) -> Result<(&Buffer, &mut Buffer), ComputeError> {
        self.read_write((DataRole::Input, input), (DataRole::Output, output))
    }
}

type DeclareFn = Box<dyn Fn(&mut SlotMap) -> GraphResult<()> + Send>;
type ComputeFn = Box<dyn FnMut(&mut Arguments<'_, '_>) -> Result<Outcome, ComputeError> + Send>;

/// Kernel assembled from closures, handy for domain code that has no state
/// worth a dedicated type.
pub struct FnKernel {
    type_name: &'static str,
    declare: DeclareFn,
    compute: ComputeFn,
}

impl FnKernel {
    pub fn new(
        type_name: &'static str,
        declare: impl Fn(&mut SlotMap) -> GraphResult<()> + Send + 'static,
        compute: impl FnMut(&mut Arguments<'_, '_>) -> Result<Outcome, ComputeError> + Send + 'static,
    ) -> Self {
        Self {
            type_name,
            declare: Box::new(declare),
            compute: Box::new(compute),
        }
    }
}

impl Kernel for FnKernel {
    fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn declare(&self, slots: &mut SlotMap) -> GraphResult<()> {
        (self.declare)(slots)
    }

    fn compute(&mut self, args: &mut Arguments<'_, '_>) -> Result<Outcome, ComputeError> {
        (self.compute)(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::lockable::LockMode;
    use crate::types::DataKind;

    fn locked<'g>(slots: &'g SlotMap) -> LockSet<'g> {
        LockSet::acquire(slots.iter().filter_map(|slot| {
            let mode = match slot.role() {
                DataRole::Input => LockMode::Read,
                _ => LockMode::Write,
            };
            slot.data().map(|d| (&**d, mode))
        }))
    }

    #[test]
    fn test_arguments_access() {
        let mut slots = SlotMap::new();
        slots.declare_input("in", DataKind::Scalar).unwrap();
        slots.declare_output("out", Buffer::Scalar(0.0)).unwrap();
        let source = Data::new(Buffer::Scalar(4.0));
        slots
            .get_mut(DataRole::Input, "in")
            .unwrap()
            .bind(source.clone());

        let mut locks = locked(&slots);
        let mut args = Arguments::new(&slots, &mut locks, WaveTime::default());
        assert_eq!(args.input("in").unwrap(), &Buffer::Scalar(4.0));
        {
            let (input, output) = args.input_output("in", "out").unwrap();
            *output = input.clone();
        }
        assert!(args.output("in").is_err());
        assert!(matches!(
            args.input("nope"),
            Err(ComputeError::MissingSlot { .. })
        ));
        // Inputs are read-locked
        assert!(args.read_write((DataRole::Output, "out"), (DataRole::Input, "in")).is_err());
    }

    #[test]
    fn test_aliased_slots() {
        let mut slots = SlotMap::new();
        slots.declare_optional_input("in", DataKind::Scalar).unwrap();
        slots.declare_buffer("state", Buffer::Scalar(0.0)).unwrap();
        let state = slots.data(DataRole::Buffer, "state").unwrap().unwrap();
        slots.get_mut(DataRole::Input, "in").unwrap().bind(state);

        let mut locks = locked(&slots);
        let mut args = Arguments::new(&slots, &mut locks, WaveTime::default());
        let err = args
            .read_write((DataRole::Input, "in"), (DataRole::Buffer, "state"))
            .unwrap_err();
        assert_eq!(err, ComputeError::Aliased("in".into(), "state".into()));
    }

    #[test]
    fn test_unconnected_optional_input() {
        let mut slots = SlotMap::new();
        slots.declare_optional_input("bias", DataKind::Scalar).unwrap();
        let mut locks = locked(&slots);
        let args = Arguments::new(&slots, &mut locks, WaveTime::default());
        assert!(args.optional_input("bias").is_none());
        assert_eq!(args.input_validity("bias"), Validity::Unknown);
    }
}
