//! Steps: connectable nodes that perform one computation per trigger.
//!
//! `on_trigger` is the single entry point used by the wave executor:
//!
//! 1. Refuse re-entry if the step is busy on another chain.
//! 2. Verify mandatory inputs are connected and not in error; otherwise mark
//!    outputs `Error` and skip compute.
//! 3. Lock all inputs (shared) and outputs/buffers (exclusive) in data-id order.
//! 4. Run the kernel. Errors and panics are caught here and never travel
//!    further than this step.
//! 5. Publish the new validity of outputs while still holding the locks.
//!    Events describing the change go out only after the locks are released,
//!    so observers may read the data they are told about.

use crate::graph::connectable::SlotMap;
use crate::graph::data::Data;
use crate::graph::error::{ComputeError, GraphResult};
use crate::graph::events::{EventBus, NetworkEvent};
use crate::graph::id::ElementId;
use crate::graph::kernel::{Arguments, Kernel, Outcome, WaveTime};
use crate::graph::lockable::{LockMode, LockOrderViolation, LockSet};
use crate::graph::slot::DataRole;
use crate::graph::validity::{Validity, ValidityEvent};
use crate::types::Buffer;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

/// Settled execution state of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum StepState {
    /// Never computed, or reset.
    #[default]
    Idle = 0,
    /// Last compute succeeded.
    Computed = 1,
    /// Last trigger found missing or erroneous mandatory inputs.
    InvalidInputs = 2,
    /// Last compute returned an error or panicked.
    Exception = 3,
}

impl StepState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => StepState::Computed,
            2 => StepState::InvalidInputs,
            3 => StepState::Exception,
            _ => StepState::Idle,
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepState::Idle => write!(f, "idle"),
            StepState::Computed => write!(f, "computed"),
            StepState::InvalidInputs => write!(f, "invalid inputs"),
            StepState::Exception => write!(f, "exception"),
        }
    }
}

/// What happened when a step was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Computed,
    Warned,
    InputsInvalid,
    Failed,
    /// Another chain is currently running this step.
    Busy,
}

impl TriggerOutcome {
    /// Whether listeners should hear about this trigger.
    ///
    /// Failures are forwarded so downstream steps re-check their inputs and
    /// turn invalid; a busy refusal is not.
    pub fn signals_listeners(self) -> bool {
        self != TriggerOutcome::Busy
    }

    pub fn computed(self) -> bool {
        matches!(self, TriggerOutcome::Computed | TriggerOutcome::Warned)
    }
}

/// Everything a step needs from its surroundings for one trigger.
pub(crate) struct StepContext<'g> {
    pub id: ElementId,
    pub name: &'g str,
    pub slots: &'g SlotMap,
    pub time: WaveTime,
    pub events: &'g EventBus,
}

/// Clears the busy flag on every exit path.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Step {
    kernel: Mutex<Box<dyn Kernel>>,
    type_name: &'static str,
    state: AtomicU8,
    busy: AtomicBool,
    deferred: AtomicBool,
    computes: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl Step {
    pub fn new(kernel: Box<dyn Kernel>) -> Self {
        let type_name = kernel.type_name();
        Self {
            kernel: Mutex::new(kernel),
            type_name,
            state: AtomicU8::new(StepState::Idle as u8),
            busy: AtomicBool::new(false),
            deferred: AtomicBool::new(false),
            computes: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn state(&self) -> StepState {
        StepState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Set when a feedback edge reached this step after it already ran in a wave.
    pub fn is_deferred(&self) -> bool {
        self.deferred.load(Ordering::Acquire)
    }

    pub(crate) fn mark_deferred(&self) {
        self.deferred.store(true, Ordering::Release);
    }

    /// Number of computes that ran (successful or not).
    pub fn compute_count(&self) -> u64 {
        self.computes.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Parameters of the kernel, for configuration output.
    pub fn parameters(&self) -> serde_json::Value {
        self.kernel.lock().parameters()
    }

    pub(crate) fn set_parameters(&self, parameters: &serde_json::Value) -> GraphResult<()> {
        self.kernel.lock().set_parameters(parameters)
    }

    pub(crate) fn declare(&self, slots: &mut SlotMap) -> GraphResult<()> {
        self.kernel.lock().declare(slots)
    }

    /// Overall validity: `Error` after a failure, otherwise the worst output.
    pub fn validity(&self, slots: &SlotMap) -> Validity {
        match self.state() {
            StepState::Exception | StepState::InvalidInputs => Validity::Error,
            _ => Validity::worst_of(slots.outputs().map(|s| s.validity())),
        }
    }

    fn settle(&self, ctx: &StepContext<'_>, next: StepState, pending: &mut Vec<NetworkEvent>) {
        let previous = StepState::from_u8(self.state.swap(next as u8, Ordering::AcqRel));
        if previous != next {
            pending.push(NetworkEvent::StepStateChanged {
                element: ctx.id,
                from: previous,
                to: next,
            });
        }
    }

    /// Apply `event` to every output and every buffer this step owns.
    fn publish(
        &self,
        ctx: &StepContext<'_>,
        event: ValidityEvent,
        pending: &mut Vec<NetworkEvent>,
    ) {
        for slot in ctx.slots.iter() {
            let publishes = match slot.role() {
                DataRole::Output => true,
                DataRole::Buffer => slot.owns_data(),
                DataRole::Input => false,
            };
            if !publishes {
                continue;
            }
            if let Some(data) = slot.data() {
                let (from, to) = data.validity_cell().apply(event);
                if from != to {
                    pending.push(NetworkEvent::ValidityChanged {
                        element: ctx.id,
                        role: slot.role(),
                        slot: slot.name().to_string(),
                        from,
                        to,
                    });
                }
            }
        }
    }

    /// Reason the step can't compute, if any.
    fn check_inputs(slots: &SlotMap) -> Option<String> {
        for slot in slots.inputs().filter(|s| s.is_mandatory()) {
            match slot.data() {
                None => return Some(format!("input '{}' is not connected", slot.name())),
                Some(data) if data.validity().is_error() => {
                    return Some(format!("input '{}' is in error", slot.name()))
                }
                Some(_) => {}
            }
        }
        None
    }

    fn lock_requests<'g>(slots: &'g SlotMap) -> impl Iterator<Item = (&'g Data, LockMode)> {
        slots.iter().filter_map(|slot| {
            let mode = match slot.role() {
                DataRole::Input => LockMode::Read,
                DataRole::Output | DataRole::Buffer => LockMode::Write,
            };
            slot.data().map(|data| (&**data, mode))
        })
    }

    /// Outputs and buffers must keep the kind they were declared with.
    fn check_kinds(slots: &SlotMap, locks: &mut LockSet<'_>) -> Result<(), ComputeError> {
        for slot in slots.iter().filter(|s| s.role() != DataRole::Input) {
            let Some(data) = slot.data() else { continue };
            if let Some(buffer) = locks.get_mut(data.id()) {
                if buffer.kind() != data.kind() {
                    let found = buffer.kind();
                    *buffer = Buffer::zero_of(data.kind());
                    return Err(ComputeError::TypeMismatch {
                        name: slot.name().to_string(),
                        expected: data.kind(),
                        found,
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn on_trigger(&self, ctx: &StepContext<'_>) -> TriggerOutcome {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("Step '{}' is busy, refusing trigger", ctx.name);
            return TriggerOutcome::Busy;
        }
        let _busy = BusyGuard(&self.busy);
        self.deferred.store(false, Ordering::Release);
        let mut pending = Vec::new();

        if let Some(reason) = Self::check_inputs(ctx.slots) {
            tracing::debug!("Step '{}' skipped: {}", ctx.name, reason);
            self.publish(ctx, ValidityEvent::InputsInvalid, &mut pending);
            self.settle(ctx, StepState::InvalidInputs, &mut pending);
            pending.into_iter().for_each(|e| ctx.events.emit(e));
            return TriggerOutcome::InputsInvalid;
        }

        let mut locks = LockSet::acquire(Self::lock_requests(ctx.slots));
        let result = {
            let mut kernel = self.kernel.lock();
            let mut args = Arguments::new(ctx.slots, &mut locks, ctx.time);
            match catch_unwind(AssertUnwindSafe(|| kernel.compute(&mut args))) {
                Ok(result) => result,
                Err(payload) => {
                    if payload.is::<LockOrderViolation>() {
                        resume_unwind(payload);
                    }
                    Err(ComputeError::Panicked(panic_message(payload.as_ref())))
                }
            }
        };
        self.computes.fetch_add(1, Ordering::Relaxed);
        let result = result.and_then(|outcome| {
            Self::check_kinds(ctx.slots, &mut locks)?;
            Ok(outcome)
        });

        let outcome = match result {
            Ok(Outcome::Valid) => {
                self.publish(ctx, ValidityEvent::Computed, &mut pending);
                self.settle(ctx, StepState::Computed, &mut pending);
                TriggerOutcome::Computed
            }
            Ok(Outcome::Warning(message)) => {
                tracing::warn!("Step '{}' computed with warning: {}", ctx.name, message);
                self.publish(ctx, ValidityEvent::ComputedWithWarning, &mut pending);
                self.settle(ctx, StepState::Computed, &mut pending);
                TriggerOutcome::Warned
            }
            Err(err) => {
                tracing::error!("Step '{}' ({}) failed: {}", ctx.name, self.type_name, err);
                *self.last_error.lock() = Some(err.to_string());
                self.publish(ctx, ValidityEvent::ComputeFailed, &mut pending);
                self.settle(ctx, StepState::Exception, &mut pending);
                pending.push(NetworkEvent::ComputeFailed {
                    element: ctx.id,
                    step: ctx.name.to_string(),
                    message: err.to_string(),
                });
                TriggerOutcome::Failed
            }
        };
        drop(locks);
        pending.into_iter().for_each(|e| ctx.events.emit(e));
        outcome
    }

    /// Run the kernel's reset with every slot locked and clear validities.
    pub(crate) fn reset(&self, ctx: &StepContext<'_>) -> Result<(), ComputeError> {
        let mut locks = LockSet::acquire(Self::lock_requests(ctx.slots));
        let result = {
            let mut kernel = self.kernel.lock();
            let mut args = Arguments::new(ctx.slots, &mut locks, ctx.time);
            match catch_unwind(AssertUnwindSafe(|| kernel.reset(&mut args))) {
                Ok(result) => result,
                Err(payload) => Err(ComputeError::Panicked(panic_message(payload.as_ref()))),
            }
        };
        let mut pending = Vec::new();
        self.publish(ctx, ValidityEvent::Reset, &mut pending);
        *self.last_error.lock() = None;
        self.settle(ctx, StepState::Idle, &mut pending);
        drop(locks);
        pending.into_iter().for_each(|e| ctx.events.emit(e));
        result
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("type_name", &self.type_name)
            .field("state", &self.state())
            .field("computes", &self.compute_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
