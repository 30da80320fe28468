//! Explicit Euler integrator.
//!
//! `state += rate * dt` each wave, where `dt` comes from the originating
//! looped trigger. The state lives in a buffer slot so another integrator
//! (or any step with a matching buffer) can share it through a buffer
//! connection.

use crate::graph::connectable::SlotMap;
use crate::graph::error::{ComputeError, GraphResult};
use crate::graph::kernel::{Arguments, Kernel, Outcome};
use crate::graph::nodes::{parse_parameters, scalar};
use crate::types::{Buffer, DataKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Integrator {
    /// State after creation and after `reset()`.
    pub initial: f64,
}

impl Integrator {
    pub fn new(initial: f64) -> Self {
        Self { initial }
    }
}

impl Kernel for Integrator {
    fn type_name(&self) -> &'static str {
        "Integrator"
    }

    fn declare(&self, slots: &mut SlotMap) -> GraphResult<()> {
        slots.declare_input("rate", DataKind::Scalar)?;
        slots.declare_buffer("state", Buffer::Scalar(self.initial))?;
        slots.declare_output("out", Buffer::Scalar(self.initial))
    }

    fn compute(&mut self, args: &mut Arguments<'_, '_>) -> Result<Outcome, ComputeError> {
        let rate = scalar(args.input("rate")?, "rate")?;
        let dt = args.dt_secs();

        let state = args.buffer("state")?;
        let next = scalar(state, "state")? + rate * dt;
        *state = Buffer::Scalar(next);

        *args.output("out")? = Buffer::Scalar(next);
        Ok(Outcome::Valid)
    }

    fn reset(&mut self, args: &mut Arguments<'_, '_>) -> Result<(), ComputeError> {
        *args.buffer("state")? = Buffer::Scalar(self.initial);
        *args.output("out")? = Buffer::Scalar(self.initial);
        Ok(())
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({ "initial": self.initial })
    }

    fn set_parameters(&mut self, parameters: &serde_json::Value) -> GraphResult<()> {
        *self = parse_parameters(self.type_name(), parameters)?;
        Ok(())
    }
}
