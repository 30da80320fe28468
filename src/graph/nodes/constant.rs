//! Constant source.

use crate::graph::connectable::SlotMap;
use crate::graph::error::{ComputeError, GraphResult};
use crate::graph::kernel::{Arguments, Kernel, Outcome};
use crate::graph::nodes::parse_parameters;
use crate::types::Buffer;
use serde::{Deserialize, Serialize};

/// Writes a fixed scalar to `out` on every trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub value: f64,
}

impl Constant {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl Kernel for Constant {
    fn type_name(&self) -> &'static str {
        "Constant"
    }

    fn declare(&self, slots: &mut SlotMap) -> GraphResult<()> {
        slots.declare_output("out", Buffer::Scalar(self.value))
    }

    fn compute(&mut self, args: &mut Arguments<'_, '_>) -> Result<Outcome, ComputeError> {
        *args.output("out")? = Buffer::Scalar(self.value);
        Ok(Outcome::Valid)
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({ "value": self.value })
    }

    fn set_parameters(&mut self, parameters: &serde_json::Value) -> GraphResult<()> {
        *self = parse_parameters(self.type_name(), parameters)?;
        Ok(())
    }
}
