//! Static gain.

use crate::graph::connectable::SlotMap;
use crate::graph::error::{ComputeError, GraphResult};
use crate::graph::kernel::{Arguments, Kernel, Outcome};
use crate::graph::nodes::{parse_parameters, scalar};
use crate::types::{Buffer, DataKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticGain {
    pub gain: f64,
    /// Outputs above this magnitude are flagged with a warning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturation: Option<f64>,
}

impl Default for StaticGain {
    fn default() -> Self {
        Self {
            gain: 1.0,
            saturation: None,
        }
    }
}

impl StaticGain {
    pub fn new(gain: f64) -> Self {
        Self {
            gain,
            ..Default::default()
        }
    }
}

impl Kernel for StaticGain {
    fn type_name(&self) -> &'static str {
        "StaticGain"
    }

    fn declare(&self, slots: &mut SlotMap) -> GraphResult<()> {
        slots.declare_input("in", DataKind::Scalar)?;
        slots.declare_output("out", Buffer::Scalar(0.0))
    }

    fn compute(&mut self, args: &mut Arguments<'_, '_>) -> Result<Outcome, ComputeError> {
        let (input, output) = args.input_output("in", "out")?;
        let value = scalar(input, "in")? * self.gain;
        *output = Buffer::Scalar(value);

        match self.saturation {
            Some(limit) if value.abs() > limit => Ok(Outcome::Warning(format!(
                "output {} exceeds saturation {}",
                value, limit
            ))),
            _ => Ok(Outcome::Valid),
        }
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    fn set_parameters(&mut self, parameters: &serde_json::Value) -> GraphResult<()> {
        *self = parse_parameters(self.type_name(), parameters)?;
        Ok(())
    }
}
