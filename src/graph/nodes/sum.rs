//! Sum of two scalars.

use crate::graph::connectable::SlotMap;
use crate::graph::error::{ComputeError, GraphResult};
use crate::graph::kernel::{Arguments, Kernel, Outcome};
use crate::graph::nodes::scalar;
use crate::types::{Buffer, DataKind};

/// `out = a + b`; `b` is optional and counts as zero while unconnected.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl Kernel for Sum {
    fn type_name(&self) -> &'static str {
        "Sum"
    }

    fn declare(&self, slots: &mut SlotMap) -> GraphResult<()> {
        slots.declare_input("a", DataKind::Scalar)?;
        slots.declare_optional_input("b", DataKind::Scalar)?;
        slots.declare_output("out", Buffer::Scalar(0.0))
    }

    fn compute(&mut self, args: &mut Arguments<'_, '_>) -> Result<Outcome, ComputeError> {
        let a = scalar(args.input("a")?, "a")?;
        let b = match args.optional_input("b") {
            Some(buffer) => scalar(buffer, "b")?,
            None => 0.0,
        };
        *args.output("out")? = Buffer::Scalar(a + b);
        Ok(Outcome::Valid)
    }
}
