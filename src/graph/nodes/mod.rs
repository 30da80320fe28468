//! Built-in kernels.
//!
//! Small scalar kernels used by demos, tests and the benchmark. Domain
//! kernels live outside the engine and are registered with a
//! [`KernelRegistry`](crate::graph::KernelRegistry).

pub mod constant;
pub mod gain;
pub mod integrator;
pub mod sum;

pub use constant::Constant;
pub use gain::StaticGain;
pub use integrator::Integrator;
pub use sum::Sum;

use crate::graph::error::{ComputeError, GraphError, GraphResult};
use crate::types::{Buffer, DataKind};
use serde::de::DeserializeOwned;

/// Read a scalar out of a slot buffer.
pub(crate) fn scalar(buffer: &Buffer, name: &str) -> Result<f64, ComputeError> {
    buffer.as_scalar().ok_or_else(|| ComputeError::TypeMismatch {
        name: name.to_string(),
        expected: DataKind::Scalar,
        found: buffer.kind(),
    })
}

/// Deserialize kernel parameters from a configuration value.
pub(crate) fn parse_parameters<T: DeserializeOwned>(
    kernel: &str,
    parameters: &serde_json::Value,
) -> GraphResult<T> {
    serde_json::from_value(parameters.clone()).map_err(|e| {
        GraphError::InvalidParameter(format!("{} parameters: {}", kernel, e))
    })
}
