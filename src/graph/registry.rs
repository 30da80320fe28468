//! Kernel factory keyed by type name.
//!
//! Network configurations only store a kernel's type name and parameters.
//! [`KernelRegistry`] turns those back into boxed kernels when a
//! configuration is read.

use crate::graph::error::{GraphError, GraphResult};
use crate::graph::kernel::Kernel;
use crate::graph::nodes::{Constant, Integrator, StaticGain, Sum};
use std::collections::BTreeMap;
use std::fmt;

type Constructor = Box<dyn Fn() -> Box<dyn Kernel> + Send + Sync>;

/// Factory for creating kernels dynamically.
#[derive(Default)]
pub struct KernelRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl KernelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in kernel.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("Constant", || Box::new(Constant::default()));
        registry.register("StaticGain", || Box::new(StaticGain::default()));
        registry.register("Sum", || Box::new(Sum::default()));
        registry.register("Integrator", || Box::new(Integrator::default()));
        registry
    }

    /// Register a constructor, replacing any previous one for `type_name`.
    pub fn register<F>(&mut self, type_name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn Kernel> + Send + Sync + 'static,
    {
        self.constructors
            .insert(type_name.into(), Box::new(constructor));
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Create a kernel and apply `parameters` unless they are null.
    pub fn create(
        &self,
        type_name: &str,
        parameters: &serde_json::Value,
    ) -> GraphResult<Box<dyn Kernel>> {
        let constructor = self
            .constructors
            .get(type_name)
            .ok_or_else(|| GraphError::UnknownKernel(type_name.to_string()))?;
        let mut kernel = constructor();
        if !parameters.is_null() {
            kernel.set_parameters(parameters)?;
        }
        Ok(kernel)
    }
}

impl fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.constructors.keys()).finish()
    }
}
