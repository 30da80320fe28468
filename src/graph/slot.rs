//! Data slots: the named, typed ports of a node.
//!
//! Each slot has a [`DataRole`]. Output and buffer slots own the data they
//! are declared with; input slots borrow the data of whatever they are
//! connected to. A buffer slot may be rebound to shared data by a
//! connection, in which case its own data is kept for restoration.

use crate::graph::data::{Data, DataRef};
use crate::graph::validity::Validity;
use crate::types::{Buffer, DataKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataRole {
    Input,
    Output,
    Buffer,
}

impl DataRole {
    /// Roles allowed at the source end of a connection.
    pub fn can_source(self) -> bool {
        matches!(self, DataRole::Output | DataRole::Buffer)
    }

    /// Roles allowed at the target end of a connection.
    pub fn can_target(self) -> bool {
        matches!(self, DataRole::Input | DataRole::Buffer)
    }
}

impl fmt::Display for DataRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataRole::Input => write!(f, "input"),
            DataRole::Output => write!(f, "output"),
            DataRole::Buffer => write!(f, "buffer"),
        }
    }
}

/// Declaration of a slot, as produced by a kernel.
#[derive(Debug, Clone)]
pub struct SlotSpec {
    pub name: String,
    pub role: DataRole,
    pub kind: DataKind,
    pub mandatory: bool,
    /// Initial content for outputs and buffers.
    pub initial: Option<Buffer>,
}

impl SlotSpec {
    pub fn input(name: impl Into<String>, kind: DataKind) -> Self {
        Self {
            name: name.into(),
            role: DataRole::Input,
            kind,
            mandatory: true,
            initial: None,
        }
    }

    pub fn output(name: impl Into<String>, initial: Buffer) -> Self {
        Self {
            name: name.into(),
            role: DataRole::Output,
            kind: initial.kind(),
            mandatory: false,
            initial: Some(initial),
        }
    }

    pub fn buffer(name: impl Into<String>, initial: Buffer) -> Self {
        Self {
            name: name.into(),
            role: DataRole::Buffer,
            kind: initial.kind(),
            mandatory: false,
            initial: Some(initial),
        }
    }

    /// Input whose absence does not block computation.
    pub fn optional(mut self) -> Self {
        self.mandatory = false;
        self
    }
}

/// A port on a connectable node.
pub struct DataSlot {
    name: String,
    role: DataRole,
    kind: DataKind,
    mandatory: bool,
    data: Option<DataRef>,
    /// Original data of a buffer slot while it is rebound to shared data.
    own: Option<DataRef>,
}

impl DataSlot {
    pub(crate) fn from_spec(spec: SlotSpec) -> Self {
        let data = match spec.role {
            DataRole::Input => None,
            DataRole::Output | DataRole::Buffer => Some(Data::new(
                spec.initial.unwrap_or_else(|| Buffer::zero_of(spec.kind)),
            )),
        };
        Self {
            name: spec.name,
            role: spec.role,
            kind: spec.kind,
            mandatory: spec.role == DataRole::Input && spec.mandatory,
            data,
            own: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> DataRole {
        self.role
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn data(&self) -> Option<&DataRef> {
        self.data.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        match self.role {
            DataRole::Input => self.data.is_some(),
            DataRole::Output => false,
            DataRole::Buffer => self.own.is_some(),
        }
    }

    /// Whether this slot's data is the one it was declared with.
    pub(crate) fn owns_data(&self) -> bool {
        self.role != DataRole::Input && self.own.is_none()
    }

    /// Validity of the content currently behind this slot.
    ///
    /// Inputs observe the validity published by the upstream producer; an
    /// unconnected input is `Unknown`.
    pub fn validity(&self) -> Validity {
        self.data
            .as_ref()
            .map(|d| d.validity())
            .unwrap_or(Validity::Unknown)
    }

    /// Bind shared data to an input or rebind a buffer.
    pub(crate) fn bind(&mut self, data: DataRef) {
        if self.role == DataRole::Buffer && self.own.is_none() {
            self.own = self.data.take();
        }
        self.data = Some(data);
    }

    /// Undo [`bind`](Self::bind).
    pub(crate) fn unbind(&mut self) {
        match self.role {
            DataRole::Input => self.data = None,
            DataRole::Buffer => {
                if let Some(own) = self.own.take() {
                    self.data = Some(own);
                }
            }
            DataRole::Output => {}
        }
    }

    /// Whether this slot currently points at `data`.
    #[cfg(test)]
    pub(crate) fn is_bound_to(&self, data: &DataRef) -> bool {
        self.data.as_ref().is_some_and(|d| std::sync::Arc::ptr_eq(d, data))
    }
}

impl fmt::Debug for DataSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSlot")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("kind", &self.kind)
            .field("data", &self.data.as_ref().map(|d| d.id()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_pairing() {
        assert!(DataRole::Output.can_source());
        assert!(DataRole::Buffer.can_source());
        assert!(!DataRole::Input.can_source());
        assert!(DataRole::Input.can_target());
        assert!(DataRole::Buffer.can_target());
        assert!(!DataRole::Output.can_target());
    }

    #[test]
    fn test_output_owns_data() {
        let slot = DataSlot::from_spec(SlotSpec::output("out", Buffer::Scalar(1.0)));
        assert!(slot.owns_data());
        assert_eq!(slot.data().unwrap().snapshot(), Buffer::Scalar(1.0));
        assert!(!slot.is_mandatory());
    }

    #[test]
    fn test_buffer_rebind_restores_own_data() {
        let mut slot = DataSlot::from_spec(SlotSpec::buffer("state", Buffer::Scalar(0.0)));
        let own = slot.data().cloned().unwrap();
        let shared = Data::new(Buffer::Scalar(9.0));

        slot.bind(shared.clone());
        assert!(slot.is_bound_to(&shared));
        assert!(slot.is_connected());
        assert!(!slot.owns_data());

        slot.unbind();
        assert!(slot.is_bound_to(&own));
        assert!(slot.owns_data());
    }

    #[test]
    fn test_input_validity_follows_source() {
        let mut input = DataSlot::from_spec(SlotSpec::input("in", DataKind::Scalar));
        assert_eq!(input.validity(), Validity::Unknown);
        assert!(input.is_mandatory());

        let source = Data::new(Buffer::Scalar(0.0));
        source.validity_cell().store(Validity::Warning);
        input.bind(source);
        assert_eq!(input.validity(), Validity::Warning);
    }
}
