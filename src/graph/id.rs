//! Identity types for the processing graph.
//!
//! `ElementId` is a newtype over `u32` that serves as a direct index into the
//! network arena, providing O(1) lookup and tolerating cycles between
//! elements without reference counting. `DataId` is a global creation-order
//! counter used for deterministic lock ordering.

use crate::graph::slot::DataRole;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Index into the network arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ElementId(pub u32);

impl ElementId {
    pub const INVALID: ElementId = ElementId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "ElementId(INVALID)")
        } else {
            write!(f, "ElementId({})", self.0)
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

static NEXT_DATA_ID: AtomicU64 = AtomicU64::new(0);

/// Creation-order id of a [`Data`](crate::graph::Data) object.
///
/// Strictly increasing across the whole process, so sorting by `DataId`
/// yields the same lock order on every run and platform.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataId(pub u64);

impl DataId {
    pub(crate) fn next() -> Self {
        DataId(NEXT_DATA_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataId({})", self.0)
    }
}

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Address of a slot: element, role and the slot name within that role.
///
/// For a group this names a promoted slot; resolution to the real slot
/// happens inside the network.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRef {
    pub element: ElementId,
    pub role: DataRole,
    pub name: String,
}

impl SlotRef {
    pub fn new(element: ElementId, role: DataRole, name: impl Into<String>) -> Self {
        Self {
            element,
            role,
            name: name.into(),
        }
    }

    pub fn input(element: ElementId, name: impl Into<String>) -> Self {
        Self::new(element, DataRole::Input, name)
    }

    pub fn output(element: ElementId, name: impl Into<String>) -> Self {
        Self::new(element, DataRole::Output, name)
    }

    pub fn buffer(element: ElementId, name: impl Into<String>) -> Self {
        Self::new(element, DataRole::Buffer, name)
    }
}

impl fmt::Debug for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}[{}]", self.element.0, self.name, self.role)
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_id() {
        let id = ElementId(42);
        assert!(id.is_valid());
        assert_eq!(id.index(), 42);
        assert!(!ElementId::INVALID.is_valid());
    }

    #[test]
    fn test_data_ids_are_increasing() {
        let a = DataId::next();
        let b = DataId::next();
        assert!(b > a);
    }

    #[test]
    fn test_slot_ref_display() {
        let slot = SlotRef::output(ElementId(3), "out");
        assert_eq!(slot.to_string(), "3.out[output]");
    }
}
