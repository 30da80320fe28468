//! Shared, lockable data buffers.
//!
//! A `Data` object is created by the step that declares an output or buffer
//! slot and is shared (via `Arc`) with every input connected to it. Its
//! [`DataId`] records creation order and fixes the global lock order.

use crate::graph::id::DataId;
use crate::graph::lockable::{DataReadGuard, DataWriteGuard};
use crate::graph::validity::{AtomicValidity, Validity};
use crate::types::{Buffer, DataKind};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Shared handle to a data object.
pub type DataRef = Arc<Data>;

/// A buffer plus its lock and creation-order id.
pub struct Data {
    id: DataId,
    kind: DataKind,
    buffer: RwLock<Buffer>,
    /// Validity as last published by the producing step.
    validity: AtomicValidity,
}

impl Data {
    pub fn new(buffer: Buffer) -> DataRef {
        Arc::new(Self {
            id: DataId::next(),
            kind: buffer.kind(),
            buffer: RwLock::new(buffer),
            validity: AtomicValidity::default(),
        })
    }

    /// Zero-valued data of the given kind.
    pub fn of_kind(kind: DataKind) -> DataRef {
        Self::new(Buffer::zero_of(kind))
    }

    #[inline]
    pub fn id(&self) -> DataId {
        self.id
    }

    /// Kind fixed at creation; computes that change it are rejected.
    #[inline]
    pub fn kind(&self) -> DataKind {
        self.kind
    }

    pub fn validity(&self) -> Validity {
        self.validity.load()
    }

    pub(crate) fn validity_cell(&self) -> &AtomicValidity {
        &self.validity
    }

    /// Take a shared lock, subject to the thread's lock-order check.
    pub fn read(&self) -> DataReadGuard<'_> {
        DataReadGuard::lock(self.id, &self.buffer)
    }

    /// Take an exclusive lock, subject to the thread's lock-order check.
    pub fn write(&self) -> DataWriteGuard<'_> {
        DataWriteGuard::lock(self.id, &self.buffer)
    }

    /// Clone the current content under a shared lock.
    pub fn snapshot(&self) -> Buffer {
        self.read().clone()
    }

    pub(crate) fn lock(&self) -> &RwLock<Buffer> {
        &self.buffer
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("validity", &self.validity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_kind_follows_buffer() {
        let data = Data::new(Buffer::Vector(vec![1.0, 2.0]));
        assert_eq!(data.kind(), DataKind::Vector);
        assert_eq!(data.validity(), Validity::Unknown);
    }

    #[test]
    fn test_write_then_snapshot() {
        let data = Data::of_kind(DataKind::Scalar);
        *data.write() = Buffer::Scalar(3.5);
        assert_eq!(data.snapshot(), Buffer::Scalar(3.5));
    }

    #[test]
    fn test_creation_order() {
        let first = Data::of_kind(DataKind::Scalar);
        let second = Data::of_kind(DataKind::Scalar);
        assert!(first.id() < second.id());
    }
}
