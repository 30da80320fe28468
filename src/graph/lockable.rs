//! Deterministic multi-lock acquisition over shared data.
//!
//! A step needs its inputs read-locked and its outputs and buffers
//! write-locked for the duration of one compute. [`LockSet::acquire`] takes
//! the union of those requests, merges duplicates (the same data reachable
//! from two slots), sorts by [`DataId`] and locks in that order. Two steps on
//! different threads with overlapping data sets therefore always lock in
//! the same order and cannot deadlock.
//!
//! Every guard registers its id in a thread-local list. Acquiring an id
//! lower than or equal to one already held on the same thread is a lock-order
//! violation and panics with a [`LockOrderViolation`] payload.

use crate::graph::data::Data;
use crate::graph::id::DataId;
use crate::types::Buffer;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};

thread_local! {
    static HELD: RefCell<Vec<DataId>> = const { RefCell::new(Vec::new()) };
}

/// Panic payload raised when a thread breaks the global lock order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOrderViolation {
    pub acquiring: DataId,
    pub held: DataId,
}

impl fmt::Display for LockOrderViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lock order violation: acquiring data {} while holding data {}",
            self.acquiring, self.held
        )
    }
}

/// Ids currently locked by this thread, in acquisition order.
pub fn held_locks() -> Vec<DataId> {
    HELD.with(|held| held.borrow().clone())
}

/// Registration of one held id; unregisters on drop.
struct HeldToken(DataId);

impl HeldToken {
    fn register(id: DataId) -> Self {
        let violation = HELD.with(|held| {
            held.borrow()
                .iter()
                .copied()
                .filter(|&h| h >= id)
                .max()
                .map(|h| LockOrderViolation {
                    acquiring: id,
                    held: h,
                })
        });
        if let Some(violation) = violation {
            tracing::error!("{}", violation);
            std::panic::panic_any(violation);
        }
        HELD.with(|held| held.borrow_mut().push(id));
        HeldToken(id)
    }
}

impl Drop for HeldToken {
    fn drop(&mut self) {
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|&h| h == self.0) {
                held.remove(pos);
            }
        });
    }
}

/// Shared lock on a data buffer.
pub struct DataReadGuard<'a> {
    // Field order matters: the lock is released before the token unregisters.
    guard: RwLockReadGuard<'a, Buffer>,
    _held: HeldToken,
}

impl<'a> DataReadGuard<'a> {
    pub(crate) fn lock(id: DataId, lock: &'a RwLock<Buffer>) -> Self {
        let held = HeldToken::register(id);
        Self {
            guard: lock.read(),
            _held: held,
        }
    }
}

impl Deref for DataReadGuard<'_> {
    type Target = Buffer;

    fn deref(&self) -> &Buffer {
        &self.guard
    }
}

/// Exclusive lock on a data buffer.
pub struct DataWriteGuard<'a> {
    guard: RwLockWriteGuard<'a, Buffer>,
    _held: HeldToken,
}

impl<'a> DataWriteGuard<'a> {
    pub(crate) fn lock(id: DataId, lock: &'a RwLock<Buffer>) -> Self {
        let held = HeldToken::register(id);
        Self {
            guard: lock.write(),
            _held: held,
        }
    }
}

impl Deref for DataWriteGuard<'_> {
    type Target = Buffer;

    fn deref(&self) -> &Buffer {
        &self.guard
    }
}

impl DerefMut for DataWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut Buffer {
        &mut self.guard
    }
}

/// Requested access on a data object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockMode {
    Read,
    Write,
}

enum Held<'a> {
    Read(DataReadGuard<'a>),
    Write(DataWriteGuard<'a>),
}

impl Held<'_> {
    fn buffer(&self) -> &Buffer {
        match self {
            Held::Read(g) => g,
            Held::Write(g) => g,
        }
    }

    fn buffer_mut(&mut self) -> Option<&mut Buffer> {
        match self {
            Held::Read(_) => None,
            Held::Write(g) => Some(g),
        }
    }
}

/// Merge requests: one entry per data id, write wins over read.
fn merge<'a>(
    requests: impl IntoIterator<Item = (&'a Data, LockMode)>,
) -> BTreeMap<DataId, (&'a Data, LockMode)> {
    let mut merged: BTreeMap<DataId, (&'a Data, LockMode)> = BTreeMap::new();
    for (data, mode) in requests {
        merged
            .entry(data.id())
            .and_modify(|entry| entry.1 = entry.1.max(mode))
            .or_insert((data, mode));
    }
    merged
}

/// The order in which [`LockSet::acquire`] would lock `requests`.
pub fn lock_order<'a>(
    requests: impl IntoIterator<Item = (&'a Data, LockMode)>,
) -> Vec<(DataId, LockMode)> {
    merge(requests)
        .into_iter()
        .map(|(id, (_, mode))| (id, mode))
        .collect()
}

/// A set of data locks held together, released on drop (including unwinds).
pub struct LockSet<'a> {
    /// Sorted by id.
    held: Vec<(DataId, Held<'a>)>,
}

impl<'a> LockSet<'a> {
    /// Lock every requested data object in ascending id order.
    pub fn acquire(requests: impl IntoIterator<Item = (&'a Data, LockMode)>) -> Self {
        let merged = merge(requests);
        let mut held = Vec::with_capacity(merged.len());
        for (id, (data, mode)) in merged {
            let guard = match mode {
                LockMode::Read => Held::Read(DataReadGuard::lock(id, data.lock())),
                LockMode::Write => Held::Write(DataWriteGuard::lock(id, data.lock())),
            };
            held.push((id, guard));
        }
        Self { held }
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Ids in the order they were locked.
    pub fn ids(&self) -> Vec<DataId> {
        self.held.iter().map(|(id, _)| *id).collect()
    }

    fn position(&self, id: DataId) -> Option<usize> {
        self.held.binary_search_by_key(&id, |(h, _)| *h).ok()
    }

    pub fn mode(&self, id: DataId) -> Option<LockMode> {
        self.position(id).map(|pos| match self.held[pos].1 {
            Held::Read(_) => LockMode::Read,
            Held::Write(_) => LockMode::Write,
        })
    }

    pub fn get(&self, id: DataId) -> Option<&Buffer> {
        self.position(id).map(|pos| self.held[pos].1.buffer())
    }

    /// Mutable access; `None` unless the id is write-locked.
    pub fn get_mut(&mut self, id: DataId) -> Option<&mut Buffer> {
        let pos = self.position(id)?;
        self.held[pos].1.buffer_mut()
    }

    /// Shared access to `read` together with mutable access to `write`.
    ///
    /// `None` if either is missing, `write` is not write-locked, or both ids
    /// are the same data object.
    pub fn pair_mut(&mut self, read: DataId, write: DataId) -> Option<(&Buffer, &mut Buffer)> {
        let r = self.position(read)?;
        let w = self.position(write)?;
        if r == w {
            return None;
        }
        if r < w {
            let (left, right) = self.held.split_at_mut(w);
            Some((left[r].1.buffer(), right[0].1.buffer_mut()?))
        } else {
            let (left, right) = self.held.split_at_mut(r);
            Some((right[0].1.buffer(), left[w].1.buffer_mut()?))
        }
    }
}
