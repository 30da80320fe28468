//! Trigger edges and the pass-through trigger nodes.
//!
//! Every element keeps an ordered list of [`Listener`]s: the elements it
//! signals when it finishes its part of a wave. An edge exists while it was
//! requested explicitly through `connect_trigger`, or while at least one
//! output-sourced data connection implies it.
//!
//! - [`Trigger`] forwards every signal. At most one driver.
//! - [`MultiTrigger`] joins N parents and forwards once all of them have
//!   signaled, in any order and across any number of waves.

use crate::graph::id::ElementId;
use parking_lot::Mutex;
use std::collections::BTreeSet;

/// One outgoing trigger edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub target: ElementId,
    /// Requested through `connect_trigger`.
    pub explicit: bool,
    /// Number of data connections implying this edge.
    pub data_links: u32,
}

impl Listener {
    pub fn explicit(target: ElementId) -> Self {
        Self {
            target,
            explicit: true,
            data_links: 0,
        }
    }

    pub fn implied(target: ElementId) -> Self {
        Self {
            target,
            explicit: false,
            data_links: 1,
        }
    }

    /// Whether the edge still has a reason to exist.
    pub fn is_live(&self) -> bool {
        self.explicit || self.data_links > 0
    }
}

/// Ordered set of listeners; declaration order is signal order.
#[derive(Debug, Default)]
pub struct Listeners {
    edges: Vec<Listener>,
}

impl Listeners {
    pub fn iter(&self) -> impl Iterator<Item = &Listener> {
        self.edges.iter()
    }

    pub fn targets(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.edges.iter().map(|l| l.target)
    }

    pub fn get(&self, target: ElementId) -> Option<&Listener> {
        self.edges.iter().find(|l| l.target == target)
    }

    pub fn contains(&self, target: ElementId) -> bool {
        self.get(target).is_some()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Add or strengthen an explicit edge. Returns `false` if it already was explicit.
    pub(crate) fn add_explicit(&mut self, target: ElementId) -> bool {
        match self.edges.iter_mut().find(|l| l.target == target) {
            Some(edge) if edge.explicit => false,
            Some(edge) => {
                edge.explicit = true;
                true
            }
            None => {
                self.edges.push(Listener::explicit(target));
                true
            }
        }
    }

    /// Drop the explicit flag. Returns `false` if there was no explicit edge.
    pub(crate) fn remove_explicit(&mut self, target: ElementId) -> bool {
        let Some(edge) = self.edges.iter_mut().find(|l| l.target == target) else {
            return false;
        };
        if !edge.explicit {
            return false;
        }
        edge.explicit = false;
        self.prune();
        true
    }

    pub(crate) fn add_data_link(&mut self, target: ElementId) {
        match self.edges.iter_mut().find(|l| l.target == target) {
            Some(edge) => edge.data_links += 1,
            None => self.edges.push(Listener::implied(target)),
        }
    }

    pub(crate) fn remove_data_link(&mut self, target: ElementId) {
        if let Some(edge) = self.edges.iter_mut().find(|l| l.target == target) {
            edge.data_links = edge.data_links.saturating_sub(1);
        }
        self.prune();
    }

    /// Forget every edge to `target`.
    pub(crate) fn remove_target(&mut self, target: ElementId) {
        self.edges.retain(|l| l.target != target);
    }

    fn prune(&mut self) {
        self.edges.retain(Listener::is_live);
    }
}

/// Pass-through trigger with at most one driver.
#[derive(Debug, Default)]
pub struct Trigger {
    driver: Option<ElementId>,
}

impl Trigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn driver(&self) -> Option<ElementId> {
        self.driver
    }

    pub(crate) fn set_driver(&mut self, driver: Option<ElementId>) {
        self.driver = driver;
    }
}

/// Join node: fires once every parent has signaled.
#[derive(Debug, Default)]
pub struct MultiTrigger {
    parents: BTreeSet<ElementId>,
    pending: Mutex<BTreeSet<ElementId>>,
}

impl MultiTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parents(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.parents.iter().copied()
    }

    pub fn parent_count(&self) -> usize {
        self.parents.len()
    }

    /// Parents that signaled since the last fire.
    pub fn pending(&self) -> Vec<ElementId> {
        self.pending.lock().iter().copied().collect()
    }

    pub(crate) fn add_parent(&mut self, parent: ElementId) -> bool {
        self.parents.insert(parent)
    }

    pub(crate) fn remove_parent(&mut self, parent: ElementId) -> bool {
        self.pending.get_mut().remove(&parent);
        self.parents.remove(&parent)
    }

    /// Record signals from `parents`; returns `true` if the join is complete,
    /// in which case the pending set is cleared.
    pub(crate) fn signal(&self, parents: impl IntoIterator<Item = ElementId>) -> bool {
        let mut pending = self.pending.lock();
        for parent in parents {
            if self.parents.contains(&parent) {
                pending.insert(parent);
            }
        }
        if !self.parents.is_empty() && self.parents.is_subset(&pending) {
            pending.clear();
            true
        } else {
            false
        }
    }

    /// Record signals without evaluating the join.
    pub(crate) fn record(&self, parents: impl IntoIterator<Item = ElementId>) {
        let mut pending = self.pending.lock();
        pending.extend(parents.into_iter().filter(|p| self.parents.contains(p)));
    }

    pub(crate) fn clear(&self) {
        self.pending.lock().clear();
    }
}
