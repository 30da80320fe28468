//! Groups: containers of child elements exposing promoted slots.
//!
//! A promotion maps a `(role, name)` on the group to a slot of an element
//! inside it, possibly another group's promotion. Connections made to a
//! group slot are resolved to the real step slot before anything is bound,
//! so they end up sharing exactly the same data as a direct connection.

use crate::graph::error::ConnectionError;
use crate::graph::id::{ElementId, SlotRef};
use crate::graph::slot::DataRole;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Default)]
pub struct Group {
    children: Vec<ElementId>,
    promotions: BTreeMap<(DataRole, String), SlotRef>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn children(&self) -> &[ElementId] {
        &self.children
    }

    pub(crate) fn add_child(&mut self, child: ElementId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn remove_child(&mut self, child: ElementId) {
        self.children.retain(|&c| c != child);
    }

    pub fn promotion(&self, role: DataRole, name: &str) -> Option<&SlotRef> {
        self.promotions.get(&(role, name.to_string()))
    }

    pub fn promotions(&self) -> impl Iterator<Item = (DataRole, &str, &SlotRef)> {
        self.promotions
            .iter()
            .map(|((role, name), target)| (*role, name.as_str(), target))
    }

    /// Insert or replace a promotion, returning the previous target.
    pub(crate) fn promote(&mut self, role: DataRole, name: &str, target: SlotRef) -> Option<SlotRef> {
        self.promotions.insert((role, name.to_string()), target)
    }

    pub(crate) fn demote(&mut self, role: DataRole, name: &str) -> Option<SlotRef> {
        self.promotions.remove(&(role, name.to_string()))
    }

    /// Drop promotions whose target is `element`.
    pub(crate) fn forget_element(&mut self, element: ElementId) {
        self.promotions.retain(|_, target| target.element != element);
    }
}

/// Follow promotions from `slot` until reaching a non-group element.
///
/// `lookup` returns the group behind an element id, or `None` for every
/// other element. A chain that revisits a slot is a
/// [`ConnectionError::PromotionCycle`]; a group slot without a promotion
/// is reported as `Ok(None)`.
pub fn resolve<'a>(
    slot: &SlotRef,
    lookup: impl Fn(ElementId) -> Option<&'a Group>,
) -> Result<Option<SlotRef>, ConnectionError> {
    let mut visited: HashSet<SlotRef> = HashSet::new();
    let mut current = slot.clone();
    loop {
        let Some(group) = lookup(current.element) else {
            return Ok(Some(current));
        };
        if !visited.insert(current.clone()) {
            return Err(ConnectionError::PromotionCycle(slot.clone()));
        }
        match group.promotion(current.role, &current.name) {
            Some(next) => current = next.clone(),
            None => return Ok(None),
        }
    }
}
