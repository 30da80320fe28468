//! Arena entries.
//!
//! An [`Element`] composes the capabilities a node has instead of inheriting
//! them: a slot map (empty for triggers and groups), an outgoing listener
//! list, and a kind-specific payload.

use crate::graph::connectable::SlotMap;
use crate::graph::group::Group;
use crate::graph::id::ElementId;
use crate::graph::looped::LoopedTrigger;
use crate::graph::step::Step;
use crate::graph::trigger::{Listeners, MultiTrigger, Trigger};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Kind-specific payload of an element.
#[derive(Debug)]
pub enum ElementKind {
    Step(Step),
    Trigger(Trigger),
    MultiTrigger(MultiTrigger),
    Looped(LoopedTrigger),
    Group(Group),
}

/// Element category, as written to configurations and reported by queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Step,
    Trigger,
    MultiTrigger,
    LoopedTrigger,
    Group,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Step => write!(f, "step"),
            ElementType::Trigger => write!(f, "trigger"),
            ElementType::MultiTrigger => write!(f, "multi-trigger"),
            ElementType::LoopedTrigger => write!(f, "looped trigger"),
            ElementType::Group => write!(f, "group"),
        }
    }
}

impl ElementKind {
    pub fn element_type(&self) -> ElementType {
        match self {
            ElementKind::Step(_) => ElementType::Step,
            ElementKind::Trigger(_) => ElementType::Trigger,
            ElementKind::MultiTrigger(_) => ElementType::MultiTrigger,
            ElementKind::Looped(_) => ElementType::LoopedTrigger,
            ElementKind::Group(_) => ElementType::Group,
        }
    }
}

pub struct Element {
    id: ElementId,
    name: String,
    parent: Option<ElementId>,
    pub(crate) slots: SlotMap,
    pub(crate) listeners: Listeners,
    pub(crate) kind: ElementKind,
    /// Waves started from this element.
    waves: AtomicU64,
    /// Elements reached through feedback edges during this element's last waves.
    deferred: Mutex<Vec<ElementId>>,
}

impl Element {
    pub(crate) fn new(id: ElementId, name: String, kind: ElementKind) -> Self {
        Self {
            id,
            name,
            parent: None,
            slots: SlotMap::new(),
            listeners: Listeners::default(),
            kind,
            waves: AtomicU64::new(0),
            deferred: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<ElementId>) {
        self.parent = parent;
    }

    pub fn slots(&self) -> &SlotMap {
        &self.slots
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn element_type(&self) -> ElementType {
        self.kind.element_type()
    }

    pub fn as_step(&self) -> Option<&Step> {
        match &self.kind {
            ElementKind::Step(step) => Some(step),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match &self.kind {
            ElementKind::Group(group) => Some(group),
            _ => None,
        }
    }

    pub(crate) fn as_group_mut(&mut self) -> Option<&mut Group> {
        match &mut self.kind {
            ElementKind::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_looped(&self) -> Option<&LoopedTrigger> {
        match &self.kind {
            ElementKind::Looped(looped) => Some(looped),
            _ => None,
        }
    }

    pub fn as_multi_trigger(&self) -> Option<&MultiTrigger> {
        match &self.kind {
            ElementKind::MultiTrigger(multi) => Some(multi),
            _ => None,
        }
    }

    /// Whether this element can have outgoing trigger edges.
    pub fn can_signal(&self) -> bool {
        !matches!(self.kind, ElementKind::Group(_))
    }

    /// Whether this element can be the target of a trigger edge.
    pub fn can_listen(&self) -> bool {
        matches!(
            self.kind,
            ElementKind::Step(_) | ElementKind::Trigger(_) | ElementKind::MultiTrigger(_)
        )
    }

    pub(crate) fn next_wave(&self) -> u64 {
        self.waves.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn wave_count(&self) -> u64 {
        self.waves.load(Ordering::Relaxed)
    }

    /// Remember `element` for this origin's next wave. Returns `false` if it
    /// was already remembered or the list is full.
    pub(crate) fn defer(&self, element: ElementId, limit: usize) -> bool {
        let mut deferred = self.deferred.lock();
        if deferred.contains(&element) {
            return false;
        }
        if deferred.len() >= limit {
            tracing::warn!(
                "Deferred list of '{}' is full ({}), dropping {}",
                self.name,
                limit,
                element
            );
            return false;
        }
        deferred.push(element);
        true
    }

    pub(crate) fn take_deferred(&self) -> Vec<ElementId> {
        std::mem::take(&mut *self.deferred.lock())
    }

    pub fn deferred(&self) -> Vec<ElementId> {
        self.deferred.lock().clone()
    }

    pub(crate) fn forget_deferred(&self, element: ElementId) {
        self.deferred.lock().retain(|&e| e != element);
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type", &self.element_type())
            .field("parent", &self.parent)
            .field("slots", &self.slots.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_by_kind() {
        let trigger = Element::new(ElementId(0), "t".into(), ElementKind::Trigger(Trigger::new()));
        let group = Element::new(ElementId(1), "g".into(), ElementKind::Group(Group::new()));
        assert!(trigger.can_signal() && trigger.can_listen());
        assert!(!group.can_signal() && !group.can_listen());
        assert_eq!(group.element_type(), ElementType::Group);
        assert!(group.as_group().is_some());
        assert!(trigger.as_step().is_none());
    }

    #[test]
    fn test_deferred_list_is_bounded_and_unique() {
        let origin = Element::new(ElementId(0), "o".into(), ElementKind::Trigger(Trigger::new()));
        assert!(origin.defer(ElementId(1), 2));
        assert!(!origin.defer(ElementId(1), 2));
        assert!(origin.defer(ElementId(2), 2));
        assert!(!origin.defer(ElementId(3), 2));
        assert_eq!(origin.take_deferred(), vec![ElementId(1), ElementId(2)]);
        assert!(origin.deferred().is_empty());
    }

    #[test]
    fn test_wave_counter() {
        let origin = Element::new(ElementId(0), "o".into(), ElementKind::Trigger(Trigger::new()));
        assert_eq!(origin.next_wave(), 1);
        assert_eq!(origin.next_wave(), 2);
        assert_eq!(origin.wave_count(), 2);
    }
}
