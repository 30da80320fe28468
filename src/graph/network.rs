//! The network: an arena of elements plus the operations over it.
//!
//! All elements live in one arena indexed by [`ElementId`]; groups only
//! record which ids are their children. Topology changes take the graph
//! lock exclusively, waves take it shared for their whole duration, so a
//! wave always sees a consistent topology and never blocks another wave.
//! Shared acquisitions are recursive: an observer called from inside a wave
//! may query the network on the same thread.
//!
//! Looped triggers run on their own threads and reach the network through a
//! weak handle. Stopping one never happens while the graph lock is held:
//! the task handle is detached under the lock, then joined outside it.

use crate::config::{
    ConnectionConfig, ElementConfig, ElementConfigKind, EngineSettings, NetworkConfig,
    PromotionConfig, SlotConfig, TriggerConfig,
};
use crate::graph::clock::PeriodicTask;
use crate::graph::connectable::SlotMap;
use crate::graph::data::DataRef;
use crate::graph::element::{Element, ElementKind, ElementType};
use crate::graph::error::{ConnectionError, GraphError, GraphResult};
use crate::graph::events::{EventBus, NetworkEvent, NetworkObserver};
use crate::graph::group::{self, Group};
use crate::graph::id::{ElementId, SlotRef};
use crate::graph::kernel::{Kernel, WaveTime};
use crate::graph::looped::{LoopMode, LoopStatistics, LoopedTrigger};
use crate::graph::registry::KernelRegistry;
use crate::graph::slot::DataRole;
use crate::graph::step::{StepContext, StepState};
use crate::graph::trigger::{MultiTrigger, Trigger};
use crate::graph::validity::Validity;
use crate::graph::wave::{WaveReport, WaveRunner};
use crate::types::Buffer;
use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// A data connection between two slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Endpoints as requested; may name promoted group slots.
    pub source: SlotRef,
    pub target: SlotRef,
    /// Endpoints after following promotions.
    pub resolved_source: SlotRef,
    pub resolved_target: SlotRef,
}

impl Connection {
    /// Output-sourced connections make the target step listen to the source step.
    fn implies_trigger(&self) -> bool {
        self.resolved_source.role == DataRole::Output
            && self.resolved_source.element != self.resolved_target.element
    }

    /// Output to input, with no buffer slot on either end.
    fn is_direct(&self) -> bool {
        self.resolved_source.role == DataRole::Output && self.resolved_target.role == DataRole::Input
    }

    fn touches(&self, id: ElementId) -> bool {
        self.source.element == id
            || self.target.element == id
            || self.resolved_source.element == id
            || self.resolved_target.element == id
    }
}

/// Arena plus connection list.
#[derive(Default)]
pub(crate) struct Graph {
    elements: Vec<Option<Element>>,
    names: HashMap<String, ElementId>,
    connections: Vec<Connection>,
}

impl Graph {
    pub(crate) fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id.index()).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.elements.get_mut(id.index()).and_then(Option::as_mut)
    }

    fn require(&self, id: ElementId) -> GraphResult<&Element> {
        self.get(id)
            .ok_or_else(|| GraphError::not_found(format!("element {}", id)))
    }

    fn require_mut(&mut self, id: ElementId) -> GraphResult<&mut Element> {
        self.get_mut(id)
            .ok_or_else(|| GraphError::not_found(format!("element {}", id)))
    }

    fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter_map(Option::as_ref)
    }

    fn require_group_mut(&mut self, id: ElementId) -> GraphResult<&mut Group> {
        let element = self.require_mut(id)?;
        let name = element.name().to_string();
        element
            .as_group_mut()
            .ok_or_else(|| GraphError::InvalidParameter(format!("'{}' is not a group", name)))
    }

    fn insert(&mut self, name: &str, kind: ElementKind, slots: SlotMap) -> GraphResult<ElementId> {
        if self.names.contains_key(name) {
            return Err(GraphError::duplicate("element", name));
        }
        let id = ElementId(self.elements.len() as u32);
        let mut element = Element::new(id, name.to_string(), kind);
        element.slots = slots;
        self.elements.push(Some(element));
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Whether `id` is `ancestor` or lives somewhere below it.
    fn is_within(&self, id: ElementId, ancestor: ElementId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.get(c).and_then(Element::parent);
        }
        false
    }

    /// Number of groups enclosing `id`.
    fn depth(&self, id: ElementId) -> usize {
        let mut depth = 0;
        let mut current = self.get(id).and_then(Element::parent);
        while let Some(parent) = current {
            depth += 1;
            current = self.get(parent).and_then(Element::parent);
        }
        depth
    }

    /// All elements below `group`, children before their own children.
    fn descendants(&self, group: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut queue: VecDeque<ElementId> = VecDeque::from([group]);
        while let Some(current) = queue.pop_front() {
            if let Some(g) = self.get(current).and_then(Element::as_group) {
                for &child in g.children() {
                    out.push(child);
                    queue.push_back(child);
                }
            }
        }
        out
    }

    fn resolve(&self, slot: &SlotRef) -> GraphResult<SlotRef> {
        self.require(slot.element)?;
        group::resolve(slot, |id| self.get(id).and_then(Element::as_group))?.ok_or_else(|| {
            GraphError::not_found(format!(
                "{} slot '{}' on group {}",
                slot.role, slot.name, slot.element
            ))
        })
    }

    /// Data behind a slot, after following promotions.
    fn slot_data(&self, slot: &SlotRef) -> GraphResult<Option<DataRef>> {
        let resolved = self.resolve(slot)?;
        self.require(resolved.element)?
            .slots()
            .data(resolved.role, &resolved.name)
    }

    /// Shortest path `from` ⇝ `to` over direct output-to-input connections.
    fn direct_path(&self, from: ElementId, to: ElementId) -> Option<Vec<ElementId>> {
        let mut previous: HashMap<ElementId, ElementId> = HashMap::new();
        let mut seen: HashSet<ElementId> = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![to];
                let mut node = to;
                while let Some(&p) = previous.get(&node) {
                    path.push(p);
                    node = p;
                }
                path.reverse();
                return Some(path);
            }
            for c in self.connections.iter().filter(|c| c.is_direct()) {
                if c.resolved_source.element == current && seen.insert(c.resolved_target.element) {
                    previous.insert(c.resolved_target.element, current);
                    queue.push_back(c.resolved_target.element);
                }
            }
        }
        None
    }

    /// Undo a connection's effect on slots and listeners.
    fn unlink(&mut self, connection: &Connection) {
        if let Some(target) = self.get_mut(connection.resolved_target.element) {
            if let Ok(slot) = target
                .slots
                .get_mut(connection.resolved_target.role, &connection.resolved_target.name)
            {
                slot.unbind();
            }
        }
        if connection.implies_trigger() {
            if let Some(source) = self.get_mut(connection.resolved_source.element) {
                source
                    .listeners
                    .remove_data_link(connection.resolved_target.element);
            }
        }
    }
}

struct Shared {
    graph: RwLock<Graph>,
    events: EventBus,
    settings: EngineSettings,
}

impl Shared {
    fn runner<'g>(&'g self, graph: &'g Graph) -> WaveRunner<'g> {
        WaveRunner {
            graph,
            events: &self.events,
            deferred_limit: self.settings.deferred_limit,
        }
    }
}

/// A processing network.
///
/// Dropping the network stops every running looped trigger.
pub struct Network {
    shared: Arc<Shared>,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                graph: RwLock::new(Graph::default()),
                events: EventBus::new(settings.event_channel_capacity),
                settings,
            }),
        }
    }

    /// Build a network from a configuration.
    pub fn from_configuration(
        config: &NetworkConfig,
        registry: &KernelRegistry,
        settings: EngineSettings,
    ) -> GraphResult<Self> {
        let network = Self::with_settings(settings);
        network.read_configuration(config, registry)?;
        Ok(network)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.shared.settings
    }

    // ── Elements ──

    pub fn add_step(&self, name: &str, kernel: impl Kernel + 'static) -> GraphResult<ElementId> {
        self.add_boxed_step(name, Box::new(kernel))
    }

    pub fn add_boxed_step(&self, name: &str, kernel: Box<dyn Kernel>) -> GraphResult<ElementId> {
        let step = crate::graph::step::Step::new(kernel);
        let mut slots = SlotMap::new();
        step.declare(&mut slots)?;
        let type_name = step.type_name();
        let id = self
            .shared
            .graph
            .write()
            .insert(name, ElementKind::Step(step), slots)?;
        tracing::debug!("Added step '{}' ({}) as {}", name, type_name, id);
        Ok(id)
    }

    pub fn add_trigger(&self, name: &str) -> GraphResult<ElementId> {
        self.shared
            .graph
            .write()
            .insert(name, ElementKind::Trigger(Trigger::new()), SlotMap::new())
    }

    pub fn add_multi_trigger(&self, name: &str) -> GraphResult<ElementId> {
        self.shared.graph.write().insert(
            name,
            ElementKind::MultiTrigger(MultiTrigger::new()),
            SlotMap::new(),
        )
    }

    pub fn add_looped_trigger(
        &self,
        name: &str,
        period: Duration,
        mode: LoopMode,
    ) -> GraphResult<ElementId> {
        let looped = LoopedTrigger::new(period, mode)?;
        self.shared
            .graph
            .write()
            .insert(name, ElementKind::Looped(looped), SlotMap::new())
    }

    pub fn add_group(&self, name: &str) -> GraphResult<ElementId> {
        self.shared
            .graph
            .write()
            .insert(name, ElementKind::Group(Group::new()), SlotMap::new())
    }

    /// Move an element into `group`, or back to the top level with `None`.
    pub fn set_parent(&self, element: ElementId, group: Option<ElementId>) -> GraphResult<()> {
        let mut graph = self.shared.graph.write();
        graph.require(element)?;
        if let Some(group) = group {
            graph.require_group_mut(group)?;
            if graph.is_within(group, element) {
                return Err(GraphError::InvalidParameter(format!(
                    "cannot place {} inside itself",
                    element
                )));
            }
        }
        if let Some(old) = graph.require(element)?.parent() {
            graph.require_group_mut(old)?.remove_child(element);
        }
        if let Some(group) = group {
            graph.require_group_mut(group)?.add_child(element);
        }
        graph.require_mut(element)?.set_parent(group);
        Ok(())
    }

    /// Remove an element. Groups take their children with them; every
    /// connection touching a removed element goes too.
    pub fn remove_element(&self, id: ElementId) -> GraphResult<()> {
        let (doomed, tasks) = {
            let graph = self.shared.graph.read_recursive();
            graph.require(id)?;
            let mut doomed = graph.descendants(id);
            doomed.reverse();
            doomed.push(id);
            let tasks: Vec<_> = doomed
                .iter()
                .filter_map(|&d| graph.get(d).and_then(Element::as_looped))
                .filter_map(LoopedTrigger::take_task)
                .collect();
            (doomed, tasks)
        };
        for task in tasks {
            task.stop(self.shared.settings.stop_timeout())?;
        }

        let mut graph = self.shared.graph.write();
        for &gone in &doomed {
            let touching: Vec<Connection> = graph
                .connections
                .iter()
                .filter(|c| c.touches(gone))
                .cloned()
                .collect();
            for connection in &touching {
                graph.unlink(connection);
            }
            graph.connections.retain(|c| !c.touches(gone));

            for element in graph.elements.iter_mut().flatten() {
                element.listeners.remove_target(gone);
                element.forget_deferred(gone);
                match &mut element.kind {
                    ElementKind::Trigger(trigger) if trigger.driver() == Some(gone) => {
                        trigger.set_driver(None)
                    }
                    ElementKind::MultiTrigger(multi) => {
                        multi.remove_parent(gone);
                    }
                    ElementKind::Group(group) => {
                        group.forget_element(gone);
                        group.remove_child(gone);
                    }
                    _ => {}
                }
            }

            if let Some(element) = graph.elements.get_mut(gone.index()).and_then(Option::take) {
                graph.names.remove(element.name());
                tracing::debug!("Removed {} '{}'", element.element_type(), element.name());
            }
        }
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<ElementId> {
        self.shared.graph.read_recursive().names.get(name).copied()
    }

    pub fn name(&self, id: ElementId) -> GraphResult<String> {
        Ok(self.shared.graph.read_recursive().require(id)?.name().to_string())
    }

    pub fn element_type(&self, id: ElementId) -> GraphResult<ElementType> {
        Ok(self.shared.graph.read_recursive().require(id)?.element_type())
    }

    pub fn parent(&self, id: ElementId) -> GraphResult<Option<ElementId>> {
        Ok(self.shared.graph.read_recursive().require(id)?.parent())
    }

    pub fn children(&self, group: ElementId) -> GraphResult<Vec<ElementId>> {
        let graph = self.shared.graph.read_recursive();
        let element = graph.require(group)?;
        Ok(element
            .as_group()
            .map(|g| g.children().to_vec())
            .unwrap_or_default())
    }

    /// Ids of all live elements, in creation order.
    pub fn elements(&self) -> Vec<ElementId> {
        self.shared.graph.read_recursive().iter().map(Element::id).collect()
    }

    pub fn len(&self) -> usize {
        self.shared.graph.read_recursive().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Data connections ──

    /// Connect an output or buffer slot to an input or buffer slot.
    ///
    /// Either end may be a promoted group slot. A buffer target is rebound
    /// to the source's data; an input target observes it. Output-sourced
    /// connections also make the target step listen to the source step.
    pub fn connect(&self, source: SlotRef, target: SlotRef) -> GraphResult<()> {
        if !source.role.can_source() || !target.role.can_target() {
            return Err(ConnectionError::RoleMismatch {
                source_role: source.role,
                target_role: target.role,
            }
            .into());
        }

        let mut graph = self.shared.graph.write();
        let resolved_source = graph.resolve(&source)?;
        let resolved_target = graph.resolve(&target)?;

        let data = graph
            .slot_data(&resolved_source)?
            .ok_or_else(|| GraphError::not_found(format!("data behind {}", source)))?;
        let target_slot = graph
            .require(resolved_target.element)?
            .slots()
            .get(resolved_target.role, &resolved_target.name)?;

        if !target_slot.kind().accepts(data.kind()) {
            return Err(ConnectionError::TypeMismatch {
                from: source,
                to: target,
                produced: data.kind(),
                expected: target_slot.kind(),
            }
            .into());
        }
        if target_slot.is_connected() {
            return Err(ConnectionError::AlreadyConnected(target).into());
        }

        let connection = Connection {
            source,
            target,
            resolved_source,
            resolved_target,
        };
        if connection.is_direct() {
            let from = connection.resolved_source.element;
            let to = connection.resolved_target.element;
            if from == to {
                return Err(ConnectionError::SelfLoop(from).into());
            }
            if let Some(back) = graph.direct_path(to, from) {
                let mut path = vec![from];
                path.extend(back);
                return Err(ConnectionError::Cycle { path }.into());
            }
        }

        graph
            .require_mut(connection.resolved_target.element)?
            .slots
            .get_mut(connection.resolved_target.role, &connection.resolved_target.name)?
            .bind(data);
        if connection.implies_trigger() {
            graph
                .require_mut(connection.resolved_source.element)?
                .listeners
                .add_data_link(connection.resolved_target.element);
        }
        tracing::debug!(
            "Connected {} -> {}",
            connection.resolved_source,
            connection.resolved_target
        );
        graph.connections.push(connection);
        Ok(())
    }

    pub fn disconnect(&self, source: &SlotRef, target: &SlotRef) -> GraphResult<()> {
        let mut graph = self.shared.graph.write();
        let Some(pos) = graph
            .connections
            .iter()
            .position(|c| &c.source == source && &c.target == target)
        else {
            return Err(ConnectionError::NotConnected {
                from: source.clone(),
                to: target.clone(),
            }
            .into());
        };
        let connection = graph.connections.remove(pos);
        graph.unlink(&connection);
        tracing::debug!("Disconnected {} -> {}", source, target);
        Ok(())
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.shared.graph.read_recursive().connections.clone()
    }

    // ── Trigger connections ──

    /// Make `listener` run whenever `source` signals.
    pub fn connect_trigger(&self, source: ElementId, listener: ElementId) -> GraphResult<()> {
        let mut graph = self.shared.graph.write();
        if !graph.require(source)?.can_signal() {
            return Err(ConnectionError::InvalidTriggerSource(source).into());
        }
        let target = graph.require(listener)?;
        if !target.can_listen() {
            return Err(ConnectionError::InvalidListener(listener).into());
        }
        if source == listener {
            return Err(ConnectionError::SelfLoop(source).into());
        }
        if graph
            .require(source)?
            .listeners()
            .get(listener)
            .is_some_and(|l| l.explicit)
        {
            return Err(ConnectionError::DuplicateTrigger {
                from: source,
                listener,
            }
            .into());
        }

        match &mut graph.require_mut(listener)?.kind {
            ElementKind::Trigger(trigger) => {
                if trigger.driver().is_some_and(|d| d != source) {
                    return Err(ConnectionError::DriverAlreadySet(listener).into());
                }
                trigger.set_driver(Some(source));
            }
            ElementKind::MultiTrigger(multi) => {
                multi.add_parent(source);
            }
            _ => {}
        }
        graph.require_mut(source)?.listeners.add_explicit(listener);
        Ok(())
    }

    pub fn disconnect_trigger(&self, source: ElementId, listener: ElementId) -> GraphResult<()> {
        let mut graph = self.shared.graph.write();
        if !graph.require_mut(source)?.listeners.remove_explicit(listener) {
            return Err(GraphError::not_found(format!(
                "trigger connection {} -> {}",
                source, listener
            )));
        }
        match &mut graph.require_mut(listener)?.kind {
            ElementKind::Trigger(trigger) if trigger.driver() == Some(source) => {
                trigger.set_driver(None)
            }
            ElementKind::MultiTrigger(multi) => {
                multi.remove_parent(source);
            }
            _ => {}
        }
        Ok(())
    }

    /// Elements `id` signals, in signal order.
    pub fn listeners(&self, id: ElementId) -> GraphResult<Vec<ElementId>> {
        Ok(self
            .shared
            .graph
            .read_recursive()
            .require(id)?
            .listeners()
            .targets()
            .collect())
    }

    // ── Promotions ──

    /// Expose `target` (inside `group`) as the group's own `(role, name)` slot.
    pub fn promote(
        &self,
        group: ElementId,
        role: DataRole,
        name: &str,
        target: SlotRef,
    ) -> GraphResult<()> {
        if role == DataRole::Buffer {
            return Err(GraphError::InvalidParameter(
                "only input and output slots can be promoted".to_string(),
            ));
        }
        if target.role != role {
            return Err(ConnectionError::RoleMismatch {
                source_role: role,
                target_role: target.role,
            }
            .into());
        }

        let mut graph = self.shared.graph.write();
        graph.require(target.element)?;
        if !graph.is_within(target.element, group) {
            return Err(GraphError::InvalidParameter(format!(
                "{} is not inside group {}",
                target.element, group
            )));
        }
        let g = graph.require_group_mut(group)?;
        if g.promotion(role, name).is_some() {
            return Err(GraphError::duplicate(role, name));
        }
        g.promote(role, name, target);

        // A promotion must resolve to a real slot without looping back
        let promoted = SlotRef::new(group, role, name);
        let check = graph.resolve(&promoted).and_then(|resolved| {
            graph
                .require(resolved.element)?
                .slots()
                .get(resolved.role, &resolved.name)
                .map(|_| ())
        });
        if let Err(err) = check {
            graph.require_group_mut(group)?.demote(role, name);
            return Err(err);
        }
        Ok(())
    }

    pub fn demote(&self, group: ElementId, role: DataRole, name: &str) -> GraphResult<()> {
        let mut graph = self.shared.graph.write();
        let promoted = SlotRef::new(group, role, name);
        if graph.connections.iter().any(|c| c.source == promoted || c.target == promoted) {
            return Err(GraphError::InvalidParameter(format!(
                "promoted slot {} is still connected",
                promoted
            )));
        }
        graph
            .require_group_mut(group)?
            .demote(role, name)
            .map(|_| ())
            .ok_or_else(|| GraphError::not_found(format!("promotion {}", promoted)))
    }

    /// The real step slot behind `slot`.
    pub fn resolve(&self, slot: &SlotRef) -> GraphResult<SlotRef> {
        self.shared.graph.read_recursive().resolve(slot)
    }

    // ── Execution ──

    /// Run one wave from `origin` on the calling thread.
    pub fn trigger(&self, origin: ElementId) -> GraphResult<WaveReport> {
        let graph = self.shared.graph.read_recursive();
        let dt = graph
            .require(origin)?
            .as_looped()
            .map_or(self.shared.settings.default_period(), LoopedTrigger::period);
        self.shared.runner(&graph).run(origin, dt)
    }

    /// Run exactly one wave from a stopped looped trigger, with `dt` = period.
    pub fn step_once(&self, looped: ElementId) -> GraphResult<WaveReport> {
        let graph = self.shared.graph.read_recursive();
        let element = graph.require(looped)?;
        let trigger = element.as_looped().ok_or_else(|| {
            GraphError::InvalidParameter(format!("'{}' is not a looped trigger", element.name()))
        })?;
        if trigger.is_running() {
            return Err(GraphError::ThreadLifecycle(format!(
                "'{}' is running",
                element.name()
            )));
        }
        let report = self.shared.runner(&graph).run(looped, trigger.period())?;
        trigger
            .stats_handle()
            .lock()
            .record(report.duration, trigger.period());
        Ok(report)
    }

    /// Start a looped trigger's clock thread. Starting a running one is a no-op.
    pub fn start(&self, id: ElementId) -> GraphResult<()> {
        let graph = self.shared.graph.read_recursive();
        let element = graph.require(id)?;
        let looped = element.as_looped().ok_or_else(|| {
            GraphError::InvalidParameter(format!("'{}' is not a looped trigger", element.name()))
        })?;

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let stats = looped.stats_handle();
        let period = looped.period();
        let mode = looped.mode();
        let name = element.name().to_string();
        let started = looped.start(element.name(), move |tick| {
            let Some(shared) = weak.upgrade() else {
                return ControlFlow::Break(());
            };
            let graph = shared.graph.read_recursive();
            match shared.runner(&graph).run(id, mode.dt(&tick)) {
                Ok(report) => {
                    stats.lock().record(report.duration, period);
                    ControlFlow::Continue(())
                }
                Err(e) => {
                    tracing::error!("Looped trigger '{}' stopping: {}", name, e);
                    ControlFlow::Break(())
                }
            }
        })?;

        if started {
            tracing::info!(
                "Started looped trigger '{}' ({:?}, {:?})",
                element.name(),
                period,
                mode
            );
            self.shared
                .events
                .emit(NetworkEvent::LoopStarted { element: id, period });
        }
        Ok(())
    }

    /// Stop a looped trigger and wait until its last wave has finished.
    pub fn stop(&self, id: ElementId) -> GraphResult<()> {
        let task = {
            let graph = self.shared.graph.read_recursive();
            let element = graph.require(id)?;
            let looped = element.as_looped().ok_or_else(|| {
                GraphError::InvalidParameter(format!(
                    "'{}' is not a looped trigger",
                    element.name()
                ))
            })?;
            looped.take_task()
        };
        match task {
            Some(task) => self.join(id, &task),
            None => Ok(()),
        }
    }

    fn join(&self, id: ElementId, task: &PeriodicTask) -> GraphResult<()> {
        task.stop(self.shared.settings.stop_timeout())?;
        let ticks = task.ticks();
        tracing::info!("Stopped looped trigger '{}' after {} ticks", task.name(), ticks);
        self.shared
            .events
            .emit(NetworkEvent::LoopStopped { element: id, ticks });
        Ok(())
    }

    fn looped_ids(&self) -> Vec<ElementId> {
        self.shared
            .graph
            .read_recursive()
            .iter()
            .filter(|e| e.as_looped().is_some())
            .map(Element::id)
            .collect()
    }

    pub fn start_all(&self) -> GraphResult<()> {
        for id in self.looped_ids() {
            self.start(id)?;
        }
        Ok(())
    }

    /// Stop every looped trigger. All are asked to stop even if one fails;
    /// the first error is returned.
    pub fn stop_all(&self) -> GraphResult<()> {
        let tasks: Vec<(ElementId, Arc<PeriodicTask>)> = {
            let graph = self.shared.graph.read_recursive();
            graph
                .iter()
                .filter_map(|e| Some((e.id(), e.as_looped()?.take_task()?)))
                .collect()
        };
        let mut first_error = None;
        for (id, task) in tasks {
            if let Err(e) = self.join(id, &task) {
                tracing::error!("{}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn is_running(&self, id: ElementId) -> GraphResult<bool> {
        Ok(self
            .shared
            .graph
            .read_recursive()
            .require(id)?
            .as_looped()
            .is_some_and(LoopedTrigger::is_running))
    }

    pub fn loop_statistics(&self, id: ElementId) -> GraphResult<LoopStatistics> {
        let graph = self.shared.graph.read_recursive();
        let element = graph.require(id)?;
        element
            .as_looped()
            .map(LoopedTrigger::statistics)
            .ok_or_else(|| {
                GraphError::InvalidParameter(format!(
                    "'{}' is not a looped trigger",
                    element.name()
                ))
            })
    }

    /// Reset a step: kernel `reset()` under the step's locks, outputs back to `Unknown`.
    pub fn reset_step(&self, id: ElementId) -> GraphResult<()> {
        let graph = self.shared.graph.read_recursive();
        let element = graph.require(id)?;
        let step = element.as_step().ok_or_else(|| {
            GraphError::InvalidParameter(format!("'{}' is not a step", element.name()))
        })?;
        let ctx = StepContext {
            id,
            name: element.name(),
            slots: element.slots(),
            time: WaveTime::default(),
            events: &self.shared.events,
        };
        step.reset(&ctx).map_err(|source| GraphError::Compute {
            step: element.name().to_string(),
            source,
        })
    }

    // ── Queries ──

    fn with_step<T>(
        &self,
        id: ElementId,
        f: impl FnOnce(&crate::graph::step::Step, &Element) -> T,
    ) -> GraphResult<T> {
        let graph = self.shared.graph.read_recursive();
        let element = graph.require(id)?;
        let step = element.as_step().ok_or_else(|| {
            GraphError::InvalidParameter(format!("'{}' is not a step", element.name()))
        })?;
        Ok(f(step, element))
    }

    /// Overall validity of an element.
    ///
    /// Steps report `Error` after a failure and otherwise their worst output;
    /// groups report the worst of their steps; triggers are always `Valid`.
    pub fn validity(&self, id: ElementId) -> GraphResult<Validity> {
        let graph = self.shared.graph.read_recursive();
        let element = graph.require(id)?;
        let validity = match element.kind() {
            ElementKind::Step(step) => step.validity(element.slots()),
            ElementKind::Group(_) => Validity::worst_of(
                graph
                    .descendants(id)
                    .into_iter()
                    .filter_map(|d| graph.get(d))
                    .filter_map(|e| e.as_step().map(|s| s.validity(e.slots()))),
            ),
            _ => Validity::Valid,
        };
        Ok(validity)
    }

    pub fn step_state(&self, id: ElementId) -> GraphResult<StepState> {
        self.with_step(id, |step, _| step.state())
    }

    pub fn compute_count(&self, id: ElementId) -> GraphResult<u64> {
        self.with_step(id, |step, _| step.compute_count())
    }

    pub fn last_error(&self, id: ElementId) -> GraphResult<Option<String>> {
        self.with_step(id, |step, _| step.last_error())
    }

    pub fn is_deferred(&self, id: ElementId) -> GraphResult<bool> {
        self.with_step(id, |step, _| step.is_deferred())
    }

    pub fn parameters(&self, id: ElementId) -> GraphResult<serde_json::Value> {
        self.with_step(id, |step, _| step.parameters())
    }

    pub fn set_parameters(&self, id: ElementId, parameters: &serde_json::Value) -> GraphResult<()> {
        self.with_step(id, |step, _| step.set_parameters(parameters))?
    }

    pub fn slot_validity(&self, slot: &SlotRef) -> GraphResult<Validity> {
        let graph = self.shared.graph.read_recursive();
        let resolved = graph.resolve(slot)?;
        Ok(graph
            .require(resolved.element)?
            .slots()
            .get(resolved.role, &resolved.name)?
            .validity())
    }

    /// Data object currently behind a slot.
    pub fn data(&self, slot: &SlotRef) -> GraphResult<Option<DataRef>> {
        self.shared.graph.read_recursive().slot_data(slot)
    }

    /// Copy of a slot's current content.
    pub fn read_slot(&self, slot: &SlotRef) -> GraphResult<Buffer> {
        self.data(slot)?
            .map(|data| data.snapshot())
            .ok_or_else(|| GraphError::not_found(format!("data behind {}", slot)))
    }

    // ── Observers ──

    /// Bounded stream of network events.
    pub fn subscribe(&self) -> Receiver<NetworkEvent> {
        self.shared.events.subscribe()
    }

    pub fn add_observer(&self, observer: Arc<dyn NetworkObserver>) {
        self.shared.events.add_observer(observer);
    }

    /// Events dropped because a subscriber fell behind.
    pub fn dropped_events(&self) -> u64 {
        self.shared.events.dropped()
    }

    // ── Persistence ──

    pub fn write_configuration(&self) -> NetworkConfig {
        let graph = self.shared.graph.read_recursive();
        let name_of = |id: ElementId| graph.get(id).map(|e| e.name().to_string()).unwrap_or_default();
        let slot_config = |slot: &SlotRef| SlotConfig::new(name_of(slot.element), slot.role, &slot.name);

        let mut config = NetworkConfig::default();
        let mut promotions = Vec::new();
        for element in graph.iter() {
            let kind = match element.kind() {
                ElementKind::Step(step) => ElementConfigKind::Step {
                    kernel: step.type_name().to_string(),
                    parameters: step.parameters(),
                },
                ElementKind::Trigger(_) => ElementConfigKind::Trigger,
                ElementKind::MultiTrigger(_) => ElementConfigKind::MultiTrigger,
                ElementKind::Looped(looped) => ElementConfigKind::LoopedTrigger {
                    period_us: u64::try_from(looped.period().as_micros()).unwrap_or(u64::MAX),
                    mode: looped.mode(),
                },
                ElementKind::Group(group) => {
                    let depth = graph.depth(element.id());
                    for (role, name, target) in group.promotions() {
                        promotions.push((
                            depth,
                            PromotionConfig {
                                group: element.name().to_string(),
                                role,
                                name: name.to_string(),
                                target: slot_config(target),
                            },
                        ));
                    }
                    ElementConfigKind::Group
                }
            };
            config.elements.push(ElementConfig {
                name: element.name().to_string(),
                parent: element.parent().map(name_of),
                kind,
            });
            for listener in element.listeners().iter().filter(|l| l.explicit) {
                config.triggers.push(TriggerConfig {
                    source: element.name().to_string(),
                    listener: name_of(listener.target),
                });
            }
        }
        // Inner groups first: an outer promotion may target an inner one
        promotions.sort_by_key(|(depth, _)| std::cmp::Reverse(*depth));
        config.promotions = promotions.into_iter().map(|(_, p)| p).collect();

        for connection in &graph.connections {
            config.connections.push(ConnectionConfig {
                source: slot_config(&connection.source),
                target: slot_config(&connection.target),
            });
        }
        config
    }

    /// Add everything described by `config` to this network.
    pub fn read_configuration(
        &self,
        config: &NetworkConfig,
        registry: &KernelRegistry,
    ) -> GraphResult<()> {
        for element in &config.elements {
            match &element.kind {
                ElementConfigKind::Step { kernel, parameters } => {
                    self.add_boxed_step(&element.name, registry.create(kernel, parameters)?)?
                }
                ElementConfigKind::Trigger => self.add_trigger(&element.name)?,
                ElementConfigKind::MultiTrigger => self.add_multi_trigger(&element.name)?,
                ElementConfigKind::LoopedTrigger { period_us, mode } => self.add_looped_trigger(
                    &element.name,
                    Duration::from_micros(*period_us),
                    *mode,
                )?,
                ElementConfigKind::Group => self.add_group(&element.name)?,
            };
        }

        let lookup = |name: &str| {
            self.find(name)
                .ok_or_else(|| GraphError::not_found(format!("element '{}'", name)))
        };
        let slot = |c: &SlotConfig| -> GraphResult<SlotRef> {
            Ok(SlotRef::new(lookup(&c.element)?, c.role, &c.slot))
        };

        for element in &config.elements {
            if let Some(parent) = &element.parent {
                self.set_parent(lookup(&element.name)?, Some(lookup(parent)?))?;
            }
        }
        for promotion in &config.promotions {
            self.promote(
                lookup(&promotion.group)?,
                promotion.role,
                &promotion.name,
                slot(&promotion.target)?,
            )?;
        }
        for connection in &config.connections {
            self.connect(slot(&connection.source)?, slot(&connection.target)?)?;
        }
        for trigger in &config.triggers {
            self.connect_trigger(lookup(&trigger.source)?, lookup(&trigger.listener)?)?;
        }
        tracing::info!(
            "Loaded network: {} elements, {} connections, {} trigger connections",
            config.elements.len(),
            config.connections.len(),
            config.triggers.len()
        );
        Ok(())
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        if let Err(e) = self.stop_all() {
            tracing::warn!("Error stopping looped triggers on drop: {}", e);
        }
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.shared.graph.read_recursive();
        f.debug_struct("Network")
            .field("elements", &graph.names.len())
            .field("connections", &graph.connections.len())
            .finish()
    }
}
