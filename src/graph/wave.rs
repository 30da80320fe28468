//! Wave propagation.
//!
//! A wave runs on the thread that started it and is planned up front:
//!
//! 1. Roots are the origin plus whatever feedback edges deferred during the
//!    origin's previous waves.
//! 2. Collect everything reachable from the roots over listener edges.
//! 3. An iterative depth-first search marks the edges that close a cycle
//!    ("feedback" edges).
//! 4. Kahn's algorithm over the remaining edges gives the execution order,
//!    so a node runs only after all of its in-wave predecessors.
//!
//! During execution a node runs only if it is a root or at least one
//! predecessor signaled it. A signal along a feedback edge doesn't re-enter
//! the target; it is deferred to the origin's next wave instead. No
//! recursion is involved, so long chains cannot exhaust the stack, and the
//! visited bookkeeping is local to the wave so concurrent waves from
//! different clocks don't interfere.

use crate::graph::element::{Element, ElementKind};
use crate::graph::error::{ConnectionError, GraphError, GraphResult};
use crate::graph::events::{EventBus, NetworkEvent};
use crate::graph::id::ElementId;
use crate::graph::kernel::WaveTime;
use crate::graph::network::Graph;
use crate::graph::step::{StepContext, TriggerOutcome};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

/// One outgoing edge as seen by a wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PlannedEdge {
    pub target: ElementId,
    /// Closes a cycle; signals along it are deferred.
    pub feedback: bool,
}

/// Execution order and classified edges for one wave.
#[derive(Debug, Default)]
pub(crate) struct Plan {
    pub order: Vec<ElementId>,
    pub edges: HashMap<ElementId, Vec<PlannedEdge>>,
}

impl Plan {
    pub fn feedback_edges(&self) -> Vec<(ElementId, ElementId)> {
        let mut edges: Vec<_> = self
            .edges
            .iter()
            .flat_map(|(&source, out)| {
                out.iter()
                    .filter(|e| e.feedback)
                    .map(move |e| (source, e.target))
            })
            .collect();
        edges.sort();
        edges
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Open,
    Done,
}

/// Plan a wave from `roots` over the graph given by `successors`.
pub(crate) fn plan<F, I>(roots: &[ElementId], successors: F) -> Plan
where
    F: Fn(ElementId) -> I,
    I: IntoIterator<Item = ElementId>,
{
    // Discover the reachable set, numbering nodes in discovery order
    let mut ids: Vec<ElementId> = Vec::new();
    let mut index: HashMap<ElementId, usize> = HashMap::new();
    for &root in roots {
        if !index.contains_key(&root) {
            index.insert(root, ids.len());
            ids.push(root);
        }
    }
    let root_count = ids.len();
    let mut adjacency: Vec<Vec<usize>> = Vec::new();
    let mut cursor = 0;
    while cursor < ids.len() {
        let mut out = Vec::new();
        for next in successors(ids[cursor]) {
            let i = *index.entry(next).or_insert_with(|| {
                ids.push(next);
                ids.len() - 1
            });
            if !out.contains(&i) {
                out.push(i);
            }
        }
        adjacency.push(out);
        cursor += 1;
    }

    // Iterative DFS: an edge into an open node closes a cycle
    let n = ids.len();
    let mut mark = vec![Mark::New; n];
    let mut feedback: HashSet<(usize, usize)> = HashSet::new();
    for root in 0..root_count {
        if mark[root] != Mark::New {
            continue;
        }
        mark[root] = Mark::Open;
        let mut stack = vec![(root, 0usize)];
        while let Some((node, next)) = stack.last_mut() {
            let node = *node;
            if let Some(&succ) = adjacency[node].get(*next) {
                *next += 1;
                match mark[succ] {
                    Mark::New => {
                        mark[succ] = Mark::Open;
                        stack.push((succ, 0));
                    }
                    Mark::Open => {
                        feedback.insert((node, succ));
                    }
                    Mark::Done => {}
                }
            } else {
                mark[node] = Mark::Done;
                stack.pop();
            }
        }
    }

    // Kahn's algorithm over forward edges
    let mut in_degree = vec![0usize; n];
    for (u, out) in adjacency.iter().enumerate() {
        for &v in out {
            if !feedback.contains(&(u, v)) {
                in_degree[v] += 1;
            }
        }
    }
    let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(u) = queue.pop_front() {
        order.push(ids[u]);
        for &v in &adjacency[u] {
            if feedback.contains(&(u, v)) {
                continue;
            }
            in_degree[v] -= 1;
            if in_degree[v] == 0 {
                queue.push_back(v);
            }
        }
    }

    let edges = adjacency
        .iter()
        .enumerate()
        .map(|(u, out)| {
            let planned = out
                .iter()
                .map(|&v| PlannedEdge {
                    target: ids[v],
                    feedback: feedback.contains(&(u, v)),
                })
                .collect();
            (ids[u], planned)
        })
        .collect();

    Plan { order, edges }
}

/// Summary of one completed wave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveReport {
    pub origin: ElementId,
    pub wave: u64,
    /// Steps whose compute ran (successfully or with a warning).
    pub computed: usize,
    /// Steps that failed or had invalid inputs.
    pub failed: usize,
    /// Steps that refused the trigger because they were busy.
    pub refused: usize,
    /// Elements deferred to the origin's next wave.
    pub deferred: Vec<ElementId>,
    pub duration: Duration,
}

pub(crate) struct WaveRunner<'g> {
    pub graph: &'g Graph,
    pub events: &'g EventBus,
    pub deferred_limit: usize,
}

impl WaveRunner<'_> {
    /// Run one wave from `origin` with integration step `dt`.
    pub fn run(&self, origin: ElementId, dt: Duration) -> GraphResult<WaveReport> {
        let origin_element = self
            .graph
            .get(origin)
            .ok_or_else(|| GraphError::not_found(format!("element {}", origin)))?;
        if !origin_element.can_signal() {
            return Err(ConnectionError::InvalidTriggerSource(origin).into());
        }

        let started = Instant::now();
        let wave = origin_element.next_wave();
        self.events.emit(NetworkEvent::WaveStarted { origin, wave });

        let mut roots = vec![origin];
        for id in origin_element.take_deferred() {
            if id != origin && self.graph.get(id).is_some_and(|e| e.can_listen()) {
                roots.push(id);
            }
        }

        let plan = plan(&roots, |id| {
            self.graph
                .get(id)
                .map(|e| e.listeners().targets().collect::<Vec<_>>())
                .unwrap_or_default()
                .into_iter()
                .filter(|&t| self.graph.get(t).is_some_and(|e| e.can_listen()))
        });
        tracing::trace!(
            "Wave {} from {}: {} elements planned, {} feedback edges",
            wave,
            origin,
            plan.order.len(),
            plan.feedback_edges().len()
        );

        let mut report = WaveReport {
            origin,
            wave,
            computed: 0,
            failed: 0,
            refused: 0,
            deferred: Vec::new(),
            duration: Duration::ZERO,
        };
        let mut signaled_by: HashMap<ElementId, Vec<ElementId>> = HashMap::new();

        for &id in &plan.order {
            let Some(element) = self.graph.get(id) else {
                continue;
            };
            let is_root = roots.contains(&id);
            let activators = signaled_by.remove(&id).unwrap_or_default();
            if !is_root && activators.is_empty() {
                continue;
            }

            let signals = match &element.kind {
                ElementKind::Step(step) => {
                    let ctx = StepContext {
                        id,
                        name: element.name(),
                        slots: &element.slots,
                        time: WaveTime {
                            wave,
                            dt,
                            elapsed: started.elapsed(),
                        },
                        events: self.events,
                    };
                    let outcome = step.on_trigger(&ctx);
                    match outcome {
                        TriggerOutcome::Computed | TriggerOutcome::Warned => report.computed += 1,
                        TriggerOutcome::Failed | TriggerOutcome::InputsInvalid => {
                            report.failed += 1
                        }
                        TriggerOutcome::Busy => report.refused += 1,
                    }
                    outcome.signals_listeners()
                }
                ElementKind::Trigger(_) | ElementKind::Looped(_) => true,
                ElementKind::MultiTrigger(multi) => {
                    if id == origin {
                        multi.clear();
                        true
                    } else {
                        multi.signal(activators)
                    }
                }
                ElementKind::Group(_) => false,
            };
            if !signals {
                continue;
            }

            for edge in plan.edges.get(&id).into_iter().flatten() {
                if edge.feedback {
                    self.defer(origin_element, id, edge.target, &mut report);
                } else {
                    signaled_by.entry(edge.target).or_default().push(id);
                }
            }
        }

        report.duration = started.elapsed();
        self.events.emit(NetworkEvent::WaveFinished {
            origin,
            wave,
            computed: report.computed,
            duration: report.duration,
        });
        tracing::trace!(
            "Wave {} from {} finished in {:?}: {} computed, {} failed, {} refused",
            wave,
            origin,
            report.duration,
            report.computed,
            report.failed,
            report.refused
        );
        Ok(report)
    }

    /// A feedback edge from `source` reached `target`.
    fn defer(
        &self,
        origin: &Element,
        source: ElementId,
        target: ElementId,
        report: &mut WaveReport,
    ) {
        let Some(element) = self.graph.get(target) else {
            return;
        };
        match &element.kind {
            ElementKind::Step(step) => step.mark_deferred(),
            ElementKind::MultiTrigger(multi) => multi.record([source]),
            _ => {}
        }
        if origin.defer(target, self.deferred_limit) {
            tracing::debug!(
                "'{}' reached again through a feedback edge, deferred to next wave of '{}'",
                element.name(),
                origin.name()
            );
            report.deferred.push(target);
            self.events.emit(NetworkEvent::StepDeferred {
                element: target,
                origin: origin.id(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(u32, u32)]) -> impl Fn(ElementId) -> Vec<ElementId> {
        let mut adjacency: HashMap<u32, Vec<ElementId>> = HashMap::new();
        for &(s, t) in edges {
            adjacency.entry(s).or_default().push(ElementId(t));
        }
        move |id| adjacency.get(&id.0).cloned().unwrap_or_default()
    }

    fn ids(raw: &[u32]) -> Vec<ElementId> {
        raw.iter().map(|&i| ElementId(i)).collect()
    }

    #[test]
    fn test_diamond_joins_before_sink() {
        let edges = [(0, 1), (0, 2), (1, 3), (2, 3)];
        let plan = plan(&[ElementId(0)], graph(&edges));
        assert_eq!(plan.order, ids(&[0, 1, 2, 3]));
        assert!(plan.feedback_edges().is_empty());
    }

    #[test]
    fn test_cycle_has_one_feedback_edge() {
        let edges = [(0, 1), (1, 2), (2, 1), (2, 3)];
        let plan = plan(&[ElementId(0)], graph(&edges));
        assert_eq!(plan.feedback_edges(), vec![(ElementId(2), ElementId(1))]);
        assert_eq!(plan.order, ids(&[0, 1, 2, 3]));
    }

    #[test]
    fn test_edge_back_to_origin_is_feedback() {
        let edges = [(0, 1), (1, 0)];
        let plan = plan(&[ElementId(0)], graph(&edges));
        assert_eq!(plan.feedback_edges(), vec![(ElementId(1), ElementId(0))]);
        assert_eq!(plan.order, ids(&[0, 1]));
    }

    #[test]
    fn test_unreachable_nodes_are_not_planned() {
        let edges = [(0, 1), (5, 1)];
        let plan = plan(&[ElementId(0)], graph(&edges));
        assert_eq!(plan.order, ids(&[0, 1]));
    }

    #[test]
    fn test_long_chain_plans_without_recursion() {
        let edges: Vec<(u32, u32)> = (0..100_000).map(|i| (i, i + 1)).collect();
        let plan = plan(&[ElementId(0)], graph(&edges));
        assert_eq!(plan.order.len(), 100_001);
        assert_eq!(plan.order.last(), Some(&ElementId(100_000)));
    }

    #[test]
    fn test_deferred_root_waits_for_predecessors() {
        // 2 was deferred by a feedback edge last wave; it still runs after 1
        let edges = [(0, 1), (1, 2)];
        let plan = plan(&[ElementId(0), ElementId(2)], graph(&edges));
        assert_eq!(plan.order, ids(&[0, 1, 2]));
    }
}
