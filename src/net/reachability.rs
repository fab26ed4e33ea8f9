//! 可达图：从当前标识出发做广度优先探索，状态数达到上限时截断。
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::fmt;

use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::net::core::{Net, NetError};
use crate::net::ids::TransitionId;
use crate::net::marking::Marking;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReachabilityEdge {
    pub transition: TransitionId,
}

impl fmt::Display for ReachabilityEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.transition)
    }
}

#[derive(Debug)]
pub struct ReachabilityGraph {
    pub graph: DiGraph<Marking, ReachabilityEdge>,
    pub initial: NodeIndex,
    /// Set when at least one successor was dropped because of the state limit.
    pub truncated: bool,
    dead: Vec<NodeIndex>,
    markings: HashMap<Marking, NodeIndex>,
}

impl ReachabilityGraph {
    pub fn state_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, marking: &Marking) -> bool {
        self.markings.contains_key(marking)
    }

    /// States with no enabled transition. A state whose successors were
    /// all cut off by the state limit is not dead.
    pub fn dead_states(&self) -> &[NodeIndex] {
        &self.dead
    }

    pub fn marking(&self, node: NodeIndex) -> &Marking {
        &self.graph[node]
    }

    /// Transitions leaving `node`, with their targets.
    pub fn successors(&self, node: NodeIndex) -> Vec<(&TransitionId, NodeIndex)> {
        self.graph
            .edges(node)
            .map(|edge| (&edge.weight().transition, edge.target()))
            .collect()
    }

    pub fn to_dot(&self) -> String {
        fn escape(s: &str) -> String {
            s.replace('\\', "\\\\").replace('"', "\\\"")
        }

        format!(
            "{:?}",
            Dot::with_attr_getters(
                &self.graph,
                &[Config::EdgeNoLabel, Config::NodeNoLabel],
                &|_, edge| format!("label=\"{}\"", escape(edge.weight().transition.as_str())),
                &|_, (index, marking)| {
                    let mut attrs = format!(
                        "label=\"s{}\\n{}\"",
                        index.index(),
                        escape(&marking.to_string())
                    );
                    if index == self.initial {
                        attrs.push_str(", penwidth=2");
                    }
                    attrs
                },
            )
        )
    }
}

impl Net {
    /// Explores the markings reachable from the current one. The net is
    /// not modified; at most `max_states` states are kept, and the initial
    /// state always counts, so a limit of 0 behaves like 1.
    pub fn explore(&self, max_states: usize) -> Result<ReachabilityGraph, NetError> {
        let max_states = max_states.max(1);
        let mut graph = DiGraph::new();
        let mut markings: HashMap<Marking, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::new();
        let mut truncated = false;
        let mut dead = Vec::new();

        let initial = graph.add_node(self.marking.clone());
        markings.insert(self.marking.clone(), initial);
        queue.push_back(initial);

        while let Some(state) = queue.pop_front() {
            let current = graph[state].clone();
            let enabled = self.enabled_transitions_under(&current)?;
            if enabled.is_empty() {
                dead.push(state);
                continue;
            }
            for transition in enabled {
                let (next, _) = self.successor(&current, &transition)?;
                let target = match markings.entry(next) {
                    Entry::Occupied(entry) => *entry.get(),
                    Entry::Vacant(entry) => {
                        if graph.node_count() >= max_states {
                            truncated = true;
                            continue;
                        }
                        let index = graph.add_node(entry.key().clone());
                        entry.insert(index);
                        queue.push_back(index);
                        index
                    }
                };
                graph.add_edge(state, target, ReachabilityEdge { transition });
            }
        }

        log::debug!(
            "explored {} states, {} edges{}",
            graph.node_count(),
            graph.edge_count(),
            if truncated { " (truncated)" } else { "" }
        );
        Ok(ReachabilityGraph {
            graph,
            initial,
            truncated,
            dead,
            markings,
        })
    }
}
