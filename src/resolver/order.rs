//! Arrow graph scheduling
//!
//! Entries are an arena of integer indices; arrows are ordering
//! constraints between them. Cycles are found with Tarjan's strongly
//! connected components; inside a cycle the weakest arrows are
//! downgraded until the component is acyclic, or resolution fails when
//! build-time arrows alone form the cycle. The final order is a
//! topological sort that is stable with respect to insertion order.

use crate::error::{Error, Result};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// How strong an ordering constraint is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArrowKind {
    /// Build-time dependency: must hold, never downgraded
    Pre,
    /// Run-time dependency: ordered before unless that closes a cycle
    PreRuntime,
    /// Post dependency: ordered after its dependent
    Post,
    /// Suggestion: weakest, first to go
    Suggest,
}

/// `from` must appear before `to` in the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrow {
    pub from: usize,
    pub to: usize,
    pub kind: ArrowKind,
    /// Set when cycle breaking waived this constraint
    pub downgraded: bool,
}

impl Arrow {
    pub fn new(from: usize, to: usize, kind: ArrowKind) -> Self {
        Self {
            from,
            to,
            kind,
            downgraded: false,
        }
    }
}

/// Order `entry_count` entries under `arrows`, downgrading weak arrows
/// inside cycles. Returns entry indices in schedule order; arrows that
/// were waived come back marked `downgraded`.
pub fn schedule(
    entry_count: usize,
    arrows: &mut [Arrow],
    describe: impl Fn(usize) -> String,
) -> Result<Vec<usize>> {
    let mut graph: DiGraph<usize, usize> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..entry_count).map(|i| graph.add_node(i)).collect();
    for (arrow_index, arrow) in arrows.iter().enumerate() {
        graph.add_edge(nodes[arrow.from], nodes[arrow.to], arrow_index);
    }

    for scc in tarjan_scc(&graph) {
        if scc.len() < 2 {
            continue;
        }
        let members: BTreeSet<usize> = scc.iter().map(|n| graph[*n]).collect();
        let inside: Vec<usize> = arrows
            .iter()
            .enumerate()
            .filter(|(_, a)| members.contains(&a.from) && members.contains(&a.to))
            .map(|(i, _)| i)
            .collect();

        // waive the weakest arrow kinds until the component untangles:
        // suggestions first, then runtime arrows, then post arrows
        let mut broke = false;
        let steps: [&[ArrowKind]; 3] = [
            &[ArrowKind::Pre, ArrowKind::PreRuntime, ArrowKind::Post],
            &[ArrowKind::Pre, ArrowKind::Post],
            &[ArrowKind::Pre],
        ];
        for kept_kinds in steps {
            let keep: Vec<usize> = inside
                .iter()
                .copied()
                .filter(|&i| kept_kinds.contains(&arrows[i].kind))
                .collect();
            if is_acyclic(&members, &keep, arrows) {
                for &i in &inside {
                    if !kept_kinds.contains(&arrows[i].kind) {
                        debug!(
                            from = %describe(arrows[i].from),
                            to = %describe(arrows[i].to),
                            "downgrading arrow to break a dependency cycle"
                        );
                        arrows[i].downgraded = true;
                    }
                }
                warn!(
                    cycle = ?members.iter().map(|&m| describe(m)).collect::<Vec<_>>(),
                    "dependency cycle broken by downgrading non-build arrows"
                );
                broke = true;
                break;
            }
        }
        if !broke {
            return Err(Error::CircularDependency {
                cycle: members.iter().map(|&m| describe(m)).collect(),
            });
        }
    }

    kahn_order(entry_count, arrows)
}

/// Are the given arrows acyclic over the member set?
fn is_acyclic(members: &BTreeSet<usize>, arrow_indices: &[usize], arrows: &[Arrow]) -> bool {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let mut map = std::collections::HashMap::new();
    for &m in members {
        map.insert(m, graph.add_node(m));
    }
    for &i in arrow_indices {
        graph.add_edge(map[&arrows[i].from], map[&arrows[i].to], ());
    }
    petgraph::algo::toposort(&graph, None).is_ok()
}

/// Kahn's algorithm, always taking the smallest ready index, so the
/// output is deterministic and respects insertion order where arrows
/// leave it free.
fn kahn_order(entry_count: usize, arrows: &[Arrow]) -> Result<Vec<usize>> {
    let mut indegree = vec![0usize; entry_count];
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); entry_count];
    for arrow in arrows.iter().filter(|a| !a.downgraded) {
        indegree[arrow.to] += 1;
        outgoing[arrow.from].push(arrow.to);
    }

    let mut ready: BTreeSet<usize> = (0..entry_count).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(entry_count);
    while let Some(&next) = ready.iter().next() {
        ready.remove(&next);
        order.push(next);
        for &succ in &outgoing[next] {
            indegree[succ] -= 1;
            if indegree[succ] == 0 {
                ready.insert(succ);
            }
        }
    }
    if order.len() != entry_count {
        return Err(Error::Internal(
            "arrow graph still cyclic after downgrade pass".to_string(),
        ));
    }
    Ok(order)
}
