//! Reachability-restricted topological ordering.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::{GraphValidationError, Pass, PassContext};
use crate::graph::{Function, Graph, NodeId};

/// Orders every node reachable backward from `roots` so that producers
/// precede consumers. Among nodes whose dependencies are all satisfied, the
/// earliest-inserted (lowest id) is emitted first, which makes the order a
/// pure function of graph construction.
pub fn topological_order(
    graph: &Graph,
    roots: &[NodeId],
) -> Result<Vec<NodeId>, GraphValidationError> {
    let n = graph.len();
    let mut reachable = vec![false; n];
    let mut stack: Vec<NodeId> = roots.to_vec();
    while let Some(id) = stack.pop() {
        if reachable[id.index()] {
            continue;
        }
        reachable[id.index()] = true;
        for input in &graph.node(id).inputs {
            stack.push(input.node);
        }
    }
    let reachable_count = reachable.iter().filter(|r| **r).count();

    // Kahn's algorithm over the induced subgraph, counting one dependency
    // per edge so duplicate edges stay balanced.
    let mut indegree = vec![0usize; n];
    let mut consumers: Vec<Vec<NodeId>> = vec![Vec::new(); n];
    for id in graph.ids() {
        if !reachable[id.index()] {
            continue;
        }
        for input in &graph.node(id).inputs {
            indegree[id.index()] += 1;
            consumers[input.node.index()].push(id);
        }
    }

    let mut ready: BinaryHeap<Reverse<NodeId>> = BinaryHeap::new();
    for id in graph.ids() {
        if reachable[id.index()] && indegree[id.index()] == 0 {
            ready.push(Reverse(id));
        }
    }

    let mut order = Vec::with_capacity(reachable_count);
    let mut placed = vec![false; n];
    while let Some(Reverse(id)) = ready.pop() {
        order.push(id);
        placed[id.index()] = true;
        for &consumer in &consumers[id.index()] {
            indegree[consumer.index()] -= 1;
            if indegree[consumer.index()] == 0 {
                ready.push(Reverse(consumer));
            }
        }
    }

    if order.len() != reachable_count {
        for id in graph.ids() {
            if reachable[id.index()] && !placed[id.index()] {
                return Err(GraphValidationError::Cycle { node: id });
            }
        }
    }
    Ok(order)
}

pub struct TopologicalSort;

impl Pass for TopologicalSort {
    fn name(&self) -> &'static str {
        "topological-sort"
    }

    fn run(
        &self,
        function: &mut Function,
        cx: &mut PassContext,
    ) -> Result<(), GraphValidationError> {
        cx.order = topological_order(function.graph(), &[function.result()])?;
        Ok(())
    }
}
