//! Tensor view assignment.

use super::{GraphValidationError, Pass, PassContext};
use crate::graph::{Function, Graph, NodeId};

/// Ensures every output of every listed node owns exactly one shared view,
/// allocating views (with dense ids) for outputs that lack one. Types must
/// already be resolved; layout stays unassigned.
pub(crate) fn ensure_views(
    graph: &mut Graph,
    nodes: &[NodeId],
) -> Result<(), GraphValidationError> {
    for &id in nodes {
        for index in 0..graph.node(id).outputs.len() {
            if graph.node(id).output_view(index).is_some() {
                continue;
            }
            let ty = graph
                .node(id)
                .output_ty(index)
                .cloned()
                .ok_or(GraphValidationError::MissingView { node: id })?;
            let view = graph.new_view(ty);
            graph.node_mut(id).outputs[index].view = Some(view);
        }
    }
    Ok(())
}

pub struct AssignTensors;

impl Pass for AssignTensors {
    fn name(&self) -> &'static str {
        "assign-tensors"
    }

    fn run(
        &self,
        function: &mut Function,
        cx: &mut PassContext,
    ) -> Result<(), GraphValidationError> {
        // Parameters come first so unused ones still get views; the ordered
        // walk covers everything reachable from the result.
        let mut worklist: Vec<NodeId> = function.parameters().to_vec();
        worklist.extend_from_slice(cx.order());
        ensure_views(function.graph_mut(), &worklist)
    }
}
