//! Type propagation over an ordered graph.

use super::{GraphValidationError, Pass, PassContext};
use crate::graph::{Function, Graph, NodeId};
use crate::ops::op_def;

/// Resolves output types for every node in `order`, in order. Nodes whose
/// outputs are already fully typed (parameters, constants, previously
/// inferred regions) keep them, which makes the walk idempotent. Every
/// resolved type must have a representable byte size; declared types are
/// checked too, so an oversized parameter is caught here rather than at
/// allocation time.
pub(crate) fn infer_types(
    graph: &mut Graph,
    order: &[NodeId],
) -> Result<(), GraphValidationError> {
    for &id in order {
        if !graph.node(id).outputs.iter().all(|o| o.ty.is_some()) {
            let kind = graph.node(id).kind;
            let tys = op_def(kind).infer(graph, id)?;
            let node = graph.node_mut(id);
            if tys.len() != node.outputs.len() {
                return Err(GraphValidationError::TypeMismatch {
                    node: id,
                    kind,
                    message: format!(
                        "inference produced {} outputs, node declares {}",
                        tys.len(),
                        node.outputs.len()
                    ),
                });
            }
            for (output, ty) in node.outputs.iter_mut().zip(tys) {
                output.ty = Some(ty);
            }
        }
        for ty in graph.node(id).outputs.iter().filter_map(|o| o.ty.as_ref()) {
            if ty.byte_len().is_none() {
                return Err(GraphValidationError::OversizedType {
                    node: id,
                    ty: ty.clone(),
                });
            }
        }
    }
    Ok(())
}

pub struct PropagateTypes;

impl Pass for PropagateTypes {
    fn name(&self) -> &'static str {
        "propagate-types"
    }

    fn run(
        &self,
        function: &mut Function,
        cx: &mut PassContext,
    ) -> Result<(), GraphValidationError> {
        infer_types(function.graph_mut(), cx.order())
    }
}
