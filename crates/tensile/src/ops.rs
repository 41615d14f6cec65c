//! Per-op-kind semantics: one strategy object per [`OpKind`] exposing shape
//! and type inference plus the backward (chain-rule) expansion.
//!
//! The registry is an exhaustive match over the closed op-kind enum; there is
//! no runtime registration and no type-identity lookup. Codegen handlers live
//! in the backend crate, keyed by the same enum.

use smallvec::SmallVec;

use crate::graph::{Graph, NodeId, OpKind, Shape, ValueType};
use crate::passes::GraphValidationError;

/// Backprop contributions produced by one backward expansion:
/// `(predecessor, contribution expression)` pairs.
pub type Contributions = SmallVec<[(NodeId, NodeId); 2]>;

/// Capability set of one operation kind.
pub trait OpDef: Sync {
    /// Derives the output value types from the node's already-resolved input
    /// types. Returns one entry per output.
    fn infer(&self, graph: &Graph, node: NodeId) -> Result<Vec<ValueType>, GraphValidationError>;

    /// Expands the chain rule: given the node's accumulated output adjoint,
    /// builds the contribution expression for each input in `graph`.
    ///
    /// Returns `None` when the kind has no backward rule. Leaf kinds and
    /// kinds whose derivative vanishes return `Some` with no entries.
    fn backward(&self, graph: &mut Graph, node: NodeId, adjoint: NodeId) -> Option<Contributions>;
}

/// Looks up the strategy object for an op kind. Total over [`OpKind`].
pub fn op_def(kind: OpKind) -> &'static dyn OpDef {
    match kind {
        OpKind::Parameter => &ParameterDef,
        OpKind::Constant => &ConstantDef,
        OpKind::Add => &AddDef,
        OpKind::Subtract => &SubtractDef,
        OpKind::Multiply => &MultiplyDef,
        OpKind::Divide => &DivideDef,
        OpKind::Negative => &NegativeDef,
        OpKind::Abs => &AbsDef,
        OpKind::Sign => &SignDef,
        OpKind::Maximum => &MaximumDef,
        OpKind::Dot => &DotDef,
        OpKind::Tuple => &TupleDef,
    }
}

fn mismatch(graph: &Graph, node: NodeId, message: impl Into<String>) -> GraphValidationError {
    GraphValidationError::TypeMismatch {
        node,
        kind: graph.node(node).kind,
        message: message.into(),
    }
}

fn input_ty<'g>(
    graph: &'g Graph,
    node: NodeId,
    index: usize,
) -> Result<&'g ValueType, GraphValidationError> {
    let input = *graph
        .node(node)
        .inputs
        .get(index)
        .ok_or_else(|| mismatch(graph, node, format!("missing input {index}")))?;
    graph
        .input_ty(input)
        .ok_or_else(|| mismatch(graph, node, format!("input {index} has an unresolved type")))
}

fn infer_elementwise_binary(
    graph: &Graph,
    node: NodeId,
) -> Result<Vec<ValueType>, GraphValidationError> {
    let a = input_ty(graph, node, 0)?;
    let b = input_ty(graph, node, 1)?;
    if a != b {
        return Err(mismatch(
            graph,
            node,
            format!("operand types differ: {a} vs {b}"),
        ));
    }
    Ok(vec![a.clone()])
}

fn infer_elementwise_unary(
    graph: &Graph,
    node: NodeId,
) -> Result<Vec<ValueType>, GraphValidationError> {
    Ok(vec![input_ty(graph, node, 0)?.clone()])
}

fn binary_operands(graph: &Graph, node: NodeId) -> (NodeId, NodeId) {
    let n = graph.node(node);
    (n.inputs[0].node, n.inputs[1].node)
}

struct ParameterDef;

impl OpDef for ParameterDef {
    fn infer(&self, graph: &Graph, node: NodeId) -> Result<Vec<ValueType>, GraphValidationError> {
        graph
            .node(node)
            .output_ty(0)
            .cloned()
            .map(|ty| vec![ty])
            .ok_or_else(|| mismatch(graph, node, "parameter lacks a declared type"))
    }

    fn backward(&self, _graph: &mut Graph, _node: NodeId, _adjoint: NodeId) -> Option<Contributions> {
        Some(SmallVec::new())
    }
}

struct ConstantDef;

impl OpDef for ConstantDef {
    fn infer(&self, graph: &Graph, node: NodeId) -> Result<Vec<ValueType>, GraphValidationError> {
        graph
            .node(node)
            .literal
            .as_ref()
            .map(|lit| vec![lit.ty.clone()])
            .ok_or_else(|| mismatch(graph, node, "constant lacks a literal payload"))
    }

    fn backward(&self, _graph: &mut Graph, _node: NodeId, _adjoint: NodeId) -> Option<Contributions> {
        Some(SmallVec::new())
    }
}

struct AddDef;

impl OpDef for AddDef {
    fn infer(&self, graph: &Graph, node: NodeId) -> Result<Vec<ValueType>, GraphValidationError> {
        infer_elementwise_binary(graph, node)
    }

    fn backward(&self, graph: &mut Graph, node: NodeId, adjoint: NodeId) -> Option<Contributions> {
        let (a, b) = binary_operands(graph, node);
        Some(SmallVec::from_slice(&[(a, adjoint), (b, adjoint)]))
    }
}

struct SubtractDef;

impl OpDef for SubtractDef {
    fn infer(&self, graph: &Graph, node: NodeId) -> Result<Vec<ValueType>, GraphValidationError> {
        infer_elementwise_binary(graph, node)
    }

    fn backward(&self, graph: &mut Graph, node: NodeId, adjoint: NodeId) -> Option<Contributions> {
        let (a, b) = binary_operands(graph, node);
        let db = graph.negative(adjoint);
        Some(SmallVec::from_slice(&[(a, adjoint), (b, db)]))
    }
}

struct MultiplyDef;

impl OpDef for MultiplyDef {
    fn infer(&self, graph: &Graph, node: NodeId) -> Result<Vec<ValueType>, GraphValidationError> {
        infer_elementwise_binary(graph, node)
    }

    fn backward(&self, graph: &mut Graph, node: NodeId, adjoint: NodeId) -> Option<Contributions> {
        let (a, b) = binary_operands(graph, node);
        let da = graph.multiply(adjoint, b);
        let db = graph.multiply(adjoint, a);
        Some(SmallVec::from_slice(&[(a, da), (b, db)]))
    }
}

struct DivideDef;

impl OpDef for DivideDef {
    fn infer(&self, graph: &Graph, node: NodeId) -> Result<Vec<ValueType>, GraphValidationError> {
        infer_elementwise_binary(graph, node)
    }

    fn backward(&self, graph: &mut Graph, node: NodeId, adjoint: NodeId) -> Option<Contributions> {
        // d(a/b) = da/b - a*db/b^2
        let (a, b) = binary_operands(graph, node);
        let da = graph.divide(adjoint, b);
        let numer = graph.multiply(adjoint, a);
        let denom = graph.multiply(b, b);
        let quotient = graph.divide(numer, denom);
        let db = graph.negative(quotient);
        Some(SmallVec::from_slice(&[(a, da), (b, db)]))
    }
}

struct NegativeDef;

impl OpDef for NegativeDef {
    fn infer(&self, graph: &Graph, node: NodeId) -> Result<Vec<ValueType>, GraphValidationError> {
        infer_elementwise_unary(graph, node)
    }

    fn backward(&self, graph: &mut Graph, node: NodeId, adjoint: NodeId) -> Option<Contributions> {
        let x = graph.node(node).inputs[0].node;
        let dx = graph.negative(adjoint);
        Some(SmallVec::from_slice(&[(x, dx)]))
    }
}

struct AbsDef;

impl OpDef for AbsDef {
    fn infer(&self, graph: &Graph, node: NodeId) -> Result<Vec<ValueType>, GraphValidationError> {
        infer_elementwise_unary(graph, node)
    }

    fn backward(&self, graph: &mut Graph, node: NodeId, adjoint: NodeId) -> Option<Contributions> {
        let x = graph.node(node).inputs[0].node;
        let sign = graph.sign(x);
        let dx = graph.multiply(adjoint, sign);
        Some(SmallVec::from_slice(&[(x, dx)]))
    }
}

struct SignDef;

impl OpDef for SignDef {
    fn infer(&self, graph: &Graph, node: NodeId) -> Result<Vec<ValueType>, GraphValidationError> {
        infer_elementwise_unary(graph, node)
    }

    fn backward(&self, _graph: &mut Graph, _node: NodeId, _adjoint: NodeId) -> Option<Contributions> {
        // Derivative vanishes almost everywhere; contributing nothing is the
        // same as accumulating an explicit zero.
        Some(SmallVec::new())
    }
}

struct MaximumDef;

impl OpDef for MaximumDef {
    fn infer(&self, graph: &Graph, node: NodeId) -> Result<Vec<ValueType>, GraphValidationError> {
        infer_elementwise_binary(graph, node)
    }

    fn backward(&self, _graph: &mut Graph, _node: NodeId, _adjoint: NodeId) -> Option<Contributions> {
        // Needs an elementwise select to route the adjoint; not provided yet.
        None
    }
}

struct DotDef;

impl OpDef for DotDef {
    fn infer(&self, graph: &Graph, node: NodeId) -> Result<Vec<ValueType>, GraphValidationError> {
        let a = input_ty(graph, node, 0)?;
        let b = input_ty(graph, node, 1)?;
        if a.dtype != b.dtype {
            return Err(mismatch(
                graph,
                node,
                format!("operand dtypes differ: {} vs {}", a.dtype, b.dtype),
            ));
        }
        let shape = match (a.shape.rank(), b.shape.rank()) {
            (1, 1) if a.shape.dim(0) == b.shape.dim(0) => Shape::scalar(),
            (2, 1) if a.shape.dim(1) == b.shape.dim(0) => Shape::new(vec![a.shape.dim(0)]),
            (2, 2) if a.shape.dim(1) == b.shape.dim(0) => {
                Shape::new(vec![a.shape.dim(0), b.shape.dim(1)])
            }
            _ => {
                return Err(mismatch(
                    graph,
                    node,
                    format!("cannot contract {} with {}", a.shape, b.shape),
                ))
            }
        };
        Ok(vec![ValueType::new(a.dtype, shape)])
    }

    fn backward(&self, _graph: &mut Graph, _node: NodeId, _adjoint: NodeId) -> Option<Contributions> {
        // Would require a transpose op to express delta * B^T and A^T * delta.
        None
    }
}

struct TupleDef;

impl OpDef for TupleDef {
    fn infer(&self, graph: &Graph, node: NodeId) -> Result<Vec<ValueType>, GraphValidationError> {
        let count = graph.node(node).inputs.len();
        let mut tys = Vec::with_capacity(count);
        for index in 0..count {
            tys.push(input_ty(graph, node, index)?.clone());
        }
        Ok(tys)
    }

    fn backward(&self, _graph: &mut Graph, _node: NodeId, _adjoint: NodeId) -> Option<Contributions> {
        None
    }
}
