//! Reverse-mode symbolic differentiation.
//!
//! [`Adjoints`] accumulates, for every node reachable backward from a
//! dependent value `y`, the symbolic partial derivative of `y` (scaled by a
//! seed expression) with respect to that node. The result of differentiation
//! is ordinary graph structure: it compiles and executes through the same
//! pipeline as any forward function.

use std::collections::HashMap;

use thiserror::Error;

use crate::graph::{Function, Graph, GraphError, Literal, NodeId, OpKind};
use crate::ops::op_def;
use crate::passes::{infer_types, topological_order, GraphValidationError};

#[derive(Debug, Error)]
pub enum AutodiffError {
    #[error("op kind `{kind}` has no backward rule")]
    MissingBackwardRule { kind: OpKind },
    #[error("cannot differentiate a multi-valued result")]
    MultiValuedResult,
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Validation(#[from] GraphValidationError),
}

/// Accumulated adjoint expressions for one dependent value.
///
/// Construction performs the full reverse traversal: nodes are visited in
/// reverse topological order so that a node is only expanded after every one
/// of its consumers has contributed its share, and `y`'s own entry is seeded
/// with `c`. Both the traversal and the expressions it builds are
/// deterministic.
pub struct Adjoints<'g> {
    graph: &'g mut Graph,
    map: HashMap<NodeId, NodeId>,
}

impl<'g> Adjoints<'g> {
    /// Differentiates `y` with respect to everything it depends on, seeding
    /// `y`'s adjoint with `c` (for a top-level gradient: a one-valued
    /// expression shaped like `y`).
    pub fn new(graph: &'g mut Graph, y: NodeId, c: NodeId) -> Result<Self, AutodiffError> {
        if graph.node(y).outputs.len() != 1 {
            return Err(AutodiffError::MultiValuedResult);
        }
        let order = topological_order(graph, &[y])?;
        infer_types(graph, &order)?;

        let mut adjoints = Self {
            graph,
            map: HashMap::new(),
        };
        adjoints.map.insert(y, c);
        for &node in order.iter().rev() {
            // Nothing flowed into this node from any consumer: it contributes
            // nothing to its own predecessors either.
            let Some(delta) = adjoints.map.get(&node).copied() else {
                continue;
            };
            let kind = adjoints.graph.node(node).kind;
            let contributions = op_def(kind)
                .backward(adjoints.graph, node, delta)
                .ok_or(AutodiffError::MissingBackwardRule { kind })?;
            for (predecessor, contribution) in contributions {
                adjoints.add_delta(predecessor, contribution);
            }
        }
        Ok(adjoints)
    }

    /// The accumulated adjoint expression for `x`.
    ///
    /// When `x` never contributes to `y`, this is not an error: the result is
    /// an explicit zero constant matching `x`'s element type and shape.
    pub fn get(&mut self, x: NodeId) -> Result<NodeId, AutodiffError> {
        if let Some(&id) = self.map.get(&x) {
            return Ok(id);
        }
        if self.graph.node(x).outputs.len() != 1 {
            return Err(AutodiffError::MultiValuedResult);
        }
        if self.graph.node(x).output_ty(0).is_none() {
            // x lives outside the differentiated region; type its own
            // ancestry on demand so the zero can be shaped.
            let order = topological_order(self.graph, &[x])?;
            infer_types(self.graph, &order)?;
        }
        let ty = self
            .graph
            .node(x)
            .output_ty(0)
            .cloned()
            .ok_or(GraphValidationError::MissingView { node: x })?;
        let zero = self.graph.constant(Literal::zeros(ty)?);
        self.map.insert(x, zero);
        Ok(zero)
    }

    /// Accumulates one backprop contribution into `x`'s entry. The first
    /// delta becomes the entry; every later one is summed in. The final
    /// accumulated value is independent of the call order.
    pub fn add_delta(&mut self, x: NodeId, delta: NodeId) {
        match self.map.get(&x).copied() {
            Some(existing) => {
                let sum = self.graph.add(existing, delta);
                self.map.insert(x, sum);
            }
            None => {
                self.map.insert(x, delta);
            }
        }
    }
}

/// Derives the gradient function of `function`.
///
/// The new function's parameters are the original parameters plus one
/// synthetic seed parameter shaped like the original result; its result is
/// the tuple of the adjoints of the original parameters, in parameter order.
pub fn backprop_function(function: &Function) -> Result<Function, AutodiffError> {
    let result = function.result();
    let mut graph = function.graph().clone();
    if graph.node(result).outputs.len() != 1 {
        return Err(AutodiffError::MultiValuedResult);
    }
    let order = topological_order(&graph, &[result])?;
    infer_types(&mut graph, &order)?;
    let seed_ty = graph
        .node(result)
        .output_ty(0)
        .cloned()
        .ok_or(GraphValidationError::MissingView { node: result })?;
    let seed = graph.parameter(seed_ty.dtype, seed_ty.shape);

    let gradients = {
        let mut adjoints = Adjoints::new(&mut graph, result, seed)?;
        let mut gradients = Vec::with_capacity(function.parameters().len());
        for &param in function.parameters() {
            gradients.push(adjoints.get(param)?);
        }
        gradients
    };

    let grad_result = graph.tuple(&gradients);
    let mut parameters = function.parameters().to_vec();
    parameters.push(seed);
    let name = format!("{}_grad", function.name());
    Ok(Function::from_parts(name, graph, parameters, grad_result)?)
}
