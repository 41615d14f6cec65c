//! The compilation pass pipeline.
//!
//! Passes run in a fixed sequence, each assuming the invariants established
//! by its predecessors: ordering, then type propagation, then tensor view
//! assignment, then layout assignment. The driver halts on the first error;
//! there is no partial-success mode.

mod assign_tensors;
mod layout;
mod propagate_types;
mod topo_sort;

pub use assign_tensors::AssignTensors;
pub use layout::{LayoutAssignment, LayoutPolicy, RowMajor};
pub use propagate_types::PropagateTypes;
pub use topo_sort::{topological_order, TopologicalSort};

pub(crate) use propagate_types::infer_types;

use thiserror::Error;

use crate::graph::{Function, NodeId, OpKind, ValueType};
use crate::profiling;

/// Fatal graph-consistency failures raised by validation and inference.
#[derive(Debug, Error)]
pub enum GraphValidationError {
    #[error("cycle detected involving node {node}")]
    Cycle { node: NodeId },
    #[error("type inference failed at node {node} (`{kind}`): {message}")]
    TypeMismatch {
        node: NodeId,
        kind: OpKind,
        message: String,
    },
    #[error("node {node}: {ty} overflows the addressable byte size")]
    OversizedType { node: NodeId, ty: ValueType },
    #[error("node {node} has no resolved tensor view")]
    MissingView { node: NodeId },
    #[error("invalid parameter list: {message}")]
    InvalidParameters { message: String },
}

/// Artifacts accumulated while the pipeline runs; carries the topological
/// order out to slot assignment and code generation.
#[derive(Debug, Default)]
pub struct PassContext {
    pub(crate) order: Vec<NodeId>,
}

impl PassContext {
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }
}

/// One deterministic transformation stage.
pub trait Pass {
    fn name(&self) -> &'static str;

    fn run(
        &self,
        function: &mut Function,
        cx: &mut PassContext,
    ) -> Result<(), GraphValidationError>;
}

/// Runs registered passes in registration order.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// The standard compilation pipeline with the default layout policy.
    pub fn with_default_passes() -> Self {
        let mut manager = Self::new();
        manager.register(Box::new(TopologicalSort));
        manager.register(Box::new(PropagateTypes));
        manager.register(Box::new(AssignTensors));
        manager.register(Box::new(LayoutAssignment::row_major()));
        manager
    }

    pub fn run(&self, function: &mut Function) -> Result<PassContext, GraphValidationError> {
        let mut cx = PassContext::default();
        for pass in &self.passes {
            let _phase = profiling::phase(pass.name());
            pass.run(function, &mut cx)?;
        }
        Ok(cx)
    }
}
