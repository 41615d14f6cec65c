//! Tensor-to-slot assignment.
//!
//! Every distinct view gets one stable non-negative index: parameter outputs
//! first (in parameter order), then result outputs, then any remaining view
//! in topological walk order as a temporary. The numbering is the ABI between
//! generated code and the execution runtime; nothing symbolic crosses that
//! boundary.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::graph::{Function, NodeId, TensorView, ViewId};
use crate::passes::GraphValidationError;

/// Buffer position of one view in the runtime ABI. Also the C-side variable
/// name (`s3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(pub u32);

impl Slot {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// The gapless view-to-slot bijection for one compiled function.
#[derive(Debug, Clone)]
pub struct SlotAssignment {
    views: Vec<Arc<TensorView>>,
    by_view: HashMap<ViewId, Slot>,
    n_inputs: usize,
    n_outputs: usize,
}

impl SlotAssignment {
    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn n_inputs(&self) -> usize {
        self.n_inputs
    }

    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    pub fn n_temporaries(&self) -> usize {
        self.views.len() - self.n_inputs - self.n_outputs
    }

    /// The view bound to `slot`.
    pub fn view(&self, slot: Slot) -> &Arc<TensorView> {
        &self.views[slot.index()]
    }

    /// All views in slot order.
    pub fn views(&self) -> &[Arc<TensorView>] {
        &self.views
    }

    pub fn slot_of(&self, view: &TensorView) -> Option<Slot> {
        self.by_view.get(&view.id).copied()
    }

    /// Views of the temporary slots, in slot order.
    pub fn temporaries(&self) -> &[Arc<TensorView>] {
        &self.views[self.n_inputs + self.n_outputs..]
    }
}

fn place(
    views: &mut Vec<Arc<TensorView>>,
    by_view: &mut HashMap<ViewId, Slot>,
    view: &Arc<TensorView>,
) {
    if !by_view.contains_key(&view.id) {
        by_view.insert(view.id, Slot(views.len() as u32));
        views.push(Arc::clone(view));
    }
}

/// Builds the slot assignment for a function whose views are all resolved.
pub fn assign_slots(
    function: &Function,
    order: &[NodeId],
) -> Result<SlotAssignment, GraphValidationError> {
    let graph = function.graph();
    let mut views = Vec::new();
    let mut by_view = HashMap::new();

    for &param in function.parameters() {
        let view = graph
            .node(param)
            .output_view(0)
            .ok_or(GraphValidationError::MissingView { node: param })?;
        place(&mut views, &mut by_view, view);
    }
    let n_inputs = views.len();

    let result = function.result();
    for index in 0..graph.node(result).outputs.len() {
        let view = graph
            .node(result)
            .output_view(index)
            .ok_or(GraphValidationError::MissingView { node: result })?;
        place(&mut views, &mut by_view, view);
    }
    let n_outputs = views.len() - n_inputs;

    for &id in order {
        let node = graph.node(id);
        for index in 0..node.outputs.len() {
            let view = node
                .output_view(index)
                .ok_or(GraphValidationError::MissingView { node: id })?;
            place(&mut views, &mut by_view, view);
        }
    }

    Ok(SlotAssignment {
        views,
        by_view,
        n_inputs,
        n_outputs,
    })
}
