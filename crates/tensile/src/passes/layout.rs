//! Layout assignment behind a swappable policy.

use super::{GraphValidationError, Pass, PassContext};
use crate::graph::{Function, Layout, NodeId, TensorView};

/// Chooses a concrete dense layout for a view from its resolved type alone.
/// Returns `None` when no layout fits the address space.
pub trait LayoutPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn layout_for(&self, view: &TensorView) -> Option<Layout>;
}

/// The default policy: innermost axis contiguous.
pub struct RowMajor;

impl LayoutPolicy for RowMajor {
    fn name(&self) -> &'static str {
        "row-major"
    }

    fn layout_for(&self, view: &TensorView) -> Option<Layout> {
        let dims = view.shape().dims();
        let mut strides = vec![0usize; dims.len()];
        let mut stride = 1usize;
        for axis in (0..dims.len()).rev() {
            strides[axis] = stride;
            stride = stride.checked_mul(dims[axis])?;
        }
        Some(Layout {
            strides,
            size_in_bytes: view.ty.byte_len()?,
        })
    }
}

/// Binds a layout to every view lacking one. Views that already carry a
/// layout (shared with a previously compiled function) are left untouched.
pub struct LayoutAssignment {
    policy: Box<dyn LayoutPolicy>,
}

impl LayoutAssignment {
    pub fn new(policy: Box<dyn LayoutPolicy>) -> Self {
        Self { policy }
    }

    pub fn row_major() -> Self {
        Self::new(Box::new(RowMajor))
    }
}

impl Pass for LayoutAssignment {
    fn name(&self) -> &'static str {
        "layout-assignment"
    }

    fn run(
        &self,
        function: &mut Function,
        cx: &mut PassContext,
    ) -> Result<(), GraphValidationError> {
        let mut worklist: Vec<NodeId> = function.parameters().to_vec();
        worklist.extend_from_slice(cx.order());
        let graph = function.graph();
        for &id in &worklist {
            let node = graph.node(id);
            for index in 0..node.outputs.len() {
                let view = node
                    .output_view(index)
                    .ok_or(GraphValidationError::MissingView { node: id })?;
                if view.layout().is_none() {
                    let layout = self.policy.layout_for(view).ok_or_else(|| {
                        GraphValidationError::OversizedType {
                            node: id,
                            ty: view.ty.clone(),
                        }
                    })?;
                    view.bind_layout(layout);
                }
            }
        }
        Ok(())
    }
}
