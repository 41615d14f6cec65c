pub mod autodiff;
mod env;
pub mod graph;
pub mod ops;
pub mod passes;
pub mod profiling;
pub mod slots;

pub use autodiff::{backprop_function, Adjoints, AutodiffError};
pub use graph::{
    DType, Function, FunctionBuilder, Graph, GraphError, Input, Layout, Literal, Node, NodeId,
    OpKind, Output, Shape, TensorView, ValueType, ViewId,
};
pub use passes::{GraphValidationError, LayoutPolicy, PassManager, RowMajor};
pub use slots::{assign_slots, Slot, SlotAssignment};
