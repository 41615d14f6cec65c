use tensile::passes::{
    AssignTensors, GraphValidationError, LayoutAssignment, PropagateTypes, TopologicalSort,
};
use tensile::{
    assign_slots, DType, Function, FunctionBuilder, Layout, LayoutPolicy, Literal, NodeId,
    PassManager, Slot, TensorView,
};

fn mul_add() -> Function {
    let mut b = FunctionBuilder::new("mul_add");
    let x = b.parameter(DType::F32, [2, 2]);
    let w = b.parameter(DType::F32, [2, 2]);
    let lit = Literal::from_f32([2, 2], &[1.0, 2.0, 3.0, 3.0]).expect("literal fits its shape");
    let c = b.constant(lit);
    let prod = b.multiply(x, w);
    let sum = b.add(prod, c);
    b.build(sum).expect("well-formed function")
}

#[test]
fn pipeline_orders_and_types_the_graph() {
    let mut f = mul_add();
    let cx = PassManager::with_default_passes()
        .run(&mut f)
        .expect("pipeline succeeds");
    let ids: Vec<u32> = cx.order().iter().map(|id| id.0).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);

    for &id in cx.order() {
        let node = f.graph().node(id);
        for index in 0..node.outputs.len() {
            assert!(node.output_ty(index).is_some(), "{id} untyped");
            assert!(node.output_view(index).is_some(), "{id} without view");
            let view = node.output_view(index).expect("view");
            assert!(view.layout().is_some(), "{id} without layout");
        }
    }
}

#[test]
fn pipeline_order_is_stable_across_runs() {
    let mut first = mul_add();
    let mut second = mul_add();
    let a = PassManager::with_default_passes()
        .run(&mut first)
        .expect("pipeline succeeds");
    let b = PassManager::with_default_passes()
        .run(&mut second)
        .expect("pipeline succeeds");
    assert_eq!(a.order(), b.order());
}

#[test]
fn shape_conflicts_name_the_node_and_kind() {
    let mut b = FunctionBuilder::new("mismatch");
    let x = b.parameter(DType::F32, [2]);
    let w = b.parameter(DType::F32, [3]);
    let sum = b.add(x, w);
    let mut f = b.build(sum).expect("built; types resolve later");
    let err = PassManager::with_default_passes().run(&mut f).unwrap_err();
    assert!(matches!(err, GraphValidationError::TypeMismatch { .. }));
    let message = err.to_string();
    assert!(message.contains("`add`"));
    assert!(message.contains("differ"));
}

#[test]
fn oversized_tensor_types_are_rejected_early() {
    let mut b = FunctionBuilder::new("huge");
    let x = b.parameter(DType::F32, [usize::MAX, 2]);
    let neg = b.negative(x);
    let mut f = b.build(neg).expect("built; sizes are checked by the pipeline");
    let err = PassManager::with_default_passes().run(&mut f).unwrap_err();
    assert!(matches!(err, GraphValidationError::OversizedType { .. }));
    assert!(err.to_string().contains("overflows"));
}

#[test]
fn slots_partition_params_then_results_then_temps() {
    let mut f = mul_add();
    let cx = PassManager::with_default_passes()
        .run(&mut f)
        .expect("pipeline succeeds");
    let slots = assign_slots(&f, cx.order()).expect("all views resolved");

    assert_eq!(slots.len(), 5);
    assert_eq!(slots.n_inputs(), 2);
    assert_eq!(slots.n_outputs(), 1);
    assert_eq!(slots.n_temporaries(), 2);

    // Parameters take the first slots, in parameter order.
    for (position, &param) in f.parameters().iter().enumerate() {
        let view = f.graph().node(param).output_view(0).expect("param view");
        assert_eq!(slots.slot_of(view), Some(Slot(position as u32)));
    }
    // The result comes right after the parameters.
    let result_view = f.graph().node(f.result()).output_view(0).expect("view");
    assert_eq!(slots.slot_of(result_view), Some(Slot(2)));

    // Gapless bijection: slot k holds the view mapped to slot k.
    for (index, view) in slots.views().iter().enumerate() {
        assert_eq!(slots.slot_of(view), Some(Slot(index as u32)));
    }
}

#[test]
fn unused_parameters_still_get_slots() {
    let mut b = FunctionBuilder::new("partial");
    let x = b.parameter(DType::F32, [4]);
    let _unused = b.parameter(DType::F32, [4]);
    let neg = b.negative(x);
    let mut f = b.build(neg).expect("well-formed function");
    let cx = PassManager::with_default_passes()
        .run(&mut f)
        .expect("pipeline succeeds");
    let slots = assign_slots(&f, cx.order()).expect("all views resolved");

    assert_eq!(slots.len(), 3);
    assert_eq!(slots.n_inputs(), 2);
    assert_eq!(slots.n_outputs(), 1);
    assert_eq!(slots.n_temporaries(), 0);
}

#[test]
fn result_aliasing_a_parameter_keeps_one_slot() {
    let mut b = FunctionBuilder::new("identity");
    let x = b.parameter(DType::F32, [2]);
    let mut f = b.build(x).expect("well-formed function");
    let cx = PassManager::with_default_passes()
        .run(&mut f)
        .expect("pipeline succeeds");
    let slots = assign_slots(&f, cx.order()).expect("all views resolved");

    assert_eq!(slots.len(), 1);
    assert_eq!(slots.n_inputs(), 1);
    assert_eq!(slots.n_outputs(), 0);
}

#[test]
fn default_layouts_are_row_major() {
    let mut b = FunctionBuilder::new("strides");
    let x = b.parameter(DType::F32, [2, 3]);
    let neg = b.negative(x);
    let mut f = b.build(neg).expect("well-formed function");
    PassManager::with_default_passes()
        .run(&mut f)
        .expect("pipeline succeeds");

    let view = f.graph().node(f.parameters()[0]).output_view(0).expect("view");
    let layout = view.layout().expect("layout bound");
    assert_eq!(layout.strides, vec![3, 1]);
    assert_eq!(layout.size_in_bytes, 24);
}

#[test]
fn layouts_bind_at_most_once() {
    let mut b = FunctionBuilder::new("rebind");
    let x = b.parameter(DType::F32, [2, 3]);
    let neg = b.negative(x);
    let mut f = b.build(neg).expect("well-formed function");
    PassManager::with_default_passes()
        .run(&mut f)
        .expect("pipeline succeeds");

    let view = f.graph().node(f.parameters()[0]).output_view(0).expect("view");
    let rebound = view.bind_layout(Layout {
        strides: vec![1, 1],
        size_in_bytes: 0,
    });
    assert_eq!(rebound.strides, vec![3, 1]);
}

struct ColumnMajor;

impl LayoutPolicy for ColumnMajor {
    fn name(&self) -> &'static str {
        "column-major"
    }

    fn layout_for(&self, view: &TensorView) -> Option<Layout> {
        let dims = view.shape().dims();
        let mut strides = vec![0usize; dims.len()];
        let mut stride = 1usize;
        for (axis, &dim) in dims.iter().enumerate() {
            strides[axis] = stride;
            stride = stride.checked_mul(dim)?;
        }
        Some(Layout {
            strides,
            size_in_bytes: view.ty.byte_len()?,
        })
    }
}

#[test]
fn layout_policy_is_swappable() {
    let mut b = FunctionBuilder::new("col_major");
    let x = b.parameter(DType::F32, [2, 3]);
    let neg = b.negative(x);
    let mut f = b.build(neg).expect("well-formed function");

    let mut manager = PassManager::new();
    manager.register(Box::new(TopologicalSort));
    manager.register(Box::new(PropagateTypes));
    manager.register(Box::new(AssignTensors));
    manager.register(Box::new(LayoutAssignment::new(Box::new(ColumnMajor))));
    manager.run(&mut f).expect("pipeline succeeds");

    let view = f.graph().node(f.parameters()[0]).output_view(0).expect("view");
    assert_eq!(view.layout().expect("layout bound").strides, vec![1, 2]);
}

#[test]
fn order_walks_every_edge_before_its_consumer() {
    let mut b = FunctionBuilder::new("diamond");
    let x = b.parameter(DType::F32, [2]);
    let a = b.negative(x);
    let c = b.abs(x);
    let sum = b.add(a, c);
    let mut f = b.build(sum).expect("well-formed function");
    let cx = PassManager::with_default_passes()
        .run(&mut f)
        .expect("pipeline succeeds");

    let position = |id: NodeId| {
        cx.order()
            .iter()
            .position(|&n| n == id)
            .expect("in the order")
    };
    for &id in cx.order() {
        for input in &f.graph().node(id).inputs {
            assert!(position(input.node) < position(id));
        }
    }
}
