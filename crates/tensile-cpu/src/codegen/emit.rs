//! Per-op C emitters and the dispatch table that selects them.
//!
//! The table is a plain map keyed by [`OpKind`]; coverage is a strict subset
//! of the op set, and a lookup miss is reported as a [`CodegenDispatchError`]
//! naming the kind. Each emitter appends statements to the entry function
//! body; slot variables (`s0`, `s1`, ...) are already declared and typed by
//! the unit prologue.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tensile::passes::GraphValidationError;
use tensile::{DType, Graph, Layout, NodeId, OpKind, Slot, SlotAssignment, TensorView};

use super::utils::{c_type, linear_index_expr, push_block, push_line};
use super::{CodegenDispatchError, CodegenError};

pub(super) type EmitFn =
    fn(&Graph, &SlotAssignment, NodeId, &mut String) -> Result<(), CodegenError>;

static EMITTERS: Lazy<HashMap<OpKind, EmitFn>> = Lazy::new(|| {
    let mut table: HashMap<OpKind, EmitFn> = HashMap::new();
    table.insert(OpKind::Parameter, emit_parameter);
    table.insert(OpKind::Constant, emit_constant);
    table.insert(OpKind::Add, emit_add);
    table.insert(OpKind::Subtract, emit_subtract);
    table.insert(OpKind::Multiply, emit_multiply);
    table.insert(OpKind::Divide, emit_divide);
    table.insert(OpKind::Negative, emit_negative);
    table.insert(OpKind::Abs, emit_abs);
    table.insert(OpKind::Sign, emit_sign);
    table.insert(OpKind::Dot, emit_dot);
    table.insert(OpKind::Tuple, emit_tuple);
    // Maximum has no entry yet: its NaN propagation rule is unsettled, and
    // the miss path doubles as the dispatch-failure report.
    table
});

pub(super) fn emitter_for(kind: OpKind) -> Result<EmitFn, CodegenDispatchError> {
    EMITTERS
        .get(&kind)
        .copied()
        .ok_or(CodegenDispatchError { kind })
}

fn output_info<'g>(
    graph: &'g Graph,
    slots: &SlotAssignment,
    node: NodeId,
    index: usize,
) -> Result<(Slot, &'g Arc<TensorView>), CodegenError> {
    let view = graph
        .node(node)
        .output_view(index)
        .ok_or(GraphValidationError::MissingView { node })?;
    let slot = slots
        .slot_of(view)
        .ok_or(GraphValidationError::MissingView { node })?;
    Ok((slot, view))
}

fn input_info<'g>(
    graph: &'g Graph,
    slots: &SlotAssignment,
    node: NodeId,
    index: usize,
) -> Result<(Slot, &'g Arc<TensorView>), CodegenError> {
    let input = graph.node(node).inputs[index];
    let view = graph
        .input_view(input)
        .ok_or(GraphValidationError::MissingView { node: input.node })?;
    let slot = slots
        .slot_of(view)
        .ok_or(GraphValidationError::MissingView { node: input.node })?;
    Ok((slot, view))
}

fn layout_of<'v>(view: &'v TensorView, node: NodeId) -> Result<&'v Layout, CodegenError> {
    view.layout().ok_or(CodegenError::MissingLayout { node })
}

fn element_count_of(view: &TensorView, node: NodeId) -> Result<usize, CodegenError> {
    view.ty.element_count().ok_or_else(|| {
        GraphValidationError::OversizedType {
            node,
            ty: view.ty.clone(),
        }
        .into()
    })
}

fn byte_len_of(view: &TensorView, node: NodeId) -> Result<usize, CodegenError> {
    view.ty.byte_len().ok_or_else(|| {
        GraphValidationError::OversizedType {
            node,
            ty: view.ty.clone(),
        }
        .into()
    })
}

fn emit_parameter(
    _graph: &Graph,
    _slots: &SlotAssignment,
    _node: NodeId,
    _unit: &mut String,
) -> Result<(), CodegenError> {
    // Parameter slots are filled by the caller before entry.
    Ok(())
}

fn emit_constant(
    graph: &Graph,
    slots: &SlotAssignment,
    node: NodeId,
    unit: &mut String,
) -> Result<(), CodegenError> {
    let (slot, _) = output_info(graph, slots, node, 0)?;
    let literal = graph
        .node(node)
        .literal
        .as_ref()
        .ok_or_else(|| CodegenError::Literal {
            node,
            message: "constant node carries no literal payload".to_string(),
        })?;
    if literal.byte_len() == 0 {
        return Ok(());
    }
    push_line(
        unit,
        1,
        &format!("memcpy({slot}, lit_{node}, {});", literal.byte_len()),
    );
    Ok(())
}

fn emit_infix(
    graph: &Graph,
    slots: &SlotAssignment,
    node: NodeId,
    unit: &mut String,
    op: char,
) -> Result<(), CodegenError> {
    let (out, out_view) = output_info(graph, slots, node, 0)?;
    let (a, _) = input_info(graph, slots, node, 0)?;
    let (b, _) = input_info(graph, slots, node, 1)?;
    let count = element_count_of(out_view, node)?;
    let block = format!(
        r#"
        for (size_t i = 0; i < {count}; ++i) {{
          {out}[i] = {a}[i] {op} {b}[i];
        }}
        "#
    );
    push_block(unit, 1, &block);
    Ok(())
}

fn emit_add(
    graph: &Graph,
    slots: &SlotAssignment,
    node: NodeId,
    unit: &mut String,
) -> Result<(), CodegenError> {
    emit_infix(graph, slots, node, unit, '+')
}

fn emit_subtract(
    graph: &Graph,
    slots: &SlotAssignment,
    node: NodeId,
    unit: &mut String,
) -> Result<(), CodegenError> {
    emit_infix(graph, slots, node, unit, '-')
}

fn emit_multiply(
    graph: &Graph,
    slots: &SlotAssignment,
    node: NodeId,
    unit: &mut String,
) -> Result<(), CodegenError> {
    emit_infix(graph, slots, node, unit, '*')
}

fn emit_divide(
    graph: &Graph,
    slots: &SlotAssignment,
    node: NodeId,
    unit: &mut String,
) -> Result<(), CodegenError> {
    emit_infix(graph, slots, node, unit, '/')
}

fn emit_negative(
    graph: &Graph,
    slots: &SlotAssignment,
    node: NodeId,
    unit: &mut String,
) -> Result<(), CodegenError> {
    let (out, out_view) = output_info(graph, slots, node, 0)?;
    let (x, _) = input_info(graph, slots, node, 0)?;
    let count = element_count_of(out_view, node)?;
    let block = format!(
        r#"
        for (size_t i = 0; i < {count}; ++i) {{
          {out}[i] = -{x}[i];
        }}
        "#
    );
    push_block(unit, 1, &block);
    Ok(())
}

fn emit_abs(
    graph: &Graph,
    slots: &SlotAssignment,
    node: NodeId,
    unit: &mut String,
) -> Result<(), CodegenError> {
    let (out, out_view) = output_info(graph, slots, node, 0)?;
    let (x, _) = input_info(graph, slots, node, 0)?;
    let count = element_count_of(out_view, node)?;
    let expr = match out_view.dtype() {
        DType::F32 => format!("fabsf({x}[i])"),
        DType::F64 => format!("fabs({x}[i])"),
        DType::I32 | DType::I64 => format!("{x}[i] < 0 ? -{x}[i] : {x}[i]"),
    };
    let block = format!(
        r#"
        for (size_t i = 0; i < {count}; ++i) {{
          {out}[i] = {expr};
        }}
        "#
    );
    push_block(unit, 1, &block);
    Ok(())
}

fn emit_sign(
    graph: &Graph,
    slots: &SlotAssignment,
    node: NodeId,
    unit: &mut String,
) -> Result<(), CodegenError> {
    let (out, out_view) = output_info(graph, slots, node, 0)?;
    let (x, _) = input_info(graph, slots, node, 0)?;
    let count = element_count_of(out_view, node)?;
    let zero = match out_view.dtype() {
        DType::F32 => "0.0f",
        DType::F64 => "0.0",
        DType::I32 | DType::I64 => "0",
    };
    let cty = c_type(out_view.dtype());
    let block = format!(
        r#"
        for (size_t i = 0; i < {count}; ++i) {{
          {out}[i] = ({cty})(({x}[i] > {zero}) - ({x}[i] < {zero}));
        }}
        "#
    );
    push_block(unit, 1, &block);
    Ok(())
}

fn emit_dot(
    graph: &Graph,
    slots: &SlotAssignment,
    node: NodeId,
    unit: &mut String,
) -> Result<(), CodegenError> {
    let (out, out_view) = output_info(graph, slots, node, 0)?;
    let (a, a_view) = input_info(graph, slots, node, 0)?;
    let (b, b_view) = input_info(graph, slots, node, 1)?;
    let a_layout = layout_of(a_view, node)?;
    let b_layout = layout_of(b_view, node)?;
    let out_layout = layout_of(out_view, node)?;
    let cty = c_type(out_view.dtype());

    let a_shape = a_view.shape();
    let b_shape = b_view.shape();
    let block = match (a_shape.rank(), b_shape.rank()) {
        (1, 1) => {
            let k = a_shape.dim(0);
            let a_idx = linear_index_expr(a_layout, &["k"]);
            let b_idx = linear_index_expr(b_layout, &["k"]);
            format!(
                r#"
                {{
                  {cty} acc = 0;
                  for (size_t k = 0; k < {k}; ++k) {{
                    acc += {a}[{a_idx}] * {b}[{b_idx}];
                  }}
                  {out}[0] = acc;
                }}
                "#
            )
        }
        (2, 1) => {
            let m = a_shape.dim(0);
            let k = a_shape.dim(1);
            let a_idx = linear_index_expr(a_layout, &["i", "k"]);
            let b_idx = linear_index_expr(b_layout, &["k"]);
            let out_idx = linear_index_expr(out_layout, &["i"]);
            format!(
                r#"
                for (size_t i = 0; i < {m}; ++i) {{
                  {cty} acc = 0;
                  for (size_t k = 0; k < {k}; ++k) {{
                    acc += {a}[{a_idx}] * {b}[{b_idx}];
                  }}
                  {out}[{out_idx}] = acc;
                }}
                "#
            )
        }
        (2, 2) => {
            let m = a_shape.dim(0);
            let k = a_shape.dim(1);
            let n = b_shape.dim(1);
            let a_idx = linear_index_expr(a_layout, &["i", "k"]);
            let b_idx = linear_index_expr(b_layout, &["k", "j"]);
            let out_idx = linear_index_expr(out_layout, &["i", "j"]);
            format!(
                r#"
                for (size_t i = 0; i < {m}; ++i) {{
                  for (size_t j = 0; j < {n}; ++j) {{
                    {cty} acc = 0;
                    for (size_t k = 0; k < {k}; ++k) {{
                      acc += {a}[{a_idx}] * {b}[{b_idx}];
                    }}
                    {out}[{out_idx}] = acc;
                  }}
                }}
                "#
            )
        }
        _ => {
            return Err(GraphValidationError::TypeMismatch {
                node,
                kind: OpKind::Dot,
                message: format!("cannot contract {a_shape} with {b_shape}"),
            }
            .into())
        }
    };
    push_block(unit, 1, &block);
    Ok(())
}

fn emit_tuple(
    graph: &Graph,
    slots: &SlotAssignment,
    node: NodeId,
    unit: &mut String,
) -> Result<(), CodegenError> {
    for index in 0..graph.node(node).inputs.len() {
        let (dst, dst_view) = output_info(graph, slots, node, index)?;
        let (src, _) = input_info(graph, slots, node, index)?;
        if src == dst {
            continue;
        }
        let len = byte_len_of(dst_view, node)?;
        push_line(unit, 1, &format!("memcpy({dst}, {src}, {len});"));
    }
    Ok(())
}
