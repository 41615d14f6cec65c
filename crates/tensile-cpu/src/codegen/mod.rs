//! C source generation for a lowered function.
//!
//! The output is one self-contained translation unit: includes, a static
//! array per reachable constant, and a single exported entry point that
//! receives every buffer through the flat slot array. Generation is
//! deterministic; the same lowered function yields byte-identical source.

mod emit;
mod utils;

use thiserror::Error;
use tensile::passes::GraphValidationError;
use tensile::{Function, NodeId, OpKind, SlotAssignment};

use self::emit::emitter_for;
use self::utils::{c_type, literal_c_elements, push_line};

/// Symbol every generated unit exports.
pub const ENTRY_SYMBOL: &str = "tensile_entry";

/// Generated C source plus the symbol to resolve after loading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeUnit {
    pub source: String,
    pub symbol: &'static str,
}

/// An op kind reached the emitter with no registered handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no emitter registered for op kind `{kind}`")]
pub struct CodegenDispatchError {
    pub kind: OpKind,
}

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error(transparent)]
    Dispatch(#[from] CodegenDispatchError),
    #[error(transparent)]
    Validation(#[from] GraphValidationError),
    #[error("node {node}: {message}")]
    Literal { node: NodeId, message: String },
    #[error("node {node}: output view has no bound layout")]
    MissingLayout { node: NodeId },
}

/// Generates the translation unit for a function whose passes have run.
///
/// `order` is the execution order produced by the sort pass and `slots` the
/// view-to-slot assignment; both must come from the same pipeline run as the
/// function's views.
pub fn generate_unit(
    function: &Function,
    order: &[NodeId],
    slots: &SlotAssignment,
) -> Result<CodeUnit, CodegenError> {
    let graph = function.graph();
    let mut unit = String::new();

    push_line(&mut unit, 0, "#include <math.h>");
    push_line(&mut unit, 0, "#include <stddef.h>");
    push_line(&mut unit, 0, "#include <stdint.h>");
    push_line(&mut unit, 0, "#include <string.h>");
    unit.push('\n');

    let mut wrote_literal = false;
    for &id in order {
        let node = graph.node(id);
        if node.kind != OpKind::Constant {
            continue;
        }
        let literal = node.literal.as_ref().ok_or_else(|| CodegenError::Literal {
            node: id,
            message: "constant node carries no literal payload".to_string(),
        })?;
        if literal.byte_len() == 0 {
            continue;
        }
        let elements = literal_c_elements(literal);
        push_line(
            &mut unit,
            0,
            &format!(
                "static const {} lit_{id}[] = {{ {} }};",
                c_type(literal.ty.dtype),
                elements.join(", ")
            ),
        );
        wrote_literal = true;
    }
    if wrote_literal {
        unit.push('\n');
    }

    push_line(
        &mut unit,
        0,
        &format!("int {ENTRY_SYMBOL}(void* const* slots) {{"),
    );
    for (index, view) in slots.views().iter().enumerate() {
        let cty = c_type(view.dtype());
        push_line(
            &mut unit,
            1,
            &format!("{cty}* s{index} = ({cty}*) slots[{index}];"),
        );
    }
    for &id in order {
        let emit = emitter_for(graph.node(id).kind)?;
        emit(graph, slots, id, &mut unit)?;
    }
    push_line(&mut unit, 1, "return 0;");
    push_line(&mut unit, 0, "}");

    Ok(CodeUnit {
        source: unit,
        symbol: ENTRY_SYMBOL,
    })
}
