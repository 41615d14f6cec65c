//! Text helpers shared by the op emitters.

use tensile::{DType, Layout, Literal};

/// C spelling of a dtype. Integer types come from `<stdint.h>`, which the
/// generated unit always includes.
pub(super) fn c_type(dtype: DType) -> &'static str {
    match dtype {
        DType::F32 => "float",
        DType::F64 => "double",
        DType::I32 => "int32_t",
        DType::I64 => "int64_t",
    }
}

pub(super) fn format_f32(value: f32) -> String {
    if value.is_nan() {
        "NAN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_negative() {
            "-INFINITY".to_string()
        } else {
            "INFINITY".to_string()
        }
    } else {
        let base = value.to_string();
        let needs_decimal = !base.contains('.') && !base.contains('e') && !base.contains('E');
        let suffix = if needs_decimal { ".0f" } else { "f" };
        format!("{base}{suffix}")
    }
}

pub(super) fn format_f64(value: f64) -> String {
    if value.is_nan() {
        "NAN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_negative() {
            "-INFINITY".to_string()
        } else {
            "INFINITY".to_string()
        }
    } else {
        let base = value.to_string();
        if !base.contains('.') && !base.contains('e') && !base.contains('E') {
            format!("{base}.0")
        } else {
            base
        }
    }
}

/// Renders every element of a packed literal as a C initializer token.
pub(super) fn literal_c_elements(literal: &Literal) -> Vec<String> {
    let bytes = &literal.bytes;
    match literal.ty.dtype {
        DType::F32 => bytes
            .chunks_exact(4)
            .map(|c| format_f32(f32::from_le_bytes([c[0], c[1], c[2], c[3]])))
            .collect(),
        DType::F64 => bytes
            .chunks_exact(8)
            .map(|c| {
                format_f64(f64::from_le_bytes([
                    c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7],
                ]))
            })
            .collect(),
        DType::I32 => bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]).to_string())
            .collect(),
        DType::I64 => bytes
            .chunks_exact(8)
            .map(|c| {
                format!(
                    "{}LL",
                    i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
                )
            })
            .collect(),
    }
}

/// Index expression for element `[indices...]` of a strided buffer, e.g.
/// `i * 3 + j` for strides `[3, 1]`. Scalars index as `0`.
pub(super) fn linear_index_expr(layout: &Layout, indices: &[&str]) -> String {
    let mut terms = Vec::new();
    for (index, stride) in indices.iter().zip(layout.strides.iter()) {
        match stride {
            0 => continue,
            1 => terms.push((*index).to_string()),
            s => terms.push(format!("{index} * {s}")),
        }
    }
    if terms.is_empty() {
        "0".to_string()
    } else {
        terms.join(" + ")
    }
}

pub(super) fn push_line(unit: &mut String, indent: usize, line: &str) {
    push_block(unit, indent, line);
}

/// Appends a (possibly multi-line) fragment, re-indenting it to `indent`
/// levels of two spaces. Leading/trailing blank lines and the fragment's own
/// common indentation are stripped, so emitters can use raw-string blocks
/// indented to match their Rust surroundings.
pub(super) fn push_block(unit: &mut String, indent: usize, block: &str) {
    if block.is_empty() {
        return;
    }
    let pad = "  ".repeat(indent);
    let mut lines: Vec<&str> = block.split('\n').collect();
    if matches!(lines.first(), Some(line) if line.trim().is_empty()) {
        lines.remove(0);
    }
    if matches!(lines.last(), Some(line) if line.trim().is_empty()) {
        lines.pop();
    }

    let mut min_indent = usize::MAX;
    for line in &lines {
        if line.trim().is_empty() {
            continue;
        }
        let count = line.chars().take_while(|c| *c == ' ' || *c == '\t').count();
        min_indent = min_indent.min(count);
    }
    if min_indent == usize::MAX {
        min_indent = 0;
    }

    for line in lines {
        if line.trim().is_empty() {
            unit.push('\n');
        } else {
            let stripped = if min_indent > 0 && line.len() >= min_indent {
                &line[min_indent..]
            } else {
                line.trim_start()
            };
            unit.push_str(&pad);
            unit.push_str(stripped);
            unit.push('\n');
        }
    }
}
