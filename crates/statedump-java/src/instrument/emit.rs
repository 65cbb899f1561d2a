//! Generated Java fragments and the edits that place them.
//!
//! All generated code stays on the lines it is inserted into, so original
//! line numbers (stack traces, diff ranges) are unchanged by instrumentation.

use statedump_core::patch::{Edit, EditSet};

use super::plan::{default_value, MethodPlan};
use crate::runtime::{MARKER_ANNOTATION, RECORDER_CLASS, RUNTIME_IMPORTS};

const ID_VAR: &str = "__objdump_id";
const PARAMS_VAR: &str = "__objdump_params";
const RET_VAR: &str = "__objdump_ret";
const RETURNED_VAR: &str = "__objdump_returned";

/// Render `text` as a quoted Java string literal.
///
/// Non-ASCII characters become `\uXXXX` escapes so the output does not
/// depend on the compiler's source encoding.
pub fn java_string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }
    out.push('"');
    out
}

/// Statements inserted at the top of the body.
pub fn prologue(plan: &MethodPlan, file_label: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        " final String {} = {}.newInvocationId();",
        ID_VAR, RECORDER_CLASS
    ));
    out.push_str(&format!(
        " final java.util.Map<String, Object> {} = new java.util.LinkedHashMap<String, Object>();",
        PARAMS_VAR
    ));
    for (i, name) in plan.param_names.iter().enumerate() {
        out.push_str(&format!(" {}.put(\"param{}\", {});", PARAMS_VAR, i, name));
    }
    out.push_str(&format!(
        " {}.writeEntry({}, {}, {}, {}, {});",
        RECORDER_CLASS,
        plan.self_expr(),
        PARAMS_VAR,
        ID_VAR,
        java_string_literal(plan.signature.as_str()),
        java_string_literal(file_label),
    ));
    if let Some(ty) = &plan.return_type {
        out.push_str(&format!(" {} {} = {};", ty, RET_VAR, default_value(ty)));
        out.push_str(&format!(" boolean {} = false;", RETURNED_VAR));
    }
    out.push_str(" try {");
    out
}

/// Closes the `try` opened by the prologue with the single exit site.
pub fn epilogue(plan: &MethodPlan, file_label: &str) -> String {
    let ret = if plan.return_type.is_some() {
        format!("{} ? {} : null", RETURNED_VAR, RET_VAR)
    } else {
        "null".to_string()
    };
    format!(
        " }} finally {{ {}.writeExit({}, {}, {}, {}, {}, {}); }} ",
        RECORDER_CLASS,
        plan.self_expr(),
        PARAMS_VAR,
        ret,
        ID_VAR,
        java_string_literal(plan.signature.as_str()),
        java_string_literal(file_label),
    )
}

/// Replacement for the `return` keyword of a value return.
fn return_open() -> String {
    format!("{{ {} =", RET_VAR)
}

/// Replacement for the `;` of a value return.
fn return_close() -> String {
    format!("; {} = true; return {}; }}", RETURNED_VAR, RET_VAR)
}

/// Append the edits instrumenting one method.
///
/// Edits are pushed in output order for equal offsets: the prologue before
/// the epilogue, so an empty body still reads `{ prologue try { } finally
/// {...} }`.
pub fn push_method_edits(edits: &mut EditSet, plan: &MethodPlan, file_label: &str) {
    let signature = plan.signature.as_str();

    let id = edits.next_id();
    edits.push(
        Edit::insert(id, plan.method_start, format!("@{} ", MARKER_ANNOTATION))
            .with_label(format!("marker {}", signature)),
    );

    let id = edits.next_id();
    edits.push(
        Edit::insert(id, plan.prologue_at, prologue(plan, file_label))
            .with_label(format!("prologue {}", signature)),
    );

    for site in &plan.returns {
        let id = edits.next_id();
        edits.push(Edit::replace(id, site.keyword, return_open()).with_label("return open"));
        let id = edits.next_id();
        edits.push(Edit::replace(id, site.semicolon, return_close()).with_label("return close"));
    }

    let id = edits.next_id();
    edits.push(
        Edit::insert(id, plan.body.end - 1, epilogue(plan, file_label))
            .with_label(format!("epilogue {}", signature)),
    );
}

/// Import edit for whichever runtime imports are missing.
///
/// The imports follow the package declaration on the same line, or open
/// the file when there is none.
pub fn import_edit(id: u32, package_end: Option<usize>, missing: &[&str]) -> Option<Edit> {
    if missing.is_empty() {
        return None;
    }
    let imports: Vec<String> = missing
        .iter()
        .map(|name| format!("import {};", name))
        .collect();
    let edit = match package_end {
        Some(offset) => Edit::insert(id, offset, format!(" {}", imports.join(" "))),
        None => Edit::insert(id, 0, format!("{} ", imports.join(" "))),
    };
    Some(edit.with_label("runtime imports"))
}

/// Runtime imports not yet present according to `has_import`.
pub fn missing_imports(has_import: impl Fn(&str) -> bool) -> Vec<&'static str> {
    RUNTIME_IMPORTS
        .iter()
        .copied()
        .filter(|name| !has_import(name))
        .collect()
}
