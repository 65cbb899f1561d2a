//! Per-method rewrite plans.
//!
//! A [`MethodPlan`] is computed from an immutable parse of the original
//! buffer. It captures everything the emitter needs as byte offsets into
//! that buffer, so no edit ever depends on another edit's result.

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use statedump_core::patch::Span;
use statedump_core::text::lookback;

use crate::params::parameter_names;
use crate::runtime::MARKER_ANNOTATION;
use crate::signature::MethodSignature;
use crate::syntax::{node_text, MethodNode};

/// How far before a declaration a textual marker is still attributed to it.
const MARKER_LOOKBACK: usize = 100;

/// Why a targeted method was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No `{ ... }` body (abstract, native, interface method) or a body the
    /// parser had to recover.
    UnsupportedBody,
    /// The marker annotation is already present.
    AlreadyInstrumented,
    /// No declaration in the file has this signature.
    NotFound,
}

/// A `return <expr>;` owned by the planned method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnSite {
    /// The `return` keyword.
    pub keyword: Span,
    /// The terminating `;`.
    pub semicolon: Span,
}

/// Everything needed to instrument one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodPlan {
    pub signature: MethodSignature,
    pub is_static: bool,
    pub is_constructor: bool,
    pub param_names: Vec<String>,
    /// Declared return type; `None` for `void` and constructors.
    pub return_type: Option<String>,
    /// Start of the declaration, where the marker goes.
    pub method_start: usize,
    /// The body including its braces.
    pub body: Span,
    /// Where the prologue is inserted: after `{`, or after an explicit
    /// `this(...)`/`super(...)` call.
    pub prologue_at: usize,
    pub returns: Vec<ReturnSite>,
}

impl MethodPlan {
    /// Plan instrumentation of `method`.
    ///
    /// `floor` bounds the marker lookback, normally the end of the
    /// preceding sibling declaration.
    pub fn build(method: &MethodNode<'_>, source: &[u8], floor: usize) -> Result<Self, SkipReason> {
        if is_marked(method, source, floor) {
            return Err(SkipReason::AlreadyInstrumented);
        }
        let body = method.body_node().ok_or(SkipReason::UnsupportedBody)?;
        if !matches!(body.kind(), "block" | "constructor_body") || body.has_error() {
            return Err(SkipReason::UnsupportedBody);
        }
        let body_span = Span::new(body.start_byte(), body.end_byte());
        if source.get(body_span.start) != Some(&b'{')
            || body_span.end == 0
            || source.get(body_span.end - 1) != Some(&b'}')
        {
            return Err(SkipReason::UnsupportedBody);
        }

        let prologue_at = method
            .explicit_constructor_invocation()
            .map(|call| call.end_byte())
            .unwrap_or(body_span.start + 1);

        let return_type = if method.is_constructor() || method.is_void() {
            None
        } else {
            method.return_type()
        };

        let mut returns = Vec::new();
        if return_type.is_some() {
            collect_returns(body, &mut returns);
        }

        Ok(MethodPlan {
            signature: method.signature(),
            is_static: method.is_static(),
            is_constructor: method.is_constructor(),
            param_names: parameter_names(&method.parameters_text()),
            return_type,
            method_start: method.span().start,
            body: body_span,
            prologue_at,
            returns,
        })
    }

    /// Receiver expression passed to the recorder.
    pub fn self_expr(&self) -> &'static str {
        if self.is_static {
            "null"
        } else {
            "this"
        }
    }
}

fn is_marked(method: &MethodNode<'_>, source: &[u8], floor: usize) -> bool {
    if method.has_marker_annotation(MARKER_ANNOTATION) {
        return true;
    }
    let marker = format!("@{}", MARKER_ANNOTATION);
    let window = lookback(source, method.span().start, MARKER_LOOKBACK, floor);
    String::from_utf8_lossy(window).contains(&marker)
}

/// Node kinds that open a new `return` scope.
fn opens_scope(kind: &str) -> bool {
    matches!(
        kind,
        "lambda_expression"
            | "class_body"
            | "class_declaration"
            | "interface_declaration"
            | "enum_declaration"
            | "record_declaration"
            | "annotation_type_declaration"
    )
}

/// Collect value-returning `return` statements of the method owning `node`.
fn collect_returns(node: Node<'_>, out: &mut Vec<ReturnSite>) {
    if node.kind() == "return_statement" {
        if let Some(site) = return_site(node) {
            out.push(site);
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if opens_scope(child.kind()) {
            continue;
        }
        collect_returns(child, out);
    }
}

fn return_site(node: Node<'_>) -> Option<ReturnSite> {
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    let keyword = children.first().filter(|n| n.kind() == "return")?;
    let semicolon = children.last().filter(|n| n.kind() == ";" && !n.is_missing())?;
    let has_value = children
        .iter()
        .any(|n| n.is_named() && !matches!(n.kind(), "line_comment" | "block_comment"));
    if !has_value {
        return None;
    }
    Some(ReturnSite {
        keyword: Span::new(keyword.start_byte(), keyword.end_byte()),
        semicolon: Span::new(semicolon.start_byte(), semicolon.end_byte()),
    })
}

/// Default initializer for a return holder of type `ty`.
pub fn default_value(ty: &str) -> &'static str {
    match ty.trim() {
        "boolean" => "false",
        "char" => "(char) 0",
        "byte" => "(byte) 0",
        "short" => "(short) 0",
        "int" => "0",
        "long" => "0L",
        "float" => "0f",
        "double" => "0d",
        _ => "null",
    }
}

/// Text of the declaration as written, for the report.
pub fn method_code(method: &MethodNode<'_>, source: &[u8]) -> String {
    node_text(source, method.node()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse_java;

    fn plan_of(source: &str, name: &str) -> Result<MethodPlan, SkipReason> {
        let tree = parse_java(source.as_bytes()).unwrap();
        let method = tree
            .method_nodes()
            .into_iter()
            .find(|m| m.name() == name)
            .unwrap();
        MethodPlan::build(&method, source.as_bytes(), 0)
    }

    mod build_tests {
        use super::*;

        #[test]
        fn instance_method() {
            let src = "class A { int f(int a, final String b) { return a; } }";
            let plan = plan_of(src, "f").unwrap();
            assert!(!plan.is_static);
            assert_eq!(plan.self_expr(), "this");
            assert_eq!(plan.param_names, vec!["a", "b"]);
            assert_eq!(plan.return_type.as_deref(), Some("int"));
            assert_eq!(plan.returns.len(), 1);
            assert_eq!(&src[plan.body.start..plan.body.start + 1], "{");
            assert_eq!(plan.prologue_at, plan.body.start + 1);
        }

        #[test]
        fn static_void_method() {
            let src = "class A { static void g() { return; } }";
            let plan = plan_of(src, "g").unwrap();
            assert_eq!(plan.self_expr(), "null");
            assert!(plan.return_type.is_none());
            assert!(plan.returns.is_empty());
        }

        #[test]
        fn constructor_after_explicit_call() {
            let src = "class A extends B { A(int x) { super(x); y = x; } }";
            let plan = plan_of(src, "A").unwrap();
            assert!(plan.is_constructor);
            assert_eq!(&src[..plan.prologue_at], "class A extends B { A(int x) { super(x);");
        }

        #[test]
        fn abstract_method_unsupported() {
            let src = "abstract class A { abstract int f(); }";
            assert_eq!(plan_of(src, "f"), Err(SkipReason::UnsupportedBody));
        }

        #[test]
        fn marked_method_skipped() {
            let src = "class A { @DumpObj int f() { return 1; } }";
            assert_eq!(plan_of(src, "f"), Err(SkipReason::AlreadyInstrumented));
            let qualified = "class A { @org.instrument.DumpObj int f() { return 1; } }";
            assert_eq!(plan_of(qualified, "f"), Err(SkipReason::AlreadyInstrumented));
        }
    }

    mod return_tests {
        use super::*;

        #[test]
        fn nested_lambda_and_class_returns_excluded() {
            let src = r#"class A {
    int f(java.util.List<Integer> xs) {
        java.util.function.Supplier<Integer> s = () -> { return 1; };
        Runnable r = new Runnable() { public void run() { return; } };
        Object o = new Object() { int g() { return 2; } };
        class Local { int h() { return 3; } }
        if (xs.isEmpty()) return 4;
        for (int x : xs) { if (x > 0) { return x; } }
        return 5;
    }
}"#;
            let plan = plan_of(src, "f").unwrap();
            let exprs: Vec<&str> = plan
                .returns
                .iter()
                .map(|r| src[r.keyword.end..r.semicolon.start].trim())
                .collect();
            assert_eq!(exprs, vec!["4", "x", "5"]);
        }

        #[test]
        fn switch_returns_included() {
            let src = "class A { String f(int k) { switch (k) { case 1: return \"a\"; default: return \"b\"; } } }";
            assert_eq!(plan_of(src, "f").unwrap().returns.len(), 2);
        }
    }

    #[test]
    fn defaults() {
        assert_eq!(default_value("int"), "0");
        assert_eq!(default_value("long"), "0L");
        assert_eq!(default_value("boolean"), "false");
        assert_eq!(default_value("char"), "(char) 0");
        assert_eq!(default_value("int[]"), "null");
        assert_eq!(default_value("java.util.List<T>"), "null");
    }
}
