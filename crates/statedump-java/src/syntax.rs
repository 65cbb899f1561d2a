//! Syntax tree indexing over tree-sitter-java.
//!
//! The indexer is read-only: it parses a byte buffer and exposes method and
//! constructor declarations as [`MethodNode`] views with byte extents and
//! 1-indexed line ranges. Rewriting happens elsewhere, as edits computed
//! from these views.

use std::borrow::Cow;
use std::cell::RefCell;

use tracing::debug;
use tree_sitter::{Node, Parser, Tree};

use statedump_core::patch::Span;
use statedump_core::text::extract_span;

use crate::signature::MethodSignature;

thread_local! {
    static JAVA_PARSER: RefCell<Option<Parser>> = RefCell::new({
        let mut parser = Parser::new();
        match parser.set_language(&tree_sitter_java::LANGUAGE.into()) {
            Ok(()) => Some(parser),
            Err(_) => None,
        }
    });
}

/// Parse Java source bytes.
///
/// Returns `None` only when tree-sitter produces no tree at all (grammar
/// load failure, parser re-entered on the same thread). Malformed input
/// still yields a tree; use [`SyntaxTree::has_errors`] to check.
pub fn parse_java(source: &[u8]) -> Option<SyntaxTree<'_>> {
    let tree = JAVA_PARSER.with(|cell| {
        let mut parser = cell.try_borrow_mut().ok()?;
        parser.as_mut()?.parse(source, None)
    });
    if tree.is_none() {
        debug!(len = source.len(), "tree-sitter produced no tree");
    }
    tree.map(|tree| SyntaxTree { source, tree })
}

/// Parsed Java compilation unit borrowing its source buffer.
pub struct SyntaxTree<'s> {
    source: &'s [u8],
    tree: Tree,
}

impl<'s> SyntaxTree<'s> {
    pub fn source(&self) -> &'s [u8] {
        self.source
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Whether tree-sitter had to recover from syntax errors.
    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// Every method and constructor declaration, in source order.
    ///
    /// Declarations nested in inner, local and anonymous classes are
    /// included. Non-Java input yields an empty list.
    pub fn method_nodes(&self) -> Vec<MethodNode<'_>> {
        let mut methods = Vec::new();
        visit_nodes(self.tree.root_node(), &mut |node| {
            if MethodKind::from_node_kind(node.kind()).is_some() {
                methods.push(MethodNode {
                    node,
                    source: self.source,
                });
            }
        });
        methods
    }

    /// Byte offset just past the `package` declaration, if there is one.
    pub fn package_end(&self) -> Option<usize> {
        let root = self.tree.root_node();
        find_named_child(root, "package_declaration").map(|n| n.end_byte())
    }

    /// Imported names, as written (`java.util.List`, `java.util.*`).
    ///
    /// Static imports are excluded.
    pub fn imports(&self) -> Vec<String> {
        let root = self.tree.root_node();
        let mut imports = Vec::new();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            if child.kind() != "import_declaration" {
                continue;
            }
            let text = node_text(self.source, child);
            let body = text
                .trim()
                .trim_start_matches("import")
                .trim_end_matches(';')
                .trim();
            if body.starts_with("static ") {
                continue;
            }
            imports.push(body.split_whitespace().collect::<String>());
        }
        imports
    }

    /// Whether `qualified` is imported, directly or through a wildcard on
    /// its package.
    pub fn has_import(&self, qualified: &str) -> bool {
        let package = qualified.rsplit_once('.').map(|(p, _)| p);
        self.imports().iter().any(|import| {
            import == qualified
                || import
                    .strip_suffix(".*")
                    .is_some_and(|wild| Some(wild) == package)
        })
    }
}

// ============================================================================
// Method Views
// ============================================================================

/// Declaration kind of a [`MethodNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Method,
    Constructor,
}

impl MethodKind {
    fn from_node_kind(kind: &str) -> Option<Self> {
        match kind {
            "method_declaration" => Some(MethodKind::Method),
            "constructor_declaration" => Some(MethodKind::Constructor),
            _ => None,
        }
    }
}

/// Read-only view of a method or constructor declaration.
#[derive(Clone, Copy)]
pub struct MethodNode<'t> {
    node: Node<'t>,
    source: &'t [u8],
}

impl<'t> MethodNode<'t> {
    pub fn kind(&self) -> MethodKind {
        MethodKind::from_node_kind(self.node.kind()).unwrap_or(MethodKind::Method)
    }

    pub fn is_constructor(&self) -> bool {
        self.kind() == MethodKind::Constructor
    }

    pub fn node(&self) -> Node<'t> {
        self.node
    }

    pub fn span(&self) -> Span {
        Span::new(self.node.start_byte(), self.node.end_byte())
    }

    /// First line of the declaration (1-indexed), including leading
    /// annotations and modifiers.
    pub fn start_line(&self) -> u32 {
        self.node.start_position().row as u32 + 1
    }

    /// Last line of the declaration (1-indexed).
    pub fn end_line(&self) -> u32 {
        self.node.end_position().row as u32 + 1
    }

    /// Full declaration text.
    pub fn text(&self) -> Cow<'t, str> {
        node_text(self.source, self.node)
    }

    pub fn name(&self) -> Cow<'t, str> {
        self.name_node()
            .map(|n| node_text(self.source, n))
            .unwrap_or(Cow::Borrowed("<anonymous>"))
    }

    pub fn name_node(&self) -> Option<Node<'t>> {
        self.node.child_by_field_name("name")
    }

    pub fn parameters_node(&self) -> Option<Node<'t>> {
        self.node.child_by_field_name("parameters")
    }

    /// Parameter list text including parentheses.
    pub fn parameters_text(&self) -> Cow<'t, str> {
        self.parameters_node()
            .map(|n| node_text(self.source, n))
            .unwrap_or(Cow::Borrowed("()"))
    }

    /// Declared return type. `None` for constructors.
    pub fn return_type_node(&self) -> Option<Node<'t>> {
        self.node.child_by_field_name("type")
    }

    /// Legacy array dimensions after the parameter list (`int f()[]`).
    pub fn dimensions_node(&self) -> Option<Node<'t>> {
        self.node.child_by_field_name("dimensions")
    }

    pub fn body_node(&self) -> Option<Node<'t>> {
        self.node.child_by_field_name("body")
    }

    pub fn modifiers_node(&self) -> Option<Node<'t>> {
        self.node
            .child_by_field_name("modifiers")
            .or_else(|| find_named_child(self.node, "modifiers"))
    }

    /// Declared return type with legacy dimensions folded in, e.g.
    /// `int[]` for `int f()[]`.
    pub fn return_type(&self) -> Option<String> {
        let ty = self.return_type_node()?;
        let mut text = node_text(self.source, ty).into_owned();
        if let Some(dims) = self.dimensions_node() {
            text.push_str(&node_text(self.source, dims));
        }
        Some(text)
    }

    pub fn is_void(&self) -> bool {
        self.return_type_node()
            .is_some_and(|ty| ty.kind() == "void_type")
            && self.dimensions_node().is_none()
    }

    pub fn is_static(&self) -> bool {
        let Some(modifiers) = self.modifiers_node() else {
            return false;
        };
        let mut cursor = modifiers.walk();
        let found = modifiers
            .children(&mut cursor)
            .any(|child| child.kind() == "static");
        found
    }

    /// Whether the declaration carries `@<marker>` (simple or qualified).
    pub fn has_marker_annotation(&self, marker: &str) -> bool {
        let Some(modifiers) = self.modifiers_node() else {
            return false;
        };
        let mut cursor = modifiers.walk();
        let found = modifiers.named_children(&mut cursor).any(|child| {
            child.kind().ends_with("annotation")
                && child.child_by_field_name("name").is_some_and(|name| {
                    let text = node_text(self.source, name);
                    text.rsplit('.').next() == Some(marker)
                })
        });
        found
    }

    /// `this(...)`/`super(...)` call opening a constructor body.
    pub fn explicit_constructor_invocation(&self) -> Option<Node<'t>> {
        let body = self.body_node()?;
        let mut cursor = body.walk();
        let first = body
            .named_children(&mut cursor)
            .find(|child| !is_comment(*child));
        first.filter(|n| n.kind() == "explicit_constructor_invocation")
    }

    /// Normalized signature key of this declaration.
    pub fn signature(&self) -> MethodSignature {
        extract_signature(self)
    }
}

impl std::fmt::Debug for MethodNode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodNode")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .field("lines", &(self.start_line(), self.end_line()))
            .finish()
    }
}

/// `"<returnType> " + name + paramListText`, normalized.
pub fn extract_signature(method: &MethodNode<'_>) -> MethodSignature {
    let return_type = method.return_type();
    MethodSignature::from_parts(
        return_type.as_deref(),
        &method.name(),
        &method.parameters_text(),
    )
}

// ============================================================================
// Node Helpers
// ============================================================================

/// Visit a node and all its descendants in pre-order.
pub fn visit_nodes<'a, F: FnMut(Node<'a>)>(node: Node<'a>, f: &mut F) {
    f(node);
    if node.child_count() == 0 {
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        visit_nodes(child, f);
    }
}

/// Find the first named child with the given kind.
pub fn find_named_child<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    let result = node
        .named_children(&mut cursor)
        .find(|child| child.kind() == kind);
    result
}

/// Source text of `node`. Invalid UTF-8 is replaced, never rejected.
pub fn node_text<'a>(source: &'a [u8], node: Node<'_>) -> Cow<'a, str> {
    let span = Span::new(node.start_byte(), node.end_byte());
    String::from_utf8_lossy(extract_span(source, &span).unwrap_or_default())
}

pub fn is_comment(node: Node<'_>) -> bool {
    matches!(node.kind(), "line_comment" | "block_comment" | "comment")
}

// ============================================================================
// Tests
// ============================================================================
