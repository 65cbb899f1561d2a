//! Relevant-method ranking.
//!
//! For an instrumented method, the report lists a few other methods of the
//! same file that use it: direct callers first, then methods that merely
//! mention its name.

use regex::Regex;
use std::collections::BTreeSet;

use crate::signature::MethodSignature;
use crate::syntax::{node_text, visit_nodes, SyntaxTree};

struct MethodInfo {
    signature: MethodSignature,
    name: String,
    body: String,
    invoked: BTreeSet<String>,
}

/// Per-file index of method bodies and the names they invoke.
pub struct RelevanceIndex {
    methods: Vec<MethodInfo>,
}

impl RelevanceIndex {
    pub fn build(tree: &SyntaxTree<'_>) -> Self {
        let source = tree.source();
        let methods = tree
            .method_nodes()
            .iter()
            .map(|method| {
                let body = method.body_node();
                let mut invoked = BTreeSet::new();
                if let Some(body) = body {
                    visit_nodes(body, &mut |node| {
                        let name = match node.kind() {
                            "method_invocation" => node
                                .child_by_field_name("name")
                                .map(|n| node_text(source, n).into_owned()),
                            "method_reference" => {
                                let mut cursor = node.walk();
                                let last = node.named_children(&mut cursor).last();
                                last.filter(|n| n.kind() == "identifier")
                                    .map(|n| node_text(source, n).into_owned())
                            }
                            "object_creation_expression" => {
                                node.child_by_field_name("type").map(|n| {
                                    let text = node_text(source, n);
                                    let base = text.split('<').next().unwrap_or("");
                                    base.rsplit('.').next().unwrap_or("").trim().to_string()
                                })
                            }
                            _ => None,
                        };
                        if let Some(name) = name {
                            invoked.insert(name);
                        }
                    });
                }
                MethodInfo {
                    signature: method.signature(),
                    name: method.name().into_owned(),
                    body: body
                        .map(|b| node_text(source, b).into_owned())
                        .unwrap_or_default(),
                    invoked,
                }
            })
            .collect();
        RelevanceIndex { methods }
    }

    /// Up to `limit` methods related to `target`, callers first.
    ///
    /// The target itself is never listed. A target absent from the file is
    /// matched by the name embedded in its signature.
    pub fn relevant_to(&self, target: &MethodSignature, limit: usize) -> Vec<MethodSignature> {
        let name = self
            .methods
            .iter()
            .find(|m| &m.signature == target)
            .map(|m| m.name.as_str())
            .unwrap_or_else(|| target.name());
        if name.is_empty() || limit == 0 {
            return Vec::new();
        }
        let Ok(pattern) = Regex::new(&format!(r"\b{}\b", regex::escape(name))) else {
            return Vec::new();
        };

        let mut callers = Vec::new();
        let mut mentions = Vec::new();
        for info in self.methods.iter().filter(|m| &m.signature != target) {
            if info.invoked.contains(name) {
                callers.push(info.signature.clone());
            } else if pattern.is_match(&info.body) {
                mentions.push(info.signature.clone());
            }
        }

        let mut selected: Vec<MethodSignature> = Vec::new();
        for signature in callers.into_iter().chain(mentions) {
            if selected.len() >= limit {
                break;
            }
            if !selected.contains(&signature) {
                selected.push(signature);
            }
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse_java;

    const SOURCE: &str = r#"class Fraction {
    int reduce(int x) { return x; }
    int a() { return reduce(1); }
    int b() { java.util.function.IntUnaryOperator f = this::reduce; return 0; }
    int c() { String s = "reduce"; return 0; }
    int d() { return 0; }
    Fraction make() { return new Fraction(); }
    Fraction() {}
}
"#;

    fn index() -> RelevanceIndex {
        let tree = parse_java(SOURCE.as_bytes()).unwrap();
        RelevanceIndex::build(&tree)
    }

    #[test]
    fn callers_before_mentions() {
        let target = MethodSignature::normalize("int reduce(int x)");
        let relevant = index().relevant_to(&target, 3);
        let names: Vec<&str> = relevant.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["int a()", "int b()", "int c()"]);
    }

    #[test]
    fn limit_is_respected() {
        let target = MethodSignature::normalize("int reduce(int x)");
        assert_eq!(index().relevant_to(&target, 1).len(), 1);
        assert!(index().relevant_to(&target, 0).is_empty());
    }

    #[test]
    fn constructor_callers_found_via_object_creation() {
        let target = MethodSignature::normalize("Fraction()");
        let relevant = index().relevant_to(&target, 3);
        assert_eq!(relevant[0].as_str(), "Fraction make()");
    }

    #[test]
    fn unused_method_has_no_relevant_methods() {
        let target = MethodSignature::normalize("int d()");
        assert!(index().relevant_to(&target, 3).is_empty());
    }
}
