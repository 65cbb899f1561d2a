//! JavaDoc extraction for the instrumentation report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::syntax::{node_text, MethodNode};

/// Structured JavaDoc comment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JavaDoc {
    /// Text before the first block tag, lines joined with `\n`.
    pub description: String,
    /// `@param name description`, by parameter name.
    pub params: BTreeMap<String, String>,
    /// `@return` / `@returns` text.
    pub returns: Option<String>,
    /// `@throws` / `@exception`, by exception type.
    pub throws: BTreeMap<String, String>,
    /// Every other block tag (`@since`, `@see`, ...), in order of appearance.
    pub tags: BTreeMap<String, Vec<String>>,
}

/// JavaDoc attached to a declaration: the `/** ... */` comment that is its
/// immediately preceding sibling.
pub fn javadoc_for(method: &MethodNode<'_>, source: &[u8]) -> Option<JavaDoc> {
    let prev = method.node().prev_sibling()?;
    if prev.kind() != "block_comment" {
        return None;
    }
    parse_javadoc(&node_text(source, prev))
}

/// Parse raw comment text. Returns `None` unless it is a `/** */` comment.
pub fn parse_javadoc(comment: &str) -> Option<JavaDoc> {
    let body = comment.trim().strip_prefix("/**")?;
    let body = body.strip_suffix("*/").unwrap_or(body);

    let mut doc = JavaDoc::default();
    let mut description: Vec<&str> = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;

    for raw in body.lines() {
        let line = raw.trim();
        let line = line.strip_prefix('*').map(str::trim).unwrap_or(line);

        if let Some(tagged) = line.strip_prefix('@') {
            if let Some((tag, content)) = current.take() {
                doc.add_tag(&tag, &content.join(" "));
            }
            let (tag, rest) = tagged
                .split_once(char::is_whitespace)
                .unwrap_or((tagged, ""));
            let rest = rest.trim();
            let content = if rest.is_empty() {
                Vec::new()
            } else {
                vec![rest.to_string()]
            };
            current = Some((tag.to_string(), content));
        } else if let Some((_, content)) = current.as_mut() {
            if !line.is_empty() {
                content.push(line.to_string());
            }
        } else {
            description.push(line);
        }
    }
    if let Some((tag, content)) = current.take() {
        doc.add_tag(&tag, &content.join(" "));
    }

    doc.description = description.join("\n").trim().to_string();
    Some(doc)
}

impl JavaDoc {
    fn add_tag(&mut self, tag: &str, content: &str) {
        let content = content.trim();
        match tag {
            "param" => {
                if let Some((name, desc)) = split_first_word(content) {
                    self.params.insert(name.to_string(), desc.to_string());
                }
            }
            "return" | "returns" => self.returns = Some(content.to_string()),
            "throws" | "exception" => {
                if let Some((ty, desc)) = split_first_word(content) {
                    self.throws.insert(ty.to_string(), desc.to_string());
                }
            }
            other => self
                .tags
                .entry(other.to_string())
                .or_default()
                .push(content.to_string()),
        }
    }
}

fn split_first_word(content: &str) -> Option<(&str, &str)> {
    if content.is_empty() {
        return None;
    }
    Some(
        content
            .split_once(char::is_whitespace)
            .map(|(first, rest)| (first, rest.trim()))
            .unwrap_or((content, "")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse_java;

    #[test]
    fn full_comment() {
        let doc = parse_javadoc(
            "/**\n * Reduces the fraction.\n * Second line.\n *\n * @param num the numerator\n *        spanning lines\n * @param den the denominator\n * @return the reduced fraction\n * @throws ArithmeticException if den is zero\n * @since 2.0\n * @see Fraction#reduce\n * @see Math\n */",
        )
        .unwrap();
        assert_eq!(doc.description, "Reduces the fraction.\nSecond line.");
        assert_eq!(doc.params["num"], "the numerator spanning lines");
        assert_eq!(doc.params["den"], "the denominator");
        assert_eq!(doc.returns.as_deref(), Some("the reduced fraction"));
        assert_eq!(doc.throws["ArithmeticException"], "if den is zero");
        assert_eq!(doc.tags["since"], vec!["2.0"]);
        assert_eq!(doc.tags["see"], vec!["Fraction#reduce", "Math"]);
    }

    #[test]
    fn single_line_comment() {
        let doc = parse_javadoc("/** Returns the count. */").unwrap();
        assert_eq!(doc.description, "Returns the count.");
        assert!(doc.params.is_empty());
    }

    #[test]
    fn plain_block_comment_is_not_javadoc() {
        assert!(parse_javadoc("/* not a doc */").is_none());
        assert!(parse_javadoc("// nope").is_none());
    }

    #[test]
    fn attached_to_following_method_only() {
        let source = "class A {\n    /** Adds. @param a first */\n    @Override\n    int add(int a) { return a; }\n\n    int other() { return 0; }\n}\n";
        let tree = parse_java(source.as_bytes()).unwrap();
        let methods = tree.method_nodes();
        let doc = javadoc_for(&methods[0], source.as_bytes()).unwrap();
        assert_eq!(doc.description, "Adds. @param a first");
        assert!(javadoc_for(&methods[1], source.as_bytes()).is_none());
    }
}
