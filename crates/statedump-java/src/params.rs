//! Formal parameter name extraction.
//!
//! Works on the raw text of a `formal_parameters` node so that it does not
//! depend on how the grammar shapes annotations, receiver parameters or
//! legacy array declarators.

use crate::signature::{tokenize, Token};

/// Split a parameter list into its top-level entries.
///
/// Surrounding parentheses are optional. Commas nested inside generic
/// arguments, annotation arguments or literals do not split.
pub fn split_parameters(params_text: &str) -> Vec<&str> {
    let trimmed = params_text.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(trimmed);

    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in inner.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '<' | '(' | '[' | '{' => depth += 1,
            '>' | ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(inner[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Name declared by one formal parameter.
///
/// Returns `None` for receiver parameters (`Foo this`) and for text that
/// declares no identifier.
pub fn parameter_name(param: &str) -> Option<String> {
    let tokens = tokenize(param);
    let mut words: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            Token::Punct("@") => i = skip_annotation(&tokens, i + 1),
            Token::Word("final") => i += 1,
            Token::Word(w) => {
                words.push(w);
                i += 1;
            }
            _ => i += 1,
        }
    }
    match words.last() {
        Some(&"this") | None => None,
        Some(name) => Some((*name).to_string()),
    }
}

/// Skip an annotation body starting right after its `@`.
fn skip_annotation(tokens: &[Token<'_>], mut i: usize) -> usize {
    // Qualified name: Word ( '.' Word )*
    if matches!(tokens.get(i), Some(Token::Word(_))) {
        i += 1;
    }
    while tokens.get(i) == Some(&Token::Punct(".")) && matches!(tokens.get(i + 1), Some(Token::Word(_))) {
        i += 2;
    }
    if tokens.get(i) == Some(&Token::Punct("(")) {
        let mut depth = 0;
        while let Some(token) = tokens.get(i) {
            match token {
                Token::Punct("(") => depth += 1,
                Token::Punct(")") => {
                    depth -= 1;
                    if depth == 0 {
                        return i + 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }
    }
    i
}

/// Parameter names of a parameter list, in declaration order.
pub fn parameter_names(params_text: &str) -> Vec<String> {
    split_parameters(params_text)
        .into_iter()
        .filter_map(parameter_name)
        .collect()
}
