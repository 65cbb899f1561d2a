//! Method signature keys.
//!
//! A signature is the string `"<returnType> <name>(<params>)"` (constructors
//! omit the return type) in a canonical spacing, so the same declaration
//! written with different whitespace, comments or `final` modifiers maps to
//! one key. Everything that distinguishes overloads (generic arguments,
//! array brackets, varargs, annotations) is preserved.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized method signature.
///
/// Only constructible through [`MethodSignature::normalize`], which is
/// idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodSignature(String);

impl MethodSignature {
    /// Normalize raw declaration text into a signature key.
    pub fn normalize(raw: &str) -> Self {
        let tokens: Vec<Token<'_>> = tokenize(raw)
            .into_iter()
            .filter(|t| *t != Token::Word("final"))
            .collect();
        MethodSignature(join_tokens(&tokens))
    }

    /// Build a signature from declaration parts.
    ///
    /// `params` is the parameter list text including its parentheses.
    pub fn from_parts(return_type: Option<&str>, name: &str, params: &str) -> Self {
        let raw = match return_type {
            Some(ty) => format!("{} {}{}", ty, name, params),
            None => format!("{}{}", name, params),
        };
        MethodSignature::normalize(&raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The method name: the last word before the parameter list.
    pub fn name(&self) -> &str {
        let head = self.0.split('(').next().unwrap_or("");
        head.rsplit(' ').next().unwrap_or("")
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

/// Lexical token of a declaration header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    /// Identifier, keyword or numeric literal.
    Word(&'a str),
    /// String or char literal, kept verbatim.
    Literal(&'a str),
    /// Single punctuation character, or `...`.
    Punct(&'a str),
}

impl<'a> Token<'a> {
    pub(crate) fn text(&self) -> &'a str {
        match self {
            Token::Word(s) | Token::Literal(s) | Token::Punct(s) => s,
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Split declaration text into tokens, dropping whitespace and comments.
///
/// `>>` is two tokens, so nested generics compare equal regardless of how
/// the closing brackets were spaced.
pub(crate) fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        let rest = &text[start..];
        if rest.starts_with("//") {
            while let Some(&(_, next)) = chars.peek() {
                if next == '\n' {
                    break;
                }
                chars.next();
            }
            continue;
        }
        if rest.starts_with("/*") {
            chars.next();
            let mut prev = ' ';
            for (_, next) in chars.by_ref() {
                if prev == '*' && next == '/' {
                    break;
                }
                prev = next;
            }
            continue;
        }
        if rest.starts_with("...") {
            chars.next();
            chars.next();
            tokens.push(Token::Punct(&text[start..start + 3]));
            continue;
        }
        if c == '"' || c == '\'' {
            let mut end = text.len();
            let mut escaped = false;
            for (i, next) in chars.by_ref() {
                if escaped {
                    escaped = false;
                } else if next == '\\' {
                    escaped = true;
                } else if next == c {
                    end = i + next.len_utf8();
                    break;
                }
            }
            tokens.push(Token::Literal(&text[start..end]));
            continue;
        }
        if is_word_char(c) {
            let mut end = start + c.len_utf8();
            while let Some(&(i, next)) = chars.peek() {
                if !is_word_char(next) {
                    break;
                }
                end = i + next.len_utf8();
                chars.next();
            }
            tokens.push(Token::Word(&text[start..end]));
            continue;
        }
        tokens.push(Token::Punct(&text[start..start + c.len_utf8()]));
    }
    tokens
}

/// Whether canonical output puts a space between `prev` and `next`.
fn needs_space(prev: &Token<'_>, next: &Token<'_>) -> bool {
    let next_is_word = matches!(next, Token::Word(_) | Token::Literal(_));
    match prev {
        Token::Punct(",") => true,
        Token::Word(_) | Token::Literal(_) => next_is_word || *next == Token::Punct("@"),
        Token::Punct(p) => {
            let closes = matches!(*p, ">" | "]" | ")" | "..." | "?");
            (closes && next_is_word) || (matches!(*p, ">" | "]" | ")") && *next == Token::Punct("@"))
        }
    }
}

fn join_tokens(tokens: &[Token<'_>]) -> String {
    let mut out = String::new();
    let mut prev: Option<&Token<'_>> = None;
    for token in tokens {
        if let Some(prev) = prev {
            if needs_space(prev, token) {
                out.push(' ');
            }
        }
        out.push_str(token.text());
        prev = Some(token);
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
