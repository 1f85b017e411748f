//! Boolean message search
//!
//! Compiles a user expression into a predicate over message text.
//!
//! Grammar, lowest to highest precedence:
//!
//! ```text
//! or      := and ( OR and )*
//! and     := not ( [AND] not )*        juxtaposition is an implicit AND
//! not     := ( NOT | ! | - ) not | primary
//! primary := word | "phrase" | ( or )
//! ```
//!
//! Every leaf is a case-insensitive substring test. Malformed input never
//! panics; [`compile`] returns a [`QueryError`] with a character position.
//! Nesting deeper than 256 levels or more than 1024 terms is rejected the same
//! way.
//!
//! ```rust
//! use guck_core::query::compile;
//!
//! let q = compile("timeout AND (db OR cache) NOT retry").unwrap();
//! assert!(q.matches("DB Timeout on shard 3"));
//! assert!(!q.matches("db timeout, retry scheduled"));
//! assert!(compile("foo AND").is_err());
//! ```

mod lexer;
mod parser;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use lexer::{tokenize, Token, TokenKind};

/// Compile failure with the character offset it was detected at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryError {
    pub position: usize,
    pub message: String,
}

impl QueryError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at position {})", self.message, self.position)
    }
}

impl std::error::Error for QueryError {}

/// Parsed expression tree; terms are stored lowercased
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Term(String),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// Evaluate against already-lowercased text
    pub fn eval(&self, lowered: &str) -> bool {
        match self {
            Expr::Term(term) => lowered.contains(term.as_str()),
            Expr::And(left, right) => left.eval(lowered) && right.eval(lowered),
            Expr::Or(left, right) => left.eval(lowered) || right.eval(lowered),
            Expr::Not(inner) => !inner.eval(lowered),
        }
    }

    fn first_positive_term(&self) -> Option<&str> {
        match self {
            Expr::Term(term) => Some(term),
            Expr::And(left, right) | Expr::Or(left, right) => left
                .first_positive_term()
                .or_else(|| right.first_positive_term()),
            Expr::Not(_) => None,
        }
    }
}

/// A compiled, reusable predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    source: String,
    expr: Expr,
}

impl CompiledQuery {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Case-insensitive match against a message
    pub fn matches(&self, message: &str) -> bool {
        self.expr.eval(&message.to_lowercase())
    }

    /// Match against an optional message; a missing message is empty text
    pub fn matches_message(&self, message: Option<&str>) -> bool {
        self.matches(message.unwrap_or(""))
    }

    /// First term that is not negated, used to focus message truncation
    pub fn focus_term(&self) -> Option<&str> {
        self.expr.first_positive_term()
    }
}

/// Compile a boolean search expression
pub fn compile(input: &str) -> Result<CompiledQuery, QueryError> {
    let tokens = tokenize(input)?;
    let expr = parser::Parser::new(tokens, input.chars().count()).parse()?;
    Ok(CompiledQuery {
        source: input.to_string(),
        expr,
    })
}

/// Compile an optional query; blank input means "no query"
pub fn compile_optional(input: Option<&str>) -> Result<Option<CompiledQuery>, QueryError> {
    match input.map(str::trim) {
        Some(text) if !text.is_empty() => compile(text).map(Some),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and() {
        let q = compile("foo AND bar").unwrap();
        assert!(q.matches("foo bar"));
        assert!(!q.matches("foo"));
    }

    #[test]
    fn test_or() {
        let q = compile("foo OR bar").unwrap();
        assert!(q.matches("foo"));
        assert!(q.matches("just bar"));
        assert!(!q.matches("baz"));
    }

    #[test]
    fn test_not() {
        let q = compile("NOT foo").unwrap();
        assert!(q.matches("bar"));
        assert!(!q.matches("foo"));
        assert!(compile("! foo").unwrap().matches("bar"));
        assert!(!compile("- foo").unwrap().matches("a foo"));
    }

    #[test]
    fn test_grouping() {
        let q = compile("foo AND (bar OR baz)").unwrap();
        assert!(q.matches("foo baz"));
        assert!(!q.matches("foo qux"));
    }

    #[test]
    fn test_phrase_is_case_insensitive() {
        let q = compile("\"exact phrase\"").unwrap();
        assert!(q.matches("this has an EXACT Phrase inside"));
        assert!(!q.matches("exact  phrase"));
    }

    #[test]
    fn test_implicit_and() {
        let q = compile("timeout db").unwrap();
        assert!(q.matches("db timeout"));
        assert!(!q.matches("timeout"));
        let q = compile("timeout NOT retry").unwrap();
        assert!(q.matches("timeout hit"));
        assert!(!q.matches("timeout retry"));
    }

    #[test]
    fn test_precedence() {
        // a OR b AND c == a OR (b AND c)
        let q = compile("a OR b AND c").unwrap();
        assert!(q.matches("a"));
        assert!(!q.matches("b"));
        assert!(q.matches("b c"));
    }

    #[test]
    fn test_lowercase_operators() {
        let q = compile("foo or bar").unwrap();
        assert!(q.matches("bar"));
    }

    #[test]
    fn test_missing_message_is_empty() {
        let q = compile("foo").unwrap();
        assert!(!q.matches_message(None));
        assert!(compile("NOT foo").unwrap().matches_message(None));
    }

    #[test]
    fn test_malformed_queries_fail_without_panicking() {
        for input in ["(", "foo AND", "\"unterminated", "AND foo", "foo )", "()", "", "NOT"] {
            assert!(compile(input).is_err(), "expected failure for {:?}", input);
        }
    }

    #[test]
    fn test_deep_nesting_is_an_error() {
        let err = compile(&"(".repeat(200_000)).unwrap_err();
        assert_eq!(err.message, "query nested too deeply");
        assert_eq!(err.position, super::parser::MAX_DEPTH);

        for prefix in ["NOT ", "! ", "- "] {
            let input = format!("{}foo", prefix.repeat(100_000));
            let err = compile(&input).unwrap_err();
            assert_eq!(err.message, "query nested too deeply", "prefix {:?}", prefix);
        }

        let nested = format!("{}foo{}", "(".repeat(200), ")".repeat(200));
        assert!(compile(&nested).unwrap().matches("FOO"));
        let negated = format!("{}foo", "NOT ".repeat(200));
        assert!(compile(&negated).unwrap().matches("foo"));
    }

    #[test]
    fn test_term_count_is_bounded() {
        let long = vec!["foo"; 50_000].join(" ");
        let err = compile(&long).unwrap_err();
        assert!(err.message.contains("terms"));
        assert!(compile(&vec!["foo"; 100].join(" OR ")).is_ok());
    }

    #[test]
    fn test_error_positions() {
        assert_eq!(compile("foo AND").unwrap_err().position, 7);
        assert_eq!(compile("AND foo").unwrap_err().position, 0);
        assert_eq!(compile("(foo").unwrap_err().position, 0);
        assert_eq!(compile("foo )").unwrap_err().position, 4);
    }

    #[test]
    fn test_focus_term() {
        assert_eq!(compile("NOT a OR Timeout").unwrap().focus_term(), Some("timeout"));
        assert_eq!(compile("NOT a").unwrap().focus_term(), None);
    }

    #[test]
    fn test_compile_optional() {
        assert!(compile_optional(None).unwrap().is_none());
        assert!(compile_optional(Some("   ")).unwrap().is_none());
        assert!(compile_optional(Some("x")).unwrap().is_some());
        assert!(compile_optional(Some("(x")).is_err());
    }
}
