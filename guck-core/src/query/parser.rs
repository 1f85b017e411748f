//! Recursive-descent parser: OR -> AND -> NOT -> primary

use super::lexer::{Token, TokenKind};
use super::{Expr, QueryError};

/// Deepest run of nested groups and negations
pub const MAX_DEPTH: usize = 256;
/// Most terms a single query may contain
pub const MAX_TERMS: usize = 1024;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
    depth: usize,
    terms: usize,
}

impl Parser {
    /// `end` is the character length of the source, used for errors at EOF
    pub fn new(tokens: Vec<Token>, end: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end,
            depth: 0,
            terms: 0,
        }
    }

    /// Parse a full expression; leftover input is an error
    pub fn parse(mut self) -> Result<Expr, QueryError> {
        if self.tokens.is_empty() {
            return Err(QueryError::new(0, "empty query"));
        }
        let expr = self.parse_or()?;
        if let Some(token) = self.peek() {
            return Err(QueryError::new(
                token.position,
                format!("unexpected {}", token.kind.describe()),
            ));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Or)) {
            self.next();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_not()?;
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::And) => {
                    self.next();
                }
                // Juxtaposition is an implicit AND
                Some(kind) if kind.starts_term() => {}
                _ => break,
            }
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn enter(&mut self, position: usize) -> Result<(), QueryError> {
        if self.depth >= MAX_DEPTH {
            return Err(QueryError::new(position, "query nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_not(&mut self) -> Result<Expr, QueryError> {
        let position = match self.peek() {
            Some(Token { kind: TokenKind::Not, position }) => *position,
            _ => return self.parse_primary(),
        };
        self.next();
        self.enter(position)?;
        let operand = self.parse_not()?;
        self.depth -= 1;
        Ok(Expr::Not(Box::new(operand)))
    }

    fn term(&mut self, position: usize, text: &str) -> Result<Expr, QueryError> {
        self.terms += 1;
        if self.terms > MAX_TERMS {
            return Err(QueryError::new(
                position,
                format!("query has more than {} terms", MAX_TERMS),
            ));
        }
        Ok(Expr::Term(text.to_lowercase()))
    }

    fn parse_primary(&mut self) -> Result<Expr, QueryError> {
        let Some(token) = self.next() else {
            return Err(QueryError::new(self.end, "expected a term but reached end of query"));
        };
        match token.kind {
            TokenKind::Word(word) => self.term(token.position, &word),
            TokenKind::Phrase(phrase) => {
                if phrase.is_empty() {
                    return Err(QueryError::new(token.position, "empty phrase"));
                }
                self.term(token.position, &phrase)
            }
            TokenKind::LParen => {
                self.enter(token.position)?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token { kind: TokenKind::RParen, .. }) => Ok(inner),
                    _ => Err(QueryError::new(token.position, "unmatched '('")),
                }
            }
            other => Err(QueryError::new(
                token.position,
                format!("expected a term but found {}", other.describe()),
            )),
        }
    }
}
