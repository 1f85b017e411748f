//! Tokenizer for boolean search expressions

use super::QueryError;

/// Token kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Word(String),
    Phrase(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl TokenKind {
    /// Whether this token can begin a primary (or NOT) expression
    pub fn starts_term(&self) -> bool {
        matches!(
            self,
            TokenKind::Word(_) | TokenKind::Phrase(_) | TokenKind::LParen | TokenKind::Not
        )
    }

    pub fn describe(&self) -> String {
        match self {
            TokenKind::Word(w) => format!("word '{}'", w),
            TokenKind::Phrase(p) => format!("phrase \"{}\"", p),
            TokenKind::And => "AND".to_string(),
            TokenKind::Or => "OR".to_string(),
            TokenKind::Not => "NOT".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
        }
    }
}

/// A token and the character offset it starts at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

fn is_boundary(c: char) -> bool {
    c.is_whitespace() || c == '(' || c == ')'
}

/// Split an expression into tokens.
///
/// `!` and `-` are NOT operators only when they stand alone; inside a word
/// (`foo-bar`, `-x`) they are ordinary characters.
pub fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token { kind: TokenKind::LParen, position: i });
                i += 1;
            }
            ')' => {
                tokens.push(Token { kind: TokenKind::RParen, position: i });
                i += 1;
            }
            '"' => {
                let start = i;
                let mut phrase = String::new();
                let mut closed = false;
                i += 1;
                while i < chars.len() {
                    match chars[i] {
                        '\\' if i + 1 < chars.len() => {
                            phrase.push(chars[i + 1]);
                            i += 2;
                        }
                        '"' => {
                            closed = true;
                            i += 1;
                            break;
                        }
                        other => {
                            phrase.push(other);
                            i += 1;
                        }
                    }
                }
                if !closed {
                    return Err(QueryError::new(start, "unterminated quote"));
                }
                tokens.push(Token { kind: TokenKind::Phrase(phrase), position: start });
            }
            '!' | '-' if chars.get(i + 1).map_or(true, |&next| is_boundary(next) || next == '"') => {
                tokens.push(Token { kind: TokenKind::Not, position: i });
                i += 1;
            }
            _ => {
                let start = i;
                while i < chars.len() && !is_boundary(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let kind = match word.to_uppercase().as_str() {
                    "AND" => TokenKind::And,
                    "OR" => TokenKind::Or,
                    "NOT" => TokenKind::Not,
                    _ => TokenKind::Word(word),
                };
                tokens.push(Token { kind, position: start });
            }
        }
    }

    Ok(tokens)
}
