//! Lexer for SLQ.
//!
//! Tokenizes query strings like `@pg1 | .actor | .[1:3]` into a flat token
//! stream for the parser. The lexer recognizes:
//!
//! - **Handles**: `@name` with name matching `[a-z][a-z0-9_]*`
//! - **Identifiers**: table, column, and function names after `.`
//! - **Numeric literals**: integers (`42`) and floats (`3.14`)
//! - **String literals**: single-quoted, `''` escapes an embedded quote
//! - **Comparison operators**: `==`, `!=`, `<`, `<=`, `>`, `>=`
//! - **Punctuation**: `|`, `,`, `.`, `:`, `[`, `]`

use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Pipe,
    Comma,
    Dot,
    Colon,
    LBracket,
    RBracket,
    /// Includes the leading `@`.
    Handle(String),
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    /// Consumes the whole input, returning tokens terminated by [`Token::Eof`].
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok == Token::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }

        let Some(&(pos, c)) = self.chars.peek() else {
            return Ok(Token::Eof);
        };

        match c {
            '|' => self.single(Token::Pipe),
            ',' => self.single(Token::Comma),
            '.' => self.single(Token::Dot),
            ':' => self.single(Token::Colon),
            '[' => self.single(Token::LBracket),
            ']' => self.single(Token::RBracket),
            '@' => self.lex_handle(pos),
            '\'' => self.lex_string(pos),
            '=' => {
                self.chars.next();
                match self.chars.peek() {
                    Some((_, '=')) => {
                        self.chars.next();
                        Ok(Token::Eq)
                    }
                    _ => Err(self.err(pos, "want == for equality")),
                }
            }
            '!' => {
                self.chars.next();
                match self.chars.peek() {
                    Some((_, '=')) => {
                        self.chars.next();
                        Ok(Token::Ne)
                    }
                    _ => Err(self.err(pos, "want != after !")),
                }
            }
            '<' => {
                self.chars.next();
                if matches!(self.chars.peek(), Some((_, '='))) {
                    self.chars.next();
                    Ok(Token::Le)
                } else {
                    Ok(Token::Lt)
                }
            }
            '>' => {
                self.chars.next();
                if matches!(self.chars.peek(), Some((_, '='))) {
                    self.chars.next();
                    Ok(Token::Ge)
                } else {
                    Ok(Token::Gt)
                }
            }
            c if c.is_ascii_digit() => self.lex_number(pos),
            c if c.is_ascii_alphabetic() || c == '_' => Ok(self.lex_ident(pos)),
            other => Err(self.err(pos, &format!("unexpected character {other:?}"))),
        }
    }

    fn single(&mut self, tok: Token) -> Result<Token> {
        self.chars.next();
        Ok(tok)
    }

    fn lex_handle(&mut self, start: usize) -> Result<Token> {
        self.chars.next(); // consume '@'
        let name_start = start + 1;
        let mut end = name_start;
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                self.chars.next();
                end = i + c.len_utf8();
            } else {
                break;
            }
        }
        let handle = &self.input[start..end];
        crate::source::validate_handle(handle)
            .map_err(|_| self.err(start, &format!("invalid handle {handle:?}")))?;
        Ok(Token::Handle(handle.to_string()))
    }

    fn lex_ident(&mut self, start: usize) -> Token {
        let mut end = start;
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.chars.next();
                end = i + c.len_utf8();
            } else {
                break;
            }
        }
        Token::Ident(self.input[start..end].to_string())
    }

    fn lex_number(&mut self, start: usize) -> Result<Token> {
        let mut end = start;
        let mut is_float = false;
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                self.chars.next();
                end = i + 1;
            } else if c == '.' && !is_float {
                // Only a float if a digit follows; otherwise the dot starts
                // a selector, as in `3.foo` (which the parser will reject).
                let mut ahead = self.chars.clone();
                ahead.next();
                if matches!(ahead.peek(), Some((_, d)) if d.is_ascii_digit()) {
                    is_float = true;
                    self.chars.next();
                    end = i + 1;
                } else {
                    break;
                }
            } else {
                break;
            }
        }
        let text = &self.input[start..end];
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| self.err(start, &format!("bad float literal {text:?}")))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| self.err(start, &format!("bad integer literal {text:?}")))
        }
    }

    fn lex_string(&mut self, start: usize) -> Result<Token> {
        self.chars.next(); // opening quote
        let mut out = String::new();
        while let Some((_, c)) = self.chars.next() {
            if c != '\'' {
                out.push(c);
                continue;
            }
            // '' inside a string is an escaped quote
            if matches!(self.chars.peek(), Some((_, '\''))) {
                self.chars.next();
                out.push('\'');
            } else {
                return Ok(Token::Str(out));
            }
        }
        Err(self.err(start, "unterminated string literal"))
    }

    fn err(&self, pos: usize, msg: &str) -> Error {
        Error::Parse(format!("at offset {pos}: {msg}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_pipeline() {
        let toks = Lexer::new("@pg1 | .actor | .[1:3]").tokenize().unwrap();
        assert_eq!(
            toks,
            vec![
                Token::Handle("@pg1".to_string()),
                Token::Pipe,
                Token::Dot,
                Token::Ident("actor".to_string()),
                Token::Pipe,
                Token::Dot,
                Token::LBracket,
                Token::Int(1),
                Token::Colon,
                Token::Int(3),
                Token::RBracket,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_expr_operators() {
        let toks = Lexer::new(".uid >= 4").tokenize().unwrap();
        assert_eq!(
            toks,
            vec![
                Token::Dot,
                Token::Ident("uid".to_string()),
                Token::Ge,
                Token::Int(4),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_string_with_escaped_quote() {
        let toks = Lexer::new("'it''s'").tokenize().unwrap();
        assert_eq!(toks[0], Token::Str("it's".to_string()));
    }

    #[test]
    fn rejects_bad_handle_and_lone_bang() {
        assert!(Lexer::new("@Nope").tokenize().is_err());
        assert!(Lexer::new("! x").tokenize().is_err());
    }
}
