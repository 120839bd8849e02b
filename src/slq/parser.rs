//! Recursive-descent parser for SLQ.
//!
//! A query is a `|`-separated pipeline of segments; a segment is a
//! comma-separated list of elements; an element is a handle, a selector, a
//! function, a row range, or a comparison expression.
//!
//! Row-range semantics:
//!
//! ```text
//! [n]    offset n, limit 1
//! [n:m]  offset n, limit max(0, m-n)
//! [:m]   offset 0, limit m
//! [n:]   offset n, limit unbounded
//! []     no range node at all
//! ```

use crate::error::{Error, Result};
use crate::slq::ast::{Ast, CmpOp, Func, Literal, Node, LIMIT_UNBOUNDED};
use crate::slq::lexer::{Lexer, Token};

/// Parses SLQ text into an [`Ast`].
pub fn parse(input: &str) -> Result<Ast> {
    let tokens = Lexer::new(input).tokenize()?;
    Parser { tokens, pos: 0 }.parse_query()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn parse_query(mut self) -> Result<Ast> {
        let mut segments = Vec::new();
        loop {
            segments.push(self.parse_segment()?);
            match self.peek() {
                Token::Pipe => {
                    self.advance();
                }
                Token::Eof => break,
                other => {
                    return Err(Error::Parse(format!(
                        "expected | or end of query, got {other:?}"
                    )))
                }
            }
        }
        Ok(Ast { segments })
    }

    fn parse_segment(&mut self) -> Result<Node> {
        let mut elements = Vec::new();
        loop {
            if let Some(elem) = self.parse_element()? {
                elements.push(elem);
            }
            match self.peek() {
                Token::Comma => {
                    self.advance();
                }
                _ => break,
            }
        }
        // A segment holding only `[]` parses to no elements; a truly empty
        // segment (`@a | | .t`) already failed in parse_element.
        Ok(Node::Segment(elements))
    }

    /// Parses one element. Returns `Ok(None)` for the empty row range `[]`,
    /// which contributes no node.
    fn parse_element(&mut self) -> Result<Option<Node>> {
        match self.peek().clone() {
            Token::Handle(h) => {
                self.advance();
                Ok(Some(Node::Handle(h)))
            }
            Token::Dot => {
                self.advance();
                if matches!(self.peek(), Token::LBracket) {
                    // `.[n:m]`, the dotted row-range form.
                    self.advance();
                    return self.parse_row_range();
                }
                let first = self.expect_ident()?;
                let mut parts = vec![first];
                if matches!(self.peek(), Token::Dot) {
                    self.advance();
                    parts.push(self.expect_ident()?);
                }
                // Single-part names from the function set are functions;
                // a column that shadows one is reached as `.tbl.col`.
                if parts.len() == 1 {
                    if let Some(func) = Func::from_name(&parts[0]) {
                        return Ok(Some(Node::Func(func)));
                    }
                }
                let selector = Node::Selector(parts);
                self.maybe_expr(selector).map(Some)
            }
            Token::LBracket => {
                self.advance();
                self.parse_row_range()
            }
            Token::Pipe | Token::Eof => Err(Error::Parse("empty segment".to_string())),
            other => Err(Error::Parse(format!("unexpected token {other:?}"))),
        }
    }

    /// After a selector, an optional comparison operator turns the element
    /// into an expression.
    fn maybe_expr(&mut self, lhs: Node) -> Result<Node> {
        let op = match self.peek() {
            Token::Eq => CmpOp::Eq,
            Token::Ne => CmpOp::Ne,
            Token::Lt => CmpOp::Lt,
            Token::Le => CmpOp::Le,
            Token::Gt => CmpOp::Gt,
            Token::Ge => CmpOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = match self.peek().clone() {
            Token::Int(n) => Literal::Int(n),
            Token::Float(f) => Literal::Float(f),
            Token::Str(s) => Literal::Text(s),
            other => {
                return Err(Error::Parse(format!(
                    "expected literal after {}, got {other:?}",
                    op.sql()
                )))
            }
        };
        self.advance();
        Ok(Node::Expr {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(Node::Literal(rhs)),
        })
    }

    /// Called with the opening `[` already consumed.
    fn parse_row_range(&mut self) -> Result<Option<Node>> {
        match self.peek().clone() {
            Token::RBracket => {
                self.advance();
                Ok(None)
            }
            Token::Int(n) => {
                self.advance();
                let offset = self.non_negative(n)?;
                match self.peek().clone() {
                    Token::RBracket => {
                        self.advance();
                        Ok(Some(Node::RowRange { offset, limit: 1 }))
                    }
                    Token::Colon => {
                        self.advance();
                        match self.peek().clone() {
                            Token::RBracket => {
                                self.advance();
                                Ok(Some(Node::RowRange {
                                    offset,
                                    limit: LIMIT_UNBOUNDED,
                                }))
                            }
                            Token::Int(m) => {
                                self.advance();
                                self.expect(Token::RBracket)?;
                                let m = self.non_negative(m)?;
                                let limit = m.saturating_sub(offset) as i64;
                                Ok(Some(Node::RowRange { offset, limit }))
                            }
                            other => Err(Error::Parse(format!(
                                "expected row-range limit, got {other:?}"
                            ))),
                        }
                    }
                    other => Err(Error::Parse(format!(
                        "expected : or ] in row range, got {other:?}"
                    ))),
                }
            }
            Token::Colon => {
                self.advance();
                match self.peek().clone() {
                    Token::Int(m) => {
                        self.advance();
                        self.expect(Token::RBracket)?;
                        let m = self.non_negative(m)?;
                        Ok(Some(Node::RowRange {
                            offset: 0,
                            limit: m as i64,
                        }))
                    }
                    other => Err(Error::Parse(format!(
                        "expected row-range limit, got {other:?}"
                    ))),
                }
            }
            other => Err(Error::Parse(format!(
                "expected row range, got {other:?}"
            ))),
        }
    }

    fn non_negative(&self, n: i64) -> Result<u64> {
        u64::try_from(n).map_err(|_| Error::Parse(format!("negative row index {n}")))
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(Error::Parse(format!("expected identifier, got {other:?}"))),
        }
    }

    fn expect(&mut self, want: Token) -> Result<()> {
        if *self.peek() == want {
            self.advance();
            Ok(())
        } else {
            Err(Error::Parse(format!(
                "expected {want:?}, got {:?}",
                self.peek()
            )))
        }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }
}
