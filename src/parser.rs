//! Recursive-descent parser for the filter text grammar.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or_expr    := and_expr (',' and_expr)*         -- disjunction
//! and_expr   := primary (';' primary)*           -- conjunction, binds tighter
//! primary    := '(' or_expr ')' | comparison
//! comparison := path op argument
//! op         := == | != | < | <= | > | >= | =lt= | =le= | =gt= | =ge=
//!             | =in= | =out= | =isnull=
//! argument   := value | '(' value (',' value)* ')'
//! value      := 'string' | number | true | false | bare-word
//! ```
//!
//! `==` and `!=` against a string value interpret `*` wildcards:
//! `'Dune*'` is a prefix match, `'*Dune'` a postfix match and `'*une*'` an
//! infix match; a negated wildcard match parses to `Not(match)`.

use crate::ast::FilterNode;
use crate::error::{QueryError, Result};
use crate::lexer::Lexer;
use crate::operator::Operator;
use crate::token::{Token, TokenKind};
use crate::value::Value;

/// Lexes and parses a complete filter string.
pub fn parse_filter(input: &str) -> Result<FilterNode> {
    let tokens: Vec<_> = Lexer::new(input).collect();
    Parser::new(&tokens).parse()
}

pub struct Parser<'a> {
    tokens: &'a [Token<'a>],
    position: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token<'a>]) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Parses the token stream as a single filter expression and checks
    /// that nothing trails it.
    pub fn parse(&mut self) -> Result<FilterNode> {
        let node = self.parse_or_expression()?;
        if let Some(token) = self.peek() {
            return Err(self.error_at(format!("unexpected {:?}", token.kind), token.span.start));
        }
        Ok(node)
    }

    /// Returns the current token without advancing.
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.position)
    }

    /// Returns the current token and advances.
    fn advance(&mut self) -> Option<&Token<'a>> {
        let token = self.tokens.get(self.position)?;
        self.position += 1;
        Some(token)
    }

    fn match_token(&self, kind: &TokenKind) -> bool {
        self.peek()
            .is_some_and(|t| std::mem::discriminant(&t.kind) == std::mem::discriminant(kind))
    }

    fn eof_offset(&self) -> usize {
        self.tokens.last().map(|t| t.span.end).unwrap_or(0)
    }

    fn error_at(&self, message: String, offset: usize) -> QueryError {
        QueryError::Parse { message, offset }
    }

    /// Disjunction, lowest precedence: `and_expr (',' and_expr)*`.
    fn parse_or_expression(&mut self) -> Result<FilterNode> {
        let mut left = self.parse_and_expression()?;
        while self.match_token(&TokenKind::Comma) {
            self.advance();
            let right = self.parse_and_expression()?;
            left = FilterNode::or(left, right);
        }
        Ok(left)
    }

    /// Conjunction: `primary (';' primary)*`.
    fn parse_and_expression(&mut self) -> Result<FilterNode> {
        let mut left = self.parse_primary()?;
        while self.match_token(&TokenKind::Semicolon) {
            self.advance();
            let right = self.parse_primary()?;
            left = FilterNode::and(left, right);
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<FilterNode> {
        if self.match_token(&TokenKind::LParen) {
            self.advance();
            let node = self.parse_or_expression()?;
            if !self.match_token(&TokenKind::RParen) {
                let offset = self.peek().map(|t| t.span.start).unwrap_or(self.eof_offset());
                return Err(self.error_at("expected ')'".to_string(), offset));
            }
            self.advance();
            return Ok(node);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<FilterNode> {
        let Some(token) = self.advance() else {
            let offset = self.eof_offset();
            return Err(self.error_at("expected a field path".to_string(), offset));
        };
        let path = match token.kind {
            TokenKind::Ident(path) => path.to_string(),
            _ => {
                let offset = token.span.start;
                let msg = format!("expected a field path, found {:?}", token.kind);
                return Err(self.error_at(msg, offset));
            }
        };

        let Some(op_token) = self.advance() else {
            let offset = self.eof_offset();
            return Err(self.error_at("expected an operator".to_string(), offset));
        };
        let op_kind = op_token.kind.clone();
        let op_offset = op_token.span.start;

        match op_kind {
            TokenKind::Eq => self.parse_match_or_equality(path, false),
            TokenKind::Ne => self.parse_match_or_equality(path, true),
            TokenKind::Lt => self.parse_single_value(path, Operator::Lt),
            TokenKind::Le => self.parse_single_value(path, Operator::Le),
            TokenKind::Gt => self.parse_single_value(path, Operator::Gt),
            TokenKind::Ge => self.parse_single_value(path, Operator::Ge),
            TokenKind::In => self.parse_value_list(path, Operator::In),
            TokenKind::Out => self.parse_value_list(path, Operator::NotIn),
            TokenKind::IsNull => self.parse_null_check(path),
            other => Err(self.error_at(format!("expected an operator, found {:?}", other), op_offset)),
        }
    }

    /// `==`/`!=`: plain equality unless the value is a string with `*`
    /// wildcards, which selects the prefix/postfix/infix match operator.
    fn parse_match_or_equality(&mut self, path: String, negated: bool) -> Result<FilterNode> {
        let value = self.parse_value()?;
        let node = match &value {
            Value::String(s) if s.len() > 1 && s.starts_with('*') && s.ends_with('*') => {
                let middle = &s[1..s.len() - 1];
                FilterNode::comparison(path, Operator::Infix, vec![Value::from(middle)])
            }
            Value::String(s) if s.ends_with('*') && s.len() > 1 => {
                let head = &s[..s.len() - 1];
                FilterNode::comparison(path, Operator::Prefix, vec![Value::from(head)])
            }
            Value::String(s) if s.starts_with('*') && s.len() > 1 => {
                let tail = &s[1..];
                FilterNode::comparison(path, Operator::Postfix, vec![Value::from(tail)])
            }
            _ => {
                let operator = if negated { Operator::Ne } else { Operator::Eq };
                return Ok(FilterNode::comparison(path, operator, vec![value]));
            }
        };
        Ok(if negated { FilterNode::not(node) } else { node })
    }

    fn parse_single_value(&mut self, path: String, operator: Operator) -> Result<FilterNode> {
        let value = self.parse_value()?;
        Ok(FilterNode::comparison(path, operator, vec![value]))
    }

    /// `=in=(a,b,...)` / `=out=(a,b,...)`.
    fn parse_value_list(&mut self, path: String, operator: Operator) -> Result<FilterNode> {
        if !self.match_token(&TokenKind::LParen) {
            let offset = self.peek().map(|t| t.span.start).unwrap_or(self.eof_offset());
            return Err(self.error_at("expected '(' after set operator".to_string(), offset));
        }
        self.advance();
        let mut values = Vec::new();
        loop {
            values.push(self.parse_value()?);
            if self.match_token(&TokenKind::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        if !self.match_token(&TokenKind::RParen) {
            let offset = self.peek().map(|t| t.span.start).unwrap_or(self.eof_offset());
            return Err(self.error_at("expected ')'".to_string(), offset));
        }
        self.advance();
        Ok(FilterNode::comparison(path, operator, values))
    }

    /// `=isnull=true` selects the null check, `=isnull=false` its negation.
    fn parse_null_check(&mut self, path: String) -> Result<FilterNode> {
        let Some(token) = self.advance() else {
            let offset = self.eof_offset();
            return Err(self.error_at("expected true or false".to_string(), offset));
        };
        let operator = match token.kind {
            TokenKind::True => Operator::IsNull,
            TokenKind::False => Operator::NotNull,
            _ => {
                let offset = token.span.start;
                let msg = format!("expected true or false, found {:?}", token.kind);
                return Err(self.error_at(msg, offset));
            }
        };
        Ok(FilterNode::comparison(path, operator, vec![]))
    }

    fn parse_value(&mut self) -> Result<Value> {
        let Some(token) = self.advance() else {
            let offset = self.eof_offset();
            return Err(self.error_at("expected a value".to_string(), offset));
        };
        match token.kind {
            TokenKind::String(s) => Ok(Value::from(s)),
            TokenKind::Int(n) => Ok(Value::from(n)),
            TokenKind::Float(n) => Ok(Value::from(n)),
            TokenKind::True => Ok(Value::from(true)),
            TokenKind::False => Ok(Value::from(false)),
            // Bare words are string values, as in `genre==SciFi`.
            TokenKind::Ident(s) => Ok(Value::from(s)),
            ref other => {
                let offset = token.span.start;
                let msg = format!("expected a value, found {:?}", other);
                Err(self.error_at(msg, offset))
            }
        }
    }
}
