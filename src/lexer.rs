//! Lexer for the filter text grammar.
//!
//! The grammar is RSQL/FiQL-shaped: `;` joins conjuncts, `,` joins
//! disjuncts, comparisons are `path==value`, `path=in=(a,b)` and friends.
//! The lexer is a plain iterator over the input; it never fails, emitting
//! `Illegal` tokens for anything it cannot classify and leaving error
//! reporting to the parser.

use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    /// Current position in the input (byte index).
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0 }
    }

    /// Returns the character at the current position without advancing.
    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// Advances one character and returns it.
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn token(&self, kind: TokenKind<'a>, start: usize) -> Token<'a> {
        Token {
            kind,
            span: Span::new(start, self.position),
        }
    }

    /// Reads a number literal: digits with an optional fraction part. The
    /// leading minus sign, if any, has already been consumed.
    fn read_number(&mut self, start: usize) -> Token<'a> {
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
            } else if c == '.' && !is_float {
                // Only a fraction if a digit follows; `5.title` is not a number.
                let rest = &self.input[self.position + 1..];
                if rest.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                    is_float = true;
                    self.bump();
                } else {
                    break;
                }
            } else {
                break;
            }
        }
        let text = &self.input[start..self.position];
        if is_float {
            match text.parse::<f64>() {
                Ok(value) => self.token(TokenKind::Float(value), start),
                Err(_) => self.token(TokenKind::Illegal, start),
            }
        } else {
            match text.parse::<i64>() {
                Ok(value) => self.token(TokenKind::Int(value), start),
                Err(_) => self.token(TokenKind::Illegal, start),
            }
        }
    }

    /// Reads a quoted string literal; the opening quote has been consumed.
    /// The token carries the content without quotes.
    fn read_string(&mut self, quote: char, start: usize) -> Token<'a> {
        let content_start = self.position;
        while let Some(c) = self.peek() {
            if c == quote {
                break;
            }
            self.bump();
        }
        if self.peek().is_none() {
            // Unterminated string.
            return self.token(TokenKind::Illegal, start);
        }
        let content = &self.input[content_start..self.position];
        self.bump(); // closing quote
        self.token(TokenKind::String(content), start)
    }

    /// Reads a dotted identifier path or a bare value. Identifiers may
    /// contain letters, digits, underscores and dots.
    fn read_identifier(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                self.bump();
            } else {
                break;
            }
        }
        let literal = &self.input[start..self.position];
        let kind = match literal {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Ident(literal),
        };
        self.token(kind, start)
    }

    /// Reads the word operators of the form `=word=` (`=in=`, `=isnull=`,
    /// ...). The leading `=` has been consumed.
    fn read_word_operator(&mut self, start: usize) -> Token<'a> {
        let word_start = self.position;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphabetic() {
                self.bump();
            } else {
                break;
            }
        }
        let word = &self.input[word_start..self.position];
        if self.peek() != Some('=') {
            return self.token(TokenKind::Illegal, start);
        }
        self.bump(); // closing '='
        let kind = match word {
            "in" => TokenKind::In,
            "out" => TokenKind::Out,
            "isnull" => TokenKind::IsNull,
            "lt" => TokenKind::Lt,
            "le" => TokenKind::Le,
            "gt" => TokenKind::Gt,
            "ge" => TokenKind::Ge,
            _ => TokenKind::Illegal,
        };
        self.token(kind, start)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let start = self.position;

        let c = self.bump()?;

        let token = match c {
            '(' => self.token(TokenKind::LParen, start),
            ')' => self.token(TokenKind::RParen, start),
            ',' => self.token(TokenKind::Comma, start),
            ';' => self.token(TokenKind::Semicolon, start),
            '=' => match self.peek() {
                Some('=') => {
                    self.bump();
                    self.token(TokenKind::Eq, start)
                }
                Some(c) if c.is_ascii_alphabetic() => self.read_word_operator(start),
                _ => self.token(TokenKind::Illegal, start),
            },
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::Ne, start)
                } else {
                    self.token(TokenKind::Illegal, start)
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::Le, start)
                } else {
                    self.token(TokenKind::Lt, start)
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::Ge, start)
                } else {
                    self.token(TokenKind::Gt, start)
                }
            }
            '\'' | '"' => self.read_string(c, start),
            '-' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.read_number(start),
            c if c.is_ascii_digit() => self.read_number(start),
            c if c.is_alphabetic() || c == '_' => self.read_identifier(start),
            _ => self.token(TokenKind::Illegal, start),
        };
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        Lexer::new(input).map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_comparison() {
        assert_eq!(
            kinds("title=='Dune'"),
            vec![
                TokenKind::Ident("title"),
                TokenKind::Eq,
                TokenKind::String("Dune"),
            ]
        );
    }

    #[test]
    fn test_all_operators_and_punctuation() {
        assert_eq!(
            kinds("== != < <= > >= =in= =out= =isnull= =lt= =le= =gt= =ge= ( ) , ;"),
            vec![
                TokenKind::Eq,
                TokenKind::Ne,
                TokenKind::Lt,
                TokenKind::Le,
                TokenKind::Gt,
                TokenKind::Ge,
                TokenKind::In,
                TokenKind::Out,
                TokenKind::IsNull,
                TokenKind::Lt,
                TokenKind::Le,
                TokenKind::Gt,
                TokenKind::Ge,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Comma,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_dotted_paths_and_keywords() {
        assert_eq!(
            kinds("publisher.editor.name true false scifi_genre"),
            vec![
                TokenKind::Ident("publisher.editor.name"),
                TokenKind::True,
                TokenKind::False,
                TokenKind::Ident("scifi_genre"),
            ]
        );
    }

    #[test]
    fn test_numbers_and_strings() {
        assert_eq!(
            kinds(r#"12345 -7 3.5 'hello world' "double""#),
            vec![
                TokenKind::Int(12345),
                TokenKind::Int(-7),
                TokenKind::Float(3.5),
                TokenKind::String("hello world"),
                TokenKind::String("double"),
            ]
        );
    }

    #[test]
    fn test_complex_filter() {
        assert_eq!(
            kinds(r#"title=='Dune';(genre=='SciFi',genre=='Fantasy')"#),
            vec![
                TokenKind::Ident("title"),
                TokenKind::Eq,
                TokenKind::String("Dune"),
                TokenKind::Semicolon,
                TokenKind::LParen,
                TokenKind::Ident("genre"),
                TokenKind::Eq,
                TokenKind::String("SciFi"),
                TokenKind::Comma,
                TokenKind::Ident("genre"),
                TokenKind::Eq,
                TokenKind::String("Fantasy"),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn test_illegal_input() {
        assert_eq!(kinds("=what"), vec![TokenKind::Illegal]);
        assert_eq!(kinds("!x"), vec![TokenKind::Illegal, TokenKind::Ident("x")]);
        assert_eq!(kinds("'unterminated"), vec![TokenKind::Illegal]);
        assert_eq!(kinds("=nope="), vec![TokenKind::Illegal]);
    }
}
