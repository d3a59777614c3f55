// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Tokenizer for flat gate-level netlists.

use compact_str::CompactString;

use crate::logic::LogicValue;

use super::NetlistError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Plain or escaped identifier (escapes are stripped of the backslash).
    Ident(CompactString),
    /// A 1-bit sized literal such as `1'b0` or `1'bx`.
    Literal(LogicValue),
    /// Unsized decimal number, only seen in bus ranges and delays.
    Number(u64),
    /// One of `( ) , ; [ ] : . = #`.
    Punct(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

impl Token {
    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }

    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "'{}'", s),
            TokenKind::Literal(v) => write!(f, "1'b{}", v),
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::Punct(c) => write!(f, "'{}'", c),
        }
    }
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
}

#[inline]
fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

#[inline]
fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$'
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<u8> {
        self.src.get(self.pos + off).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek() {
            if c == b'\n' {
                break;
            }
            self.pos += 1;
        }
    }

    /// Skip whitespace, comments and compiler directives.
    fn skip_trivia(&mut self) -> Result<(), NetlistError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_ascii_whitespace() => {
                    self.bump();
                }
                (Some(b'/'), Some(b'/')) | (Some(b'`'), _) => self.skip_line(),
                (Some(b'/'), Some(b'*')) => {
                    let start = self.line;
                    self.pos += 2;
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.pos += 2;
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => {
                                return Err(NetlistError::Syntax {
                                    line: start,
                                    msg: "unterminated block comment".into(),
                                })
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn take_while(&mut self, f: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().map_or(false, &f) {
            self.pos += 1;
        }
        // only ASCII bytes are accepted by the callers' predicates
        std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("")
    }

    fn literal(&mut self) -> Result<TokenKind, NetlistError> {
        let line = self.line;
        let width = self.take_while(|c| c.is_ascii_digit());
        if self.peek() != Some(b'\'') {
            return width.parse().map(TokenKind::Number).map_err(|_| NetlistError::Syntax {
                line,
                msg: format!("number '{}' out of range", width),
            });
        }
        self.pos += 1;
        if !matches!(self.peek(), Some(b'b' | b'B')) {
            return Err(NetlistError::Unsupported {
                line,
                what: "non-binary literals".into(),
            });
        }
        self.pos += 1;
        let digits = self.take_while(|c| c.is_ascii_alphanumeric() || c == b'?');
        if width != "1" || digits.len() != 1 {
            return Err(NetlistError::Unsupported {
                line,
                what: format!("multi-bit literal {}'b{}", width, digits),
            });
        }
        match digits.chars().next().and_then(LogicValue::from_char) {
            Some(v) => Ok(TokenKind::Literal(v)),
            None => Err(NetlistError::Syntax {
                line,
                msg: format!("bad literal digit '{}'", digits),
            }),
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, NetlistError> {
        self.skip_trivia()?;
        let line = self.line;
        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(None),
        };
        let kind = match c {
            b'(' | b')' | b',' | b';' | b'[' | b']' | b':' | b'.' | b'=' | b'#' => {
                self.pos += 1;
                TokenKind::Punct(c as char)
            }
            b'\\' => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().map_or(false, |c| !c.is_ascii_whitespace()) {
                    self.pos += 1;
                }
                let name = String::from_utf8_lossy(&self.src[start..self.pos]);
                if name.is_empty() {
                    return Err(NetlistError::Syntax {
                        line,
                        msg: "empty escaped identifier".into(),
                    });
                }
                TokenKind::Ident(CompactString::from(name.as_ref()))
            }
            c if is_ident_start(c) => TokenKind::Ident(CompactString::from(self.take_while(is_ident_char))),
            c if c.is_ascii_digit() => self.literal()?,
            _ => {
                let ch = String::from_utf8_lossy(&self.src[self.pos..]).chars().next().unwrap_or('?');
                return Err(NetlistError::Syntax {
                    line,
                    msg: format!("unexpected character '{}'", ch),
                });
            }
        };
        Ok(Some(Token { kind, line }))
    }
}

/// Split `src` into tokens, dropping comments and `` ` `` directives.
pub fn tokenize(src: &str) -> Result<Vec<Token>, NetlistError> {
    let mut lexer = Lexer {
        src: src.as_bytes(),
        pos: 0,
        line: 1,
    };
    let mut tokens = Vec::new();
    while let Some(t) = lexer.next_token()? {
        tokens.push(t);
    }
    Ok(tokens)
}
