// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Line/column-tracking scanner for assembly source.

use crate::core::parser::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    /// Dot-directive with the leading dot stripped, lowercased.
    Directive(String),
    Number(i64),
    Str(String),
    Newline,
    Comma,
    Colon,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Shl,
    Shr,
    UShr,
    Amp,
    AmpAmp,
    Pipe,
    PipePipe,
    Caret,
    Hash,
    Tilde,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub column: usize,
}

struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: usize,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.line, self.column)
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Parse a number literal body (`0x`/`0b` prefixes, `_` separators).
pub fn parse_number(text: &str) -> Option<i64> {
    let text: String = text.chars().filter(|&c| c != '_').collect();
    let text = text.as_str();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()
    } else {
        text.parse::<i64>().ok()
    }
}

/// Tokenize a whole source text. Newlines are significant and kept as
/// tokens; a trailing `Newline` is guaranteed.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut scanner = Scanner::new(source);
    let mut tokens = Vec::new();

    loop {
        let (line, column) = (scanner.line, scanner.column);
        let ch = match scanner.peek() {
            Some(ch) => ch,
            None => break,
        };

        let kind = match ch {
            ' ' | '\t' | '\r' => {
                scanner.bump();
                continue;
            }
            ';' => {
                while let Some(ch) = scanner.peek() {
                    if ch == '\n' {
                        break;
                    }
                    scanner.bump();
                }
                continue;
            }
            '\n' => {
                scanner.bump();
                TokenKind::Newline
            }
            ',' => {
                scanner.bump();
                TokenKind::Comma
            }
            ':' => {
                scanner.bump();
                TokenKind::Colon
            }
            '[' => {
                scanner.bump();
                TokenKind::LBracket
            }
            ']' => {
                scanner.bump();
                TokenKind::RBracket
            }
            '(' => {
                scanner.bump();
                TokenKind::LParen
            }
            ')' => {
                scanner.bump();
                TokenKind::RParen
            }
            '+' => {
                scanner.bump();
                TokenKind::Plus
            }
            '-' => {
                scanner.bump();
                TokenKind::Minus
            }
            '*' => {
                scanner.bump();
                TokenKind::Star
            }
            '/' => {
                scanner.bump();
                TokenKind::Slash
            }
            '%' => {
                scanner.bump();
                TokenKind::Percent
            }
            '^' => {
                scanner.bump();
                TokenKind::Caret
            }
            '#' => {
                scanner.bump();
                TokenKind::Hash
            }
            '~' => {
                scanner.bump();
                TokenKind::Tilde
            }
            '&' => {
                scanner.bump();
                if scanner.eat('&') {
                    TokenKind::AmpAmp
                } else {
                    TokenKind::Amp
                }
            }
            '|' => {
                scanner.bump();
                if scanner.eat('|') {
                    TokenKind::PipePipe
                } else {
                    TokenKind::Pipe
                }
            }
            '<' => {
                scanner.bump();
                if !scanner.eat('<') {
                    return Err(scanner.error("Expected << operator"));
                }
                TokenKind::Shl
            }
            '>' => {
                scanner.bump();
                if !scanner.eat('>') {
                    return Err(scanner.error("Expected >> operator"));
                }
                if scanner.eat('>') {
                    TokenKind::UShr
                } else {
                    TokenKind::Shr
                }
            }
            '"' => {
                scanner.bump();
                let mut text = String::new();
                loop {
                    match scanner.bump() {
                        Some('"') => break,
                        Some('\\') => text.push(scan_escape(&mut scanner)?),
                        Some('\n') | None => {
                            return Err(ParseError::new(
                                "Unterminated string literal",
                                line,
                                column,
                            ))
                        }
                        Some(other) => text.push(other),
                    }
                }
                TokenKind::Str(text)
            }
            '\'' => {
                scanner.bump();
                let value = match scanner.bump() {
                    Some('\\') => scan_escape(&mut scanner)?,
                    Some('\'') | Some('\n') | None => {
                        return Err(ParseError::new("Empty character literal", line, column))
                    }
                    Some(other) => other,
                };
                if !scanner.eat('\'') {
                    return Err(ParseError::new(
                        "Unterminated character literal",
                        line,
                        column,
                    ));
                }
                TokenKind::Number(value as i64)
            }
            '.' => {
                scanner.bump();
                let mut name = String::new();
                while let Some(ch) = scanner.peek() {
                    if is_ident_continue(ch) {
                        name.push(ch);
                        scanner.bump();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    return Err(ParseError::new("Expected directive name", line, column));
                }
                TokenKind::Directive(name.to_ascii_lowercase())
            }
            ch if ch.is_ascii_digit() => {
                let mut text = String::new();
                while let Some(ch) = scanner.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        text.push(ch);
                        scanner.bump();
                    } else {
                        break;
                    }
                }
                match parse_number(&text) {
                    Some(value) => TokenKind::Number(value),
                    None => {
                        return Err(ParseError::new(
                            format!("Invalid number: {text}"),
                            line,
                            column,
                        ))
                    }
                }
            }
            ch if is_ident_start(ch) => {
                let mut name = String::new();
                while let Some(ch) = scanner.peek() {
                    if is_ident_continue(ch) {
                        name.push(ch);
                        scanner.bump();
                    } else {
                        break;
                    }
                }
                TokenKind::Identifier(name)
            }
            other => {
                return Err(ParseError::new(
                    format!("Unexpected character: {other:?}"),
                    line,
                    column,
                ))
            }
        };

        tokens.push(Token { kind, line, column });
    }

    if !matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Newline)) {
        tokens.push(Token {
            kind: TokenKind::Newline,
            line: scanner.line,
            column: scanner.column,
        });
    }
    Ok(tokens)
}

fn scan_escape(scanner: &mut Scanner<'_>) -> Result<char, ParseError> {
    match scanner.bump() {
        Some('n') => Ok('\n'),
        Some('t') => Ok('\t'),
        Some('r') => Ok('\r'),
        Some('0') => Ok('\0'),
        Some('\\') => Ok('\\'),
        Some('"') => Ok('"'),
        Some('\'') => Ok('\''),
        Some(other) => Err(scanner.error(format!("Unknown escape: \\{other}"))),
        None => Err(scanner.error("Unterminated escape")),
    }
}
