/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * This file is part of the U Language Compiler.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 *
 * 1. OPEN SOURCE: You may use this file under the terms of the GNU Affero
 * General Public License v3.0. If you link to this code, your ENTIRE
 * application must be open-sourced under AGPLv3.
 *
 * 2. COMMERCIAL: For proprietary use, you must obtain a Commercial License
 * from Sovereign Systems.
 *
 * PATENT NOTICE: Protected by US Patent App #63/935,467.
 * NO IMPLIED LICENSE to rights of Mohamad Al-Zawahreh or Sovereign Systems.
 */

//! Tokenizer for U source text.
//!
//! The whole input is tokenized up front into a `Vec<Token>`; the parser
//! walks that vector with a cursor, which makes one-token rewinds and
//! speculative lookahead trivial.

use thiserror::Error;

// ─── Error Types ─────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone)]
pub enum LexError {
    #[error("{line}:{col}: unknown token starting with '{ch}'")]
    UnknownChar { ch: char, line: u32, col: u32 },
    #[error("{line}:{col}: unsupported character in number: '{ch}'")]
    BadNumber { ch: char, line: u32, col: u32 },
    #[error("{line}:{col}: reached end of file before string literal end")]
    UnterminatedString { line: u32, col: u32 },
}

// ─── Token Types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Ident(String),
    Int { value: i64, bits: u32, unsigned: bool },
    Bool(bool),
    Str(Vec<u8>),

    // Punctuation
    Colon,
    Semicolon,
    Assign,  // =
    Equal,   // ==
    Comma,
    Arrow,   // ->
    Declare, // :=
    Minus,
    Plus,
    Star,
    Percent,
    Slash,
    Bang,
    Dot,
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    OpenParen,
    CloseParen,

    // Keywords
    KwFn,
    KwIf,
    KwElse,
    KwExport,
    KwExtern,
    KwReturn,
    KwAnd,
    KwOr,
    KwU8,
    KwI32,
    KwU32,
    KwBool,

    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub col: u32,
}

impl Token {
    fn new(kind: TokenKind, line: u32, col: u32) -> Self {
        Token { kind, line, col }
    }
}

// ─── Lexer ───────────────────────────────────────────────────────────────────

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            if self.pos >= self.source.len() {
                tokens.push(Token::new(TokenKind::Eof, self.line, self.col));
                break;
            }
            let tok = self.next_token()?;
            tokens.push(tok);
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.peek().is_some_and(|c| c.is_whitespace()) {
                self.advance();
            }
            if self.peek() == Some('/') && self.source.get(self.pos + 1) == Some(&'/') {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.advance();
                }
                continue;
            }
            break;
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let line = self.line;
        let col = self.col;
        let ch = self.peek().unwrap_or('\0');

        if ch == '_' || ch.is_alphabetic() {
            return Ok(self.lex_word(line, col));
        }
        if ch.is_ascii_digit() {
            return self.lex_number(line, col);
        }
        if ch == '"' {
            return self.lex_string(line, col);
        }

        self.advance();
        let kind = match ch {
            ':' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Declare
                } else {
                    TokenKind::Colon
                }
            }
            ';' => TokenKind::Semicolon,
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Equal
                } else {
                    TokenKind::Assign
                }
            }
            ',' => TokenKind::Comma,
            '{' => TokenKind::OpenBrace,
            '}' => TokenKind::CloseBrace,
            '[' => TokenKind::OpenBracket,
            ']' => TokenKind::CloseBracket,
            '(' => TokenKind::OpenParen,
            ')' => TokenKind::CloseParen,
            '-' => {
                if self.peek() == Some('>') {
                    self.advance();
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            '+' => TokenKind::Plus,
            '*' => TokenKind::Star,
            '%' => TokenKind::Percent,
            '/' => TokenKind::Slash,
            '!' => TokenKind::Bang,
            '.' => TokenKind::Dot,
            _ => return Err(LexError::UnknownChar { ch, line, col }),
        };
        Ok(Token::new(kind, line, col))
    }

    fn lex_word(&mut self, line: u32, col: u32) -> Token {
        let mut word = String::new();
        while self.peek().is_some_and(|c| c == '_' || c.is_alphanumeric()) {
            word.push(self.advance().unwrap_or('\0'));
        }

        let kind = match word.as_str() {
            "fn" => TokenKind::KwFn,
            "if" => TokenKind::KwIf,
            "else" => TokenKind::KwElse,
            "export" => TokenKind::KwExport,
            "extern" => TokenKind::KwExtern,
            "return" => TokenKind::KwReturn,
            "and" => TokenKind::KwAnd,
            "or" => TokenKind::KwOr,
            "u8" => TokenKind::KwU8,
            "i32" => TokenKind::KwI32,
            "u32" => TokenKind::KwU32,
            "bool" => TokenKind::KwBool,
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            _ => TokenKind::Ident(word),
        };
        Token::new(kind, line, col)
    }

    /// Integer literals carry an optional width suffix: `250u8`, `7i32`.
    /// Without one the literal defaults to `i32`.
    fn lex_number(&mut self, line: u32, col: u32) -> Result<Token, LexError> {
        let mut text = String::new();
        while self.peek().is_some_and(|c| c.is_alphanumeric()) {
            text.push(self.advance().unwrap_or('\0'));
        }

        let mut value: i64 = 0;
        let mut bits: u32 = 32;
        let mut unsigned = false;
        let mut parsing_bits = false;

        for c in text.chars() {
            if let Some(d) = c.to_digit(10) {
                if parsing_bits {
                    bits = bits.wrapping_mul(10).wrapping_add(d);
                } else {
                    value = value.wrapping_mul(10).wrapping_add(d as i64);
                }
            } else if !parsing_bits && (c == 'u' || c == 'i') {
                bits = 0;
                unsigned = c == 'u';
                parsing_bits = true;
            } else {
                return Err(LexError::BadNumber { ch: c, line, col });
            }
        }

        Ok(Token::new(
            TokenKind::Int {
                value,
                bits,
                unsigned,
            },
            line,
            col,
        ))
    }

    fn lex_string(&mut self, line: u32, col: u32) -> Result<Token, LexError> {
        self.advance(); // opening quote
        let mut bytes = Vec::new();
        loop {
            let Some(c) = self.advance() else {
                return Err(LexError::UnterminatedString { line, col });
            };
            match c {
                '"' => break,
                '\\' => {
                    let Some(esc) = self.advance() else {
                        return Err(LexError::UnterminatedString { line, col });
                    };
                    match esc {
                        'n' => bytes.push(b'\n'),
                        other => {
                            let mut buf = [0u8; 4];
                            bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                        }
                    }
                }
                other => {
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
        Ok(Token::new(TokenKind::Str(bytes), line, col))
    }
}
