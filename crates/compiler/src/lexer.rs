//! Lexer for JAPL source
//!
//! Scans source bytes into a token stream terminated by an explicit `Eof`
//! token. Errors are reported to stderr as three-line tracebacks and set a
//! flag; scanning continues best-effort so one pass can surface several
//! errors. A raised flag suppresses compilation downstream.

use crate::token::{Token, TokenKind};

pub struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    file: &'src str,
    start: usize,
    current: usize,
    line: u32,
    /// Line the token under construction began on. Differs from `line`
    /// only inside multi-line string literals.
    start_line: u32,
    errored: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, file: &'src str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            file,
            start: 0,
            current: 0,
            line: 1,
            start_line: 1,
            errored: false,
        }
    }

    /// Scan the whole source. Returns the tokens and whether any error was
    /// reported along the way.
    pub fn tokenize(mut self) -> (Vec<Token>, bool) {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            self.start = self.current;
            self.start_line = self.line;
            if self.is_at_end() {
                tokens.push(Token::new(
                    TokenKind::Eof,
                    String::new(),
                    (self.current, self.current),
                    self.line,
                ));
                break;
            }
            if let Some(token) = self.scan_token() {
                tokens.push(token);
            }
        }
        (tokens, self.errored)
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.bytes.len()
    }

    fn advance(&mut self) -> u8 {
        let byte = self.bytes[self.current];
        self.current += 1;
        byte
    }

    fn peek(&self) -> u8 {
        if self.is_at_end() {
            0
        } else {
            self.bytes[self.current]
        }
    }

    fn peek_next(&self) -> u8 {
        if self.current + 1 >= self.bytes.len() {
            0
        } else {
            self.bytes[self.current + 1]
        }
    }

    /// Consume the next byte when it matches, for two-byte operators.
    fn matches(&mut self, expected: u8) -> bool {
        if self.peek() == expected {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' => {
                    self.current += 1;
                }
                b'\n' => {
                    self.line += 1;
                    self.current += 1;
                }
                b'/' => match self.peek_next() {
                    b'/' => {
                        while self.peek() != b'\n' && !self.is_at_end() {
                            self.current += 1;
                        }
                    }
                    b'*' => {
                        self.start = self.current;
                        self.current += 2;
                        self.block_comment();
                    }
                    _ => return,
                },
                _ => return,
            }
        }
    }

    /// Skip a `/* ... */` comment, honoring nesting.
    fn block_comment(&mut self) {
        let mut depth = 1usize;
        while depth > 0 {
            if self.is_at_end() {
                self.error("unexpected EOF in block comment");
                return;
            }
            match self.advance() {
                b'\n' => self.line += 1,
                b'/' if self.peek() == b'*' => {
                    self.current += 1;
                    depth += 1;
                }
                b'*' if self.peek() == b'/' => {
                    self.current += 1;
                    depth -= 1;
                }
                _ => {}
            }
        }
    }

    fn scan_token(&mut self) -> Option<Token> {
        let byte = self.advance();
        let kind = match byte {
            b'(' => TokenKind::LeftParen,
            b')' => TokenKind::RightParen,
            b'{' => TokenKind::LeftBrace,
            b'}' => TokenKind::RightBrace,
            b'[' => TokenKind::LeftBracket,
            b']' => TokenKind::RightBracket,
            b'.' => TokenKind::Dot,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b':' => TokenKind::Colon,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b'^' => TokenKind::Caret,
            b'*' => {
                if self.matches(b'*') {
                    TokenKind::StarStar
                } else {
                    TokenKind::Star
                }
            }
            b'=' => {
                if self.matches(b'=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                }
            }
            b'!' => {
                if self.matches(b'=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                }
            }
            b'>' => {
                if self.matches(b'=') {
                    TokenKind::GreaterEqual
                } else if self.matches(b'>') {
                    TokenKind::GreaterGreater
                } else {
                    TokenKind::Greater
                }
            }
            b'<' => {
                if self.matches(b'=') {
                    TokenKind::LessEqual
                } else if self.matches(b'<') {
                    TokenKind::LessLess
                } else {
                    TokenKind::Less
                }
            }
            b'"' | b'\'' => return self.string(byte),
            b'0'..=b'9' => return self.number(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => return Some(self.identifier()),
            _ => {
                self.error(&format!("unexpected character '{}'", byte as char));
                return None;
            }
        };
        Some(self.make_token(kind))
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(
            kind,
            self.source[self.start..self.current].to_string(),
            (self.start, self.current),
            self.start_line,
        )
    }

    fn string(&mut self, delimiter: u8) -> Option<Token> {
        while self.peek() != delimiter && !self.is_at_end() {
            if self.peek() == b'\n' {
                self.line += 1;
            }
            self.current += 1;
        }
        if self.is_at_end() {
            self.error("unterminated string");
            return None;
        }
        self.current += 1;
        let content = self.source[self.start + 1..self.current - 1].to_string();
        Some(self.make_token(TokenKind::Str(content)))
    }

    fn number(&mut self) -> Option<Token> {
        while self.peek().is_ascii_digit() {
            self.current += 1;
        }
        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.current += 1;
            while self.peek().is_ascii_digit() {
                self.current += 1;
            }
            let text = &self.source[self.start..self.current];
            match text.parse::<f64>() {
                Ok(value) => Some(self.make_token(TokenKind::Float(value))),
                Err(_) => {
                    self.error_named("OverflowError", "float literal is out of range");
                    None
                }
            }
        } else {
            let text = &self.source[self.start..self.current];
            match text.parse::<i64>() {
                Ok(value) => Some(self.make_token(TokenKind::Int(value))),
                Err(_) => {
                    self.error_named("OverflowError", "integer is too big");
                    None
                }
            }
        }
    }

    fn identifier(&mut self) -> Token {
        while matches!(self.peek(), b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_') {
            self.current += 1;
        }
        let text = &self.source[self.start..self.current];
        let kind = TokenKind::keyword(text).unwrap_or(TokenKind::Identifier);
        self.make_token(kind)
    }

    fn error(&mut self, message: &str) {
        self.error_named("SyntaxError", message);
    }

    /// Three-line traceback: header, context, error line. The offending
    /// text is bounded to its first line and decoded lossily, since the
    /// error may sit mid-byte in arbitrary input.
    fn error_named(&mut self, name: &str, message: &str) {
        self.errored = true;
        let end = self.current.min(self.bytes.len());
        let lexeme = String::from_utf8_lossy(&self.bytes[self.start..end]);
        let context = lexeme.lines().next().unwrap_or("");
        eprintln!("Traceback (most recent call last):");
        eprintln!("  File '{}', line {}, at '{}'", self.file, self.line, context);
        eprintln!("{}: {}", name, message);
    }
}
