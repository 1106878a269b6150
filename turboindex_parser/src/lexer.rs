// SQL lexer
//
// Converts MySQL SQL text into tokens. Tracks byte offset, line and column
// for error reporting. Comments (`-- `, `#`, `/* */`) and whitespace are
// dropped.

use crate::error::{ParseError, Position, Result};
use crate::token::{Token, TokenKind};

/// SQL lexer that produces a stream of tokens from source text.
pub struct Lexer<'a> {
    /// The source bytes (UTF-8).
    src: &'a [u8],
    /// Current byte offset into src.
    pos: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number (1-based).
    col: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Tokenize the entire input. The last token is always `Eof`.
    pub fn tokenize(source: &str) -> Result<Vec<Token>> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                return Ok(tokens);
            }
        }
    }

    fn position(&self) -> Position {
        Position::new(self.pos, self.line, self.col)
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.pos + ahead).copied()
    }

    fn advance(&mut self) {
        if let Some(&b) = self.src.get(self.pos) {
            self.pos += 1;
            if b == b'\n' {
                self.line += 1;
                self.col = 1;
            } else if b & 0xC0 != 0x80 {
                // count characters, not UTF-8 continuation bytes
                self.col += 1;
            }
        }
    }

    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments()?;

        let position = self.position();
        let Some(ch) = self.peek_at(0) else {
            return Ok(Token {
                kind: TokenKind::Eof,
                position,
            });
        };

        let kind = match ch {
            b'\'' | b'"' => self.lex_string(ch, position)?,
            b'`' => self.lex_backtick_ident(position)?,
            b'0'..=b'9' => self.lex_number(),
            b'.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.lex_number(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'$' | 0x80..=0xFF => self.lex_word(),
            b'?' => self.single(TokenKind::Param),
            b'=' => self.single(TokenKind::Eq),
            b'+' => self.single(TokenKind::Plus),
            b'-' => match (self.peek_at(1), self.peek_at(2)) {
                (Some(b'>'), Some(b'>')) => self.multi(3, TokenKind::Operator("->>")),
                (Some(b'>'), _) => self.multi(2, TokenKind::Operator("->")),
                _ => self.single(TokenKind::Minus),
            },
            b'*' => self.single(TokenKind::Star),
            b'/' => self.single(TokenKind::Slash),
            b'%' => self.single(TokenKind::Percent),
            b'(' => self.single(TokenKind::LParen),
            b')' => self.single(TokenKind::RParen),
            b',' => self.single(TokenKind::Comma),
            b'.' => self.single(TokenKind::Dot),
            b';' => self.single(TokenKind::Semicolon),
            b'<' => match (self.peek_at(1), self.peek_at(2)) {
                (Some(b'='), Some(b'>')) => self.multi(3, TokenKind::NullSafeEq),
                (Some(b'='), _) => self.multi(2, TokenKind::LtEq),
                (Some(b'>'), _) => self.multi(2, TokenKind::NotEq),
                (Some(b'<'), _) => self.multi(2, TokenKind::Operator("<<")),
                _ => self.single(TokenKind::Lt),
            },
            b'>' => match self.peek_at(1) {
                Some(b'=') => self.multi(2, TokenKind::GtEq),
                Some(b'>') => self.multi(2, TokenKind::Operator(">>")),
                _ => self.single(TokenKind::Gt),
            },
            b'!' => match self.peek_at(1) {
                Some(b'=') => self.multi(2, TokenKind::NotEq),
                _ => self.single(TokenKind::Bang),
            },
            b'&' if self.peek_at(1) == Some(b'&') => self.multi(2, TokenKind::DoubleAmpersand),
            b'|' if self.peek_at(1) == Some(b'|') => self.multi(2, TokenKind::DoublePipe),
            b'&' => self.single(TokenKind::Operator("&")),
            b'|' => self.single(TokenKind::Operator("|")),
            b'^' => self.single(TokenKind::Operator("^")),
            b'~' => self.single(TokenKind::Operator("~")),
            b'@' => self.lex_variable(position)?,
            other => {
                return Err(ParseError::syntax(
                    position,
                    format!("unexpected character `{}`", char::from(other)),
                ))
            }
        };

        Ok(Token { kind, position })
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn multi(&mut self, len: usize, kind: TokenKind) -> TokenKind {
        self.advance_by(len);
        kind
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        loop {
            match self.peek_at(0) {
                Some(b) if b.is_ascii_whitespace() => self.advance(),
                // `-- ` needs trailing whitespace in MySQL; `--5` is minus minus five
                Some(b'-')
                    if self.peek_at(1) == Some(b'-')
                        && self.peek_at(2).map_or(true, |c| c.is_ascii_whitespace()) =>
                {
                    self.skip_line();
                }
                Some(b'#') => self.skip_line(),
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.position();
                    self.advance_by(2);
                    loop {
                        match self.peek_at(0) {
                            None => {
                                return Err(ParseError::syntax(start, "unterminated comment"));
                            }
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.advance_by(2);
                                break;
                            }
                            Some(_) => self.advance(),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(b) = self.peek_at(0) {
            if b == b'\n' {
                break;
            }
            self.advance();
        }
    }

    fn lex_string(&mut self, quote: u8, start: Position) -> Result<TokenKind> {
        self.advance();
        let mut value = Vec::new();
        loop {
            match self.peek_at(0) {
                None => return Err(ParseError::syntax(start, "unterminated string literal")),
                Some(b) if b == quote => {
                    if self.peek_at(1) == Some(quote) {
                        value.push(quote);
                        self.advance_by(2);
                    } else {
                        self.advance();
                        break;
                    }
                }
                Some(b'\\') => {
                    let Some(escaped) = self.peek_at(1) else {
                        return Err(ParseError::syntax(start, "unterminated string literal"));
                    };
                    match escaped {
                        b'0' => value.push(0),
                        b'b' => value.push(0x08),
                        b'n' => value.push(b'\n'),
                        b'r' => value.push(b'\r'),
                        b't' => value.push(b'\t'),
                        b'Z' => value.push(0x1A),
                        // kept verbatim so LIKE patterns retain their escapes
                        b'%' | b'_' => {
                            value.push(b'\\');
                            value.push(escaped);
                        }
                        other => value.push(other),
                    }
                    self.advance_by(2);
                }
                Some(b) => {
                    value.push(b);
                    self.advance();
                }
            }
        }
        Ok(TokenKind::String(String::from_utf8_lossy(&value).into_owned()))
    }

    fn lex_backtick_ident(&mut self, start: Position) -> Result<TokenKind> {
        self.advance();
        let mut value = Vec::new();
        loop {
            match self.peek_at(0) {
                None => return Err(ParseError::syntax(start, "unterminated quoted identifier")),
                Some(b'`') if self.peek_at(1) == Some(b'`') => {
                    value.push(b'`');
                    self.advance_by(2);
                }
                Some(b'`') => {
                    self.advance();
                    break;
                }
                Some(b) => {
                    value.push(b);
                    self.advance();
                }
            }
        }
        if value.is_empty() {
            return Err(ParseError::syntax(start, "empty quoted identifier"));
        }
        Ok(TokenKind::Word {
            value: String::from_utf8_lossy(&value).into_owned(),
            quoted: true,
        })
    }

    /// `@name`, `@'quoted'`, `@@name` and `@@scope.name`.
    fn lex_variable(&mut self, start: Position) -> Result<TokenKind> {
        let begin = self.pos;
        self.advance();
        let system = self.peek_at(0) == Some(b'@');
        if system {
            self.advance();
        }
        match self.peek_at(0) {
            Some(quote @ (b'\'' | b'"')) if !system => {
                self.lex_string(quote, start)?;
            }
            Some(b'`') => {
                self.lex_backtick_ident(start)?;
            }
            Some(c) if c.is_ascii_alphanumeric() || c == b'_' || c == b'$' => {
                while self.peek_at(0).is_some_and(|c| {
                    c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || (system && c == b'.')
                }) {
                    self.advance();
                }
            }
            _ => return Err(ParseError::syntax(start, "expected variable name after `@`")),
        }
        Ok(TokenKind::Variable(self.slice(begin)))
    }

    fn lex_number(&mut self) -> TokenKind {
        let start = self.pos;

        if self.peek_at(0) == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.advance_by(2);
            while self.peek_at(0).is_some_and(|c| c.is_ascii_hexdigit()) {
                self.advance();
            }
            return TokenKind::Number(self.slice(start));
        }
        if self.peek_at(0) == Some(b'0')
            && self.peek_at(1) == Some(b'b')
            && matches!(self.peek_at(2), Some(b'0') | Some(b'1'))
        {
            self.advance_by(2);
            while matches!(self.peek_at(0), Some(b'0') | Some(b'1')) {
                self.advance();
            }
            return TokenKind::Number(self.slice(start));
        }

        while self.peek_at(0).is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek_at(0) == Some(b'.') {
            self.advance();
            while self.peek_at(0).is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek_at(0), Some(b'e') | Some(b'E')) {
            let sign = matches!(self.peek_at(1), Some(b'+') | Some(b'-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                self.advance_by(digit_at);
                while self.peek_at(0).is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }
        TokenKind::Number(self.slice(start))
    }

    fn lex_word(&mut self) -> TokenKind {
        let start = self.pos;
        while self
            .peek_at(0)
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c >= 0x80)
        {
            self.advance();
        }
        TokenKind::Word {
            value: self.slice(start),
            quoted: false,
        }
    }

    fn slice(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }
}
