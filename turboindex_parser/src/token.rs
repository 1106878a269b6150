// Token types produced by the lexer.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::error::Position;

/// Words that may not be used as bare identifiers or aliases.
///
/// The serializer backtick-quotes any identifier found here.
pub static RESERVED_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "ALL", "AND", "AS", "ASC", "BETWEEN", "BINARY", "BY", "CASE", "COLLATE", "CROSS", "DESC",
        "DISTINCT", "DIV", "ELSE", "END", "EXISTS", "FALSE", "FOR", "FORCE", "FROM", "GROUP",
        "HAVING", "IGNORE", "IN", "INDEX", "INNER", "INTERVAL", "INTO", "IS", "JOIN", "KEY", "LEFT",
        "LIKE", "LIMIT", "LOCK", "MATCH", "MOD", "NATURAL", "NOT", "NULL", "ON", "OR", "ORDER", "OUTER", "OVER", "PARTITION", "RANGE",
        "REGEXP", "RIGHT", "RLIKE", "ROWS", "SELECT", "STRAIGHT_JOIN", "THEN", "TRUE", "UNION",
        "USE", "USING", "WHEN", "WHERE", "WINDOW", "WITH", "XOR",
    ]
    .into_iter()
    .collect()
});

/// Returns true when `word` is reserved (case-insensitive).
pub fn is_reserved(word: &str) -> bool {
    RESERVED_WORDS.contains(word.to_ascii_uppercase().as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword. `quoted` is set for backtick identifiers,
    /// which are never treated as keywords.
    Word { value: String, quoted: bool },
    Number(String),
    /// Single- or double-quoted string, already unescaped.
    String(String),
    /// `?` placeholder
    Param,
    Eq,
    NullSafeEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Comma,
    Dot,
    Semicolon,
    /// `&&`
    DoubleAmpersand,
    /// `||`
    DoublePipe,
    /// `!`
    Bang,
    /// `@name` or `@@scope.name`, verbatim.
    Variable(String),
    /// Operator that is lexed but not modelled: `&`, `|`, `^`, `~`, `<<`,
    /// `>>`, `->` and `->>`.
    Operator(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

impl Token {
    /// True for an unquoted word equal to `keyword` (case-insensitive).
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Word { value, quoted: false } if value.eq_ignore_ascii_case(keyword))
    }

    /// Short human-readable description used in error messages.
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Word { value, .. } => format!("`{}`", value),
            TokenKind::Number(n) => format!("number {}", n),
            TokenKind::String(_) => "string literal".to_string(),
            TokenKind::Variable(name) => format!("variable {}", name),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("`{}`", punctuation(other)),
        }
    }
}

/// Fixed spelling of a punctuation token.
pub(crate) fn punctuation(kind: &TokenKind) -> &'static str {
    match kind {
        TokenKind::Param => "?",
        TokenKind::Eq => "=",
        TokenKind::NullSafeEq => "<=>",
        TokenKind::NotEq => "<>",
        TokenKind::Lt => "<",
        TokenKind::LtEq => "<=",
        TokenKind::Gt => ">",
        TokenKind::GtEq => ">=",
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Star => "*",
        TokenKind::Slash => "/",
        TokenKind::Percent => "%",
        TokenKind::LParen => "(",
        TokenKind::RParen => ")",
        TokenKind::Comma => ",",
        TokenKind::Dot => ".",
        TokenKind::Semicolon => ";",
        TokenKind::DoubleAmpersand => "&&",
        TokenKind::DoublePipe => "||",
        TokenKind::Bang => "!",
        TokenKind::Operator(op) => op,
        TokenKind::Word { .. }
        | TokenKind::Number(_)
        | TokenKind::String(_)
        | TokenKind::Variable(_)
        | TokenKind::Eof => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_lookup_is_case_insensitive() {
        assert!(is_reserved("select"));
        assert!(is_reserved("Order"));
        assert!(!is_reserved("status"));
        assert!(!is_reserved("date"));
    }
}
