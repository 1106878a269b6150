// Parse errors
//
// Every failure carries the byte offset plus the 1-based line and column of
// the offending token so callers can point at it.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Location of a token in the original SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Position {
    /// Byte offset into the source.
    pub offset: usize,
    /// Line number (1-based).
    pub line: u32,
    /// Column number (1-based).
    pub column: u32,
}

impl Position {
    pub fn new(offset: usize, line: u32, column: u32) -> Self {
        Self { offset, line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A fragment the parser recognised but does not model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsupportedConstruct {
    /// Canonical text of the skipped fragment.
    pub fragment: String,
    /// Why the fragment is not modelled (e.g. "subquery").
    pub reason: String,
    pub position: Position,
}

impl fmt::Display for UnsupportedConstruct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.reason, self.position, self.fragment)
    }
}

/// Errors produced while turning SQL text into a [`crate::Query`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("syntax error at {position}: {message}")]
    Syntax { position: Position, message: String },

    #[error("unsupported construct ({0})")]
    Unsupported(UnsupportedConstruct),
}

impl ParseError {
    pub(crate) fn syntax(position: Position, message: impl Into<String>) -> Self {
        ParseError::Syntax {
            position,
            message: message.into(),
        }
    }

    /// Position of the offending token.
    pub fn position(&self) -> Position {
        match self {
            ParseError::Syntax { position, .. } => *position,
            ParseError::Unsupported(construct) => construct.position,
        }
    }
}

/// Raised when a dialect tag or server version string cannot be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialectError {
    #[error("unrecognized dialect tag `{0}` (expected e.g. mysql_8.0 or mariadb_10.6)")]
    UnknownTag(String),

    #[error("invalid version `{0}`")]
    InvalidVersion(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;
