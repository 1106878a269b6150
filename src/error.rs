//! Error types for the analysis layer.
//!
//! Parsing errors come from `turboindex_parser`; provider failures are split
//! into statistics errors (never fatal, they only lower confidence) and
//! execution errors (fatal for profiling only).

use thiserror::Error;
use turboindex_parser::{DialectError, ParseError, Position, UnsupportedConstruct};

/// Failure to obtain statistics for one table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    #[error("table `{0}` not found")]
    NotFound(String),
    #[error("statistics unavailable: {0}")]
    Unavailable(String),
    #[error("statistics request timed out after {0} ms")]
    Timeout(u64),
}

/// Failure reported by the EXPLAIN capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("execution error: {0}")]
    Execution(String),
}

/// Top-level error of every analysis entry point.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("syntax error at {position}: {message}")]
    Syntax { position: Position, message: String },
    #[error("{0}")]
    Unsupported(UnsupportedConstruct),
    #[error(transparent)]
    Dialect(#[from] DialectError),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("execution error: {0}")]
    Execution(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("analysis task failed: {0}")]
    Task(String),
}

impl AnalysisError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, AnalysisError::Unsupported(_))
    }
}

impl From<ParseError> for AnalysisError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Syntax { position, message } => AnalysisError::Syntax { position, message },
            ParseError::Unsupported(construct) => AnalysisError::Unsupported(construct),
        }
    }
}

impl From<ExecutionError> for AnalysisError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Connection(msg) => AnalysisError::Connection(msg),
            ExecutionError::Execution(msg) => AnalysisError::Execution(msg),
        }
    }
}

#[cfg(feature = "mysql")]
impl From<sqlx::Error> for StatsError {
    fn from(err: sqlx::Error) -> Self {
        StatsError::Unavailable(err.to_string())
    }
}

#[cfg(feature = "mysql")]
impl From<sqlx::Error> for ExecutionError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Protocol(_) => ExecutionError::Connection(err.to_string()),
            other => ExecutionError::Execution(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;
    use turboindex_parser::{parse, Dialect};

    #[test]
    fn test_parse_errors_map_to_analysis_errors() {
        let err: AnalysisError = parse("SELECT FROM", Dialect::default()).unwrap_err().into();
        assert!(matches!(err, AnalysisError::Syntax { .. }));

        let err: AnalysisError = parse("DELETE FROM t", Dialect::default()).unwrap_err().into();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_execution_error_kinds_survive_conversion() {
        let err: AnalysisError = ExecutionError::Connection("refused".into()).into();
        assert_eq!(err, AnalysisError::Connection("refused".into()));
        assert_eq!(err.to_string(), "connection error: refused");
    }
}
