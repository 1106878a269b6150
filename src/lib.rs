//! Query profiling, rewrite suggestions and index recommendations for
//! MySQL/MariaDB.
//!
//! The analytical core (extraction, estimation, rewriting, recommendation)
//! is synchronous and pure. Statistics and EXPLAIN plans come from
//! provider traits; MySQL-backed providers ship behind the `mysql` feature.
//!
//! ```
//! use turboindex::{recommend, extract, AnalysisConfig, StatsSnapshot};
//! use turboindex_parser::{parse, Dialect};
//!
//! let query = parse("SELECT * FROM orders WHERE customer_id = 123", Dialect::default()).unwrap();
//! let tables = recommend(&extract(&query), &StatsSnapshot::offline(), &AnalysisConfig::default(), query.dialect);
//! assert_eq!(tables[0].candidates[0].create_statement, "CREATE INDEX idx_orders_customer_id ON orders (customer_id);");
//! ```

pub mod analyzer;
pub mod config;
pub mod error;
pub mod estimate;
pub mod extract;
pub mod profile;
pub mod recommend;
pub mod rewrite;
pub mod stats;

pub use analyzer::{AnalysisReport, AnalysisRequest, Analyzer, Command, IndexReport, ProfileReport};
pub use config::{AnalysisConfig, RewriteMode};
pub use error::{AnalysisError, ExecutionError, Result, StatsError};
pub use estimate::{estimate, scan_cost, Confidence, CostEstimate, Estimate};
pub use extract::{extract, extract_with_columns, ExtractedQuery, JoinClause, OperatorClass, Predicate, PredicateKind};
pub use profile::{health_score, ExecutionProvider, ExplainRow, Profile, Profiler, StaticExecution, TableVerdict, Verdict};
pub use recommend::{create_index_statement, generate_index_name, recommend, IndexCandidate, KeyPart, KeyRole, TableRecommendation};
pub use rewrite::{rewrite, Finding, RewriteEngine, RewriteOutcome, RewriteSuggestion, Safety};
pub use stats::{ColumnStats, Histogram, IndexDef, StaticStatistics, StatisticsProvider, StatsSnapshot, TableStats};

#[cfg(feature = "mysql")]
pub use profile::mysql::MySqlExecution;
#[cfg(feature = "mysql")]
pub use stats::mysql::MySqlStatistics;

pub use turboindex_parser::{parse, parse_lenient, Dialect, ParseError, Query};
