//! Analysis configuration.
//!
//! Flag/env/file precedence is resolved by the caller; the core receives one
//! immutable `AnalysisConfig`. Every field has a default so a partial
//! document deserializes.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use turboindex_parser::{Dialect, DialectError};

/// Which rewrite applications are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewriteMode {
    /// Only provably result-equivalent rewrites.
    #[default]
    Safe,
    /// Also rewrites that hold under stated assumptions.
    Aggressive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Dialect tag, e.g. `mysql_8.0` or `mariadb_10.6`.
    pub dialect: String,
    pub rewrite_mode: RewriteMode,
    /// Candidates kept per table.
    pub top_k: usize,
    /// Relative execution frequency of the analyzed query.
    pub query_frequency: f64,
    /// Maximum key parts in a recommended index.
    pub max_index_columns: usize,
    /// Score deducted per key part for write amplification.
    pub column_penalty: f64,
    /// Score added when the index also delivers ORDER BY / GROUP BY order.
    pub sort_bonus: f64,
    /// Score added when the index covers every referenced column.
    pub covering_bonus: f64,
    /// Lower clamp for the product of conjunct selectivities.
    pub selectivity_floor: f64,
    pub max_rewrite_iterations: usize,
    pub stats_timeout_ms: u64,
    pub explain_timeout_ms: u64,
    /// Recommend functional key parts for function-wrapped predicates
    /// (only honored on dialects that support them).
    pub functional_indexes: bool,
    /// Row count assumed for tables without statistics.
    pub default_row_count: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            dialect: "mysql_8.0".to_string(),
            rewrite_mode: RewriteMode::Safe,
            top_k: 3,
            query_frequency: 1.0,
            max_index_columns: 5,
            column_penalty: 0.02,
            sort_bonus: 0.05,
            covering_bonus: 0.03,
            selectivity_floor: 1e-6,
            max_rewrite_iterations: 32,
            stats_timeout_ms: 2_000,
            explain_timeout_ms: 5_000,
            functional_indexes: false,
            default_row_count: 1_000,
        }
    }
}

impl AnalysisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialect(mut self, tag: impl Into<String>) -> Self {
        self.dialect = tag.into();
        self
    }

    pub fn with_rewrite_mode(mut self, mode: RewriteMode) -> Self {
        self.rewrite_mode = mode;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_query_frequency(mut self, frequency: f64) -> Self {
        self.query_frequency = frequency;
        self
    }

    pub fn with_max_index_columns(mut self, max: usize) -> Self {
        self.max_index_columns = max;
        self
    }

    pub fn with_max_rewrite_iterations(mut self, max: usize) -> Self {
        self.max_rewrite_iterations = max;
        self
    }

    pub fn with_stats_timeout_ms(mut self, ms: u64) -> Self {
        self.stats_timeout_ms = ms;
        self
    }

    pub fn with_explain_timeout_ms(mut self, ms: u64) -> Self {
        self.explain_timeout_ms = ms;
        self
    }

    pub fn with_functional_indexes(mut self, enabled: bool) -> Self {
        self.functional_indexes = enabled;
        self
    }

    /// Resolve the configured dialect tag.
    pub fn dialect(&self) -> Result<Dialect, DialectError> {
        Dialect::from_tag(&self.dialect)
    }

    pub fn stats_timeout(&self) -> Duration {
        Duration::from_millis(self.stats_timeout_ms)
    }

    pub fn explain_timeout(&self) -> Duration {
        Duration::from_millis(self.explain_timeout_ms)
    }

    /// Reject values the estimator and recommender cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if self.top_k == 0 {
            return Err("top_k must be at least 1".to_string());
        }
        if self.max_index_columns == 0 {
            return Err("max_index_columns must be at least 1".to_string());
        }
        if !(self.query_frequency.is_finite() && self.query_frequency >= 0.0) {
            return Err(format!("query_frequency {} is not a non-negative number", self.query_frequency));
        }
        if !(self.selectivity_floor > 0.0 && self.selectivity_floor <= 1.0) {
            return Err(format!("selectivity_floor {} must be in (0, 1]", self.selectivity_floor));
        }
        if self.max_rewrite_iterations == 0 {
            return Err("max_rewrite_iterations must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"dialect": "mariadb_10.6", "rewrite_mode": "aggressive"}"#)
                .unwrap();
        assert_eq!(config.rewrite_mode, RewriteMode::Aggressive);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.max_rewrite_iterations, 32);
        assert_eq!(config.dialect().unwrap(), Dialect::mariadb(10, 6));
    }

    #[test]
    fn test_validate() {
        assert!(AnalysisConfig::default().validate().is_ok());
        assert!(AnalysisConfig::default().with_top_k(0).validate().is_err());
        let mut config = AnalysisConfig::default();
        config.selectivity_floor = 0.0;
        assert!(config.validate().is_err());
    }
}
