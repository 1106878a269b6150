//! Analysis façade: one entry point per command, plus batch review.
//!
//! ```no_run
//! use turboindex::{AnalysisConfig, AnalysisRequest, Analyzer, Command};
//!
//! # async fn demo() -> turboindex::Result<()> {
//! let analyzer = Analyzer::new(AnalysisConfig::default())?;
//! let report = analyzer
//!     .run(AnalysisRequest::new(Command::RecommendIndexes, "SELECT * FROM orders WHERE customer_id = 1"))
//!     .await?;
//! println!("{}", serde_json::to_string_pretty(&report).unwrap());
//! # Ok(())
//! # }
//! ```

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use turboindex_parser::{parse_lenient, Dialect, ParsedQuery, Query, UnsupportedConstruct};

use crate::config::{AnalysisConfig, RewriteMode};
use crate::error::{AnalysisError, Result};
use crate::estimate::{scan_cost, Confidence, CostEstimate};
use crate::extract::{extract, extract_with_columns, ExtractedQuery};
use crate::profile::{ExecutionProvider, Profile, Profiler};
use crate::recommend::{recommend, TableRecommendation};
use crate::rewrite::{rewrite, RewriteOutcome};
use crate::stats::{Degradation, StatisticsProvider, StatsSnapshot};

// ============================================================================
// Requests and reports
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    Profile,
    Rewrite {
        #[serde(default)]
        mode: RewriteMode,
    },
    RecommendIndexes,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Profile => "profile",
            Command::Rewrite { .. } => "rewrite",
            Command::RecommendIndexes => "recommend-indexes",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(flatten)]
    pub command: Command,
    pub sql: String,
    /// Overrides the configured dialect tag.
    #[serde(default)]
    pub dialect: Option<String>,
}

impl AnalysisRequest {
    pub fn new(command: Command, sql: impl Into<String>) -> Self {
        Self {
            command,
            sql: sql.into(),
            dialect: None,
        }
    }

    pub fn with_dialect(mut self, tag: impl Into<String>) -> Self {
        self.dialect = Some(tag.into());
        self
    }
}

/// Index recommendations with the scan cost they were derived from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexReport {
    pub sql: String,
    pub dialect: Dialect,
    pub tables: Vec<TableRecommendation>,
    pub cost: CostEstimate,
    pub confidence: Confidence,
    pub degradations: Vec<Degradation>,
    pub skipped: Vec<UnsupportedConstruct>,
}

impl IndexReport {
    pub fn candidate_count(&self) -> usize {
        self.tables.iter().map(|t| t.candidates.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileReport {
    pub profile: Profile,
    pub indexes: IndexReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AnalysisReport {
    Profile(ProfileReport),
    Rewrite(RewriteOutcome),
    Indexes(IndexReport),
}

// ============================================================================
// Analyzer
// ============================================================================

/// Holds the configuration and the optional providers. Cheap to clone; each
/// analysis builds its own statistics snapshot.
#[derive(Clone)]
pub struct Analyzer {
    config: Arc<AnalysisConfig>,
    statistics: Option<Arc<dyn StatisticsProvider>>,
    execution: Option<Arc<dyn ExecutionProvider>>,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("config", &self.config)
            .field("statistics", &self.statistics.is_some())
            .field("execution", &self.execution.is_some())
            .finish()
    }
}

/// One parsed query with everything derived from it.
struct Prepared {
    query: Query,
    skipped: Vec<UnsupportedConstruct>,
    snapshot: StatsSnapshot,
    extracted: ExtractedQuery,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate().map_err(AnalysisError::Config)?;
        config.dialect()?;
        Ok(Self {
            config: Arc::new(config),
            statistics: None,
            execution: None,
        })
    }

    pub fn with_statistics(mut self, provider: Arc<dyn StatisticsProvider>) -> Self {
        self.statistics = Some(provider);
        self
    }

    pub fn with_execution(mut self, provider: Arc<dyn ExecutionProvider>) -> Self {
        self.execution = Some(provider);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    fn dialect(&self, tag: Option<&str>) -> Result<Dialect> {
        match tag {
            Some(tag) => Ok(Dialect::from_tag(tag)?),
            None => Ok(self.config.dialect()?),
        }
    }

    async fn prepare(&self, sql: &str, dialect: Dialect) -> Result<Prepared> {
        let ParsedQuery { query, skipped } = parse_lenient(sql, dialect)?;
        if !skipped.is_empty() {
            debug!(skipped = skipped.len(), "unsupported fragments kept opaque");
        }

        let snapshot = match &self.statistics {
            Some(provider) => {
                let tables = extract(&query).table_names();
                StatsSnapshot::collect(provider.as_ref(), &tables, self.config.stats_timeout()).await
            }
            None => StatsSnapshot::offline(),
        };
        let extracted = extract_with_columns(&query, &snapshot.column_lists());

        Ok(Prepared {
            query,
            skipped,
            snapshot,
            extracted,
        })
    }

    fn index_report(&self, prepared: &Prepared) -> IndexReport {
        let dialect = prepared.query.dialect;
        let tables = recommend(&prepared.extracted, &prepared.snapshot, &self.config, dialect);
        let cost = scan_cost(&prepared.extracted, &prepared.snapshot, &self.config);
        IndexReport {
            sql: prepared.query.to_sql(),
            dialect,
            tables,
            confidence: cost.confidence,
            cost,
            degradations: prepared.snapshot.degradations().to_vec(),
            skipped: prepared.skipped.clone(),
        }
    }

    /// Suggest rewrites. `mode` overrides the configured rewrite mode.
    pub async fn rewrite(&self, sql: &str, dialect: Option<&str>, mode: Option<RewriteMode>) -> Result<RewriteOutcome> {
        let dialect = self.dialect(dialect)?;
        let mode = mode.unwrap_or(self.config.rewrite_mode);
        let prepared = self.prepare(sql, dialect).await?;

        let mut outcome = rewrite(&prepared.query, mode, &prepared.snapshot, &self.config);
        outcome.skipped = prepared.skipped;
        info!(
            command = "rewrite",
            suggestions = outcome.suggestions.len(),
            findings = outcome.findings.len(),
            converged = outcome.converged,
            "analysis complete"
        );
        Ok(outcome)
    }

    pub async fn recommend_indexes(&self, sql: &str, dialect: Option<&str>) -> Result<IndexReport> {
        let dialect = self.dialect(dialect)?;
        let prepared = self.prepare(sql, dialect).await?;
        let report = self.index_report(&prepared);
        info!(
            command = "recommend-indexes",
            tables = report.tables.len(),
            candidates = report.candidate_count(),
            confidence = ?report.confidence,
            "analysis complete"
        );
        Ok(report)
    }

    /// Profile against the execution provider. Connection and execution
    /// errors are returned without retrying.
    pub async fn profile(&self, sql: &str, dialect: Option<&str>) -> Result<ProfileReport> {
        let Some(execution) = &self.execution else {
            return Err(AnalysisError::Config("profiling requires an execution provider".to_string()));
        };
        let dialect = self.dialect(dialect)?;
        let prepared = self.prepare(sql, dialect).await?;
        let indexes = self.index_report(&prepared);

        let profile = Profiler::new(execution.as_ref(), &self.config)
            .profile(&prepared.query, &prepared.extracted, &indexes.tables, &prepared.snapshot)
            .await?;
        info!(
            command = "profile",
            health = ?profile.health_score,
            verdicts = profile.verdicts.len(),
            confidence = ?profile.confidence,
            "analysis complete"
        );
        Ok(ProfileReport { profile, indexes })
    }

    /// Dispatch one request.
    pub async fn run(&self, request: AnalysisRequest) -> Result<AnalysisReport> {
        let dialect = request.dialect.as_deref();
        match request.command {
            Command::Profile => self.profile(&request.sql, dialect).await.map(AnalysisReport::Profile),
            Command::Rewrite { mode } => self
                .rewrite(&request.sql, dialect, Some(mode))
                .await
                .map(AnalysisReport::Rewrite),
            Command::RecommendIndexes => self
                .recommend_indexes(&request.sql, dialect)
                .await
                .map(AnalysisReport::Indexes),
        }
    }

    /// Run every request as its own task; results keep request order.
    pub async fn review_batch(&self, requests: Vec<AnalysisRequest>) -> Vec<Result<AnalysisReport>> {
        let tasks = requests.into_iter().map(|request| {
            let analyzer = self.clone();
            tokio::spawn(async move { analyzer.run(request).await })
        });

        join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap_or_else(|err| Err(AnalysisError::Task(err.to_string()))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{ColumnStats, StaticStatistics, TableStats};

    fn orders() -> Arc<dyn StatisticsProvider> {
        Arc::new(StaticStatistics::new(vec![TableStats::new("orders", 10_000)
            .with_column(ColumnStats::new("id").with_distinct(10_000))
            .with_column(ColumnStats::new("customer_id").with_distinct(1_000))]))
    }

    #[tokio::test]
    async fn test_recommend_indexes_offline() {
        let analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
        let report = analyzer
            .recommend_indexes("SELECT * FROM orders WHERE customer_id = 123", None)
            .await
            .unwrap();
        assert_eq!(report.tables.len(), 1);
        assert_eq!(report.tables[0].candidates[0].columns(), vec!["customer_id"]);
        assert_eq!(report.confidence, Confidence::Heuristic);
    }

    #[tokio::test]
    async fn test_run_dispatches_rewrite() {
        let analyzer = Analyzer::new(AnalysisConfig::default()).unwrap().with_statistics(orders());
        let report = analyzer
            .run(AnalysisRequest::new(
                Command::Rewrite { mode: RewriteMode::Safe },
                "SELECT id FROM orders WHERE customer_id = 1 OR customer_id = 2",
            ))
            .await
            .unwrap();
        let AnalysisReport::Rewrite(outcome) = report else {
            panic!("expected a rewrite report");
        };
        assert_eq!(outcome.rewritten, "SELECT id FROM orders WHERE customer_id IN (1, 2)");
    }

    #[tokio::test]
    async fn test_profile_without_provider_is_config_error() {
        let analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
        let err = analyzer.profile("SELECT 1 FROM t", None).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Config(_)));
    }

    #[tokio::test]
    async fn test_request_dialect_overrides_config() {
        let analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
        let err = analyzer
            .recommend_indexes("WITH c AS (SELECT id FROM t) SELECT id FROM c", Some("mysql_5.7"))
            .await
            .unwrap_err();
        assert!(err.is_unsupported());
        assert!(analyzer
            .recommend_indexes("WITH c AS (SELECT id FROM t) SELECT id FROM c", None)
            .await
            .is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Analyzer::new(AnalysisConfig::default().with_dialect("postgres")).unwrap_err();
        assert!(matches!(err, AnalysisError::Dialect(_)));
        let err = Analyzer::new(AnalysisConfig::default().with_top_k(0)).unwrap_err();
        assert!(matches!(err, AnalysisError::Config(_)));
    }

    #[test]
    fn test_request_deserializes() {
        let request: AnalysisRequest =
            serde_json::from_str(r#"{"command": "rewrite", "mode": "aggressive", "sql": "SELECT 1"}"#).unwrap();
        assert_eq!(request.command, Command::Rewrite { mode: RewriteMode::Aggressive });
        assert_eq!(request.dialect, None);
    }
}
