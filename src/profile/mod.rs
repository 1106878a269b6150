//! Execution profiling.
//!
//! Asks the execution capability for the EXPLAIN plan of a parsed SELECT
//! and reconciles each plan row with the index recommendations for its
//! table.

#[cfg(feature = "mysql")]
pub mod mysql;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};
use turboindex_parser::{Dialect, Query};

use crate::config::AnalysisConfig;
use crate::error::ExecutionError;
use crate::estimate::Confidence;
use crate::extract::{ExtractedQuery, TableRef};
use crate::recommend::TableRecommendation;
use crate::stats::{table_key, StatsSnapshot};

// ============================================================================
// Execution capability
// ============================================================================

/// One row of traditional `EXPLAIN` output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExplainRow {
    pub id: Option<u64>,
    pub select_type: Option<String>,
    /// Table name or alias as the server reports it.
    pub table: Option<String>,
    /// `type` column: `ALL`, `index`, `range`, `ref`, `eq_ref`, `const`, ...
    pub access_type: Option<String>,
    pub possible_keys: Vec<String>,
    pub chosen_key: Option<String>,
    pub key_length: Option<String>,
    pub estimated_rows: Option<u64>,
    pub filtered_percent: Option<f64>,
    pub extra: String,
}

impl ExplainRow {
    pub fn new(table: impl Into<String>, access_type: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            access_type: Some(access_type.into()),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.chosen_key = Some(key.into());
        self
    }

    pub fn with_possible_keys(mut self, keys: &[&str]) -> Self {
        self.possible_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_rows(mut self, rows: u64) -> Self {
        self.estimated_rows = Some(rows);
        self
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = extra.into();
        self
    }

    fn access(&self) -> String {
        self.access_type.as_deref().unwrap_or_default().to_ascii_lowercase()
    }

    /// `type = ALL`.
    pub fn is_full_scan(&self) -> bool {
        self.access() == "all"
    }

    /// `type = index`: every index entry is read.
    pub fn is_index_scan(&self) -> bool {
        self.access() == "index"
    }

    fn extra_flags(&self) -> impl Iterator<Item = String> + '_ {
        self.extra.split(';').map(|f| f.trim().to_ascii_lowercase())
    }

    pub fn uses_filesort(&self) -> bool {
        self.extra_flags().any(|f| f.contains("filesort"))
    }

    pub fn uses_temporary(&self) -> bool {
        self.extra_flags().any(|f| f.contains("temporary"))
    }

    /// Index-only access (`Using index`, not `Using index condition`).
    pub fn uses_index(&self) -> bool {
        self.extra_flags().any(|f| f == "using index" || f.starts_with("using index for"))
    }

    pub fn uses_where(&self) -> bool {
        self.extra_flags().any(|f| f == "using where")
    }
}

/// Source of EXPLAIN plans, normally a live server.
#[async_trait]
pub trait ExecutionProvider: Send + Sync {
    /// Run `EXPLAIN` for one SELECT.
    async fn explain(&self, sql: &str) -> Result<Vec<ExplainRow>, ExecutionError>;

    /// Version string as returned by `SELECT VERSION()`, when known.
    async fn server_version(&self) -> Result<Option<String>, ExecutionError> {
        Ok(None)
    }
}

/// Fixed plan, for tests and offline replays of captured EXPLAIN output.
#[derive(Debug, Clone, Default)]
pub struct StaticExecution {
    rows: Vec<ExplainRow>,
    version: Option<String>,
}

impl StaticExecution {
    pub fn new(rows: Vec<ExplainRow>) -> Self {
        Self { rows, version: None }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

#[async_trait]
impl ExecutionProvider for StaticExecution {
    async fn explain(&self, _sql: &str) -> Result<Vec<ExplainRow>, ExecutionError> {
        Ok(self.rows.clone())
    }

    async fn server_version(&self) -> Result<Option<String>, ExecutionError> {
        Ok(self.version.clone())
    }
}

// ============================================================================
// Profile
// ============================================================================

/// How a plan row relates to the recommendations for its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    UsesRecommended,
    UsesOtherIndex,
    FullScanMissingIndex,
    NoRecommendation,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::UsesRecommended => "uses-recommended",
            Verdict::UsesOtherIndex => "uses-other-index",
            Verdict::FullScanMissingIndex => "full-scan-missing-index",
            Verdict::NoRecommendation => "no-recommendation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableVerdict {
    /// Base table name, or the plan's own label for derived tables.
    pub table: String,
    pub verdict: Verdict,
    pub access_type: Option<String>,
    pub chosen_key: Option<String>,
    pub possible_keys: Vec<String>,
    pub estimated_rows: Option<u64>,
    pub filtered_percent: Option<f64>,
    pub filesort: bool,
    pub temporary: bool,
    pub index_only: bool,
    pub using_where: bool,
    /// Names of the recommended indexes for this table.
    pub recommended: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub sql: String,
    /// `None` when EXPLAIN timed out.
    pub plan: Option<Vec<ExplainRow>>,
    pub verdicts: Vec<TableVerdict>,
    /// 0 (poor) to 100 (no issues); `None` without a plan.
    pub health_score: Option<u8>,
    pub issues: Vec<String>,
    /// Sum of the plan's row estimates.
    pub estimated_rows_examined: Option<u64>,
    pub server_version: Option<String>,
    pub confidence: Confidence,
    pub warnings: Vec<String>,
}

// ============================================================================
// Health score
// ============================================================================

const FULL_SCAN_PENALTY: i32 = 20;
const INDEX_SCAN_PENALTY: i32 = 5;
const FILESORT_PENALTY: i32 = 10;
const TEMPORARY_PENALTY: i32 = 10;
const RECOMMENDATION_PENALTY: i32 = 5;
const MAX_RECOMMENDATION_PENALTY: i32 = 20;

/// Score a plan: start at 100 and deduct per scan, filesort and temporary
/// table, plus a capped deduction per outstanding recommendation.
pub fn health_score(rows: &[ExplainRow], recommendations: usize) -> (u8, Vec<String>) {
    let mut score: i32 = 100;
    let mut issues = Vec::new();

    for row in rows {
        let table = row.table.as_deref().unwrap_or("?");
        if row.is_full_scan() {
            score -= FULL_SCAN_PENALTY;
            issues.push(format!("Full table scan on {} (type=ALL)", table));
        } else if row.is_index_scan() {
            score -= INDEX_SCAN_PENALTY;
            issues.push(format!("Sequential index scan on {} (type=index)", table));
        }
        if row.uses_filesort() {
            score -= FILESORT_PENALTY;
            issues.push(format!("Filesort required for {}", table));
        }
        if row.uses_temporary() {
            score -= TEMPORARY_PENALTY;
            issues.push(format!("Temporary table used for {}", table));
        }
    }

    if recommendations > 0 {
        let penalty = (RECOMMENDATION_PENALTY * recommendations.min(i32::MAX as usize) as i32)
            .min(MAX_RECOMMENDATION_PENALTY);
        score -= penalty;
        issues.push(format!("{} index recommendation(s) suggested", recommendations));
    }

    (score.clamp(0, 100) as u8, issues)
}

// ============================================================================
// Verdicts
// ============================================================================

fn row_matches(label: &str, table: &TableRef) -> bool {
    let label = table_key(label);
    if let Some(alias) = &table.alias {
        return table_key(alias) == label;
    }
    let name = table_key(&table.name);
    name == label || name.rsplit('.').next() == Some(label.as_str())
}

fn base_table<'a>(label: &str, extracted: &'a ExtractedQuery) -> Option<&'a str> {
    extracted
        .tables
        .iter()
        .find(|t| row_matches(label, t))
        .map(|t| t.name.as_str())
}

fn verdict_for(
    row: &ExplainRow,
    table: Option<&str>,
    recommendations: &[TableRecommendation],
    snapshot: &StatsSnapshot,
) -> (Verdict, Vec<String>) {
    let recommendation = table.and_then(|t| {
        recommendations
            .iter()
            .find(|r| table_key(&r.table) == table_key(t))
    });
    let recommended: Vec<String> = recommendation
        .map(|r| r.candidates.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default();
    let has_candidates = !recommended.is_empty();

    let verdict = match row.chosen_key.as_deref() {
        Some(key) => {
            let by_name = recommended.iter().any(|name| name.eq_ignore_ascii_case(key));
            // An index created under another name still counts when its
            // columns start with a recommended key.
            let by_columns = recommendation.is_some_and(|r| {
                let existing = table.map(|t| snapshot.indexes(t)).unwrap_or(&[]);
                existing
                    .iter()
                    .filter(|e| e.name.eq_ignore_ascii_case(key))
                    .any(|e| {
                        r.candidates.iter().any(|c| {
                            let columns = c.columns();
                            columns.len() <= e.columns.len()
                                && columns
                                    .iter()
                                    .zip(&e.columns)
                                    .all(|(a, b)| a.eq_ignore_ascii_case(b))
                        })
                    })
            });
            if by_name || by_columns {
                Verdict::UsesRecommended
            } else {
                Verdict::UsesOtherIndex
            }
        }
        None if has_candidates => Verdict::FullScanMissingIndex,
        None => Verdict::NoRecommendation,
    };
    (verdict, recommended)
}

/// Map plan rows to per-table verdicts.
pub fn reconcile(
    rows: &[ExplainRow],
    extracted: &ExtractedQuery,
    recommendations: &[TableRecommendation],
    snapshot: &StatsSnapshot,
) -> Vec<TableVerdict> {
    rows.iter()
        .filter_map(|row| {
            let label = row.table.as_deref()?;
            let table = base_table(label, extracted);
            let (verdict, recommended) = verdict_for(row, table, recommendations, snapshot);
            Some(TableVerdict {
                table: table.unwrap_or(label).to_string(),
                verdict,
                access_type: row.access_type.clone(),
                chosen_key: row.chosen_key.clone(),
                possible_keys: row.possible_keys.clone(),
                estimated_rows: row.estimated_rows,
                filtered_percent: row.filtered_percent,
                filesort: row.uses_filesort(),
                temporary: row.uses_temporary(),
                index_only: row.uses_index(),
                using_where: row.uses_where(),
                recommended,
            })
        })
        .collect()
}

// ============================================================================
// Profiler
// ============================================================================

pub struct Profiler<'a> {
    provider: &'a dyn ExecutionProvider,
    config: &'a AnalysisConfig,
}

impl<'a> Profiler<'a> {
    pub fn new(provider: &'a dyn ExecutionProvider, config: &'a AnalysisConfig) -> Self {
        Self { provider, config }
    }

    /// Profile one parsed SELECT. Connection and execution failures are
    /// returned as-is; a timed out EXPLAIN yields a profile without a plan.
    pub async fn profile(
        &self,
        query: &Query,
        extracted: &ExtractedQuery,
        recommendations: &[TableRecommendation],
        snapshot: &StatsSnapshot,
    ) -> Result<Profile, ExecutionError> {
        let sql = query.to_sql();
        let timeout = self.config.explain_timeout();
        let mut warnings = Vec::new();
        let mut confidence = if snapshot.degradations().is_empty() {
            Confidence::Statistics
        } else {
            Confidence::Reduced
        };

        debug!(sql = %sql, "requesting EXPLAIN");
        let plan = match tokio::time::timeout(timeout, self.provider.explain(&sql)).await {
            Ok(result) => Some(result?),
            Err(_) => {
                warn!(timeout_ms = self.config.explain_timeout_ms, "EXPLAIN timed out, profiling without a plan");
                warnings.push(format!("EXPLAIN timed out after {} ms", self.config.explain_timeout_ms));
                confidence = Confidence::Reduced;
                None
            }
        };

        let server_version = match plan {
            Some(_) => self.server_version(timeout, query.dialect, &mut warnings).await,
            None => None,
        };

        let recommended: usize = recommendations.iter().map(|r| r.candidates.len()).sum();
        let (verdicts, health_score, issues, estimated_rows_examined) = match &plan {
            Some(rows) => {
                let (score, issues) = health_score(rows, recommended);
                let examined = rows.iter().filter_map(|r| r.estimated_rows).sum();
                (
                    reconcile(rows, extracted, recommendations, snapshot),
                    Some(score),
                    issues,
                    Some(examined),
                )
            }
            None => (Vec::new(), None, Vec::new(), None),
        };

        Ok(Profile {
            sql,
            plan,
            verdicts,
            health_score,
            issues,
            estimated_rows_examined,
            server_version,
            confidence,
            warnings,
        })
    }

    /// The version is informational; failures only produce a warning.
    async fn server_version(
        &self,
        timeout: std::time::Duration,
        dialect: Dialect,
        warnings: &mut Vec<String>,
    ) -> Option<String> {
        let version = match tokio::time::timeout(timeout, self.provider.server_version()).await {
            Ok(Ok(version)) => version?,
            Ok(Err(err)) => {
                warn!(error = %err, "server version unavailable");
                return None;
            }
            Err(_) => {
                warn!("server version request timed out");
                return None;
            }
        };

        if let Ok(server) = Dialect::from_server_version(&version) {
            if server.flavor != dialect.flavor || (server.major, server.minor) < (dialect.major, dialect.minor) {
                warnings.push(format!(
                    "server reports {} {}.{}, analysis assumed {} {}.{}",
                    server.flavor.as_str(),
                    server.major,
                    server.minor,
                    dialect.flavor.as_str(),
                    dialect.major,
                    dialect.minor
                ));
            }
        }
        Some(version)
    }
}
