//! Table statistics model and the per-analysis statistics cache.

#[cfg(feature = "mysql")]
pub mod mysql;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{NaiveDate, NaiveDateTime};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::StatsError;

// ============================================================================
// Values
// ============================================================================

/// A scalar taken from a literal, a histogram bucket or a min/max bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Datum {
    Number(f64),
    Text(String),
}

impl Datum {
    /// Numeric position of the value on its axis. Dates and datetimes map to
    /// seconds since the Unix epoch so they can be interpolated.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Number(n) => Some(*n),
            Datum::Text(text) => {
                let text = text.trim();
                if let Ok(n) = text.parse::<f64>() {
                    return Some(n);
                }
                temporal_seconds(text)
            }
        }
    }

    /// Ordering used when matching values against histogram buckets.
    pub fn compare(&self, other: &Datum) -> Option<Ordering> {
        match (self, other) {
            (Datum::Text(a), Datum::Text(b)) => match (self.as_f64(), other.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => Some(a.cmp(b)),
            },
            _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
        }
    }
}

fn temporal_seconds(text: &str) -> Option<f64> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt.and_utc().timestamp() as f64);
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp() as f64);
    }
    None
}

// ============================================================================
// Histograms
// ============================================================================

/// One histogram bucket. Singleton buckets have `lower == upper` and
/// `distinct == 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub lower: Datum,
    pub upper: Datum,
    /// Fraction of all rows that fall in this bucket.
    pub frequency: f64,
    pub distinct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub buckets: Vec<Bucket>,
    /// Fraction of rows that are NULL.
    pub null_fraction: f64,
}

impl Histogram {
    /// Decode the JSON document stored in
    /// `information_schema.COLUMN_STATISTICS.HISTOGRAM`.
    ///
    /// Bucket frequencies are stored there as cumulative fractions; they are
    /// turned into per-bucket fractions here.
    pub fn from_mysql_json(doc: &serde_json::Value) -> Option<Histogram> {
        let kind = doc.get("histogram-type")?.as_str()?;
        let raw = doc.get("buckets")?.as_array()?;
        let null_fraction = doc.get("null-values").and_then(|v| v.as_f64()).unwrap_or(0.0);

        let mut buckets = Vec::with_capacity(raw.len());
        let mut previous = 0.0;
        for entry in raw {
            let parts = entry.as_array()?;
            let bucket = match kind {
                "singleton" => {
                    let value = histogram_value(parts.first()?)?;
                    let cumulative = parts.get(1)?.as_f64()?;
                    (value.clone(), value, cumulative, 1.0)
                }
                "equi-height" => {
                    let lower = histogram_value(parts.first()?)?;
                    let upper = histogram_value(parts.get(1)?)?;
                    let cumulative = parts.get(2)?.as_f64()?;
                    let distinct = parts.get(3).and_then(|v| v.as_f64()).unwrap_or(1.0);
                    (lower, upper, cumulative, distinct.max(1.0))
                }
                _ => return None,
            };
            let (lower, upper, cumulative, distinct) = bucket;
            buckets.push(Bucket {
                lower,
                upper,
                frequency: (cumulative - previous).max(0.0),
                distinct,
            });
            previous = cumulative;
        }

        Some(Histogram {
            buckets,
            null_fraction,
        })
    }

    /// Fraction of rows equal to `value`.
    pub fn equality_fraction(&self, value: &Datum) -> Option<f64> {
        let mut matched = false;
        let mut fraction = 0.0;
        for bucket in &self.buckets {
            let above_lower = value.compare(&bucket.lower)? != Ordering::Less;
            let below_upper = value.compare(&bucket.upper)? != Ordering::Greater;
            if above_lower && below_upper {
                matched = true;
                fraction = bucket.frequency / bucket.distinct;
                break;
            }
        }
        // A value outside every bucket was not seen when sampling.
        Some(if matched { fraction } else { 0.0 })
    }

    /// Fraction of rows inside `[low, high]`, assuming uniform spread within
    /// a bucket. `None` when the buckets are not numeric.
    pub fn range_fraction(&self, low: Option<f64>, high: Option<f64>) -> Option<f64> {
        let low = low.unwrap_or(f64::NEG_INFINITY);
        let high = high.unwrap_or(f64::INFINITY);
        if low > high {
            return Some(0.0);
        }

        let mut total = 0.0;
        for bucket in &self.buckets {
            let lower = bucket.lower.as_f64()?;
            let upper = bucket.upper.as_f64()?;
            if upper < low || lower > high {
                continue;
            }
            if upper <= lower {
                total += bucket.frequency;
                continue;
            }
            let from = low.max(lower);
            let to = high.min(upper);
            total += bucket.frequency * ((to - from) / (upper - lower)).clamp(0.0, 1.0);
        }
        Some(total.clamp(0.0, 1.0))
    }
}

fn histogram_value(value: &serde_json::Value) -> Option<Datum> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().map(Datum::Number),
        serde_json::Value::String(s) => Some(Datum::Text(decode_histogram_string(s))),
        serde_json::Value::Bool(b) => Some(Datum::Number(if *b { 1.0 } else { 0.0 })),
        _ => None,
    }
}

/// String bucket values are stored as `base64:type<N>:<payload>`.
fn decode_histogram_string(raw: &str) -> String {
    let Some(rest) = raw.strip_prefix("base64:") else {
        return raw.to_string();
    };
    let payload = rest.split_once(':').map(|(_, p)| p).unwrap_or(rest);
    STANDARD
        .decode(payload)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| raw.to_string())
}

// ============================================================================
// Table Statistics
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnStats {
    pub name: String,
    /// Estimated number of distinct values.
    pub distinct: Option<u64>,
    pub null_fraction: Option<f64>,
    pub min: Option<Datum>,
    pub max: Option<Datum>,
    pub histogram: Option<Histogram>,
    /// Lower-case SQL type name (`int`, `varchar`, `datetime`, ...).
    pub data_type: Option<String>,
}

impl ColumnStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_distinct(mut self, distinct: u64) -> Self {
        self.distinct = Some(distinct);
        self
    }

    pub fn with_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into().to_ascii_lowercase());
        self
    }

    pub fn with_bounds(mut self, min: Datum, max: Datum) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn with_null_fraction(mut self, fraction: f64) -> Self {
        self.null_fraction = Some(fraction);
        self
    }

    pub fn with_histogram(mut self, histogram: Histogram) -> Self {
        self.histogram = Some(histogram);
        self
    }

    pub fn type_family(&self) -> Option<TypeFamily> {
        self.data_type.as_deref().map(TypeFamily::of)
    }
}

/// Coarse grouping of SQL column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeFamily {
    Integer,
    Decimal,
    Float,
    Text,
    Date,
    DateTime,
    Time,
    Other,
}

impl TypeFamily {
    pub fn of(data_type: &str) -> TypeFamily {
        let base = data_type
            .trim()
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        match base.as_str() {
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "signed"
            | "unsigned" | "year" | "bit" => TypeFamily::Integer,
            "decimal" | "numeric" | "dec" | "fixed" => TypeFamily::Decimal,
            "float" | "double" | "real" => TypeFamily::Float,
            "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "enum"
            | "set" | "nchar" | "nvarchar" => TypeFamily::Text,
            "date" => TypeFamily::Date,
            "datetime" | "timestamp" => TypeFamily::DateTime,
            "time" => TypeFamily::Time,
            _ => TypeFamily::Other,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, TypeFamily::Integer | TypeFamily::Decimal | TypeFamily::Float)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, TypeFamily::Date | TypeFamily::DateTime)
    }
}

/// Existing index definition (key parts in order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    /// Column names; functional key parts are kept as `(expression)`.
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, columns: &[&str], unique: bool) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.name.eq_ignore_ascii_case("PRIMARY")
    }

    /// Columns stored in the index entries. InnoDB appends the primary key
    /// to every secondary index, so those columns are readable (and
    /// seekable after the declared parts) without touching the row.
    pub fn stored_columns(&self, primary: Option<&IndexDef>) -> Vec<String> {
        let mut columns = self.columns.clone();
        if let Some(primary) = primary.filter(|p| !self.is_primary() && p.name != self.name) {
            for column in &primary.columns {
                if !columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                    columns.push(column.clone());
                }
            }
        }
        columns
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TableStats {
    pub name: String,
    pub row_count: u64,
    pub columns: Vec<ColumnStats>,
    pub indexes: Vec<IndexDef>,
}

impl TableStats {
    pub fn new(name: impl Into<String>, row_count: u64) -> Self {
        Self {
            name: name.into(),
            row_count,
            ..Default::default()
        }
    }

    pub fn with_column(mut self, column: ColumnStats) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnStats> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Source of table statistics (live server, a schema dump, a test fixture).
#[async_trait]
pub trait StatisticsProvider: Send + Sync {
    /// `table` is the name as written in the query, optionally
    /// schema-qualified (`db.orders`).
    async fn table_stats(&self, table: &str) -> Result<TableStats, StatsError>;
}

/// Provider backed by a fixed set of tables, e.g. loaded from JSON.
#[derive(Debug, Clone, Default)]
pub struct StaticStatistics {
    tables: HashMap<String, TableStats>,
}

impl StaticStatistics {
    pub fn new(tables: impl IntoIterator<Item = TableStats>) -> Self {
        Self {
            tables: tables.into_iter().map(|t| (table_key(&t.name), t)).collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let tables: Vec<TableStats> = serde_json::from_str(json)?;
        Ok(Self::new(tables))
    }
}

#[async_trait]
impl StatisticsProvider for StaticStatistics {
    async fn table_stats(&self, table: &str) -> Result<TableStats, StatsError> {
        let key = table_key(table);
        self.tables
            .get(&key)
            .or_else(|| {
                let bare = key.rsplit('.').next().unwrap_or(&key);
                self.tables.get(bare)
            })
            .cloned()
            .ok_or_else(|| StatsError::NotFound(table.to_string()))
    }
}

/// Lookup key for a table name: lower-case, as qualified as written.
pub fn table_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

// ============================================================================
// Per-analysis cache
// ============================================================================

/// Why statistics for a table are missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Degradation {
    pub table: String,
    pub reason: String,
}

/// Statistics gathered for one analysis. Each table is requested at most
/// once; failures are recorded and the table falls back to heuristics.
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    tables: HashMap<String, TableStats>,
    degraded: Vec<Degradation>,
    provider_present: bool,
}

impl StatsSnapshot {
    /// No provider: every estimate is heuristic.
    pub fn offline() -> Self {
        Self::default()
    }

    /// Snapshot over already-known statistics.
    pub fn from_tables(tables: impl IntoIterator<Item = TableStats>) -> Self {
        Self {
            tables: tables.into_iter().map(|t| (table_key(&t.name), t)).collect(),
            degraded: Vec::new(),
            provider_present: true,
        }
    }

    /// Fetch statistics for `tables` concurrently, each bounded by `timeout`.
    pub async fn collect(
        provider: &dyn StatisticsProvider,
        tables: &[String],
        timeout: Duration,
    ) -> Self {
        let mut unique: Vec<&String> = Vec::new();
        for table in tables {
            if !unique.iter().any(|t| table_key(t) == table_key(table)) {
                unique.push(table);
            }
        }

        let requests = unique.iter().map(|table| async move {
            debug!(table = %table, "requesting table statistics");
            let result = match tokio::time::timeout(timeout, provider.table_stats(table)).await {
                Ok(result) => result,
                Err(_) => Err(StatsError::Timeout(timeout.as_millis() as u64)),
            };
            (table.to_string(), result)
        });

        let mut snapshot = StatsSnapshot {
            provider_present: true,
            ..Default::default()
        };
        for (table, result) in join_all(requests).await {
            match result {
                Ok(stats) => {
                    snapshot.tables.insert(table_key(&table), stats);
                }
                Err(err) => {
                    warn!(table = %table, error = %err, "statistics unavailable, using heuristics");
                    snapshot.degraded.push(Degradation {
                        table,
                        reason: err.to_string(),
                    });
                }
            }
        }
        snapshot
    }

    pub fn get(&self, table: &str) -> Option<&TableStats> {
        self.tables.get(&table_key(table))
    }

    pub fn column(&self, table: &str, column: &str) -> Option<&ColumnStats> {
        self.get(table).and_then(|t| t.column(column))
    }

    pub fn row_count(&self, table: &str) -> Option<u64> {
        self.get(table).map(|t| t.row_count)
    }

    pub fn indexes(&self, table: &str) -> &[IndexDef] {
        self.get(table).map(|t| t.indexes.as_slice()).unwrap_or(&[])
    }

    pub fn primary_key(&self, table: &str) -> Option<&IndexDef> {
        self.indexes(table).iter().find(|index| index.is_primary())
    }

    /// Known column names per table, for resolving unqualified columns.
    pub fn column_lists(&self) -> HashMap<String, Vec<String>> {
        self.tables
            .iter()
            .filter(|(_, t)| !t.columns.is_empty())
            .map(|(key, t)| (key.clone(), t.column_names()))
            .collect()
    }

    pub fn is_degraded(&self, table: &str) -> bool {
        self.degraded.iter().any(|d| table_key(&d.table) == table_key(table))
    }

    pub fn degradations(&self) -> &[Degradation] {
        &self.degraded
    }

    /// A provider was consulted (successfully or not).
    pub fn has_provider(&self) -> bool {
        self.provider_present
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_singleton_histogram_from_mysql_json() {
        let doc = json!({
            "buckets": [[1, 0.25], [2, 0.75], [3, 0.9]],
            "null-values": 0.1,
            "histogram-type": "singleton",
        });
        let histogram = Histogram::from_mysql_json(&doc).unwrap();
        assert_eq!(histogram.buckets.len(), 3);
        assert!((histogram.buckets[1].frequency - 0.5).abs() < 1e-9);
        assert!((histogram.equality_fraction(&Datum::Number(2.0)).unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(histogram.equality_fraction(&Datum::Number(7.0)), Some(0.0));
    }

    #[test]
    fn test_equi_height_histogram_range() {
        let doc = json!({
            "buckets": [[0, 9, 0.5, 10], [10, 19, 1.0, 10]],
            "null-values": 0.0,
            "histogram-type": "equi-height",
        });
        let histogram = Histogram::from_mysql_json(&doc).unwrap();
        let all = histogram.range_fraction(None, None).unwrap();
        assert!((all - 1.0).abs() < 1e-9);
        let narrow = histogram.range_fraction(Some(10.0), None).unwrap();
        assert!(narrow <= all);
        assert!((histogram.equality_fraction(&Datum::Number(4.0)).unwrap() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_string_histogram_values_are_decoded() {
        let doc = json!({
            "buckets": [["base64:type254:YWN0aXZl", 0.8], ["base64:type254:Y2xvc2Vk", 1.0]],
            "histogram-type": "singleton",
        });
        let histogram = Histogram::from_mysql_json(&doc).unwrap();
        assert_eq!(histogram.buckets[0].lower, Datum::Text("active".into()));
    }

    #[test]
    fn test_temporal_datums_are_ordered() {
        let a = Datum::Text("2024-01-01".into());
        let b = Datum::Text("2024-01-01 12:00:00".into());
        assert_eq!(a.compare(&b), Some(Ordering::Less));
    }

    #[test]
    fn test_type_families() {
        assert_eq!(TypeFamily::of("int(11) unsigned"), TypeFamily::Integer);
        assert_eq!(TypeFamily::of("DATETIME(6)"), TypeFamily::DateTime);
        assert!(TypeFamily::of("decimal(10,2)").is_numeric());
    }

    #[tokio::test]
    async fn test_collect_records_missing_tables() {
        let provider = StaticStatistics::new(vec![TableStats::new("orders", 500)]);
        let snapshot = StatsSnapshot::collect(
            &provider,
            &["orders".to_string(), "ORDERS".to_string(), "ghost".to_string()],
            Duration::from_millis(100),
        )
        .await;
        assert_eq!(snapshot.row_count("orders"), Some(500));
        assert!(snapshot.is_degraded("ghost"));
        assert_eq!(snapshot.degradations().len(), 1);
    }
}
