//! Statistics read from a live MySQL/MariaDB server through
//! `information_schema`.

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row as _;
use std::collections::HashMap;
use tracing::debug;

use super::{ColumnStats, Histogram, IndexDef, StatisticsProvider, TableStats};
use crate::error::StatsError;

const TABLE_ROWS_SQL: &str = r#"
    SELECT CAST(COALESCE(TABLE_ROWS, 0) AS SIGNED) AS table_rows
    FROM information_schema.TABLES
    WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
"#;

const COLUMNS_SQL: &str = r#"
    SELECT COLUMN_NAME AS column_name,
           CAST(COLUMN_TYPE AS CHAR) AS column_type,
           IS_NULLABLE AS is_nullable
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

// Functional key parts (MySQL 8.0.13+) have no COLUMN_NAME; they come back
// as `(expression)`. Key parts are NUL separated since expressions may
// contain commas.
const INDEXES_SQL: &str = r#"
    SELECT INDEX_NAME AS index_name,
           CAST(MIN(NON_UNIQUE) AS SIGNED) AS non_unique,
           CAST(GROUP_CONCAT(COALESCE(COLUMN_NAME, CONCAT('(', EXPRESSION, ')'))
                ORDER BY SEQ_IN_INDEX SEPARATOR '\0') AS CHAR) AS columns
    FROM information_schema.STATISTICS
    WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
    GROUP BY INDEX_NAME
    ORDER BY INDEX_NAME
"#;

// MariaDB and older MySQL have no EXPRESSION column.
const LEGACY_INDEXES_SQL: &str = r#"
    SELECT INDEX_NAME AS index_name,
           CAST(MIN(NON_UNIQUE) AS SIGNED) AS non_unique,
           CAST(GROUP_CONCAT(COLUMN_NAME ORDER BY SEQ_IN_INDEX SEPARATOR '\0') AS CHAR) AS columns
    FROM information_schema.STATISTICS
    WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
    GROUP BY INDEX_NAME
    ORDER BY INDEX_NAME
"#;

const KEY_PART_SEPARATOR: char = '\0';

const LEADING_CARDINALITY_SQL: &str = r#"
    SELECT COLUMN_NAME AS column_name,
           CAST(MAX(COALESCE(CARDINALITY, 0)) AS SIGNED) AS cardinality
    FROM information_schema.STATISTICS
    WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ? AND SEQ_IN_INDEX = 1
      AND COLUMN_NAME IS NOT NULL
    GROUP BY COLUMN_NAME
"#;

// MySQL 8.0+ only; older servers and MariaDB fail this query and simply get
// no histograms.
const HISTOGRAMS_SQL: &str = r#"
    SELECT COLUMN_NAME AS column_name, CAST(HISTOGRAM AS CHAR) AS histogram
    FROM information_schema.COLUMN_STATISTICS
    WHERE SCHEMA_NAME = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
"#;

/// Reads row counts, column types, index definitions, leading-column
/// cardinalities and histograms. The pool is owned by the caller.
#[derive(Debug, Clone)]
pub struct MySqlStatistics {
    pool: MySqlPool,
}

impl MySqlStatistics {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn fetch(
        &self,
        sql: &'static str,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<MySqlRow>, sqlx::Error> {
        #[cfg(feature = "log_sql")]
        debug!(target: "turboindex::sql", sql = %sql.trim(), schema = ?schema, table = %table, "executing");

        sqlx::query(sql)
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await
    }

    async fn read_columns(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<ColumnStats>, StatsError> {
        let rows = self.fetch(COLUMNS_SQL, schema, table).await?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("column_name")?;
            let column_type: String = row.try_get("column_type").unwrap_or_default();
            let nullable: String = row.try_get("is_nullable").unwrap_or_default();

            let mut column = ColumnStats::new(name).with_type(column_type);
            if nullable.eq_ignore_ascii_case("NO") {
                column.null_fraction = Some(0.0);
            }
            columns.push(column);
        }
        Ok(columns)
    }

    async fn read_indexes(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<IndexDef>, StatsError> {
        let rows = match self.fetch(INDEXES_SQL, schema, table).await {
            Ok(rows) => rows,
            Err(sqlx::Error::Database(error)) => {
                debug!(table = %table, error = %error, "no EXPRESSION column; reading plain key parts");
                self.fetch(LEGACY_INDEXES_SQL, schema, table).await?
            }
            Err(error) => return Err(error.into()),
        };
        let mut indexes = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("index_name")?;
            let non_unique: i64 = row.try_get("non_unique").unwrap_or(1);
            let columns: Option<String> = row.try_get("columns").unwrap_or(None);
            indexes.extend(index_def(name, non_unique, columns.as_deref()));
        }
        Ok(indexes)
    }

    async fn read_cardinalities(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<HashMap<String, u64>, StatsError> {
        let rows = self.fetch(LEADING_CARDINALITY_SQL, schema, table).await?;
        let mut out = HashMap::new();
        for row in rows {
            let name: String = row.try_get("column_name")?;
            let cardinality: i64 = row.try_get("cardinality").unwrap_or(0);
            if cardinality > 0 {
                out.insert(name.to_ascii_lowercase(), cardinality as u64);
            }
        }
        Ok(out)
    }

    async fn read_histograms(&self, schema: Option<&str>, table: &str) -> HashMap<String, Histogram> {
        let rows = match self.fetch(HISTOGRAMS_SQL, schema, table).await {
            Ok(rows) => rows,
            Err(err) => {
                debug!(table = %table, error = %err, "column histograms not available");
                return HashMap::new();
            }
        };

        let mut out = HashMap::new();
        for row in rows {
            let Ok(name) = row.try_get::<String, _>("column_name") else {
                continue;
            };
            let Ok(Some(raw)) = row.try_get::<Option<String>, _>("histogram") else {
                continue;
            };
            let parsed = serde_json::from_str::<serde_json::Value>(&raw)
                .ok()
                .and_then(|doc| Histogram::from_mysql_json(&doc));
            if let Some(histogram) = parsed {
                out.insert(name.to_ascii_lowercase(), histogram);
            }
        }
        out
    }
}

#[async_trait]
impl StatisticsProvider for MySqlStatistics {
    async fn table_stats(&self, table: &str) -> Result<TableStats, StatsError> {
        let (schema, name) = match table.split_once('.') {
            Some((schema, name)) => (Some(schema), name),
            None => (None, table),
        };

        let rows = self.fetch(TABLE_ROWS_SQL, schema, name).await?;
        let Some(row) = rows.first() else {
            return Err(StatsError::NotFound(table.to_string()));
        };
        let row_count: i64 = row.try_get("table_rows").unwrap_or(0);

        let mut columns = self.read_columns(schema, name).await?;
        let indexes = self.read_indexes(schema, name).await?;
        let cardinalities = self.read_cardinalities(schema, name).await?;
        let mut histograms = self.read_histograms(schema, name).await;

        for column in &mut columns {
            let key = column.name.to_ascii_lowercase();
            column.distinct = cardinalities.get(&key).copied();
            if let Some(histogram) = histograms.remove(&key) {
                if column.null_fraction.is_none() {
                    column.null_fraction = Some(histogram.null_fraction);
                }
                if column.distinct.is_none() {
                    column.distinct = Some(histogram.buckets.iter().map(|b| b.distinct).sum::<f64>() as u64);
                }
                column.min = histogram.buckets.first().map(|b| b.lower.clone());
                column.max = histogram.buckets.last().map(|b| b.upper.clone());
                column.histogram = Some(histogram);
            }
        }

        debug!(
            table = %table,
            rows = row_count,
            columns = columns.len(),
            indexes = indexes.len(),
            "loaded table statistics"
        );

        Ok(TableStats {
            name: table.to_string(),
            row_count: row_count.max(0) as u64,
            columns,
            indexes,
        })
    }
}

/// One `information_schema.STATISTICS` group as an index definition. A
/// group with no readable key parts is skipped.
fn index_def(name: String, non_unique: i64, columns: Option<&str>) -> Option<IndexDef> {
    let columns: Vec<String> = columns
        .unwrap_or_default()
        .split(KEY_PART_SEPARATOR)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    (!columns.is_empty()).then(|| IndexDef {
        name,
        columns,
        unique: non_unique == 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_index_rows_keep_functional_key_parts() {
        let index = index_def(
            "idx_customer_month".to_string(),
            1,
            Some("customer_id\0(date_format(`created`,_utf8mb4'%Y-%m'))"),
        )
        .unwrap();
        assert_eq!(index.columns, vec!["customer_id", "(date_format(`created`,_utf8mb4'%Y-%m'))"]);
        assert!(!index.unique);

        let primary = index_def("PRIMARY".to_string(), 0, Some("id")).unwrap();
        assert!(primary.unique);
        assert!(primary.is_primary());
    }

    #[test]
    fn test_index_rows_without_key_parts_are_skipped() {
        assert_eq!(index_def("idx_empty".to_string(), 1, None), None);
        assert_eq!(index_def("idx_empty".to_string(), 1, Some("")), None);
    }

    #[test]
    fn test_index_queries_agree_on_separator() {
        for sql in [INDEXES_SQL, LEGACY_INDEXES_SQL] {
            assert!(sql.contains("SEPARATOR '\\0'"));
        }
        assert!(INDEXES_SQL.contains("COALESCE(COLUMN_NAME, CONCAT('(', EXPRESSION, ')'))"));
    }
}
