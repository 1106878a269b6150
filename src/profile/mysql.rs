//! EXPLAIN plans from a live MySQL/MariaDB server.

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row as _;
use tracing::debug;

use super::{ExecutionProvider, ExplainRow};
use crate::error::ExecutionError;

/// Runs traditional `EXPLAIN` on the caller's pool.
#[derive(Debug, Clone)]
pub struct MySqlExecution {
    pool: MySqlPool,
}

impl MySqlExecution {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

// Column types differ between MySQL and MariaDB (and between the text and
// binary protocols), so every field is decoded leniently.

fn text(row: &MySqlRow, column: &str) -> Option<String> {
    if let Ok(value) = row.try_get::<Option<String>, _>(column) {
        return value;
    }
    row.try_get::<Option<Vec<u8>>, _>(column)
        .ok()
        .flatten()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

fn unsigned(row: &MySqlRow, column: &str) -> Option<u64> {
    if let Ok(value) = row.try_get::<Option<u64>, _>(column) {
        return value;
    }
    if let Ok(value) = row.try_get::<Option<i64>, _>(column) {
        return value.and_then(|v| u64::try_from(v).ok());
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(column) {
        return value.filter(|v| *v >= 0.0).map(|v| v as u64);
    }
    text(row, column).and_then(|s| s.trim().parse().ok())
}

fn float(row: &MySqlRow, column: &str) -> Option<f64> {
    if let Ok(value) = row.try_get::<Option<f64>, _>(column) {
        return value;
    }
    if let Ok(value) = row.try_get::<Option<f32>, _>(column) {
        return value.map(f64::from);
    }
    if let Ok(value) = row.try_get::<Option<rust_decimal::Decimal>, _>(column) {
        return value.and_then(|d| d.to_string().parse().ok());
    }
    text(row, column).and_then(|s| s.trim().parse().ok())
}

fn key_list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn explain_row(row: &MySqlRow) -> ExplainRow {
    ExplainRow {
        id: unsigned(row, "id"),
        select_type: text(row, "select_type"),
        table: text(row, "table"),
        access_type: text(row, "type"),
        possible_keys: key_list(text(row, "possible_keys")),
        chosen_key: text(row, "key").filter(|k| !k.is_empty()),
        key_length: text(row, "key_len"),
        estimated_rows: unsigned(row, "rows"),
        filtered_percent: float(row, "filtered"),
        extra: text(row, "Extra").unwrap_or_default(),
    }
}

#[async_trait]
impl ExecutionProvider for MySqlExecution {
    async fn explain(&self, sql: &str) -> Result<Vec<ExplainRow>, ExecutionError> {
        let statement = format!("EXPLAIN {}", sql);

        #[cfg(feature = "log_sql")]
        debug!(target: "turboindex::sql", sql = %statement, "executing");

        let rows = sqlx::query(&statement)
            .persistent(false)
            .fetch_all(&self.pool)
            .await?;
        debug!(rows = rows.len(), "EXPLAIN returned");
        Ok(rows.iter().map(explain_row).collect())
    }

    async fn server_version(&self) -> Result<Option<String>, ExecutionError> {
        #[cfg(feature = "log_sql")]
        debug!(target: "turboindex::sql", sql = "SELECT VERSION()", "executing");

        let version: Option<String> = sqlx::query_scalar("SELECT VERSION()")
            .fetch_optional(&self.pool)
            .await?;
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_list() {
        assert_eq!(key_list(Some("PRIMARY, idx_orders_status".into())), vec!["PRIMARY", "idx_orders_status"]);
        assert!(key_list(None).is_empty());
        assert!(key_list(Some(String::new())).is_empty());
    }
}
