// Shared fixtures for the integration suites.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use turboindex::{
    ColumnStats, ExecutionError, ExecutionProvider, ExplainRow, IndexDef, StaticStatistics, StatisticsProvider,
    StatsError, StatsSnapshot, TableStats,
};

pub fn orders() -> TableStats {
    TableStats::new("orders", 100_000)
        .with_column(ColumnStats::new("id").with_distinct(100_000).with_type("bigint"))
        .with_column(ColumnStats::new("customer_id").with_distinct(5_000).with_type("bigint"))
        .with_column(ColumnStats::new("status").with_distinct(5).with_type("varchar(16)"))
        .with_column(ColumnStats::new("total").with_distinct(20_000).with_type("decimal(10,2)"))
        .with_column(ColumnStats::new("created").with_distinct(90_000).with_type("datetime"))
        .with_index(IndexDef::new("PRIMARY", &["id"], true))
}

pub fn users() -> TableStats {
    TableStats::new("users", 10_000)
        .with_column(ColumnStats::new("id").with_distinct(10_000).with_type("bigint"))
        .with_column(ColumnStats::new("email").with_distinct(10_000).with_type("varchar(255)"))
        .with_column(ColumnStats::new("status").with_distinct(3).with_type("varchar(16)"))
        .with_index(IndexDef::new("PRIMARY", &["id"], true))
}

pub fn snapshot() -> StatsSnapshot {
    StatsSnapshot::from_tables(vec![orders(), users()])
}

pub fn statistics() -> Arc<dyn StatisticsProvider> {
    Arc::new(StaticStatistics::new(vec![orders(), users()]))
}

/// Statistics provider that never answers within a short timeout.
pub struct SlowStatistics {
    pub delay: Duration,
}

#[async_trait]
impl StatisticsProvider for SlowStatistics {
    async fn table_stats(&self, table: &str) -> Result<TableStats, StatsError> {
        tokio::time::sleep(self.delay).await;
        Err(StatsError::NotFound(table.to_string()))
    }
}

pub enum Behavior {
    Plan(Vec<ExplainRow>),
    Fail(ExecutionError),
    Hang(Duration),
}

/// Execution provider that counts EXPLAIN calls.
pub struct MockExecution {
    pub behavior: Behavior,
    pub version: Option<String>,
    pub calls: AtomicUsize,
}

impl MockExecution {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            version: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn with_version(behavior: Behavior, version: &str) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            version: Some(version.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionProvider for MockExecution {
    async fn explain(&self, _sql: &str) -> Result<Vec<ExplainRow>, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Plan(rows) => Ok(rows.clone()),
            Behavior::Fail(err) => Err(err.clone()),
            Behavior::Hang(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Vec::new())
            }
        }
    }

    async fn server_version(&self) -> Result<Option<String>, ExecutionError> {
        Ok(self.version.clone())
    }
}
