//! Index recommendation.
//!
//! Per table: gather the key columns the query can seek on, order them
//! equality-first, score a few candidate key sequences and keep the best
//! ones that are not prefixes of each other or of existing indexes.

use serde::Serialize;
use std::cmp::Ordering;
use tracing::debug;
use turboindex_parser::{quote_ident, Dialect};

use crate::config::AnalysisConfig;
use crate::estimate::{combine_and, estimate, estimate_kind, Confidence};
use crate::extract::{Clause, ColumnSide, ExtractedQuery, Operand, OperatorClass, PredicateKind};
use crate::stats::{table_key, IndexDef, StatsSnapshot, TableStats};

// ============================================================================
// Core Types
// ============================================================================

/// Why a column is part of an index key. Ordered by key position preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyRole {
    Equality,
    Join,
    InList,
    Range,
    Sort,
    Covering,
}

impl KeyRole {
    fn is_point(&self) -> bool {
        matches!(self, KeyRole::Equality | KeyRole::Join | KeyRole::InList)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyPart {
    /// Column name, or `(expression)` for a functional key part.
    pub column: String,
    pub role: KeyRole,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexCandidate {
    pub table: String,
    pub name: String,
    pub key_parts: Vec<KeyPart>,
    /// Predicates the index can seek on through its leftmost prefix.
    pub covers: Vec<String>,
    /// Combined selectivity of `covers`.
    pub selectivity: f64,
    pub score: f64,
    /// Maintenance cost charged against the score.
    pub write_penalty: f64,
    pub satisfies_order: bool,
    pub covering: bool,
    /// Existing non-unique indexes this one makes redundant.
    pub supersedes: Vec<String>,
    pub create_statement: String,
    pub reason: String,
    pub confidence: Confidence,
}

impl IndexCandidate {
    pub fn columns(&self) -> Vec<&str> {
        self.key_parts.iter().map(|p| p.column.as_str()).collect()
    }
}

/// Candidates for one table, best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRecommendation {
    pub table: String,
    pub candidates: Vec<IndexCandidate>,
    pub existing: Vec<IndexDef>,
}

// ============================================================================
// Key columns
// ============================================================================

/// A column (or expression) the query can seek on.
#[derive(Debug, Clone)]
struct KeyColumn {
    column: String,
    role: KeyRole,
    selectivity: f64,
    confidence: Confidence,
    covers: Vec<String>,
}

fn role_of(class: OperatorClass) -> Option<KeyRole> {
    match class {
        OperatorClass::Equality => Some(KeyRole::Equality),
        OperatorClass::InList => Some(KeyRole::InList),
        OperatorClass::Range | OperatorClass::LikePrefix => Some(KeyRole::Range),
        _ => None,
    }
}

fn merge_key(keys: &mut Vec<KeyColumn>, key: KeyColumn) {
    match keys.iter_mut().find(|k| k.column.eq_ignore_ascii_case(&key.column)) {
        Some(existing) => {
            existing.role = existing.role.min(key.role);
            existing.selectivity *= key.selectivity;
            existing.confidence = existing.confidence.worst(key.confidence);
            existing.covers.extend(key.covers);
        }
        None => keys.push(key),
    }
}

fn side_text(side: &ColumnSide) -> String {
    format!("{}.{}", side.table, side.column)
}

fn key_columns(
    table: &str,
    extracted: &ExtractedQuery,
    stats: Option<&TableStats>,
    functional: bool,
) -> Vec<KeyColumn> {
    let mut keys = Vec::new();
    for predicate in extracted.predicates_for(table) {
        if predicate.clause == Clause::Having || predicate.disjunctive || !predicate.restricts_rows {
            continue;
        }
        let (column, class) = match &predicate.kind {
            PredicateKind::FunctionWrapped { expression, comparison } if functional => {
                (format!("({})", expression), *comparison)
            }
            _ if !predicate.sargable => continue,
            kind => (predicate.column.clone(), kind.class()),
        };
        let Some(role) = role_of(class) else {
            continue;
        };
        let estimate = estimate(predicate, stats);
        merge_key(
            &mut keys,
            KeyColumn {
                column,
                role,
                selectivity: estimate.selectivity,
                confidence: estimate.confidence,
                covers: vec![predicate.text.clone()],
            },
        );
    }

    for join in extracted.joins_for(table) {
        if table_key(&join.probe.table) != table_key(table) {
            continue;
        }
        let column_stats = stats.and_then(|s| s.column(&join.probe.column));
        let estimate = estimate_kind(&PredicateKind::Equals(Operand::Param), column_stats);
        merge_key(
            &mut keys,
            KeyColumn {
                column: join.probe.column.clone(),
                role: KeyRole::Join,
                selectivity: estimate.selectivity,
                confidence: estimate.confidence,
                covers: vec![format!("{} = {}", side_text(&join.left), side_text(&join.right))],
            },
        );
    }
    keys
}

fn by_selectivity(a: &KeyColumn, b: &KeyColumn) -> Ordering {
    a.selectivity
        .partial_cmp(&b.selectivity)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.column.to_ascii_lowercase().cmp(&b.column.to_ascii_lowercase()))
}

/// Point lookups (plain equalities before IN lists, most selective first),
/// then the single most selective range.
fn filter_key(keys: &[KeyColumn]) -> Vec<&KeyColumn> {
    let mut points: Vec<&KeyColumn> = keys.iter().filter(|k| k.role != KeyRole::Range).collect();
    points.sort_by(|a, b| {
        (a.role == KeyRole::InList)
            .cmp(&(b.role == KeyRole::InList))
            .then_with(|| by_selectivity(a, b))
    });
    let range = keys
        .iter()
        .filter(|k| k.role == KeyRole::Range)
        .min_by(|a, b| by_selectivity(a, b));
    points.extend(range);
    points
}

// ============================================================================
// Candidate construction
// ============================================================================

struct TableContext<'a> {
    table: &'a str,
    keys: &'a [KeyColumn],
    config: &'a AnalysisConfig,
    dialect: Dialect,
    /// ORDER BY (or GROUP BY) columns of this table, when every item is one.
    sort: Vec<(String, bool)>,
    /// Every column the query reads from this table, when known.
    referenced: Option<Vec<String>>,
}

impl<'a> TableContext<'a> {
    fn new(
        table: &'a str,
        keys: &'a [KeyColumn],
        extracted: &'a ExtractedQuery,
        config: &'a AnalysisConfig,
        dialect: Dialect,
    ) -> Self {
        let of_table = |uses: &[crate::extract::ColumnUse], complete: bool| -> Option<Vec<(String, bool)>> {
            if !complete || uses.is_empty() || uses.iter().any(|u| table_key(&u.table) != table_key(table)) {
                return None;
            }
            Some(uses.iter().map(|u| (u.column.clone(), u.descending)).collect())
        };
        let sort = of_table(&extracted.order_by, extracted.order_by_complete)
            .or_else(|| of_table(&extracted.group_by, extracted.group_by_complete))
            .map(|columns| Self::normalize_directions(columns, dialect))
            .unwrap_or_default();

        let referenced = (!extracted.select_star && extracted.unresolved.is_empty())
            .then(|| extracted.referenced.get(&table_key(table)))
            .flatten()
            .map(|columns| columns.iter().cloned().collect());

        Self {
            table,
            keys,
            config,
            dialect,
            sort,
            referenced,
        }
    }

    /// A uniformly descending order is served by a backward scan; mixed
    /// directions need descending key parts.
    fn normalize_directions(columns: Vec<(String, bool)>, dialect: Dialect) -> Vec<(String, bool)> {
        let descending = columns.iter().filter(|(_, d)| *d).count();
        if descending == 0 || descending == columns.len() {
            columns.into_iter().map(|(c, _)| (c, false)).collect()
        } else if dialect.supports_descending_indexes() {
            columns
        } else {
            Vec::new()
        }
    }

    fn key(&self, column: &str) -> Option<&KeyColumn> {
        self.keys.iter().find(|k| k.column.eq_ignore_ascii_case(column))
    }

    /// Candidate key sequences worth scoring, deduplicated.
    fn sequences(&self) -> Vec<Vec<KeyPart>> {
        let cap = self.config.max_index_columns.max(1);
        let filter: Vec<KeyPart> = filter_key(self.keys)
            .into_iter()
            .map(|k| KeyPart {
                column: k.column.clone(),
                role: k.role,
                descending: false,
            })
            .collect();

        let mut full = filter.clone();
        if !full.iter().any(|p| p.role == KeyRole::Range) {
            for (column, descending) in &self.sort {
                if !contains(&full, column) {
                    full.push(KeyPart {
                        column: column.clone(),
                        role: KeyRole::Sort,
                        descending: *descending,
                    });
                }
            }
        }
        if let Some(referenced) = &self.referenced {
            let missing: Vec<&String> = referenced.iter().filter(|c| !contains(&full, c)).collect();
            if full.len() + missing.len() <= cap {
                full.extend(missing.into_iter().map(|column| KeyPart {
                    column: column.clone(),
                    role: KeyRole::Covering,
                    descending: false,
                }));
            }
        }

        let mut sequences = vec![full, filter.clone()];
        let points = filter.iter().take_while(|p| p.role.is_point()).count();
        if points > 0 && points < filter.len() {
            sequences.push(filter[..points].to_vec());
        }
        for part in filter.iter().skip(1) {
            sequences.push(vec![part.clone()]);
        }

        let mut out: Vec<Vec<KeyPart>> = Vec::new();
        for mut sequence in sequences {
            sequence.truncate(cap);
            if !sequence.is_empty() && !out.iter().any(|s| same_columns(s, &sequence)) {
                out.push(sequence);
            }
        }
        out
    }

    fn satisfies_order(&self, parts: &[KeyPart]) -> bool {
        if self.sort.is_empty() {
            return false;
        }
        let rest: Vec<&KeyPart> = parts
            .iter()
            .skip_while(|p| matches!(p.role, KeyRole::Equality | KeyRole::Join))
            .collect();
        // equality-bound sort columns are constant and can be skipped
        let wanted: Vec<&(String, bool)> = self
            .sort
            .iter()
            .filter(|(c, _)| !self.key(c).is_some_and(|k| matches!(k.role, KeyRole::Equality)))
            .collect();
        wanted.len() <= rest.len()
            && wanted
                .iter()
                .zip(&rest)
                .all(|((column, descending), part)| part.column.eq_ignore_ascii_case(column) && part.descending == *descending)
    }

    fn is_covering(&self, parts: &[KeyPart]) -> bool {
        self.referenced
            .as_ref()
            .is_some_and(|columns| !columns.is_empty() && columns.iter().all(|c| contains(parts, c)))
    }

    fn candidate(&self, parts: Vec<KeyPart>) -> IndexCandidate {
        let mut selectivities = Vec::new();
        let mut covers = Vec::new();
        let mut confidence = Confidence::Statistics;
        for part in &parts {
            let Some(key) = self.key(&part.column).filter(|_| part.role <= KeyRole::Range) else {
                break;
            };
            selectivities.push(key.selectivity);
            covers.extend(key.covers.iter().cloned());
            confidence = confidence.worst(key.confidence);
            if key.role == KeyRole::Range {
                break;
            }
        }
        let selectivity = combine_and(selectivities.iter().copied(), self.config.selectivity_floor);
        let satisfies_order = self.satisfies_order(&parts);
        let covering = self.is_covering(&parts);

        let write_penalty = self.config.column_penalty * parts.len() as f64;
        let mut score = (1.0 - selectivity) * self.config.query_frequency - write_penalty;
        if satisfies_order {
            score += self.config.sort_bonus;
        }
        if covering {
            score += self.config.covering_bonus;
        }

        IndexCandidate {
            table: self.table.to_string(),
            name: String::new(),
            reason: reason(&parts, satisfies_order, covering),
            key_parts: parts,
            covers,
            selectivity,
            score,
            write_penalty,
            satisfies_order,
            covering,
            supersedes: Vec::new(),
            create_statement: String::new(),
            confidence,
        }
    }
}

fn contains(parts: &[KeyPart], column: &str) -> bool {
    parts.iter().any(|p| p.column.eq_ignore_ascii_case(column))
}

fn same_columns(a: &[KeyPart], b: &[KeyPart]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.column.eq_ignore_ascii_case(&y.column))
}

/// `prefix` is a (not necessarily strict) leftmost prefix of `of`.
fn is_prefix<A: AsRef<str>, B: AsRef<str>>(prefix: &[A], of: &[B]) -> bool {
    prefix.len() <= of.len()
        && prefix
            .iter()
            .zip(of)
            .all(|(a, b)| a.as_ref().eq_ignore_ascii_case(b.as_ref()))
}

fn reason(parts: &[KeyPart], satisfies_order: bool, covering: bool) -> String {
    let mut segments = Vec::new();
    for (role, label) in [
        (KeyRole::Equality, "equality on"),
        (KeyRole::Join, "join lookup on"),
        (KeyRole::InList, "IN list on"),
        (KeyRole::Range, "range on"),
    ] {
        let columns: Vec<&str> = parts.iter().filter(|p| p.role == role).map(|p| p.column.as_str()).collect();
        if !columns.is_empty() {
            segments.push(format!("{} {}", label, columns.join(", ")));
        }
    }
    if satisfies_order {
        segments.push("avoids a filesort".to_string());
    }
    if covering {
        segments.push("covers every column read".to_string());
    }
    segments.join("; ")
}

// ============================================================================
// Naming and DDL
// ============================================================================

fn bare_table(table: &str) -> &str {
    table.rsplit('.').next().unwrap_or(table)
}

fn name_segment(column: &str) -> String {
    let cleaned: String = column
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    cleaned
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// `idx_<table>_<cols>`, at most 64 characters and unused by `taken`.
pub fn generate_index_name(table: &str, columns: &[&str], taken: &[String]) -> String {
    let mut base = format!(
        "idx_{}_{}",
        name_segment(bare_table(table)),
        columns.iter().map(|c| name_segment(c)).collect::<Vec<_>>().join("_")
    );
    base.truncate(60);
    let mut name = base.clone();
    let mut suffix = 2;
    while taken.iter().any(|t| t.eq_ignore_ascii_case(&name)) {
        name = format!("{}_{}", base, suffix);
        suffix += 1;
    }
    name
}

pub fn create_index_statement(table: &str, name: &str, parts: &[KeyPart], dialect: Dialect) -> String {
    let syntax = dialect.index_syntax();
    let table = table
        .split('.')
        .map(|part| quote_ident(part).into_owned())
        .collect::<Vec<_>>()
        .join(".");
    let key = parts
        .iter()
        .map(|part| {
            let column = if part.column.starts_with('(') {
                part.column.clone()
            } else {
                quote_ident(&part.column).into_owned()
            };
            if part.descending && syntax.descending_supported {
                format!("{} DESC", column)
            } else {
                column
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE INDEX {}{} ON {} ({});",
        if syntax.if_not_exists_supported { "IF NOT EXISTS " } else { "" },
        quote_ident(name),
        table,
        key
    )
}

// ============================================================================
// Entry point
// ============================================================================

/// Recommend indexes for every table of `extracted`, in FROM order.
pub fn recommend(
    extracted: &ExtractedQuery,
    snapshot: &StatsSnapshot,
    config: &AnalysisConfig,
    dialect: Dialect,
) -> Vec<TableRecommendation> {
    let functional = config.functional_indexes && dialect.supports_functional_indexes();
    extracted
        .table_names()
        .into_iter()
        .map(|table| {
            let existing = snapshot.indexes(&table).to_vec();
            let keys = key_columns(&table, extracted, snapshot.get(&table), functional);
            let mut candidates = if keys.is_empty() {
                Vec::new()
            } else {
                let cx = TableContext::new(&table, &keys, extracted, config, dialect);
                select_candidates(&cx, &existing, snapshot.primary_key(&table))
            };
            if snapshot.is_degraded(&table) {
                for candidate in &mut candidates {
                    candidate.confidence = Confidence::Reduced;
                }
            }
            debug!(table = %table, keys = keys.len(), candidates = candidates.len(), "index recommendation");
            TableRecommendation {
                table,
                candidates,
                existing,
            }
        })
        .collect()
}

/// An existing index already serves `parts` when the seek and sort part of
/// the key is its leftmost prefix and it stores every covering column.
fn served_by(parts: &[KeyPart], stored: &[String]) -> bool {
    let seek: Vec<&str> = parts
        .iter()
        .filter(|p| p.role != KeyRole::Covering)
        .map(|p| p.column.as_str())
        .collect();
    is_prefix(&seek, stored)
        && parts
            .iter()
            .filter(|p| p.role == KeyRole::Covering)
            .all(|p| stored.iter().any(|c| c.eq_ignore_ascii_case(&p.column)))
}

fn select_candidates(
    cx: &TableContext<'_>,
    existing: &[IndexDef],
    primary: Option<&IndexDef>,
) -> Vec<IndexCandidate> {
    let mut scored: Vec<IndexCandidate> = cx
        .sequences()
        .into_iter()
        .map(|parts| cx.candidate(parts))
        .filter(|c| c.score > 0.0)
        .collect();
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.key_parts.len().cmp(&b.key_parts.len()))
            .then_with(|| {
                let lower = |c: &IndexCandidate| c.columns().iter().map(|s| s.to_ascii_lowercase()).collect::<Vec<_>>();
                lower(a).cmp(&lower(b))
            })
    });

    let stored: Vec<Vec<String>> = existing.iter().map(|e| e.stored_columns(primary)).collect();
    let mut taken: Vec<String> = existing.iter().map(|e| e.name.clone()).collect();
    let mut accepted: Vec<IndexCandidate> = Vec::new();
    for mut candidate in scored {
        let columns: Vec<String> = candidate.columns().into_iter().map(str::to_owned).collect();
        if stored.iter().any(|s| is_prefix(&columns, s) || served_by(&candidate.key_parts, s)) {
            continue;
        }
        if accepted
            .iter()
            .any(|a| is_prefix(&columns, &a.columns()) || is_prefix(&a.columns(), &columns))
        {
            continue;
        }
        candidate.supersedes = existing
            .iter()
            .filter(|e| !e.unique && e.columns.len() < columns.len() && is_prefix(&e.columns, &columns))
            .map(|e| e.name.clone())
            .collect();
        let column_refs: Vec<&str> = columns.iter().map(String::as_str).collect();
        candidate.name = generate_index_name(cx.table, &column_refs, &taken);
        candidate.create_statement =
            create_index_statement(cx.table, &candidate.name, &candidate.key_parts, cx.dialect);
        taken.push(candidate.name.clone());
        accepted.push(candidate);
        if accepted.len() >= cx.config.top_k {
            break;
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_with_columns;
    use crate::stats::ColumnStats;
    use pretty_assertions::assert_eq;
    use turboindex_parser::parse;

    fn recommend_sql(sql: &str, snapshot: &StatsSnapshot, config: &AnalysisConfig) -> Vec<TableRecommendation> {
        let query = parse(sql, config.dialect().unwrap()).unwrap();
        let extracted = extract_with_columns(&query, &snapshot.column_lists());
        recommend(&extracted, snapshot, config, query.dialect)
    }

    fn columns(candidate: &IndexCandidate) -> Vec<&str> {
        candidate.columns()
    }

    #[test]
    fn test_single_equality_without_statistics() {
        let out = recommend_sql(
            "SELECT * FROM orders WHERE customer_id = 123",
            &StatsSnapshot::offline(),
            &AnalysisConfig::default(),
        );
        assert_eq!(out.len(), 1);
        let top = &out[0].candidates[0];
        assert_eq!(columns(top), vec!["customer_id"]);
        assert_eq!(top.name, "idx_orders_customer_id");
        assert_eq!(top.create_statement, "CREATE INDEX idx_orders_customer_id ON orders (customer_id);");
        assert_eq!(top.confidence, Confidence::Heuristic);
        assert!((top.score - (0.9 - 0.02)).abs() < 1e-9);
    }

    #[test]
    fn test_no_predicates_no_candidates() {
        let out = recommend_sql("SELECT id FROM orders ORDER BY id", &StatsSnapshot::offline(), &AnalysisConfig::default());
        assert!(out[0].candidates.is_empty());
    }

    #[test]
    fn test_equality_first_then_in_then_range() {
        let snapshot = StatsSnapshot::from_tables([TableStats::new("orders", 100_000)
            .with_column(ColumnStats::new("status").with_distinct(5))
            .with_column(ColumnStats::new("region"))
            .with_column(ColumnStats::new("created"))]);
        let out = recommend_sql(
            "SELECT * FROM orders WHERE created > '2024-01-01' AND region IN ('eu', 'us') AND status = 'open' ORDER BY id",
            &snapshot,
            &AnalysisConfig::default(),
        );
        let top = &out[0].candidates[0];
        assert_eq!(columns(top), vec!["status", "region", "created"]);
        assert_eq!(top.key_parts[1].role, KeyRole::InList);
        assert!(!top.satisfies_order);
        for (i, a) in out[0].candidates.iter().enumerate() {
            for b in out[0].candidates.iter().skip(i + 1) {
                assert!(!is_prefix(&a.columns(), &b.columns()));
                assert!(!is_prefix(&b.columns(), &a.columns()));
            }
        }
    }

    #[test]
    fn test_marginal_range_column_is_not_worth_its_penalty() {
        let snapshot = StatsSnapshot::from_tables([TableStats::new("orders", 100_000)
            .with_column(ColumnStats::new("customer_id").with_distinct(10_000))
            .with_column(ColumnStats::new("created"))]);
        let out = recommend_sql(
            "SELECT * FROM orders WHERE created > '2024-01-01' AND customer_id = 7",
            &snapshot,
            &AnalysisConfig::default(),
        );
        assert_eq!(columns(&out[0].candidates[0]), vec!["customer_id"]);
        assert_eq!(columns(&out[0].candidates[1]), vec!["created"]);
    }

    #[test]
    fn test_order_by_and_covering_bonus() {
        let out = recommend_sql(
            "SELECT id FROM orders WHERE status = 'open' ORDER BY created",
            &StatsSnapshot::offline(),
            &AnalysisConfig::default(),
        );
        let top = &out[0].candidates[0];
        assert_eq!(columns(top), vec!["status", "created", "id"]);
        assert!(top.satisfies_order);
        assert!(top.covering);
        assert_eq!(top.key_parts[1].role, KeyRole::Sort);
        assert_eq!(top.key_parts[2].role, KeyRole::Covering);
    }

    #[test]
    fn test_existing_index_prefix_rules() {
        let snapshot = StatsSnapshot::from_tables([TableStats::new("orders", 1000)
            .with_index(IndexDef::new("idx_customer", &["customer_id"], false))
            .with_index(IndexDef::new("idx_status_created", &["status", "created"], false))]);
        let out = recommend_sql(
            "SELECT * FROM orders WHERE customer_id = 1 AND region = 'eu'",
            &snapshot,
            &AnalysisConfig::default(),
        );
        let top = &out[0].candidates[0];
        assert_eq!(top.supersedes, vec!["idx_customer".to_string()]);

        let out = recommend_sql("SELECT * FROM orders WHERE status = 'x'", &snapshot, &AnalysisConfig::default());
        assert!(out[0].candidates.is_empty());
    }

    #[test]
    fn test_primary_key_columns_ride_along_in_secondary_indexes() {
        let snapshot = StatsSnapshot::from_tables([TableStats::new("orders", 1000)
            .with_index(IndexDef::new("PRIMARY", &["id"], true))
            .with_index(IndexDef::new("idx_customer_created", &["customer_id", "created"], false))]);
        let out = recommend_sql(
            "SELECT id FROM orders WHERE customer_id = 7",
            &snapshot,
            &AnalysisConfig::default(),
        );
        assert!(out[0].candidates.is_empty());

        let out = recommend_sql(
            "SELECT id, total FROM orders WHERE customer_id = 7",
            &snapshot,
            &AnalysisConfig::default(),
        );
        assert!(out[0].candidates.iter().all(|c| c.columns().contains(&"total")));

        let stored = snapshot.indexes("orders")[1].stored_columns(snapshot.primary_key("orders"));
        assert_eq!(stored, vec!["customer_id", "created", "id"]);
    }

    #[test]
    fn test_join_probe_side_gets_the_index() {
        let out = recommend_sql(
            "SELECT o.id FROM customers c JOIN orders o ON o.customer_id = c.id WHERE c.country = 'NZ'",
            &StatsSnapshot::offline(),
            &AnalysisConfig::default(),
        );
        let orders = out.iter().find(|t| t.table == "orders").unwrap();
        assert_eq!(columns(&orders.candidates[0])[0], "customer_id");
        assert_eq!(orders.candidates[0].key_parts[0].role, KeyRole::Join);
        let customers = out.iter().find(|t| t.table == "customers").unwrap();
        assert_eq!(columns(&customers.candidates[0])[0], "country");
    }

    #[test]
    fn test_functional_key_part_needs_dialect_and_switch() {
        let sql = "SELECT * FROM events WHERE YEAR(created) = 2024";
        let off = recommend_sql(sql, &StatsSnapshot::offline(), &AnalysisConfig::default());
        assert!(off[0].candidates.is_empty());

        let config = AnalysisConfig::default()
            .with_dialect("mysql_8.0.13")
            .with_functional_indexes(true);
        let on = recommend_sql(sql, &StatsSnapshot::offline(), &config);
        let top = &on[0].candidates[0];
        assert_eq!(columns(top), vec!["(YEAR(created))"]);
        assert_eq!(top.create_statement, "CREATE INDEX idx_events_year_created ON events ((YEAR(created)));");
    }

    #[test]
    fn test_index_names_avoid_collisions() {
        let taken = vec!["idx_orders_a".to_string()];
        assert_eq!(generate_index_name("shop.orders", &["a"], &taken), "idx_orders_a_2");
        assert_eq!(generate_index_name("orders", &["(YEAR(created))"], &[]), "idx_orders_year_created");
    }

    #[test]
    fn test_top_k_limits_output() {
        let config = AnalysisConfig::default().with_top_k(1);
        let out = recommend_sql(
            "SELECT * FROM orders WHERE a = 1 AND b > 2",
            &StatsSnapshot::offline(),
            &config,
        );
        assert_eq!(out[0].candidates.len(), 1);
    }
}
