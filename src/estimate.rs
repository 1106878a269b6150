//! Selectivity and scan-cost estimation.
//!
//! Every function here is pure: the same predicate and statistics always
//! give the same number. Histograms win over min/max bounds, which win over
//! distinct counts, which win over the per-class defaults.

use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::extract::{BoolNode, Bound, Clause, ExtractedQuery, Operand, OperatorClass, Predicate, PredicateKind};
use crate::stats::{table_key, ColumnStats, Datum, StatsSnapshot, TableStats};

pub const EQUALITY_DEFAULT: f64 = 0.1;
pub const RANGE_DEFAULT: f64 = 0.3;
pub const LIKE_PREFIX_DEFAULT: f64 = 0.25;
pub const LIKE_WILDCARD_DEFAULT: f64 = 1.0;

/// How much an estimate can be trusted. Ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Statistics were requested but could not be obtained in time.
    Reduced,
    /// Per-class defaults only.
    Heuristic,
    /// Backed by server statistics.
    Statistics,
}

impl Confidence {
    pub fn worst(self, other: Confidence) -> Confidence {
        self.min(other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    pub selectivity: f64,
    pub confidence: Confidence,
}

impl Estimate {
    fn heuristic(selectivity: f64) -> Self {
        Self {
            selectivity: selectivity.clamp(0.0, 1.0),
            confidence: Confidence::Heuristic,
        }
    }

    fn from_stats(selectivity: f64) -> Self {
        Self {
            selectivity: selectivity.clamp(0.0, 1.0),
            confidence: Confidence::Statistics,
        }
    }
}

// ============================================================================
// Single predicates
// ============================================================================

/// Selectivity of one predicate against its table's statistics.
pub fn estimate(predicate: &Predicate, stats: Option<&TableStats>) -> Estimate {
    let column = stats.and_then(|t| t.column(&predicate.column));
    estimate_kind(&predicate.kind, column)
}

pub fn estimate_kind(kind: &PredicateKind, column: Option<&ColumnStats>) -> Estimate {
    match kind {
        PredicateKind::Equals(value) => equality(value, column),
        PredicateKind::IsNull => match null_fraction(column) {
            Some(fraction) => Estimate::from_stats(fraction),
            None => Estimate::heuristic(EQUALITY_DEFAULT),
        },
        PredicateKind::IsNotNull => match null_fraction(column) {
            Some(fraction) => Estimate::from_stats(1.0 - fraction),
            None => Estimate::heuristic(1.0 - EQUALITY_DEFAULT),
        },
        PredicateKind::Range { lower, upper } => range(lower.as_ref(), upper.as_ref(), column),
        PredicateKind::InList(values) => in_list(values, column),
        PredicateKind::LikePrefix { prefix, pattern } if prefix == pattern => {
            equality(&Operand::Value(Datum::Text(pattern.clone())), column)
        }
        PredicateKind::LikePrefix { .. } => Estimate::heuristic(LIKE_PREFIX_DEFAULT),
        PredicateKind::LikeWildcard { .. } => Estimate::heuristic(LIKE_WILDCARD_DEFAULT),
        PredicateKind::NotEquals(Operand::Null) => Estimate::heuristic(0.0),
        PredicateKind::NotEquals(value) => complement(equality(value, column)),
        PredicateKind::NotIn(values) => complement(in_list(values, column)),
        PredicateKind::NotLike => Estimate::heuristic(1.0 - LIKE_PREFIX_DEFAULT),
        PredicateKind::NotBetween => Estimate::heuristic(1.0 - RANGE_DEFAULT * RANGE_DEFAULT),
        PredicateKind::FunctionWrapped { comparison, .. } => Estimate::heuristic(class_default(*comparison)),
    }
}

/// Default selectivity of an operator class when nothing else is known.
pub fn class_default(class: OperatorClass) -> f64 {
    match class {
        OperatorClass::Equality | OperatorClass::InList => EQUALITY_DEFAULT,
        OperatorClass::Range => RANGE_DEFAULT,
        OperatorClass::LikePrefix => LIKE_PREFIX_DEFAULT,
        OperatorClass::LikeWildcard => LIKE_WILDCARD_DEFAULT,
        OperatorClass::FunctionWrapped => RANGE_DEFAULT,
        OperatorClass::Inequality => 1.0 - EQUALITY_DEFAULT,
    }
}

fn complement(estimate: Estimate) -> Estimate {
    Estimate {
        selectivity: (1.0 - estimate.selectivity).clamp(0.0, 1.0),
        confidence: estimate.confidence,
    }
}

fn null_fraction(column: Option<&ColumnStats>) -> Option<f64> {
    let column = column?;
    column
        .null_fraction
        .or_else(|| column.histogram.as_ref().map(|h| h.null_fraction))
}

fn equality(value: &Operand, column: Option<&ColumnStats>) -> Estimate {
    // `c = NULL` is never true.
    if *value == Operand::Null {
        return Estimate::from_stats(0.0);
    }
    let Some(column) = column else {
        return Estimate::heuristic(EQUALITY_DEFAULT);
    };
    if let (Operand::Value(datum), Some(histogram)) = (value, &column.histogram) {
        if let Some(fraction) = histogram.equality_fraction(datum) {
            return Estimate::from_stats(fraction);
        }
    }
    match column.distinct {
        Some(distinct) if distinct > 0 => Estimate::from_stats(1.0 / distinct as f64),
        _ => Estimate::heuristic(EQUALITY_DEFAULT),
    }
}

fn in_list(values: &[Operand], column: Option<&ColumnStats>) -> Estimate {
    let mut distinct: Vec<&Operand> = Vec::new();
    for value in values {
        if !distinct.contains(&value) {
            distinct.push(value);
        }
    }
    let mut total = 0.0;
    let mut confidence = Confidence::Statistics;
    for value in distinct {
        let single = equality(value, column);
        total += single.selectivity;
        confidence = confidence.worst(single.confidence);
    }
    Estimate {
        selectivity: total.min(1.0),
        confidence,
    }
}

/// `Some(None)` for an open side, `Some(Some(v))` for a numeric literal and
/// `None` when the bound is a placeholder, expression or non-numeric value.
fn bound_value(bound: Option<&Bound>) -> Option<Option<f64>> {
    match bound {
        None => Some(None),
        Some(Bound {
            value: Operand::Value(datum),
            ..
        }) => datum.as_f64().map(Some),
        Some(_) => None,
    }
}

/// Sides the value of which is unknown are estimated as open and then scaled
/// by [`RANGE_DEFAULT`] each, so adding or narrowing a bound never raises
/// the estimate.
fn range(lower: Option<&Bound>, upper: Option<&Bound>, column: Option<&ColumnStats>) -> Estimate {
    let (low, high) = (bound_value(lower), bound_value(upper));
    let unknown = low.is_none() as i32 + high.is_none() as i32;
    let (low, high) = (low.flatten(), high.flatten());
    if let (Some(l), Some(h)) = (low, high) {
        if l > h {
            return Estimate::heuristic(0.0);
        }
    }

    let known = known_range(low, high, column);
    if unknown == 0 {
        return known;
    }
    Estimate {
        selectivity: known.selectivity * range_default(unknown),
        confidence: known.confidence.worst(Confidence::Heuristic),
    }
}

/// Fraction of rows inside `[low, high]`, a missing side being open.
fn known_range(low: Option<f64>, high: Option<f64>, column: Option<&ColumnStats>) -> Estimate {
    let sides = low.is_some() as i32 + high.is_some() as i32;
    if sides == 0 {
        return Estimate::heuristic(1.0);
    }

    if let Some(column) = column {
        if let Some(histogram) = &column.histogram {
            if let Some(fraction) = histogram.range_fraction(low, high) {
                return Estimate::from_stats(fraction);
            }
        }
        let bounds = (
            column.min.as_ref().and_then(Datum::as_f64),
            column.max.as_ref().and_then(Datum::as_f64),
        );
        if let (Some(min), Some(max)) = bounds {
            if max > min {
                let from = low.unwrap_or(min).max(min);
                let to = high.unwrap_or(max).min(max);
                let fraction = if to < from { 0.0 } else { (to - from) / (max - min) };
                let non_null = 1.0 - column.null_fraction.unwrap_or(0.0);
                return Estimate::from_stats(fraction * non_null);
            }
        }
    }
    Estimate::heuristic(range_default(sides))
}

/// [`RANGE_DEFAULT`] once per bounded side.
fn range_default(sides: i32) -> f64 {
    match sides {
        0 => 1.0,
        1 => RANGE_DEFAULT,
        _ => RANGE_DEFAULT * RANGE_DEFAULT,
    }
}

// ============================================================================
// Boolean structure
// ============================================================================

/// Product of conjunct selectivities, clamped to `floor`.
pub fn combine_and(selectivities: impl IntoIterator<Item = f64>, floor: f64) -> f64 {
    let product: f64 = selectivities.into_iter().product();
    product.clamp(floor, 1.0)
}

/// Inclusion-exclusion upper bound: the sum, clamped to 1.
pub fn combine_or(selectivities: impl IntoIterator<Item = f64>) -> f64 {
    selectivities.into_iter().sum::<f64>().clamp(0.0, 1.0)
}

/// Selectivity of a filter tree. With `table` set, leaves on other tables
/// and ON conditions that do not restrict `table` count as 1.
pub fn estimate_node(
    node: &BoolNode,
    extracted: &ExtractedQuery,
    snapshot: &StatsSnapshot,
    table: Option<&str>,
    floor: f64,
) -> Estimate {
    match node {
        BoolNode::And(children) => {
            let parts: Vec<Estimate> = children
                .iter()
                .map(|c| estimate_node(c, extracted, snapshot, table, floor))
                .collect();
            Estimate {
                selectivity: combine_and(parts.iter().map(|e| e.selectivity), floor),
                confidence: worst_of(&parts),
            }
        }
        BoolNode::Or(children) => {
            let parts: Vec<Estimate> = children
                .iter()
                .map(|c| estimate_node(c, extracted, snapshot, table, floor))
                .collect();
            Estimate {
                selectivity: combine_or(parts.iter().map(|e| e.selectivity)),
                confidence: worst_of(&parts),
            }
        }
        BoolNode::Not(inner) => complement(estimate_node(inner, extracted, snapshot, table, floor)),
        BoolNode::Predicate(index) => {
            let Some(predicate) = extracted.predicates.get(*index) else {
                return Estimate::heuristic(1.0);
            };
            let foreign = table.is_some_and(|t| table_key(t) != table_key(&predicate.table));
            if foreign || !predicate.restricts_rows {
                return Estimate::from_stats(1.0);
            }
            estimate(predicate, snapshot.get(&predicate.table))
        }
        BoolNode::Constant(value) => Estimate::from_stats(if *value { 1.0 } else { 0.0 }),
        BoolNode::Join(_) | BoolNode::Opaque(_) => Estimate::from_stats(1.0),
    }
}

fn worst_of(parts: &[Estimate]) -> Confidence {
    parts
        .iter()
        .map(|e| e.confidence)
        .min()
        .unwrap_or(Confidence::Statistics)
}

// ============================================================================
// Scan cost
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableCost {
    pub table: String,
    pub rows: f64,
    pub selectivity: f64,
    /// Rows read: `rows × selectivity`.
    pub cost: f64,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub total: f64,
    pub tables: Vec<TableCost>,
    pub confidence: Confidence,
}

/// Σ over tables of row count × access selectivity. Used to compare a query
/// with its rewritten form.
pub fn scan_cost(extracted: &ExtractedQuery, snapshot: &StatsSnapshot, config: &AnalysisConfig) -> CostEstimate {
    let mut tables = Vec::new();
    for table in extracted.table_names() {
        let stats = snapshot.get(&table);
        let rows = stats.map(|s| s.row_count).unwrap_or(config.default_row_count) as f64;

        let parts: Vec<Estimate> = extracted
            .filters
            .iter()
            .filter(|f| f.clause != Clause::Having)
            .map(|f| estimate_node(&f.root, extracted, snapshot, Some(&table), config.selectivity_floor))
            .collect();
        let selectivity = if parts.is_empty() {
            1.0
        } else {
            combine_and(parts.iter().map(|e| e.selectivity), config.selectivity_floor)
        };

        let confidence = if snapshot.is_degraded(&table) {
            Confidence::Reduced
        } else if stats.is_none() {
            Confidence::Heuristic
        } else {
            worst_of(&parts).max(Confidence::Heuristic)
        };

        tables.push(TableCost {
            table,
            rows,
            selectivity,
            cost: rows * selectivity,
            confidence,
        });
    }

    let total = tables.iter().map(|t| t.cost).sum();
    let confidence = tables
        .iter()
        .map(|t| t.confidence)
        .min()
        .unwrap_or(if snapshot.degradations().is_empty() {
            Confidence::Heuristic
        } else {
            Confidence::Reduced
        });
    CostEstimate {
        total,
        tables,
        confidence,
    }
}
