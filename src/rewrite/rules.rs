//! Rewrite rule catalog.
//!
//! Every rule is a pair of plain functions: `matches` reports whether the
//! node (or statement) qualifies and at which safety level, `produce` builds
//! the replacement. Rules are tried in catalog order.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::str::FromStr;
use turboindex_parser::{
    expr_to_sql, BinaryOp, ColumnRef, Expr, ExprArena, ExprId, FunctionArgs, Literal, Select,
    SelectItem, TableFactor, TemporalKind, UnaryOp,
};

use super::{RewriteClause, RuleContext, Safety};
use crate::stats::TypeFamily;

// ============================================================================
// Rule definitions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    /// Any node inside a filter tree.
    Anywhere,
    /// Only nodes reachable from the filter root through AND/OR.
    FilterOnly,
}

/// Replacement for one expression node.
pub struct Production {
    pub replacement: ExprId,
    pub rationale: String,
}

/// Replacement for the whole statement body.
pub struct StatementProduction {
    pub select: Select,
    pub clause: RewriteClause,
    pub original: String,
    pub rewritten: String,
    pub rationale: String,
}

pub type ExprMatch = fn(&RuleContext<'_>, &ExprArena, ExprId) -> Option<Safety>;
pub type ExprProduce = fn(&RuleContext<'_>, &mut ExprArena, ExprId) -> Option<Production>;
pub type StatementMatch = fn(&RuleContext<'_>, &ExprArena, &Select) -> Option<Safety>;
pub type StatementProduce = fn(&RuleContext<'_>, &mut ExprArena, &Select) -> Option<StatementProduction>;

pub enum Rule {
    Expression {
        id: &'static str,
        scope: RuleScope,
        matches: ExprMatch,
        produce: ExprProduce,
    },
    Statement {
        id: &'static str,
        matches: StatementMatch,
        produce: StatementProduce,
    },
}

impl Rule {
    pub fn id(&self) -> &'static str {
        match self {
            Rule::Expression { id, .. } | Rule::Statement { id, .. } => *id,
        }
    }
}

/// All rules in priority order.
pub static CATALOG: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::Expression {
            id: "negation-normalize",
            scope: RuleScope::Anywhere,
            matches: |_, arena, id| negation(arena, id).map(|_| Safety::Safe),
            produce: produce_negation,
        },
        Rule::Expression {
            id: "null-safe-equals-null",
            scope: RuleScope::Anywhere,
            matches: |_, arena, id| null_safe_operand(arena, id).map(|_| Safety::Safe),
            produce: produce_null_safe,
        },
        Rule::Expression {
            id: "constant-fold",
            scope: RuleScope::Anywhere,
            matches: |_, arena, id| fold(arena, id).map(|_| Safety::Safe),
            produce: produce_fold,
        },
        Rule::Expression {
            id: "null-comparison",
            scope: RuleScope::Anywhere,
            matches: |_, arena, id| null_comparison(arena, id).map(|_| Safety::Aggressive),
            produce: produce_null_comparison,
        },
        Rule::Expression {
            id: "contradiction",
            scope: RuleScope::FilterOnly,
            matches: |cx, arena, id| contradiction(cx, arena, id).then_some(Safety::Safe),
            produce: produce_contradiction,
        },
        Rule::Expression {
            id: "boolean-simplify",
            scope: RuleScope::Anywhere,
            matches: |cx, arena, id| simplify(cx, arena, id).map(|_| Safety::Safe),
            produce: produce_simplify,
        },
        Rule::Expression {
            id: "dedupe-conjuncts",
            scope: RuleScope::Anywhere,
            matches: |cx, arena, id| dedupe(cx, arena, id).map(|_| Safety::Safe),
            produce: produce_dedupe,
        },
        Rule::Expression {
            id: "range-merge",
            scope: RuleScope::Anywhere,
            matches: |cx, arena, id| redundant_bound(cx, arena, id).map(|_| Safety::Safe),
            produce: produce_range_merge,
        },
        Rule::Expression {
            id: "or-to-in",
            scope: RuleScope::Anywhere,
            matches: |_, arena, id| or_group(arena, id).map(|_| Safety::Safe),
            produce: produce_or_to_in,
        },
        Rule::Expression {
            id: "in-single-to-eq",
            scope: RuleScope::Anywhere,
            matches: |_, arena, id| single_in(arena, id).map(|_| Safety::Safe),
            produce: produce_single_in,
        },
        Rule::Expression {
            id: "like-to-equals",
            scope: RuleScope::Anywhere,
            matches: |_, arena, id| plain_like(arena, id).map(|_| Safety::Aggressive),
            produce: produce_like_to_equals,
        },
        Rule::Expression {
            id: "implicit-cast-removal",
            scope: RuleScope::Anywhere,
            matches: |cx, arena, id| identity_cast(cx, arena, id).map(|_| Safety::Safe),
            produce: produce_cast_removal,
        },
        Rule::Expression {
            id: "literal-type-match",
            scope: RuleScope::Anywhere,
            matches: |cx, arena, id| numeric_string(cx, arena, id).map(|(_, _, safety)| safety),
            produce: produce_literal_type_match,
        },
        Rule::Expression {
            id: "year-to-range",
            scope: RuleScope::Anywhere,
            matches: |cx, arena, id| temporal_range(cx, arena, id).map(|range| range.safety),
            produce: produce_temporal_range,
        },
        Rule::Statement {
            id: "remove-true-where",
            matches: |_, arena, select| true_where(arena, select).then_some(Safety::Safe),
            produce: produce_remove_true_where,
        },
        Rule::Statement {
            id: "having-to-where",
            matches: |_, arena, select| movable_having(arena, select).map(|_| Safety::Aggressive),
            produce: produce_having_to_where,
        },
        Rule::Statement {
            id: "select-star-expand",
            matches: |cx, _, select| star_columns(cx, select).map(|_| Safety::Aggressive),
            produce: produce_select_star_expand,
        },
    ]
});

// ============================================================================
// Shared helpers
// ============================================================================

fn binary(arena: &mut ExprArena, op: BinaryOp, left: ExprId, right: ExprId) -> ExprId {
    arena.push(Expr::Binary { op, left, right })
}

/// Left-associative chain of `op` over `operands`.
fn chain(arena: &mut ExprArena, op: BinaryOp, operands: &[ExprId]) -> Option<ExprId> {
    let (first, rest) = operands.split_first()?;
    Some(rest.iter().fold(*first, |acc, next| binary(arena, op, acc, *next)))
}

fn flatten(arena: &ExprArena, id: ExprId, op: BinaryOp, out: &mut Vec<ExprId>) {
    match &arena[id] {
        Expr::Binary { op: inner, left, right } if *inner == op => {
            flatten(arena, *left, op, out);
            flatten(arena, *right, op, out);
        }
        _ => out.push(id),
    }
}

fn operands_of(arena: &ExprArena, id: ExprId) -> Option<(BinaryOp, Vec<ExprId>)> {
    match &arena[id] {
        Expr::Binary {
            op: op @ (BinaryOp::And | BinaryOp::Or),
            ..
        } => {
            let mut out = Vec::new();
            flatten(arena, id, *op, &mut out);
            Some((*op, out))
        }
        _ => None,
    }
}

/// Evaluates to 0, 1 or NULL.
pub(crate) fn is_boolean_valued(arena: &ExprArena, id: ExprId) -> bool {
    match &arena[id] {
        Expr::Binary { op, .. } => {
            op.is_comparison() || matches!(op, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::Regexp)
        }
        Expr::Unary { op: UnaryOp::Not, .. }
        | Expr::IsNull { .. }
        | Expr::InList { .. }
        | Expr::Between { .. }
        | Expr::Like { .. } => true,
        Expr::Literal(Literal::Boolean(_) | Literal::Null) => true,
        _ => false,
    }
}

fn is_null(arena: &ExprArena, id: ExprId) -> bool {
    matches!(arena.as_literal(id), Some(Literal::Null))
}

fn boolean_literal(arena: &ExprArena, id: ExprId) -> Option<bool> {
    match arena.as_literal(id) {
        Some(Literal::Boolean(value)) => Some(*value),
        _ => None,
    }
}

fn decimal_of(literal: &Literal) -> Option<Decimal> {
    match literal {
        Literal::Number(text) => Decimal::from_str(text)
            .or_else(|_| Decimal::from_scientific(text))
            .ok(),
        Literal::Boolean(true) => Some(Decimal::ONE),
        Literal::Boolean(false) => Some(Decimal::ZERO),
        _ => None,
    }
}

fn same_column(a: &ColumnRef, b: &ColumnRef) -> bool {
    a.name.matches(b.name.as_str())
        && match (&a.qualifier, &b.qualifier) {
            (Some(x), Some(y)) => x.matches(y.as_str()),
            (None, None) => true,
            _ => false,
        }
}

fn compare(op: BinaryOp, ordering: Ordering) -> Option<bool> {
    Some(match op {
        BinaryOp::Eq | BinaryOp::NullSafeEq => ordering == Ordering::Equal,
        BinaryOp::NotEq => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::LtEq => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::GtEq => ordering != Ordering::Less,
        _ => return None,
    })
}

/// `column op literal` with the column on the left, for a numeric literal.
/// Digits in the shortest exact decimal form of `value`.
fn significant_digits(value: Decimal) -> u32 {
    let mut mantissa = value.normalize().mantissa().unsigned_abs();
    let mut digits = 0;
    while mantissa > 0 {
        mantissa /= 10;
        digits += 1;
    }
    digits
}

/// A constant bound on a column that compares exactly in decimal. Integer
/// and DECIMAL columns compare exactly; anything else (DOUBLE, strings,
/// unknown types) compares in double precision, where only literals of at
/// most 15 significant digits keep their decimal order.
fn numeric_bound<'a>(
    cx: &RuleContext<'_>,
    arena: &'a ExprArena,
    id: ExprId,
) -> Option<(&'a ColumnRef, BinaryOp, Decimal)> {
    let Expr::Binary { op, left, right } = &arena[id] else {
        return None;
    };
    if !matches!(op, BinaryOp::Eq | BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq) {
        return None;
    }
    let (column, op, literal) = match (arena.as_column(*left), arena.as_column(*right)) {
        (Some(column), None) => (column, *op, arena.as_literal(*right)?),
        (None, Some(column)) => (column, op.flipped()?, arena.as_literal(*left)?),
        _ => return None,
    };
    let value = match literal {
        Literal::Number(_) => decimal_of(literal)?,
        _ => return None,
    };
    let exact = matches!(
        cx.schema.column(column).and_then(|c| c.type_family()),
        Some(TypeFamily::Integer | TypeFamily::Decimal)
    );
    (exact || significant_digits(value) <= 15).then_some((column, op, value))
}

/// Constant bounds collected for one column.
#[derive(Debug, Default)]
struct Interval {
    equal: Option<Decimal>,
    conflicting: bool,
    /// (value, strict)
    lower: Option<(Decimal, bool)>,
    upper: Option<(Decimal, bool)>,
}

impl Interval {
    fn add(&mut self, op: BinaryOp, value: Decimal) {
        match op {
            BinaryOp::Eq => match self.equal {
                Some(existing) if existing != value => self.conflicting = true,
                _ => self.equal = Some(value),
            },
            BinaryOp::Gt | BinaryOp::GtEq => {
                let strict = op == BinaryOp::Gt;
                if self.lower.map_or(true, |current| tighter_lower((value, strict), current)) {
                    self.lower = Some((value, strict));
                }
            }
            BinaryOp::Lt | BinaryOp::LtEq => {
                let strict = op == BinaryOp::Lt;
                if self.upper.map_or(true, |current| tighter_upper((value, strict), current)) {
                    self.upper = Some((value, strict));
                }
            }
            _ => {}
        }
    }

    fn admits(&self, value: Decimal) -> bool {
        let above = self.lower.map_or(true, |(low, strict)| value > low || (!strict && value == low));
        let below = self.upper.map_or(true, |(high, strict)| value < high || (!strict && value == high));
        above && below
    }

    fn is_empty(&self) -> bool {
        if self.conflicting {
            return true;
        }
        if let Some(value) = self.equal {
            return !self.admits(value);
        }
        match (self.lower, self.upper) {
            (Some((low, low_strict)), Some((high, high_strict))) => {
                low > high || (low == high && (low_strict || high_strict))
            }
            _ => false,
        }
    }
}

fn tighter_lower(candidate: (Decimal, bool), current: (Decimal, bool)) -> bool {
    candidate.0 > current.0 || (candidate.0 == current.0 && candidate.1 && !current.1)
}

fn tighter_upper(candidate: (Decimal, bool), current: (Decimal, bool)) -> bool {
    candidate.0 < current.0 || (candidate.0 == current.0 && candidate.1 && !current.1)
}

/// `a` being TRUE guarantees `b` is TRUE (both bounds on the same column).
fn implies(a: (BinaryOp, Decimal), b: (BinaryOp, Decimal)) -> bool {
    let mut interval = Interval::default();
    interval.add(a.0, a.1);
    let (op, value) = b;
    match (a.0, op) {
        (BinaryOp::Eq, _) => {
            let mut single = Interval::default();
            single.add(op, value);
            single.admits(a.1) && (op != BinaryOp::Eq || a.1 == value)
        }
        (BinaryOp::Gt | BinaryOp::GtEq, BinaryOp::Gt | BinaryOp::GtEq) => {
            let (Some(ours), strict) = (interval.lower, op == BinaryOp::Gt) else {
                return false;
            };
            ours == (value, strict) || tighter_lower(ours, (value, strict))
        }
        (BinaryOp::Lt | BinaryOp::LtEq, BinaryOp::Lt | BinaryOp::LtEq) => {
            let (Some(ours), strict) = (interval.upper, op == BinaryOp::Lt) else {
                return false;
            };
            ours == (value, strict) || tighter_upper(ours, (value, strict))
        }
        _ => false,
    }
}

// ============================================================================
// negation-normalize
// ============================================================================

enum Negation {
    Build(Expr),
    Reuse(ExprId),
}

fn negation(arena: &ExprArena, id: ExprId) -> Option<Negation> {
    let Expr::Unary {
        op: UnaryOp::Not,
        operand,
    } = &arena[id]
    else {
        return None;
    };
    Some(match &arena[*operand] {
        Expr::Binary { op, left, right } => Negation::Build(Expr::Binary {
            op: op.negated()?,
            left: *left,
            right: *right,
        }),
        Expr::IsNull { operand, negated } => Negation::Build(Expr::IsNull {
            operand: *operand,
            negated: !negated,
        }),
        Expr::InList { operand, list, negated } => Negation::Build(Expr::InList {
            operand: *operand,
            list: list.clone(),
            negated: !negated,
        }),
        Expr::Between {
            operand,
            low,
            high,
            negated,
        } => Negation::Build(Expr::Between {
            operand: *operand,
            low: *low,
            high: *high,
            negated: !negated,
        }),
        Expr::Like {
            operand,
            pattern,
            escape,
            negated,
        } => Negation::Build(Expr::Like {
            operand: *operand,
            pattern: *pattern,
            escape: *escape,
            negated: !negated,
        }),
        Expr::Unary {
            op: UnaryOp::Not,
            operand: inner,
        } if is_boolean_valued(arena, *inner) => Negation::Reuse(*inner),
        _ => return None,
    })
}

fn produce_negation(_: &RuleContext<'_>, arena: &mut ExprArena, id: ExprId) -> Option<Production> {
    let replacement = match negation(arena, id)? {
        Negation::Build(expr) => arena.push(expr),
        Negation::Reuse(inner) => inner,
    };
    Some(Production {
        replacement,
        rationale: "NOT folded into the operator it negates".to_string(),
    })
}

// ============================================================================
// null-safe-equals-null
// ============================================================================

fn null_safe_operand(arena: &ExprArena, id: ExprId) -> Option<ExprId> {
    let Expr::Binary {
        op: BinaryOp::NullSafeEq,
        left,
        right,
    } = &arena[id]
    else {
        return None;
    };
    match (is_null(arena, *left), is_null(arena, *right)) {
        (false, true) => Some(*left),
        (true, false) => Some(*right),
        _ => None,
    }
}

fn produce_null_safe(_: &RuleContext<'_>, arena: &mut ExprArena, id: ExprId) -> Option<Production> {
    let operand = null_safe_operand(arena, id)?;
    Some(Production {
        replacement: arena.push(Expr::IsNull {
            operand,
            negated: false,
        }),
        rationale: "`x <=> NULL` is exactly `x IS NULL`".to_string(),
    })
}

// ============================================================================
// constant-fold
// ============================================================================

fn fold(arena: &ExprArena, id: ExprId) -> Option<Literal> {
    match &arena[id] {
        Expr::IsNull { operand, negated } => {
            let literal = arena.as_literal(*operand)?;
            Some(Literal::Boolean((*literal == Literal::Null) != *negated))
        }
        Expr::Binary { op, left, right } if op.is_comparison() => {
            let (left, right) = (arena.as_literal(*left)?, arena.as_literal(*right)?);
            if *left == Literal::Null || *right == Literal::Null {
                return Some(if *op == BinaryOp::NullSafeEq {
                    Literal::Boolean(left == right)
                } else {
                    Literal::Null
                });
            }
            let ordering = match (left, right) {
                (Literal::String(a), Literal::String(b)) if a == b => Ordering::Equal,
                (Literal::String(_), _) | (_, Literal::String(_)) => return None,
                _ => decimal_of(left)?.cmp(&decimal_of(right)?),
            };
            compare(*op, ordering).map(Literal::Boolean)
        }
        _ => None,
    }
}

fn produce_fold(_: &RuleContext<'_>, arena: &mut ExprArena, id: ExprId) -> Option<Production> {
    let literal = fold(arena, id)?;
    Some(Production {
        replacement: arena.push(Expr::Literal(literal)),
        rationale: "comparison of constants evaluated once".to_string(),
    })
}

// ============================================================================
// null-comparison
// ============================================================================

fn null_comparison(arena: &ExprArena, id: ExprId) -> Option<(ExprId, bool)> {
    let Expr::Binary { op, left, right } = &arena[id] else {
        return None;
    };
    let negated = match op {
        BinaryOp::Eq => false,
        BinaryOp::NotEq => true,
        _ => return None,
    };
    match (is_null(arena, *left), is_null(arena, *right)) {
        (false, true) => Some((*left, negated)),
        (true, false) => Some((*right, negated)),
        _ => None,
    }
}

fn produce_null_comparison(_: &RuleContext<'_>, arena: &mut ExprArena, id: ExprId) -> Option<Production> {
    let (operand, negated) = null_comparison(arena, id)?;
    Some(Production {
        replacement: arena.push(Expr::IsNull { operand, negated }),
        rationale: "comparison with NULL never matches; assumes IS NULL / IS NOT NULL was intended"
            .to_string(),
    })
}

// ============================================================================
// contradiction
// ============================================================================

fn contradiction(cx: &RuleContext<'_>, arena: &ExprArena, id: ExprId) -> bool {
    match &arena[id] {
        Expr::Literal(Literal::Null) => true,
        Expr::Binary { op, left, right } if op.is_comparison() && *op != BinaryOp::NullSafeEq => {
            is_null(arena, *left) || is_null(arena, *right)
        }
        Expr::Binary { op: BinaryOp::And, .. } => {
            let mut conjuncts = Vec::new();
            flatten(arena, id, BinaryOp::And, &mut conjuncts);
            let mut intervals: Vec<(&ColumnRef, Interval)> = Vec::new();
            for conjunct in conjuncts {
                if boolean_literal(arena, conjunct) == Some(false) {
                    // boolean-simplify's job
                    continue;
                }
                let Some((column, op, value)) = numeric_bound(cx, arena, conjunct) else {
                    continue;
                };
                match intervals.iter_mut().find(|(c, _)| same_column(c, column)) {
                    Some((_, interval)) => interval.add(op, value),
                    None => {
                        let mut interval = Interval::default();
                        interval.add(op, value);
                        intervals.push((column, interval));
                    }
                }
            }
            intervals.iter().any(|(_, interval)| interval.is_empty())
        }
        _ => false,
    }
}

fn produce_contradiction(cx: &RuleContext<'_>, arena: &mut ExprArena, id: ExprId) -> Option<Production> {
    contradiction(cx, arena, id).then(|| Production {
        replacement: arena.push(Expr::boolean(false)),
        rationale: "condition can never be TRUE".to_string(),
    })
}

// ============================================================================
// boolean-simplify
// ============================================================================

enum Simplified {
    Constant(bool),
    Keep(ExprId),
}

fn simplify(cx: &RuleContext<'_>, arena: &ExprArena, id: ExprId) -> Option<Simplified> {
    match &arena[id] {
        Expr::Unary {
            op: UnaryOp::Not,
            operand,
        } => boolean_literal(arena, *operand).map(|value| Simplified::Constant(!value)),
        Expr::Binary {
            op: op @ (BinaryOp::And | BinaryOp::Or),
            left,
            right,
        } => {
            let (literal, other) = match (boolean_literal(arena, *left), boolean_literal(arena, *right)) {
                (Some(value), _) => (value, *right),
                (None, Some(value)) => (value, *left),
                (None, None) => return None,
            };
            let absorbing = *op == BinaryOp::Or;
            if literal == absorbing {
                Some(Simplified::Constant(absorbing))
            } else if cx.filter_position || is_boolean_valued(arena, other) {
                Some(Simplified::Keep(other))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn produce_simplify(cx: &RuleContext<'_>, arena: &mut ExprArena, id: ExprId) -> Option<Production> {
    let replacement = match simplify(cx, arena, id)? {
        Simplified::Constant(value) => arena.push(Expr::boolean(value)),
        Simplified::Keep(other) => other,
    };
    Some(Production {
        replacement,
        rationale: "boolean constant absorbed".to_string(),
    })
}

// ============================================================================
// dedupe-conjuncts
// ============================================================================

fn dedupe(cx: &RuleContext<'_>, arena: &ExprArena, id: ExprId) -> Option<(BinaryOp, Vec<ExprId>)> {
    let (op, operands) = operands_of(arena, id)?;
    let mut kept: Vec<ExprId> = Vec::with_capacity(operands.len());
    for operand in &operands {
        let duplicate = arena.is_deterministic(*operand)
            && (cx.filter_position || is_boolean_valued(arena, *operand))
            && kept.iter().any(|k| arena.same_tree(*k, arena, *operand));
        if !duplicate {
            kept.push(*operand);
        }
    }
    (kept.len() < operands.len()).then_some((op, kept))
}

fn produce_dedupe(cx: &RuleContext<'_>, arena: &mut ExprArena, id: ExprId) -> Option<Production> {
    let (op, kept) = dedupe(cx, arena, id)?;
    Some(Production {
        replacement: chain(arena, op, &kept)?,
        rationale: format!("repeated {} operand removed", op.as_sql()),
    })
}

// ============================================================================
// range-merge
// ============================================================================

/// Operands of an AND chain, and the index of a bound implied by another.
fn redundant_bound(cx: &RuleContext<'_>, arena: &ExprArena, id: ExprId) -> Option<(Vec<ExprId>, usize)> {
    let (BinaryOp::And, operands) = operands_of(arena, id)? else {
        return None;
    };
    let bounds: Vec<_> = operands.iter().map(|o| numeric_bound(cx, arena, *o)).collect();
    for (j, candidate) in bounds.iter().enumerate() {
        let Some((column, op, value)) = candidate else {
            continue;
        };
        let implied = bounds.iter().enumerate().any(|(i, other)| match other {
            Some((other_column, other_op, other_value)) if i != j && same_column(column, other_column) => {
                // ties keep the earlier operand
                let mutual = implies((*op, *value), (*other_op, *other_value));
                implies((*other_op, *other_value), (*op, *value)) && (!mutual || i < j)
            }
            _ => false,
        });
        if implied {
            return Some((operands, j));
        }
    }
    None
}

fn produce_range_merge(cx: &RuleContext<'_>, arena: &mut ExprArena, id: ExprId) -> Option<Production> {
    let (mut operands, redundant) = redundant_bound(cx, arena, id)?;
    let dropped = expr_to_sql(arena, operands.remove(redundant));
    Some(Production {
        replacement: chain(arena, BinaryOp::And, &operands)?,
        rationale: format!("`{}` is implied by a tighter bound on the same column", dropped),
    })
}

// ============================================================================
// or-to-in
// ============================================================================

/// Equalities against constants folded into one list per column.
struct OrGroup {
    operands: Vec<ExprId>,
    members: Vec<usize>,
    column: ExprId,
    values: Vec<ExprId>,
}

fn equality_values(arena: &ExprArena, id: ExprId) -> Option<(ExprId, Vec<ExprId>)> {
    let constant = |v: ExprId| arena.is_constant_operand(v) && !is_null(arena, v);
    match &arena[id] {
        Expr::Binary {
            op: BinaryOp::Eq,
            left,
            right,
        } => {
            if arena.as_column(*left).is_some() && constant(*right) {
                Some((*left, vec![*right]))
            } else if arena.as_column(*right).is_some() && constant(*left) {
                Some((*right, vec![*left]))
            } else {
                None
            }
        }
        Expr::InList {
            operand,
            list,
            negated: false,
        } if arena.as_column(*operand).is_some() && list.iter().all(|v| constant(*v)) => {
            Some((*operand, list.clone()))
        }
        _ => None,
    }
}

/// IN compares mixed-type lists differently from a chain of `=`.
fn uniform_values(arena: &ExprArena, values: &[ExprId]) -> bool {
    let kind = |v: &ExprId| match arena.as_literal(*v) {
        Some(Literal::Number(_)) => 1,
        Some(Literal::String(_)) => 2,
        Some(Literal::Temporal { .. }) => 3,
        Some(_) => 4,
        None => 0,
    };
    let mut kinds = values.iter().map(kind).filter(|k| *k != 0);
    match kinds.next() {
        Some(first) => first != 4 && kinds.all(|k| k == first),
        None => true,
    }
}

fn or_group(arena: &ExprArena, id: ExprId) -> Option<OrGroup> {
    let (BinaryOp::Or, operands) = operands_of(arena, id)? else {
        return None;
    };
    let candidates: Vec<_> = operands.iter().map(|o| equality_values(arena, *o)).collect();
    for (i, candidate) in candidates.iter().enumerate() {
        let Some((column, _)) = candidate else {
            continue;
        };
        let Some(column_ref) = arena.as_column(*column) else {
            continue;
        };
        let members: Vec<usize> = candidates
            .iter()
            .enumerate()
            .skip(i)
            .filter_map(|(j, c)| match c {
                Some((other, _)) if arena.as_column(*other).is_some_and(|o| same_column(column_ref, o)) => Some(j),
                _ => None,
            })
            .collect();
        if members.len() < 2 {
            continue;
        }
        let values: Vec<ExprId> = members
            .iter()
            .filter_map(|j| candidates[*j].as_ref())
            .flat_map(|(_, values)| values.iter().copied())
            .collect();
        if !uniform_values(arena, &values) {
            continue;
        }
        return Some(OrGroup {
            operands,
            members,
            column: *column,
            values,
        });
    }
    None
}

fn produce_or_to_in(_: &RuleContext<'_>, arena: &mut ExprArena, id: ExprId) -> Option<Production> {
    let group = or_group(arena, id)?;
    let list = arena.push(Expr::InList {
        operand: group.column,
        list: group.values,
        negated: false,
    });
    let first = group.members[0];
    let remaining: Vec<ExprId> = group
        .operands
        .iter()
        .enumerate()
        .filter_map(|(i, operand)| {
            if i == first {
                Some(list)
            } else if group.members.contains(&i) {
                None
            } else {
                Some(*operand)
            }
        })
        .collect();
    Some(Production {
        replacement: chain(arena, BinaryOp::Or, &remaining)?,
        rationale: "equalities on one column merged into an IN list".to_string(),
    })
}

// ============================================================================
// in-single-to-eq
// ============================================================================

fn single_in(arena: &ExprArena, id: ExprId) -> Option<(ExprId, ExprId, bool)> {
    match &arena[id] {
        Expr::InList { operand, list, negated } if list.len() == 1 => Some((*operand, list[0], *negated)),
        _ => None,
    }
}

fn produce_single_in(_: &RuleContext<'_>, arena: &mut ExprArena, id: ExprId) -> Option<Production> {
    let (operand, value, negated) = single_in(arena, id)?;
    let op = if negated { BinaryOp::NotEq } else { BinaryOp::Eq };
    Some(Production {
        replacement: binary(arena, op, operand, value),
        rationale: "single-element IN list is a plain comparison".to_string(),
    })
}

// ============================================================================
// like-to-equals
// ============================================================================

fn plain_like(arena: &ExprArena, id: ExprId) -> Option<(ExprId, ExprId, bool)> {
    let Expr::Like {
        operand,
        pattern,
        escape,
        negated,
    } = &arena[id]
    else {
        return None;
    };
    let Some(Literal::String(text)) = arena.as_literal(*pattern) else {
        return None;
    };
    let escape_char = match escape {
        Some(escape) => match arena.as_literal(*escape) {
            Some(Literal::String(e)) => e.chars().next(),
            _ => return None,
        },
        None => Some('\\'),
    };
    let special = |c: char| c == '%' || c == '_' || Some(c) == escape_char;
    if text.chars().any(special) {
        return None;
    }
    Some((*operand, *pattern, *negated))
}

fn produce_like_to_equals(_: &RuleContext<'_>, arena: &mut ExprArena, id: ExprId) -> Option<Production> {
    let (operand, pattern, negated) = plain_like(arena, id)?;
    let op = if negated { BinaryOp::NotEq } else { BinaryOp::Eq };
    Some(Production {
        replacement: binary(arena, op, operand, pattern),
        rationale: "pattern has no wildcards; assumes trailing spaces are not significant".to_string(),
    })
}

// ============================================================================
// implicit-cast-removal
// ============================================================================

/// CAST that cannot change the value of the column it wraps.
fn cast_is_identity(column_type: &str, family: TypeFamily, target: &str) -> bool {
    let column_type = column_type.to_ascii_lowercase();
    let unsigned = column_type.contains("unsigned");
    match family {
        TypeFamily::Integer if !column_type.starts_with("bit") => match target {
            "SIGNED" | "SIGNED INTEGER" => !unsigned,
            "UNSIGNED" | "UNSIGNED INTEGER" => unsigned,
            _ => false,
        },
        TypeFamily::Date => target == "DATE",
        TypeFamily::DateTime => target == "DATETIME" && !column_type.contains('('),
        _ => false,
    }
}

/// Side index (0 = left) of an identity CAST compared with a constant.
fn identity_cast(cx: &RuleContext<'_>, arena: &ExprArena, id: ExprId) -> Option<(usize, ExprId)> {
    let Expr::Binary { op, left, right } = &arena[id] else {
        return None;
    };
    if !op.is_comparison() {
        return None;
    }
    [(0, *left, *right), (1, *right, *left)].into_iter().find_map(|(side, cast, other)| {
        let Expr::Cast { operand, data_type } = &arena[cast] else {
            return None;
        };
        if !arena.is_constant_operand(other) {
            return None;
        }
        let stats = cx.schema.column(arena.as_column(*operand)?)?;
        let column_type = stats.data_type.as_deref()?;
        cast_is_identity(column_type, stats.type_family()?, data_type).then_some((side, *operand))
    })
}

fn produce_cast_removal(cx: &RuleContext<'_>, arena: &mut ExprArena, id: ExprId) -> Option<Production> {
    let (side, column) = identity_cast(cx, arena, id)?;
    let Expr::Binary { op, left, right } = arena[id].clone() else {
        return None;
    };
    let (left, right) = if side == 0 { (column, right) } else { (left, column) };
    Some(Production {
        replacement: binary(arena, op, left, right),
        rationale: "column already has the cast's type; the bare column is index-usable".to_string(),
    })
}

// ============================================================================
// literal-type-match
// ============================================================================

/// Text that reads back identically as a decimal number and fits a double.
fn canonical_number(text: &str) -> bool {
    let digits = text.chars().filter(char::is_ascii_digit).count();
    digits > 0
        && digits <= 15
        && Decimal::from_str(text).is_ok_and(|value| value.to_string() == text)
}

/// Literal side, literal text and safety. Integer columns compare an
/// integer string exactly either way; DECIMAL and FLOAT columns compare a
/// string in double precision but a number in decimal, so values beyond
/// double precision may match differently.
fn numeric_string(cx: &RuleContext<'_>, arena: &ExprArena, id: ExprId) -> Option<(usize, String, Safety)> {
    let Expr::Binary { op, left, right } = &arena[id] else {
        return None;
    };
    if !op.is_comparison() {
        return None;
    }
    [(1, *left, *right), (0, *right, *left)].into_iter().find_map(|(literal_side, column, literal)| {
        let Some(Literal::String(text)) = arena.as_literal(literal) else {
            return None;
        };
        let family = cx.schema.column(arena.as_column(column)?)?.type_family()?;
        if !family.is_numeric() || !canonical_number(text) {
            return None;
        }
        let safety = if family == TypeFamily::Integer && i64::from_str(text).is_ok() {
            Safety::Safe
        } else {
            Safety::Aggressive
        };
        Some((literal_side, text.clone(), safety))
    })
}

fn produce_literal_type_match(cx: &RuleContext<'_>, arena: &mut ExprArena, id: ExprId) -> Option<Production> {
    let (literal_side, text, _) = numeric_string(cx, arena, id)?;
    let Expr::Binary { op, left, right } = arena[id].clone() else {
        return None;
    };
    let number = arena.push(Expr::number(text));
    let (left, right) = if literal_side == 0 { (number, right) } else { (left, number) };
    Some(Production {
        replacement: binary(arena, op, left, right),
        rationale: "numeric column compared with a number instead of a string".to_string(),
    })
}

// ============================================================================
// year-to-range
// ============================================================================

struct TemporalRange {
    safety: Safety,
    column: ExprId,
    lower: Option<NaiveDate>,
    upper: Option<NaiveDate>,
    function: &'static str,
}

fn single_column_argument(arena: &ExprArena, args: &FunctionArgs) -> Option<ExprId> {
    match args {
        FunctionArgs::List { distinct: false, args } if args.len() == 1 && arena.as_column(args[0]).is_some() => {
            Some(args[0])
        }
        _ => None,
    }
}

fn temporal_range(cx: &RuleContext<'_>, arena: &ExprArena, id: ExprId) -> Option<TemporalRange> {
    let Expr::Binary { op, left, right } = &arena[id] else {
        return None;
    };
    let (function, op, literal) = match (&arena[*left], &arena[*right]) {
        (Expr::Function { .. }, Expr::Literal(literal)) => (&arena[*left], *op, literal),
        (Expr::Literal(literal), Expr::Function { .. }) => (&arena[*right], op.flipped()?, literal),
        _ => return None,
    };
    let Expr::Function { name, args, over: None } = function else {
        return None;
    };
    let column = single_column_argument(arena, args)?;

    let (function, lower, upper) = match name.as_str() {
        "YEAR" => {
            let Literal::Number(text) = literal else {
                return None;
            };
            let year: i32 = text.parse().ok().filter(|y| (1000..=9998).contains(y))?;
            let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
            let next = NaiveDate::from_ymd_opt(year + 1, 1, 1)?;
            let (lower, upper) = match op {
                BinaryOp::Eq => (Some(start), Some(next)),
                BinaryOp::Lt => (None, Some(start)),
                BinaryOp::LtEq => (None, Some(next)),
                BinaryOp::Gt => (Some(next), None),
                BinaryOp::GtEq => (Some(start), None),
                _ => return None,
            };
            ("YEAR", lower, upper)
        }
        "DATE" if op == BinaryOp::Eq => {
            let text = match literal {
                Literal::String(text) => text,
                Literal::Temporal {
                    kind: TemporalKind::Date,
                    value,
                } => value,
                _ => return None,
            };
            let day = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
            ("DATE", Some(day), Some(day.succ_opt()?))
        }
        _ => return None,
    };

    let temporal = arena
        .as_column(column)
        .and_then(|c| cx.schema.column(c))
        .and_then(|stats| stats.type_family())
        .is_some_and(|family| family.is_temporal());
    Some(TemporalRange {
        safety: if temporal { Safety::Safe } else { Safety::Aggressive },
        column,
        lower,
        upper,
        function,
    })
}

fn produce_temporal_range(cx: &RuleContext<'_>, arena: &mut ExprArena, id: ExprId) -> Option<Production> {
    let range = temporal_range(cx, arena, id)?;
    let mut bounds = Vec::new();
    if let Some(lower) = range.lower {
        let value = arena.push(Expr::string(lower.format("%Y-%m-%d").to_string()));
        bounds.push(binary(arena, BinaryOp::GtEq, range.column, value));
    }
    if let Some(upper) = range.upper {
        let value = arena.push(Expr::string(upper.format("%Y-%m-%d").to_string()));
        bounds.push(binary(arena, BinaryOp::Lt, range.column, value));
    }
    let rationale = match range.safety {
        Safety::Safe => format!("{}() on the column blocks index use; the range is equivalent", range.function),
        Safety::Aggressive => format!(
            "{}() on the column blocks index use; assumes the column holds DATE or DATETIME values",
            range.function
        ),
    };
    Some(Production {
        replacement: chain(arena, BinaryOp::And, &bounds)?,
        rationale,
    })
}

// ============================================================================
// Statement rules
// ============================================================================

fn true_where(arena: &ExprArena, select: &Select) -> bool {
    select.selection.is_some_and(|id| boolean_literal(arena, id) == Some(true))
}

fn produce_remove_true_where(_: &RuleContext<'_>, arena: &mut ExprArena, select: &Select) -> Option<StatementProduction> {
    if !true_where(arena, select) {
        return None;
    }
    Some(StatementProduction {
        select: Select {
            selection: None,
            ..select.clone()
        },
        clause: RewriteClause::Where,
        original: "WHERE TRUE".to_string(),
        rewritten: String::new(),
        rationale: "WHERE TRUE filters nothing".to_string(),
    })
}

/// HAVING conjuncts that only read GROUP BY columns, split into
/// (movable, remaining).
fn movable_having(arena: &ExprArena, select: &Select) -> Option<(Vec<ExprId>, Vec<ExprId>)> {
    let having = select.having?;
    if select.group_by.is_empty() {
        return None;
    }
    let grouped: Vec<&ColumnRef> = select.group_by.iter().filter_map(|g| arena.as_column(*g)).collect();
    let aliases: Vec<(&str, Option<ExprId>)> = select
        .projection
        .iter()
        .filter_map(|item| match item {
            SelectItem::Expr { expr, alias: Some(alias) } => Some((alias.as_str(), Some(*expr))),
            _ => None,
        })
        .collect();

    let reads_grouped_column = |column: &ColumnRef| {
        let shadowed = column.qualifier.is_none()
            && aliases.iter().any(|(alias, expr)| {
                column.name.matches(alias)
                    && !expr
                        .and_then(|e| arena.as_column(e))
                        .is_some_and(|aliased| same_column(aliased, column))
            });
        !shadowed && grouped.iter().any(|g| same_column(g, column))
    };

    let mut conjuncts = Vec::new();
    flatten(arena, having, BinaryOp::And, &mut conjuncts);
    let (movable, remaining): (Vec<ExprId>, Vec<ExprId>) = conjuncts.into_iter().partition(|c| {
        arena.contains_column(*c)
            && !arena.contains_aggregate(*c)
            && arena.is_deterministic(*c)
            && arena
                .post_order(*c)
                .into_iter()
                .filter_map(|node| arena.as_column(node))
                .all(&reads_grouped_column)
    });
    (!movable.is_empty()).then_some((movable, remaining))
}

fn produce_having_to_where(_: &RuleContext<'_>, arena: &mut ExprArena, select: &Select) -> Option<StatementProduction> {
    let (movable, remaining) = movable_having(arena, select)?;
    let original = format!("HAVING {}", expr_to_sql(arena, select.having?));

    let mut filters: Vec<ExprId> = select.selection.into_iter().collect();
    filters.extend(movable);
    let selection = chain(arena, BinaryOp::And, &filters);
    let having = chain(arena, BinaryOp::And, &remaining);

    let mut rewritten = format!("WHERE {}", expr_to_sql(arena, selection?));
    if let Some(having) = having {
        rewritten.push_str(" HAVING ");
        rewritten.push_str(&expr_to_sql(arena, having));
    }
    Some(StatementProduction {
        select: Select {
            selection,
            having,
            ..select.clone()
        },
        clause: RewriteClause::Having,
        original,
        rewritten,
        rationale: "filter on grouping columns applied before grouping; assumes no select alias shadows them"
            .to_string(),
    })
}

fn star_columns(cx: &RuleContext<'_>, select: &Select) -> Option<Vec<String>> {
    if !matches!(select.projection.as_slice(), [SelectItem::Wildcard]) {
        return None;
    }
    match select.from.as_slice() {
        [item] if item.joins.is_empty() && matches!(item.relation, TableFactor::Table { .. }) => {}
        _ => return None,
    }
    cx.schema.table_columns(cx.schema.single_table()?)
}

fn produce_select_star_expand(cx: &RuleContext<'_>, arena: &mut ExprArena, select: &Select) -> Option<StatementProduction> {
    let columns = star_columns(cx, select)?;
    let projection: Vec<SelectItem> = columns
        .iter()
        .map(|name| SelectItem::Expr {
            expr: arena.push(Expr::column(None, name)),
            alias: None,
        })
        .collect();
    let rewritten = projection
        .iter()
        .filter_map(|item| match item {
            SelectItem::Expr { expr, .. } => Some(expr_to_sql(arena, *expr)),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(", ");
    Some(StatementProduction {
        select: Select {
            projection,
            ..select.clone()
        },
        clause: RewriteClause::Select,
        original: "*".to_string(),
        rewritten,
        rationale: "explicit column list; assumes the table's columns do not change".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalysisConfig, RewriteMode};
    use crate::rewrite::rewrite;
    use crate::stats::{ColumnStats, StatsSnapshot, TableStats};
    use pretty_assertions::assert_eq;
    use turboindex_parser::{parse, Dialect};

    fn snapshot() -> StatsSnapshot {
        StatsSnapshot::from_tables([TableStats::new("orders", 10_000)
            .with_column(ColumnStats::new("id").with_type("bigint"))
            .with_column(ColumnStats::new("qty").with_type("int"))
            .with_column(ColumnStats::new("status").with_type("varchar(16)"))
            .with_column(ColumnStats::new("created").with_type("datetime"))])
    }

    fn rewritten(sql: &str, mode: RewriteMode) -> (String, Vec<&'static str>) {
        rewritten_against(sql, mode, &snapshot())
    }

    fn rewritten_against(sql: &str, mode: RewriteMode, snapshot: &StatsSnapshot) -> (String, Vec<&'static str>) {
        let query = parse(sql, Dialect::default()).unwrap();
        let outcome = rewrite(&query, mode, snapshot, &AnalysisConfig::default());
        let rules = outcome.suggestions.iter().map(|s| s.rule_id).collect();
        (outcome.rewritten, rules)
    }

    #[test]
    fn test_catalog_ids_are_unique() {
        let mut ids: Vec<_> = CATALOG.iter().map(Rule::id).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert_eq!(total, 17);
    }

    #[test]
    fn test_negation_normalize() {
        let (sql, rules) = rewritten("SELECT id FROM orders WHERE NOT qty > 5 AND NOT status IS NULL", RewriteMode::Safe);
        assert_eq!(sql, "SELECT id FROM orders WHERE qty <= 5 AND status IS NOT NULL");
        assert_eq!(rules, vec!["negation-normalize", "negation-normalize"]);
    }

    #[test]
    fn test_double_negation_of_non_boolean_is_kept() {
        let (sql, rules) = rewritten("SELECT NOT NOT qty FROM orders WHERE NOT NOT qty", RewriteMode::Safe);
        assert_eq!(sql, "SELECT NOT NOT qty FROM orders WHERE NOT NOT qty");
        assert!(rules.is_empty());
    }

    #[test]
    fn test_constant_fold_and_simplify() {
        let (sql, rules) = rewritten("SELECT id FROM orders WHERE 1 = 1 AND qty > 3", RewriteMode::Safe);
        assert_eq!(sql, "SELECT id FROM orders WHERE qty > 3");
        assert_eq!(rules, vec!["constant-fold", "boolean-simplify"]);
    }

    #[test]
    fn test_remove_true_where() {
        let (sql, rules) = rewritten("SELECT id FROM orders WHERE 2 > 1", RewriteMode::Safe);
        assert_eq!(sql, "SELECT id FROM orders");
        assert_eq!(rules, vec!["constant-fold", "remove-true-where"]);
    }

    #[test]
    fn test_contradiction_on_conflicting_equalities() {
        let (sql, _) = rewritten("SELECT id FROM orders WHERE qty = 1 AND qty = 2", RewriteMode::Safe);
        assert_eq!(sql, "SELECT id FROM orders WHERE FALSE");
    }

    #[test]
    fn test_contradiction_not_applied_under_not() {
        let (sql, _) = rewritten("SELECT id FROM orders WHERE NOT (qty = 1 AND qty = 2)", RewriteMode::Safe);
        assert_eq!(sql, "SELECT id FROM orders WHERE NOT (qty = 1 AND qty = 2)");
    }

    #[test]
    fn test_range_merge_keeps_tightest() {
        let (sql, rules) = rewritten("SELECT id FROM orders WHERE qty > 1 AND qty >= 5 AND qty < 10", RewriteMode::Safe);
        assert_eq!(sql, "SELECT id FROM orders WHERE qty >= 5 AND qty < 10");
        assert_eq!(rules, vec!["range-merge"]);
    }

    #[test]
    fn test_dedupe_skips_parameters() {
        let (sql, _) = rewritten("SELECT id FROM orders WHERE qty = ? AND qty = ?", RewriteMode::Safe);
        assert_eq!(sql, "SELECT id FROM orders WHERE qty = ? AND qty = ?");
        let (sql, rules) = rewritten("SELECT id FROM orders WHERE status = 'a' AND status = 'a'", RewriteMode::Safe);
        assert_eq!(sql, "SELECT id FROM orders WHERE status = 'a'");
        assert_eq!(rules, vec!["dedupe-conjuncts"]);
    }

    #[test]
    fn test_partial_or_to_in() {
        let (sql, _) = rewritten(
            "SELECT id FROM orders WHERE qty = 1 OR status = 'x' OR qty IN (2, 3)",
            RewriteMode::Safe,
        );
        assert_eq!(sql, "SELECT id FROM orders WHERE qty IN (1, 2, 3) OR status = 'x'");
    }

    #[test]
    fn test_mixed_type_or_is_left_alone() {
        let (_, rules) = rewritten("SELECT id FROM orders WHERE status = 1 OR status = 'x'", RewriteMode::Safe);
        assert!(rules.is_empty());
    }

    #[test]
    fn test_single_in() {
        let (sql, _) = rewritten("SELECT id FROM orders WHERE status NOT IN ('x')", RewriteMode::Safe);
        assert_eq!(sql, "SELECT id FROM orders WHERE status <> 'x'");
    }

    #[test]
    fn test_year_to_range_is_safe_on_datetime() {
        let (sql, rules) = rewritten("SELECT id FROM orders WHERE YEAR(created) = 2024", RewriteMode::Safe);
        assert_eq!(
            sql,
            "SELECT id FROM orders WHERE created >= '2024-01-01' AND created < '2025-01-01'"
        );
        assert_eq!(rules, vec!["year-to-range"]);
    }

    #[test]
    fn test_year_to_range_without_schema_is_aggressive() {
        let (sql, rules) = rewritten("SELECT id FROM events WHERE YEAR(at) > 2020", RewriteMode::Safe);
        assert_eq!(sql, "SELECT id FROM events WHERE YEAR(at) > 2020");
        assert!(rules.is_empty());
        let (sql, _) = rewritten("SELECT id FROM events WHERE YEAR(at) > 2020", RewriteMode::Aggressive);
        assert_eq!(sql, "SELECT id FROM events WHERE at >= '2021-01-01'");
    }

    #[test]
    fn test_date_to_range() {
        let (sql, _) = rewritten("SELECT id FROM orders WHERE DATE(created) = '2024-02-29'", RewriteMode::Safe);
        assert_eq!(
            sql,
            "SELECT id FROM orders WHERE created >= '2024-02-29' AND created < '2024-03-01'"
        );
    }

    #[test]
    fn test_cast_removal_needs_matching_type() {
        let (sql, rules) = rewritten("SELECT id FROM orders WHERE CAST(qty AS SIGNED) = 5", RewriteMode::Safe);
        assert_eq!(sql, "SELECT id FROM orders WHERE qty = 5");
        assert_eq!(rules, vec!["implicit-cast-removal"]);
        let (_, rules) = rewritten("SELECT id FROM orders WHERE CAST(created AS DATE) = '2024-01-01'", RewriteMode::Safe);
        assert!(rules.is_empty());
    }

    #[test]
    fn test_literal_type_match() {
        let (sql, _) = rewritten("SELECT id FROM orders WHERE qty = '42'", RewriteMode::Safe);
        assert_eq!(sql, "SELECT id FROM orders WHERE qty = 42");
        let (_, rules) = rewritten("SELECT id FROM orders WHERE qty = '042'", RewriteMode::Safe);
        assert!(rules.is_empty());
        let (_, rules) = rewritten("SELECT id FROM orders WHERE status = '42'", RewriteMode::Safe);
        assert!(rules.is_empty());
    }

    #[test]
    fn test_like_to_equals_is_aggressive() {
        let (_, rules) = rewritten("SELECT id FROM orders WHERE status LIKE 'open'", RewriteMode::Safe);
        assert!(rules.is_empty());
        let (sql, _) = rewritten("SELECT id FROM orders WHERE status LIKE 'open'", RewriteMode::Aggressive);
        assert_eq!(sql, "SELECT id FROM orders WHERE status = 'open'");
        let (_, rules) = rewritten("SELECT id FROM orders WHERE status LIKE 'op_n'", RewriteMode::Aggressive);
        assert!(rules.is_empty());
    }

    #[test]
    fn test_having_to_where() {
        let (sql, rules) = rewritten(
            "SELECT status, COUNT(*) FROM orders GROUP BY status HAVING status = 'open' AND COUNT(*) > 1",
            RewriteMode::Aggressive,
        );
        assert_eq!(
            sql,
            "SELECT status, COUNT(*) FROM orders WHERE status = 'open' GROUP BY status HAVING COUNT(*) > 1"
        );
        assert_eq!(rules, vec!["having-to-where"]);
    }

    #[test]
    fn test_having_with_parameter_stays() {
        let (_, rules) = rewritten(
            "SELECT status FROM orders GROUP BY status HAVING status = ?",
            RewriteMode::Aggressive,
        );
        assert!(rules.is_empty());
    }

    #[test]
    fn test_select_star_expand() {
        let (sql, rules) = rewritten("SELECT * FROM orders WHERE qty > 1", RewriteMode::Aggressive);
        assert_eq!(sql, "SELECT id, qty, status, created FROM orders WHERE qty > 1");
        assert_eq!(rules, vec!["select-star-expand"]);
    }

    fn prices() -> StatsSnapshot {
        StatsSnapshot::from_tables([TableStats::new("prices", 1_000)
            .with_column(ColumnStats::new("id").with_type("bigint"))
            .with_column(ColumnStats::new("amount").with_type("decimal(30,20)"))
            .with_column(ColumnStats::new("ratio").with_type("double"))])
    }

    #[test]
    fn test_literal_type_match_on_fractional_columns_is_aggressive() {
        let sql = "SELECT id FROM prices WHERE amount = '9.5' AND ratio < '0.25'";
        let (safe, rules) = rewritten_against(sql, RewriteMode::Safe, &prices());
        assert_eq!(safe, sql);
        assert!(rules.is_empty());
        let (aggressive, rules) = rewritten_against(sql, RewriteMode::Aggressive, &prices());
        assert_eq!(aggressive, "SELECT id FROM prices WHERE amount = 9.5 AND ratio < 0.25");
        assert_eq!(rules, vec!["literal-type-match", "literal-type-match"]);

        let (_, rules) = rewritten_against("SELECT amount FROM prices WHERE id = '7'", RewriteMode::Safe, &prices());
        assert_eq!(rules, vec!["literal-type-match"]);
    }

    #[test]
    fn test_bounds_beyond_double_precision() {
        // equal as doubles
        let sql = "SELECT id FROM prices WHERE ratio = 0.1000000000000000001 AND ratio = 0.1";
        let (out, rules) = rewritten_against(sql, RewriteMode::Safe, &prices());
        assert_eq!(out, sql);
        assert!(rules.is_empty());

        let sql = "SELECT id FROM prices WHERE ratio > 0.1000000000000000001 AND ratio > 0.1";
        let (out, rules) = rewritten_against(sql, RewriteMode::Safe, &prices());
        assert_eq!(out, sql);
        assert!(rules.is_empty());

        let (out, _) = rewritten_against(
            "SELECT id FROM prices WHERE amount = 0.1000000000000000001 AND amount = 0.1",
            RewriteMode::Safe,
            &prices(),
        );
        assert_eq!(out, "SELECT id FROM prices WHERE FALSE");

        let (out, rules) = rewritten_against(
            "SELECT id FROM prices WHERE ratio > 1 AND ratio > 2.5",
            RewriteMode::Safe,
            &prices(),
        );
        assert_eq!(out, "SELECT id FROM prices WHERE ratio > 2.5");
        assert_eq!(rules, vec!["range-merge"]);

        let (out, _) = rewritten("SELECT id FROM events WHERE score = 1 AND score = 2", RewriteMode::Safe);
        assert_eq!(out, "SELECT id FROM events WHERE FALSE");
    }

    #[test]
    fn test_significant_digits() {
        assert_eq!(significant_digits(Decimal::from_str("0.00120").unwrap()), 2);
        assert_eq!(significant_digits(Decimal::from_str("-123456.789").unwrap()), 9);
        assert_eq!(significant_digits(Decimal::ZERO), 0);
    }

    #[test]
    fn test_interval_implication() {
        let five = Decimal::from(5);
        let one = Decimal::from(1);
        assert!(implies((BinaryOp::Gt, five), (BinaryOp::GtEq, five)));
        assert!(!implies((BinaryOp::GtEq, five), (BinaryOp::Gt, five)));
        assert!(implies((BinaryOp::Eq, five), (BinaryOp::Gt, one)));
        assert!(!implies((BinaryOp::Lt, five), (BinaryOp::Gt, one)));
    }
}
