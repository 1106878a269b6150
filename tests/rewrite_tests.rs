// Rewrite engine: result equivalence of safe rewrites over random rows,
// determinism and handling of unsupported fragments.

mod support;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::HashMap;

use turboindex::{rewrite, AnalysisConfig, Analyzer, RewriteMode, Safety, StatsSnapshot};
use turboindex_parser::{parse, BinaryOp, Dialect, Expr, ExprArena, ExprId, Literal, Query, UnaryOp};

// ============================================================================
// Three-valued evaluator
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Null,
    Num(f64),
    Str(String),
}

type Row = HashMap<&'static str, Value>;

fn truth(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Num(n) => Some(*n != 0.0),
        Value::Str(s) => Some(s.trim().parse::<f64>().map(|n| n != 0.0).unwrap_or(false)),
    }
}

fn from_truth(t: Option<bool>) -> Value {
    match t {
        None => Value::Null,
        Some(b) => Value::Num(if b { 1.0 } else { 0.0 }),
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Num(x), Value::Num(y)) => x.partial_cmp(y),
        (Value::Str(x), Value::Str(y)) => Some(x.to_lowercase().cmp(&y.to_lowercase())),
        (Value::Num(x), Value::Str(y)) => x.partial_cmp(&y.parse::<f64>().unwrap_or(0.0)),
        (Value::Str(x), Value::Num(y)) => x.parse::<f64>().unwrap_or(0.0).partial_cmp(y),
    }
}

fn eval(arena: &ExprArena, id: ExprId, row: &Row) -> Value {
    use std::cmp::Ordering::*;
    match &arena[id] {
        Expr::Column(column) => row[column.name.0.to_lowercase().as_str()].clone(),
        Expr::Literal(Literal::Number(n)) => Value::Num(n.parse().unwrap()),
        Expr::Literal(Literal::String(s)) => Value::Str(s.clone()),
        Expr::Literal(Literal::Null) => Value::Null,
        Expr::Literal(Literal::Boolean(b)) => from_truth(Some(*b)),
        Expr::Unary { op: UnaryOp::Not, operand } => from_truth(truth(&eval(arena, *operand, row)).map(|b| !b)),
        Expr::Unary { op: UnaryOp::Minus, operand } => match eval(arena, *operand, row) {
            Value::Num(n) => Value::Num(-n),
            other => other,
        },
        Expr::Binary { op, left, right } => {
            let l = eval(arena, *left, row);
            let r = eval(arena, *right, row);
            match op {
                BinaryOp::And => from_truth(match (truth(&l), truth(&r)) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                }),
                BinaryOp::Or => from_truth(match (truth(&l), truth(&r)) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                }),
                BinaryOp::Xor => from_truth(match (truth(&l), truth(&r)) {
                    (Some(a), Some(b)) => Some(a != b),
                    _ => None,
                }),
                BinaryOp::NullSafeEq => from_truth(Some(match (&l, &r) {
                    (Value::Null, Value::Null) => true,
                    (Value::Null, _) | (_, Value::Null) => false,
                    _ => compare(&l, &r) == Some(Equal),
                })),
                BinaryOp::Eq => from_truth(compare(&l, &r).map(|o| o == Equal)),
                BinaryOp::NotEq => from_truth(compare(&l, &r).map(|o| o != Equal)),
                BinaryOp::Lt => from_truth(compare(&l, &r).map(|o| o == Less)),
                BinaryOp::LtEq => from_truth(compare(&l, &r).map(|o| o != Greater)),
                BinaryOp::Gt => from_truth(compare(&l, &r).map(|o| o == Greater)),
                BinaryOp::GtEq => from_truth(compare(&l, &r).map(|o| o != Less)),
                other => panic!("operator {:?} not generated", other),
            }
        }
        Expr::IsNull { operand, negated } => {
            let is_null = eval(arena, *operand, row) == Value::Null;
            from_truth(Some(is_null != *negated))
        }
        Expr::InList { operand, list, negated } => {
            let value = eval(arena, *operand, row);
            let mut saw_null = false;
            let mut found = false;
            for item in list {
                match compare(&value, &eval(arena, *item, row)) {
                    Some(Equal) => found = true,
                    Some(_) => {}
                    None => saw_null = true,
                }
            }
            let result = if found {
                Some(true)
            } else if saw_null {
                None
            } else {
                Some(false)
            };
            from_truth(result.map(|b| b != *negated))
        }
        Expr::Between { operand, low, high, negated } => {
            let value = eval(arena, *operand, row);
            let lower = compare(&value, &eval(arena, *low, row)).map(|o| o != Less);
            let upper = compare(&value, &eval(arena, *high, row)).map(|o| o != Greater);
            let inside = match (lower, upper) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            };
            from_truth(inside.map(|b| b != *negated))
        }
        other => panic!("expression {:?} not generated", other),
    }
}

/// Whether the WHERE clause of `query` accepts `row`.
fn accepts(query: &Query, row: &Row) -> bool {
    match query.body.selection {
        Some(root) => truth(&eval(&query.arena, root, row)) == Some(true),
        None => true,
    }
}

// ============================================================================
// Generators
// ============================================================================

fn literal() -> impl Strategy<Value = String> {
    prop_oneof![4 => (-3i64..=3).prop_map(|n| n.to_string()), 1 => Just("NULL".to_string())]
}

fn column() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("a"), Just("b")]
}

fn comparison() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("="), Just("<>"), Just("<"), Just("<="), Just(">"), Just(">="), Just("<=>")]
}

fn leaf() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => (column(), comparison(), literal()).prop_map(|(c, op, lit)| format!("{} {} {}", c, op, lit)),
        1 => (column(), any::<bool>()).prop_map(|(c, neg)| format!("{} IS {}NULL", c, if neg { "NOT " } else { "" })),
        1 => (column(), any::<bool>(), prop::collection::vec(-3i64..=3, 1..4)).prop_map(|(c, neg, items)| {
            let items: Vec<String> = items.iter().map(|n| n.to_string()).collect();
            format!("{} {}IN ({})", c, if neg { "NOT " } else { "" }, items.join(", "))
        }),
        1 => (column(), any::<bool>(), -3i64..=3, -3i64..=3)
            .prop_map(|(c, neg, lo, hi)| format!("{} {}BETWEEN {} AND {}", c, if neg { "NOT " } else { "" }, lo, hi)),
        1 => prop_oneof![Just("s = 'x'"), Just("s <> 'y'"), Just("s = NULL")].prop_map(str::to_string),
        1 => prop_oneof![Just("TRUE"), Just("FALSE")].prop_map(str::to_string),
    ]
}

fn predicate() -> impl Strategy<Value = String> {
    leaf().prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({} AND {})", l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({} OR {})", l, r)),
            inner.prop_map(|e| format!("NOT ({})", e)),
        ]
    })
}

fn value() -> impl Strategy<Value = Value> {
    prop_oneof![4 => (-4i64..=4).prop_map(|n| Value::Num(n as f64)), 1 => Just(Value::Null)]
}

fn text() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        Just(Value::Str("x".to_string())),
        Just(Value::Str("y".to_string())),
        Just(Value::Str("z".to_string())),
    ]
}

fn rows() -> impl Strategy<Value = Vec<Row>> {
    prop::collection::vec(
        (value(), value(), text()).prop_map(|(a, b, s)| Row::from([("a", a), ("b", b), ("s", s)])),
        1..24,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn safe_rewrites_select_the_same_rows(predicate in predicate(), rows in rows()) {
        let sql = format!("SELECT a FROM t WHERE {}", predicate);
        let query = parse(&sql, Dialect::default()).unwrap();
        let outcome = rewrite(&query, RewriteMode::Safe, &StatsSnapshot::offline(), &AnalysisConfig::default());

        prop_assert!(outcome.suggestions.iter().all(|s| s.safety == Safety::Safe));
        for row in &rows {
            prop_assert_eq!(
                accepts(&query, row),
                accepts(&outcome.rewritten_query, row),
                "{} => {} on {:?}",
                sql,
                outcome.rewritten,
                row
            );
        }

        // The rewritten text is itself valid SQL.
        prop_assert!(parse(&outcome.rewritten, Dialect::default()).is_ok());
    }

    #[test]
    fn rewriting_is_deterministic(predicate in predicate()) {
        let sql = format!("SELECT a FROM t WHERE {}", predicate);
        let query = parse(&sql, Dialect::default()).unwrap();
        let config = AnalysisConfig::default();
        let first = rewrite(&query, RewriteMode::Aggressive, &StatsSnapshot::offline(), &config);
        let second = rewrite(&query, RewriteMode::Aggressive, &StatsSnapshot::offline(), &config);
        prop_assert_eq!(first.rewritten, second.rewritten);
        prop_assert_eq!(first.suggestions, second.suggestions);
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_or_of_equalities_becomes_in_list() {
    let query = parse("SELECT * FROM users WHERE status = 'a' OR status = 'b'", Dialect::default()).unwrap();
    let outcome = rewrite(&query, RewriteMode::Safe, &support::snapshot(), &AnalysisConfig::default());

    assert_eq!(outcome.rewritten, "SELECT * FROM users WHERE status IN ('a', 'b')");
    assert_eq!(outcome.suggestions.len(), 1);
    assert_eq!(outcome.suggestions[0].rule_id, "or-to-in");
    assert_eq!(outcome.suggestions[0].safety, Safety::Safe);
}

#[test]
fn test_year_filter_uses_schema_types() {
    let sql = "SELECT id FROM orders WHERE YEAR(created) = 2024";
    let query = parse(sql, Dialect::default()).unwrap();

    let outcome = rewrite(&query, RewriteMode::Safe, &support::snapshot(), &AnalysisConfig::default());
    assert_eq!(
        outcome.rewritten,
        "SELECT id FROM orders WHERE created >= '2024-01-01' AND created < '2025-01-01'"
    );

    let offline = rewrite(&query, RewriteMode::Safe, &StatsSnapshot::offline(), &AnalysisConfig::default());
    assert!(!offline.changed());
    assert!(offline.findings.iter().any(|f| f.code == "non-sargable-predicate"));
}

#[test]
fn test_conflicting_bounds_become_false() {
    let query = parse(
        "SELECT id FROM orders WHERE customer_id = 1 AND customer_id > 5",
        Dialect::default(),
    )
    .unwrap();
    let outcome = rewrite(&query, RewriteMode::Safe, &support::snapshot(), &AnalysisConfig::default());
    assert_eq!(outcome.rewritten, "SELECT id FROM orders WHERE FALSE");
    assert_eq!(outcome.suggestions[0].rule_id, "contradiction");
}

#[tokio::test]
async fn test_unsupported_fragment_is_reported_and_left_alone() {
    let sql = "SELECT id FROM users WHERE id IN (SELECT customer_id FROM orders) AND (status = 'a' OR status = 'b')";
    assert!(parse(sql, Dialect::default()).is_err());

    let analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
    let outcome = analyzer.rewrite(sql, None, Some(RewriteMode::Aggressive)).await.unwrap();
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(
        outcome.rewritten,
        "SELECT id FROM users WHERE id IN (SELECT customer_id FROM orders) AND status IN ('a', 'b')"
    );
}

#[tokio::test]
async fn test_statement_level_construct_is_an_error() {
    let analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
    let err = analyzer
        .rewrite("UPDATE users SET status = 'a'", None, None)
        .await
        .unwrap_err();
    assert!(err.is_unsupported());
}
