// Index recommender: prefix-freedom of candidates, empty inputs and the
// single-equality baseline.

mod support;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use turboindex::{extract_with_columns, recommend, AnalysisConfig, IndexDef, StatsSnapshot, TableStats};
use turboindex_parser::{parse, Dialect};

fn recommend_sql(sql: &str, snapshot: &StatsSnapshot, config: &AnalysisConfig) -> Vec<turboindex::TableRecommendation> {
    let query = parse(sql, Dialect::default()).unwrap();
    let extracted = extract_with_columns(&query, &snapshot.column_lists());
    recommend(&extracted, snapshot, config, query.dialect)
}

fn is_prefix(short: &[&str], long: &[String]) -> bool {
    short.len() <= long.len() && short.iter().zip(long).all(|(a, b)| a.eq_ignore_ascii_case(b))
}

#[test]
fn test_single_equality_without_index() {
    let snapshot = StatsSnapshot::from_tables(vec![TableStats::new("orders", 50_000)]);
    let tables = recommend_sql(
        "SELECT * FROM orders WHERE customer_id = 123",
        &snapshot,
        &AnalysisConfig::default(),
    );
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].table, "orders");
    let top = &tables[0].candidates[0];
    assert_eq!(top.columns(), vec!["customer_id"]);
    assert_eq!(top.name, "idx_orders_customer_id");
    assert!(top.score > 0.0);
}

#[test]
fn test_no_predicates_no_candidates() {
    let config = AnalysisConfig::default();
    for sql in [
        "SELECT * FROM orders",
        "SELECT id, total FROM orders LIMIT 10",
        "SELECT o.id FROM orders o, users u",
    ] {
        for table in recommend_sql(sql, &support::snapshot(), &config) {
            assert!(table.candidates.is_empty(), "{sql}: {:?}", table.candidates);
        }
    }
}

#[test]
fn test_existing_index_suppresses_recommendation() {
    let snapshot = StatsSnapshot::from_tables(vec![support::orders()
        .with_index(IndexDef::new("idx_customer_created", &["customer_id", "created"], false))]);
    let tables = recommend_sql(
        "SELECT id FROM orders WHERE customer_id = 7",
        &snapshot,
        &AnalysisConfig::default(),
    );
    assert!(tables[0].candidates.is_empty());
}

#[test]
fn test_join_recommends_probe_side() {
    let tables = recommend_sql(
        "SELECT u.email FROM users u JOIN orders o ON o.customer_id = u.id WHERE u.status = 'active'",
        &support::snapshot(),
        &AnalysisConfig::default(),
    );
    let orders = tables.iter().find(|t| t.table == "orders").unwrap();
    assert!(orders
        .candidates
        .iter()
        .any(|c| c.columns().first() == Some(&"customer_id")));
}

fn conjunct() -> impl Strategy<Value = String> {
    prop_oneof![
        (prop_oneof![Just("customer_id"), Just("status"), Just("id")], 0i64..100)
            .prop_map(|(c, v)| format!("{} = {}", c, v)),
        (prop_oneof![Just("customer_id"), Just("total")], prop::collection::vec(0i64..100, 2..4)).prop_map(
            |(c, items)| {
                let items: Vec<String> = items.iter().map(|n| n.to_string()).collect();
                format!("{} IN ({})", c, items.join(", "))
            }
        ),
        (prop_oneof![Just("created"), Just("total")], prop_oneof![Just(">"), Just("<"), Just(">=")])
            .prop_map(|(c, op)| format!("{} {} 10", c, op)),
        Just("status LIKE 'pa%'".to_string()),
    ]
}

fn order_by() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just(" ORDER BY created".to_string()),
        Just(" ORDER BY total DESC, created DESC".to_string()),
    ]
}

proptest! {
    #[test]
    fn candidates_are_never_prefixes(conjuncts in prop::collection::vec(conjunct(), 0..5), order in order_by(), top_k in 1usize..6) {
        let filter = if conjuncts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conjuncts.join(" AND "))
        };
        let sql = format!("SELECT id, status FROM orders{}{}", filter, order);
        let config = AnalysisConfig::default().with_top_k(top_k);
        let snapshot = support::snapshot();
        let tables = recommend_sql(&sql, &snapshot, &config);

        for table in &tables {
            prop_assert!(table.candidates.len() <= top_k);
            if conjuncts.is_empty() {
                prop_assert!(table.candidates.is_empty());
            }
            for (i, a) in table.candidates.iter().enumerate() {
                let cols_a = a.columns();
                prop_assert!(cols_a.len() <= config.max_index_columns);
                for existing in &table.existing {
                    prop_assert!(!is_prefix(&cols_a, &existing.columns), "{} vs existing {}", a.name, existing.name);
                }
                for (j, b) in table.candidates.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    let cols_b: Vec<String> = b.columns().iter().map(|s| s.to_string()).collect();
                    prop_assert!(!is_prefix(&cols_a, &cols_b), "{:?} prefixes {:?} in {}", cols_a, cols_b, sql);
                }
            }
            for pair in table.candidates.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
        }
    }
}
