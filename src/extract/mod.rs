//! Predicate extraction.
//!
//! Turns the filter clauses of a parsed query into per-table predicates and
//! join clauses while keeping the AND/OR shape as a [`BoolNode`] tree.
//! Aliases are resolved to base tables; unqualified columns are resolved
//! when only one table is in scope or when column lists are supplied.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use turboindex_parser::{
    expr_to_sql, is_nondeterministic_function, BinaryOp, ColumnRef, Expr, ExprArena, ExprId,
    JoinConstraint, JoinKind, Literal, Query, Select, SelectItem, TableFactor, UnaryOp,
};

use crate::stats::{table_key, Datum};

// ============================================================================
// Core Types
// ============================================================================

/// Clause a predicate was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Clause {
    Where,
    On,
    Having,
}

/// Operator class, in the order indexes prefer them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperatorClass {
    Equality,
    InList,
    Range,
    LikePrefix,
    LikeWildcard,
    FunctionWrapped,
    Inequality,
}

/// Right-hand side of a predicate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Operand {
    Value(Datum),
    Null,
    /// `?` placeholder; value unknown until execution.
    Param,
    /// Constant expression kept as canonical text (`NOW() - INTERVAL 1 DAY`).
    Expression(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bound {
    pub value: Operand,
    pub inclusive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PredicateKind {
    /// `c = v`, `c <=> v`
    Equals(Operand),
    IsNull,
    IsNotNull,
    /// `<`, `<=`, `>`, `>=`, `BETWEEN`
    Range {
        lower: Option<Bound>,
        upper: Option<Bound>,
    },
    InList(Vec<Operand>),
    /// `LIKE 'abc%'`; a pattern without wildcards has `prefix == pattern`.
    LikePrefix { prefix: String, pattern: String },
    /// Leading wildcard or a pattern unknown before execution.
    LikeWildcard { pattern: Option<String> },
    NotEquals(Operand),
    NotIn(Vec<Operand>),
    NotLike,
    NotBetween,
    /// Column hidden inside a function or arithmetic: `YEAR(c) = 2024`.
    FunctionWrapped {
        expression: String,
        comparison: OperatorClass,
    },
}

impl PredicateKind {
    pub fn class(&self) -> OperatorClass {
        match self {
            PredicateKind::Equals(_) | PredicateKind::IsNull => OperatorClass::Equality,
            PredicateKind::IsNotNull | PredicateKind::Range { .. } => OperatorClass::Range,
            PredicateKind::InList(_) => OperatorClass::InList,
            PredicateKind::LikePrefix { .. } => OperatorClass::LikePrefix,
            PredicateKind::LikeWildcard { .. } => OperatorClass::LikeWildcard,
            PredicateKind::FunctionWrapped { .. } => OperatorClass::FunctionWrapped,
            PredicateKind::NotEquals(_)
            | PredicateKind::NotIn(_)
            | PredicateKind::NotLike
            | PredicateKind::NotBetween => OperatorClass::Inequality,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predicate {
    /// Base table, as written (schema-qualified when the query qualifies it).
    pub table: String,
    pub column: String,
    pub kind: PredicateKind,
    pub clause: Clause,
    /// Sits under an OR; cannot back a composite index with its siblings.
    pub disjunctive: bool,
    pub sargable: bool,
    /// Restricts which rows of `table` are read (false for ON conditions on
    /// the preserved side of an outer join).
    pub restricts_rows: bool,
    pub expr: ExprId,
    pub text: String,
}

impl Predicate {
    pub fn class(&self) -> OperatorClass {
        self.kind.class()
    }

    /// Usable as a key part of a composite index.
    pub fn backs_index(&self) -> bool {
        self.sargable && !self.disjunctive && self.restricts_rows
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnSide {
    pub table: String,
    pub column: String,
}

/// Column-to-column equality between two tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinClause {
    pub left: ColumnSide,
    pub right: ColumnSide,
    pub kind: JoinKind,
    pub clause: Clause,
    /// Side looked up once per row of the other side; an index on it
    /// serves the join.
    pub probe: ColumnSide,
}

/// Boolean structure of one filter clause.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BoolNode {
    And(Vec<BoolNode>),
    Or(Vec<BoolNode>),
    Not(Box<BoolNode>),
    /// Index into [`ExtractedQuery::predicates`].
    Predicate(usize),
    /// Index into [`ExtractedQuery::joins`].
    Join(usize),
    Constant(bool),
    /// Condition that cannot be modelled, as canonical text.
    Opaque(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    pub clause: Clause,
    pub root: BoolNode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnUse {
    pub table: String,
    pub column: String,
    pub descending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedQuery {
    /// Base tables in FROM order.
    pub tables: Vec<TableRef>,
    pub predicates: Vec<Predicate>,
    pub joins: Vec<JoinClause>,
    pub filters: Vec<Filter>,
    pub group_by: Vec<ColumnUse>,
    /// Every GROUP BY item is a resolved bare column.
    pub group_by_complete: bool,
    pub order_by: Vec<ColumnUse>,
    /// Every ORDER BY item is a resolved bare column.
    pub order_by_complete: bool,
    pub projected: Vec<ColumnUse>,
    pub select_star: bool,
    /// Resolved columns referenced anywhere in the main SELECT, per table
    /// key.
    pub referenced: BTreeMap<String, BTreeSet<String>>,
    /// Column references that could not be tied to one base table.
    pub unresolved: Vec<String>,
}

impl ExtractedQuery {
    pub fn predicates_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a Predicate> + 'a {
        self.predicates
            .iter()
            .filter(move |p| table_key(&p.table) == table_key(table))
    }

    pub fn joins_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a JoinClause> + 'a {
        self.joins.iter().filter(move |j| {
            table_key(&j.left.table) == table_key(table) || table_key(&j.right.table) == table_key(table)
        })
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for table in &self.tables {
            if !out.iter().any(|t| table_key(t) == table_key(&table.name)) {
                out.push(table.name.clone());
            }
        }
        out
    }

    /// Function-wrapped and leading-wildcard predicates.
    pub fn non_sargable(&self) -> impl Iterator<Item = &Predicate> {
        self.predicates.iter().filter(|p| {
            matches!(
                p.kind,
                PredicateKind::FunctionWrapped { .. } | PredicateKind::LikeWildcard { pattern: Some(_) }
            )
        })
    }
}

// ============================================================================
// Entry Points
// ============================================================================

/// Extract predicates resolving unqualified columns only by table count.
pub fn extract(query: &Query) -> ExtractedQuery {
    extract_with_columns(query, &HashMap::new())
}

/// Extract predicates; `columns` maps table keys to their column names.
pub fn extract_with_columns(query: &Query, columns: &HashMap<String, Vec<String>>) -> ExtractedQuery {
    let cte_names: Vec<String> = query.ctes.iter().map(|c| c.name.as_str().to_ascii_lowercase()).collect();
    let mut extractor = Extractor {
        arena: &query.arena,
        columns,
        cte_names: &cte_names,
        out: ExtractedQuery {
            group_by_complete: true,
            order_by_complete: true,
            ..Default::default()
        },
    };

    for cte in &query.ctes {
        let scope = extractor.scope_for(&cte.body);
        extractor.filters_of(&cte.body, &scope);
    }

    let scope = extractor.scope_for(&query.body);
    for entry in &scope.entries {
        if let Some(table) = &entry.table {
            extractor.out.tables.push(TableRef {
                name: table.clone(),
                alias: entry.alias.clone(),
            });
        }
    }
    extractor.filters_of(&query.body, &scope);
    extractor.ordering_of(&query.body, &scope);
    extractor.references_of(&query.body, &scope);
    extractor.out
}

// ============================================================================
// Scope
// ============================================================================

#[derive(Debug, Clone)]
struct ScopeEntry {
    /// Name the query uses to refer to the relation.
    exposed: String,
    alias: Option<String>,
    /// Base table; `None` for derived tables and CTE references.
    table: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Scope {
    entries: Vec<ScopeEntry>,
}

enum Resolved {
    Column(ColumnSide, usize),
    Unknown,
}

impl Scope {
    fn base_table_of(&self, factor: &TableFactor) -> Option<String> {
        let exposed = factor.exposed_name()?;
        self.entries
            .iter()
            .find(|e| e.exposed.eq_ignore_ascii_case(exposed.as_str()))
            .and_then(|e| e.table.clone())
    }
}

struct Extractor<'a> {
    arena: &'a ExprArena,
    columns: &'a HashMap<String, Vec<String>>,
    cte_names: &'a [String],
    out: ExtractedQuery,
}

#[derive(Debug, Clone, Copy)]
struct WalkCx {
    clause: Clause,
    disjunctive: bool,
    negated: bool,
    /// Kind and FROM position of the relation an ON clause belongs to.
    join: Option<(JoinKind, usize)>,
}

impl<'a> Extractor<'a> {
    fn scope_for(&self, select: &Select) -> Scope {
        let mut scope = Scope::default();
        for factor in select.table_factors() {
            let entry = match factor {
                TableFactor::Table { name, alias, .. } => {
                    let is_cte = name.schema.is_none()
                        && self.cte_names.iter().any(|c| name.name.matches(c));
                    let qualified = match &name.schema {
                        Some(schema) => format!("{}.{}", schema, name.name),
                        None => name.name.to_string(),
                    };
                    ScopeEntry {
                        exposed: alias.as_ref().unwrap_or(&name.name).to_string(),
                        alias: alias.as_ref().map(|a| a.to_string()),
                        table: if is_cte { None } else { Some(qualified) },
                    }
                }
                TableFactor::Opaque { alias, .. } => ScopeEntry {
                    exposed: alias.as_ref().map(|a| a.to_string()).unwrap_or_default(),
                    alias: alias.as_ref().map(|a| a.to_string()),
                    table: None,
                },
            };
            scope.entries.push(entry);
        }
        scope
    }

    fn resolve(&mut self, scope: &Scope, column: &ColumnRef) -> Resolved {
        let name = column.name.to_string();
        let found = match &column.qualifier {
            Some(qualifier) => scope
                .entries
                .iter()
                .enumerate()
                .find(|(_, e)| {
                    qualifier.matches(&e.exposed)
                        && match (&column.schema, &e.table) {
                            // `db.t.col` names the unaliased table `t` of `db`
                            (Some(schema), Some(table)) => {
                                e.alias.is_none()
                                    && table.split_once('.').map_or(true, |(db, _)| schema.matches(db))
                            }
                            _ => true,
                        }
                })
                .and_then(|(pos, e)| e.table.clone().map(|t| (t, pos))),
            None => {
                let bases: Vec<(usize, &String)> = scope
                    .entries
                    .iter()
                    .enumerate()
                    .filter_map(|(pos, e)| e.table.as_ref().map(|t| (pos, t)))
                    .collect();
                if bases.len() == 1 && scope.entries.len() == 1 {
                    Some((bases[0].1.clone(), bases[0].0))
                } else {
                    let owners: Vec<(usize, &String)> = bases
                        .into_iter()
                        .filter(|(_, t)| {
                            self.columns
                                .get(&table_key(t))
                                .map(|cols| cols.iter().any(|c| column.name.matches(c)))
                                .unwrap_or(false)
                        })
                        .collect();
                    match owners.as_slice() {
                        [(pos, table)] => Some(((*table).clone(), *pos)),
                        _ => None,
                    }
                }
            }
        };

        match found {
            Some((table, pos)) => Resolved::Column(ColumnSide { table, column: name }, pos),
            None => {
                let text = match (&column.schema, &column.qualifier) {
                    (Some(db), Some(q)) => format!("{}.{}.{}", db, q, column.name),
                    (_, Some(q)) => format!("{}.{}", q, column.name),
                    _ => name,
                };
                if !self.out.unresolved.contains(&text) {
                    self.out.unresolved.push(text);
                }
                Resolved::Unknown
            }
        }
    }

    // ------------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------------

    fn filters_of(&mut self, select: &Select, scope: &Scope) {
        if let Some(selection) = select.selection {
            let cx = WalkCx {
                clause: Clause::Where,
                disjunctive: false,
                negated: false,
                join: None,
            };
            let root = self.walk(scope, selection, cx);
            self.out.filters.push(Filter {
                clause: Clause::Where,
                root,
            });
        }

        let mut position = 0usize;
        for item in &select.from {
            let mut previous = scope.base_table_of(&item.relation);
            for join in &item.joins {
                position += 1;
                let relation = scope.base_table_of(&join.relation);
                match &join.constraint {
                    JoinConstraint::On(on) => {
                        let cx = WalkCx {
                            clause: Clause::On,
                            disjunctive: false,
                            negated: false,
                            join: Some((join.kind, position)),
                        };
                        let root = self.walk(scope, *on, cx);
                        self.out.filters.push(Filter {
                            clause: Clause::On,
                            root,
                        });
                    }
                    JoinConstraint::Using(columns) => {
                        if let (Some(left), Some(right)) = (&previous, &relation) {
                            for column in columns {
                                let left = ColumnSide {
                                    table: left.clone(),
                                    column: column.to_string(),
                                };
                                let right = ColumnSide {
                                    table: right.clone(),
                                    column: column.to_string(),
                                };
                                let probe = if join.kind == JoinKind::Right {
                                    left.clone()
                                } else {
                                    right.clone()
                                };
                                self.out.joins.push(JoinClause {
                                    left,
                                    right,
                                    kind: join.kind,
                                    clause: Clause::On,
                                    probe,
                                });
                            }
                        }
                    }
                    JoinConstraint::None => {}
                }
                previous = relation.or(previous);
            }
            position += 1;
        }

        if let Some(having) = select.having {
            let cx = WalkCx {
                clause: Clause::Having,
                disjunctive: false,
                negated: false,
                join: None,
            };
            let root = self.walk(scope, having, cx);
            self.out.filters.push(Filter {
                clause: Clause::Having,
                root,
            });
        }
    }

    fn walk(&mut self, scope: &Scope, id: ExprId, cx: WalkCx) -> BoolNode {
        let arena = self.arena;
        match &arena[id] {
            Expr::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                ..
            } => {
                let mut operands = Vec::new();
                flatten(arena, id, *op, &mut operands);
                // Under NOT, AND and OR swap places (De Morgan).
                let conjunction = (*op == BinaryOp::And) != cx.negated;
                if !conjunction && !cx.negated {
                    if let Some(folded) = self.fold_disjunction(scope, id, &operands, cx) {
                        return folded;
                    }
                }
                let child_cx = WalkCx {
                    disjunctive: cx.disjunctive || !conjunction,
                    ..cx
                };
                let children: Vec<BoolNode> = operands
                    .into_iter()
                    .map(|operand| self.walk(scope, operand, child_cx))
                    .collect();
                if conjunction {
                    BoolNode::And(children)
                } else {
                    BoolNode::Or(children)
                }
            }
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => self.walk(
                scope,
                *operand,
                WalkCx {
                    negated: !cx.negated,
                    ..cx
                },
            ),
            Expr::Literal(Literal::Boolean(value)) => BoolNode::Constant(*value != cx.negated),
            // NULL is never true, negated or not.
            Expr::Literal(Literal::Null) => BoolNode::Constant(false),
            _ => match self.leaf(scope, id, cx) {
                Some(node) => node,
                None => {
                    let text = expr_to_sql(arena, id);
                    if cx.negated {
                        BoolNode::Not(Box::new(BoolNode::Opaque(text)))
                    } else {
                        BoolNode::Opaque(text)
                    }
                }
            },
        }
    }

    /// `c = 1 OR c = 2 OR c IN (3, 4)` becomes one IN-list predicate.
    fn fold_disjunction(
        &mut self,
        scope: &Scope,
        id: ExprId,
        operands: &[ExprId],
        cx: WalkCx,
    ) -> Option<BoolNode> {
        let arena = self.arena;
        let mut column: Option<&ColumnRef> = None;
        let mut values = Vec::new();

        for &operand in operands {
            let (col, items): (ExprId, Vec<ExprId>) = match &arena[operand] {
                Expr::Binary {
                    op: BinaryOp::Eq,
                    left,
                    right,
                } => {
                    if arena.as_column(*left).is_some() && is_constant_side(arena, *right) {
                        (*left, vec![*right])
                    } else if arena.as_column(*right).is_some() && is_constant_side(arena, *left) {
                        (*right, vec![*left])
                    } else {
                        return None;
                    }
                }
                Expr::InList {
                    operand: col,
                    list,
                    negated: false,
                } if arena.as_column(*col).is_some() && list.iter().all(|i| is_constant_side(arena, *i)) => {
                    (*col, list.clone())
                }
                _ => return None,
            };
            let reference = arena.as_column(col)?;
            match column {
                None => column = Some(reference),
                Some(existing) if same_column(existing, reference) => {}
                Some(_) => return None,
            }
            values.extend(items);
        }

        let Resolved::Column(side, position) = self.resolve(scope, column?) else {
            return None;
        };
        let operands: Vec<Operand> = values.iter().map(|v| operand_of(arena, *v)).collect();
        let kind = PredicateKind::InList(operands);
        Some(self.push_predicate(side, position, kind, id, cx))
    }

    fn leaf(&mut self, scope: &Scope, id: ExprId, cx: WalkCx) -> Option<BoolNode> {
        let arena = self.arena;
        if arena.contains_aggregate(id) || arena.contains_opaque(id) {
            return None;
        }

        match &arena[id] {
            Expr::Binary { op, left, right } if op.is_comparison() => {
                if let (Some(l), Some(r)) = (arena.as_column(*left), arena.as_column(*right)) {
                    return self.column_pair(scope, *op, l, r, cx);
                }
                let (subject, value, op) = if is_constant_side(arena, *right) {
                    (*left, *right, *op)
                } else if is_constant_side(arena, *left) {
                    (*right, *left, op.flipped()?)
                } else {
                    return None;
                };
                let kind = comparison_kind(op, operand_of(arena, value), cx.negated)?;
                self.subject_predicate(scope, id, subject, kind, cx)
            }
            Expr::IsNull { operand, negated } => {
                let kind = if *negated != cx.negated {
                    PredicateKind::IsNotNull
                } else {
                    PredicateKind::IsNull
                };
                self.subject_predicate(scope, id, *operand, kind, cx)
            }
            Expr::InList {
                operand,
                list,
                negated,
            } => {
                if !list.iter().all(|item| is_constant_side(arena, *item)) {
                    return None;
                }
                let values = list.iter().map(|item| operand_of(arena, *item)).collect();
                let kind = if *negated != cx.negated {
                    PredicateKind::NotIn(values)
                } else {
                    PredicateKind::InList(values)
                };
                self.subject_predicate(scope, id, *operand, kind, cx)
            }
            Expr::Between {
                operand,
                low,
                high,
                negated,
            } => {
                if !is_constant_side(arena, *low) || !is_constant_side(arena, *high) {
                    return None;
                }
                let kind = if *negated != cx.negated {
                    PredicateKind::NotBetween
                } else {
                    PredicateKind::Range {
                        lower: Some(Bound {
                            value: operand_of(arena, *low),
                            inclusive: true,
                        }),
                        upper: Some(Bound {
                            value: operand_of(arena, *high),
                            inclusive: true,
                        }),
                    }
                };
                self.subject_predicate(scope, id, *operand, kind, cx)
            }
            Expr::Like {
                operand,
                pattern,
                escape,
                negated,
            } => {
                if !is_constant_side(arena, *pattern) {
                    return None;
                }
                let kind = if *negated != cx.negated {
                    PredicateKind::NotLike
                } else {
                    let escape_char = match escape.and_then(|e| arena.as_literal(e)) {
                        Some(Literal::String(s)) => s.chars().next(),
                        _ => Some('\\'),
                    };
                    match arena.as_literal(*pattern) {
                        Some(Literal::String(text)) => like_kind(text, escape_char),
                        _ => PredicateKind::LikeWildcard { pattern: None },
                    }
                };
                self.subject_predicate(scope, id, *operand, kind, cx)
            }
            _ => None,
        }
    }

    fn column_pair(
        &mut self,
        scope: &Scope,
        op: BinaryOp,
        left: &ColumnRef,
        right: &ColumnRef,
        cx: WalkCx,
    ) -> Option<BoolNode> {
        if op != BinaryOp::Eq || cx.negated || cx.disjunctive {
            return None;
        }
        let (Resolved::Column(left, lpos), Resolved::Column(right, rpos)) =
            (self.resolve(scope, left), self.resolve(scope, right))
        else {
            return None;
        };
        if table_key(&left.table) == table_key(&right.table) {
            return None;
        }

        let kind = match cx.join {
            Some((kind, _)) => kind,
            None => JoinKind::Inner,
        };
        let probe = match kind {
            JoinKind::Right => {
                if lpos < rpos {
                    left.clone()
                } else {
                    right.clone()
                }
            }
            _ => {
                if lpos > rpos {
                    left.clone()
                } else {
                    right.clone()
                }
            }
        };
        self.out.joins.push(JoinClause {
            left,
            right,
            kind,
            clause: cx.clause,
            probe,
        });
        Some(BoolNode::Join(self.out.joins.len() - 1))
    }

    /// `subject` is either a bare column or an expression over one table's
    /// columns (function-wrapped).
    fn subject_predicate(
        &mut self,
        scope: &Scope,
        id: ExprId,
        subject: ExprId,
        kind: PredicateKind,
        cx: WalkCx,
    ) -> Option<BoolNode> {
        let arena = self.arena;
        if let Some(column) = arena.as_column(subject) {
            let Resolved::Column(side, position) = self.resolve(scope, column) else {
                return None;
            };
            return Some(self.push_predicate(side, position, kind, id, cx));
        }

        if !arena.is_deterministic(subject) {
            return None;
        }
        let columns: Vec<&ColumnRef> = arena
            .post_order(subject)
            .into_iter()
            .filter_map(|node| arena.as_column(node))
            .collect();
        let first = *columns.first()?;
        if !columns.iter().all(|c| same_column(c, first)) {
            return None;
        }
        let Resolved::Column(side, position) = self.resolve(scope, first) else {
            return None;
        };
        let wrapped = PredicateKind::FunctionWrapped {
            expression: expr_to_sql(arena, subject),
            comparison: kind.class(),
        };
        Some(self.push_predicate(side, position, wrapped, id, cx))
    }

    /// `position` is the FROM position of the predicate's table.
    fn push_predicate(
        &mut self,
        side: ColumnSide,
        position: usize,
        kind: PredicateKind,
        id: ExprId,
        cx: WalkCx,
    ) -> BoolNode {
        let sargable = match &kind {
            PredicateKind::Equals(Operand::Null) => false,
            other => matches!(
                other.class(),
                OperatorClass::Equality | OperatorClass::InList | OperatorClass::Range | OperatorClass::LikePrefix
            ),
        };
        let restricts_rows = match cx.join {
            None | Some((JoinKind::Inner, _)) | Some((JoinKind::Cross, _)) => true,
            Some((JoinKind::Left, joined)) => position == joined,
            Some((JoinKind::Right, joined)) => position != joined,
        };
        self.out.predicates.push(Predicate {
            table: side.table,
            column: side.column,
            kind,
            clause: cx.clause,
            disjunctive: cx.disjunctive,
            sargable,
            restricts_rows,
            expr: id,
            text: expr_to_sql(self.arena, id),
        });
        BoolNode::Predicate(self.out.predicates.len() - 1)
    }

    // ------------------------------------------------------------------------
    // Ordering, projection and references
    // ------------------------------------------------------------------------

    fn ordering_of(&mut self, select: &Select, scope: &Scope) {
        for &item in &select.group_by {
            match self.column_use(select, scope, item, false) {
                Some(column) => self.out.group_by.push(column),
                None => self.out.group_by_complete = false,
            }
        }
        for item in &select.order_by {
            match self.column_use(select, scope, item.expr, item.descending) {
                Some(column) => self.out.order_by.push(column),
                None => self.out.order_by_complete = false,
            }
        }

        for item in &select.projection {
            match item {
                SelectItem::Wildcard | SelectItem::QualifiedWildcard(_) => self.out.select_star = true,
                SelectItem::Expr { expr, .. } => {
                    for node in self.arena.post_order(*expr) {
                        let Some(column) = self.arena.as_column(node) else {
                            continue;
                        };
                        if let Resolved::Column(side, _) = self.resolve(scope, column) {
                            let duplicate = self.out.projected.iter().any(|p| {
                                table_key(&p.table) == table_key(&side.table)
                                    && p.column.eq_ignore_ascii_case(&side.column)
                            });
                            if !duplicate {
                                self.out.projected.push(ColumnUse {
                                    table: side.table,
                                    column: side.column,
                                    descending: false,
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    /// GROUP BY / ORDER BY item as a bare column, following select aliases
    /// and positional references.
    fn column_use(&mut self, select: &Select, scope: &Scope, id: ExprId, descending: bool) -> Option<ColumnUse> {
        let arena = self.arena;
        let target = match &arena[id] {
            Expr::Literal(Literal::Number(n)) => {
                let position: usize = n.parse().ok()?;
                match select.projection.get(position.checked_sub(1)?)? {
                    SelectItem::Expr { expr, .. } => *expr,
                    _ => return None,
                }
            }
            Expr::Column(column) if column.qualifier.is_none() => select
                .projection
                .iter()
                .find_map(|item| match item {
                    SelectItem::Expr {
                        expr,
                        alias: Some(alias),
                    } if column.name.matches(alias.as_str()) => Some(*expr),
                    _ => None,
                })
                .unwrap_or(id),
            _ => id,
        };
        let column = arena.as_column(target)?;
        match self.resolve(scope, column) {
            Resolved::Column(side, _) => Some(ColumnUse {
                table: side.table,
                column: side.column,
                descending,
            }),
            Resolved::Unknown => None,
        }
    }

    fn references_of(&mut self, select: &Select, scope: &Scope) {
        let mut roots: Vec<ExprId> = Vec::new();
        for item in &select.projection {
            if let SelectItem::Expr { expr, .. } = item {
                roots.push(*expr);
            }
        }
        roots.extend(select.selection);
        roots.extend(select.having);
        roots.extend(select.group_by.iter().copied());
        roots.extend(select.order_by.iter().map(|o| o.expr));
        for item in &select.from {
            for join in &item.joins {
                if let JoinConstraint::On(on) = join.constraint {
                    roots.push(on);
                }
            }
        }

        let aliases: Vec<String> = select
            .projection
            .iter()
            .filter_map(|item| match item {
                SelectItem::Expr { alias: Some(a), .. } => Some(a.as_str().to_ascii_lowercase()),
                _ => None,
            })
            .collect();

        for root in roots {
            for node in self.arena.post_order(root) {
                let Some(column) = self.arena.as_column(node) else {
                    continue;
                };
                if column.qualifier.is_none() && aliases.contains(&column.name.as_str().to_ascii_lowercase()) {
                    continue;
                }
                if let Resolved::Column(side, _) = self.resolve(scope, column) {
                    self.out
                        .referenced
                        .entry(table_key(&side.table))
                        .or_default()
                        .insert(side.column.to_ascii_lowercase());
                }
            }
        }

        for item in &select.from {
            for join in &item.joins {
                if let JoinConstraint::Using(columns) = &join.constraint {
                    for factor in [&item.relation, &join.relation] {
                        if let Some(table) = scope.base_table_of(factor) {
                            for column in columns {
                                self.out
                                    .referenced
                                    .entry(table_key(&table))
                                    .or_default()
                                    .insert(column.as_str().to_ascii_lowercase());
                            }
                        }
                    }
                }
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn flatten(arena: &ExprArena, id: ExprId, op: BinaryOp, out: &mut Vec<ExprId>) {
    match &arena[id] {
        Expr::Binary { op: inner, left, right } if *inner == op => {
            flatten(arena, *left, op, out);
            flatten(arena, *right, op, out);
        }
        _ => out.push(id),
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

/// A value fixed for the whole statement: no column, no subquery, nothing
/// re-evaluated per row.
pub(crate) fn is_constant_side(arena: &ExprArena, id: ExprId) -> bool {
    !arena.any(id, |e| match e {
        Expr::Column(_) | Expr::Opaque { .. } => true,
        Expr::Function { name, over, .. } => over.is_some() || is_nondeterministic_function(name),
        _ => false,
    }) && !arena.contains_aggregate(id)
}

pub(crate) fn operand_of(arena: &ExprArena, id: ExprId) -> Operand {
    match &arena[id] {
        Expr::Literal(Literal::Number(text)) => match text.parse::<f64>() {
            Ok(n) => Operand::Value(Datum::Number(n)),
            Err(_) => Operand::Expression(text.clone()),
        },
        Expr::Literal(Literal::String(text)) => Operand::Value(Datum::Text(text.clone())),
        Expr::Literal(Literal::Temporal { value, .. }) => Operand::Value(Datum::Text(value.clone())),
        Expr::Literal(Literal::Boolean(b)) => Operand::Value(Datum::Number(if *b { 1.0 } else { 0.0 })),
        Expr::Literal(Literal::Null) => Operand::Null,
        Expr::Param => Operand::Param,
        _ => Operand::Expression(expr_to_sql(arena, id)),
    }
}

/// `column op value`, with NOT applied when `negated`.
fn comparison_kind(op: BinaryOp, value: Operand, negated: bool) -> Option<PredicateKind> {
    if op == BinaryOp::NullSafeEq {
        return Some(match (value, negated) {
            (Operand::Null, false) => PredicateKind::IsNull,
            (Operand::Null, true) => PredicateKind::IsNotNull,
            (value, false) => PredicateKind::Equals(value),
            (value, true) => PredicateKind::NotEquals(value),
        });
    }

    let op = if negated { op.negated()? } else { op };
    Some(match op {
        BinaryOp::Eq => PredicateKind::Equals(value),
        BinaryOp::NotEq => PredicateKind::NotEquals(value),
        BinaryOp::Lt | BinaryOp::LtEq => PredicateKind::Range {
            lower: None,
            upper: Some(Bound {
                value,
                inclusive: op == BinaryOp::LtEq,
            }),
        },
        BinaryOp::Gt | BinaryOp::GtEq => PredicateKind::Range {
            lower: Some(Bound {
                value,
                inclusive: op == BinaryOp::GtEq,
            }),
            upper: None,
        },
        _ => return None,
    })
}

fn like_kind(pattern: &str, escape: Option<char>) -> PredicateKind {
    let mut prefix = String::new();
    let mut complete = true;
    for c in pattern.chars() {
        if c == '%' || c == '_' || Some(c) == escape {
            complete = false;
            break;
        }
        prefix.push(c);
    }
    if prefix.is_empty() && !(complete && pattern.is_empty()) {
        return PredicateKind::LikeWildcard {
            pattern: Some(pattern.to_string()),
        };
    }
    PredicateKind::LikePrefix {
        prefix,
        pattern: pattern.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use turboindex_parser::{parse, parse_lenient, Dialect};

    fn extracted(sql: &str) -> ExtractedQuery {
        extract(&parse(sql, Dialect::default()).unwrap())
    }

    #[test]
    fn test_simple_equality() {
        let ex = extracted("SELECT * FROM orders WHERE customer_id = 123");
        assert_eq!(ex.predicates.len(), 1);
        let p = &ex.predicates[0];
        assert_eq!(p.table, "orders");
        assert_eq!(p.column, "customer_id");
        assert_eq!(p.kind, PredicateKind::Equals(Operand::Value(Datum::Number(123.0))));
        assert!(p.sargable && !p.disjunctive);
        assert!(ex.select_star);
    }

    #[test]
    fn test_or_of_equalities_folds_into_in_list() {
        let ex = extracted("SELECT * FROM users WHERE status = 'a' OR status = 'b'");
        assert_eq!(ex.predicates.len(), 1);
        assert_eq!(ex.predicates[0].class(), OperatorClass::InList);
        assert!(!ex.predicates[0].disjunctive);
    }

    #[test]
    fn test_mixed_disjunction_is_flagged() {
        let ex = extracted("SELECT * FROM users WHERE status = 'a' OR age > 3");
        assert_eq!(ex.predicates.len(), 2);
        assert!(ex.predicates.iter().all(|p| p.disjunctive));
        assert!(matches!(ex.filters[0].root, BoolNode::Or(_)));
    }

    #[test]
    fn test_negation_pushes_through() {
        let ex = extracted("SELECT * FROM t WHERE NOT (a = 1 OR b > 2)");
        let kinds: Vec<OperatorClass> = ex.predicates.iter().map(|p| p.class()).collect();
        assert_eq!(kinds, vec![OperatorClass::Inequality, OperatorClass::Range]);
        assert!(ex.predicates.iter().all(|p| !p.disjunctive));
        assert_eq!(
            ex.predicates[1].kind,
            PredicateKind::Range {
                lower: None,
                upper: Some(Bound {
                    value: Operand::Value(Datum::Number(2.0)),
                    inclusive: true
                })
            }
        );
    }

    #[test]
    fn test_aliases_resolve_and_joins_are_recorded() {
        let ex = extracted(
            "SELECT o.id FROM orders o JOIN customers c ON o.customer_id = c.id \
             WHERE c.region = 'eu' AND o.total > 10 ORDER BY o.created_at DESC",
        );
        assert_eq!(ex.joins.len(), 1);
        let join = &ex.joins[0];
        assert_eq!(join.probe.table, "customers");
        assert_eq!(join.probe.column, "id");
        let tables: Vec<&str> = ex.predicates.iter().map(|p| p.table.as_str()).collect();
        assert_eq!(tables, vec!["customers", "orders"]);
        assert_eq!(ex.order_by[0].column, "created_at");
        assert!(ex.order_by[0].descending);
    }

    #[test]
    fn test_left_join_on_conditions_of_preserved_side_do_not_restrict() {
        let ex = extracted("SELECT * FROM a LEFT JOIN b ON a.id = b.a_id AND a.flag = 1 AND b.kind = 2");
        let a_flag = ex.predicates.iter().find(|p| p.table == "a").unwrap();
        let b_kind = ex.predicates.iter().find(|p| p.table == "b").unwrap();
        assert!(!a_flag.restricts_rows);
        assert!(b_kind.restricts_rows);
        assert_eq!(ex.joins[0].probe.table, "b");
    }

    #[test]
    fn test_function_wrapped_and_like() {
        let ex = extracted(
            "SELECT id FROM t WHERE YEAR(created_at) = 2024 AND name LIKE 'ab%' AND code LIKE '%x'",
        );
        assert_eq!(ex.predicates[0].class(), OperatorClass::FunctionWrapped);
        assert_eq!(ex.predicates[0].column, "created_at");
        assert!(!ex.predicates[0].sargable);
        assert_eq!(
            ex.predicates[1].kind,
            PredicateKind::LikePrefix {
                prefix: "ab".into(),
                pattern: "ab%".into()
            }
        );
        assert_eq!(ex.predicates[2].class(), OperatorClass::LikeWildcard);
        assert_eq!(ex.non_sargable().count(), 2);
    }

    #[test]
    fn test_unqualified_columns_need_column_lists_with_several_tables() {
        let query = parse(
            "SELECT * FROM orders o, customers c WHERE o.customer_id = c.id AND region = 'eu'",
            Dialect::default(),
        )
        .unwrap();
        let ex = extract(&query);
        assert_eq!(ex.predicates.len(), 0);
        assert_eq!(ex.unresolved, vec!["region".to_string()]);

        let mut columns = HashMap::new();
        columns.insert("customers".to_string(), vec!["id".to_string(), "region".to_string()]);
        columns.insert("orders".to_string(), vec!["id".to_string(), "customer_id".to_string()]);
        let ex = extract_with_columns(&query, &columns);
        assert_eq!(ex.predicates[0].table, "customers");
        assert_eq!(ex.joins[0].probe.table, "customers");
    }

    #[test]
    fn test_three_part_column_references_resolve() {
        let ex = extracted("SELECT shop.orders.id FROM shop.orders WHERE shop.orders.customer_id = 7");
        assert_eq!(ex.predicates.len(), 1);
        assert_eq!(ex.predicates[0].table, "shop.orders");
        assert_eq!(ex.predicates[0].column, "customer_id");

        let ex = extracted("SELECT 1 FROM shop.orders WHERE archive.orders.customer_id = 7");
        assert!(ex.predicates.is_empty());
        assert_eq!(ex.unresolved, vec!["archive.orders.customer_id".to_string()]);
    }

    #[test]
    fn test_opaque_fragments_are_not_predicates() {
        let parsed = parse_lenient(
            "SELECT * FROM t WHERE a IN (SELECT b FROM u) AND c = 1",
            Dialect::default(),
        )
        .unwrap();
        let ex = extract(&parsed.query);
        assert_eq!(ex.predicates.len(), 1);
        match &ex.filters[0].root {
            BoolNode::And(children) => assert!(matches!(children[0], BoolNode::Opaque(_))),
            other => panic!("unexpected root {:?}", other),
        }
    }

    #[test]
    fn test_group_by_positions_and_aliases() {
        let ex = extracted("SELECT status AS s, COUNT(*) FROM t WHERE a = 1 GROUP BY 1 ORDER BY s");
        assert_eq!(ex.group_by[0].column, "status");
        assert_eq!(ex.order_by[0].column, "status");
        assert!(ex.group_by_complete && ex.order_by_complete);
        let referenced = &ex.referenced["t"];
        assert!(referenced.contains("a") && referenced.contains("status"));
    }
}
