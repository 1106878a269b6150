//! Rule-driven rewrite engine.
//!
//! Rules live in a fixed-priority catalog ([`rules::CATALOG`]). Each
//! iteration scans the catalog in order and, per rule, the filter trees
//! bottom-up; the first allowed match is rewritten and the scan restarts.
//! Nodes are never mutated: a rewrite appends the replacement subtree to the
//! arena and rebuilds the path from the clause root.

pub mod rules;

use serde::Serialize;
use tracing::{debug, warn};
use turboindex_parser::{
    expr_to_sql, BinaryOp, ColumnRef, Dialect, Expr, ExprArena, ExprId, JoinConstraint, Literal,
    Query, Select, TableFactor, UnsupportedConstruct, MAX_EXPR_HEIGHT,
};

use crate::config::{AnalysisConfig, RewriteMode};
use crate::estimate::scan_cost;
use crate::extract::{extract_with_columns, PredicateKind};
use crate::stats::{ColumnStats, StatsSnapshot};

pub use rules::{Production, Rule, RuleScope, StatementProduction, CATALOG};

// ============================================================================
// Core Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Safety {
    /// Result-equivalent for every input.
    Safe,
    /// Equivalent only under the assumption stated in the rationale.
    Aggressive,
}

impl Safety {
    pub fn allowed_in(&self, mode: RewriteMode) -> bool {
        match (self, mode) {
            (Safety::Safe, _) => true,
            (Safety::Aggressive, RewriteMode::Aggressive) => true,
            (Safety::Aggressive, RewriteMode::Safe) => false,
        }
    }
}

/// Part of the statement a suggestion touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RewriteClause {
    Select,
    Where,
    On,
    Having,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewriteSuggestion {
    pub rule_id: &'static str,
    pub safety: Safety,
    pub clause: RewriteClause,
    /// Canonical text of the fragment before the rewrite.
    pub original: String,
    pub rewritten: String,
    pub rationale: String,
    /// Change in estimated rows read; negative is an improvement.
    pub cost_delta: f64,
}

/// Advisory note that does not change the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub code: &'static str,
    pub fragment: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RewriteOutcome {
    pub original: String,
    pub rewritten: String,
    #[serde(skip)]
    pub rewritten_query: Query,
    pub mode: RewriteMode,
    pub suggestions: Vec<RewriteSuggestion>,
    pub findings: Vec<Finding>,
    pub warnings: Vec<String>,
    /// Fragments replaced by opaque nodes during lenient parsing.
    pub skipped: Vec<UnsupportedConstruct>,
    pub iterations: usize,
    pub converged: bool,
}

impl RewriteOutcome {
    pub fn changed(&self) -> bool {
        !self.suggestions.is_empty()
    }
}

// ============================================================================
// Schema view
// ============================================================================

/// Column types and lists for the tables of one query, through its aliases.
#[derive(Debug, Clone)]
pub struct SchemaView<'a> {
    snapshot: &'a StatsSnapshot,
    /// (exposed name, base table) in FROM order.
    relations: Vec<(String, Option<String>)>,
}

impl<'a> SchemaView<'a> {
    pub fn new(query: &Query, snapshot: &'a StatsSnapshot) -> Self {
        let relations = query
            .body
            .table_factors()
            .into_iter()
            .map(|factor| match factor {
                TableFactor::Table { name, alias, .. } => {
                    let is_cte = name.schema.is_none() && query.ctes.iter().any(|c| c.name.matches(name.name.as_str()));
                    let table = match &name.schema {
                        Some(schema) => format!("{}.{}", schema, name.name),
                        None => name.name.to_string(),
                    };
                    (
                        alias.as_ref().unwrap_or(&name.name).to_string(),
                        if is_cte { None } else { Some(table) },
                    )
                }
                TableFactor::Opaque { alias, .. } => (
                    alias.as_ref().map(|a| a.to_string()).unwrap_or_default(),
                    None,
                ),
            })
            .collect();
        Self { snapshot, relations }
    }

    /// Statistics of the column `column` refers to, when it can be resolved.
    pub fn column(&self, column: &ColumnRef) -> Option<&'a ColumnStats> {
        match &column.qualifier {
            Some(qualifier) => {
                let (_, table) = self.relations.iter().find(|(exposed, _)| qualifier.matches(exposed))?;
                self.snapshot.column(table.as_ref()?, column.name.as_str())
            }
            None => {
                let mut found = None;
                for (_, table) in &self.relations {
                    let Some(table) = table else {
                        return None;
                    };
                    if let Some(stats) = self.snapshot.column(table, column.name.as_str()) {
                        if found.is_some() {
                            return None;
                        }
                        found = Some(stats);
                    }
                }
                found
            }
        }
    }

    /// The only relation in FROM, when it is a base table.
    pub fn single_table(&self) -> Option<&str> {
        match self.relations.as_slice() {
            [(_, Some(table))] => Some(table),
            _ => None,
        }
    }

    pub fn table_columns(&self, table: &str) -> Option<Vec<String>> {
        let stats = self.snapshot.get(table)?;
        if stats.columns.is_empty() {
            None
        } else {
            Some(stats.column_names())
        }
    }
}

/// What a rule sees besides the node itself.
pub struct RuleContext<'a> {
    pub schema: &'a SchemaView<'a>,
    pub dialect: Dialect,
    /// The node is reachable from a WHERE/ON/HAVING root through AND/OR
    /// only, so only the set of rows that evaluate TRUE matters.
    pub filter_position: bool,
}

// ============================================================================
// Sites
// ============================================================================

/// Root of one filter tree inside the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Site {
    Where,
    On(usize, usize),
    Having,
}

impl Site {
    fn clause(&self) -> RewriteClause {
        match self {
            Site::Where => RewriteClause::Where,
            Site::On(..) => RewriteClause::On,
            Site::Having => RewriteClause::Having,
        }
    }
}

fn sites(select: &Select) -> Vec<(Site, ExprId)> {
    let mut out = Vec::new();
    if let Some(selection) = select.selection {
        out.push((Site::Where, selection));
    }
    for (i, item) in select.from.iter().enumerate() {
        for (j, join) in item.joins.iter().enumerate() {
            if let JoinConstraint::On(on) = join.constraint {
                out.push((Site::On(i, j), on));
            }
        }
    }
    if let Some(having) = select.having {
        out.push((Site::Having, having));
    }
    out
}

fn set_site(select: &mut Select, site: Site, root: ExprId) {
    match site {
        Site::Where => select.selection = Some(root),
        Site::On(i, j) => {
            if let Some(join) = select.from.get_mut(i).and_then(|item| item.joins.get_mut(j)) {
                join.constraint = JoinConstraint::On(root);
            }
        }
        Site::Having => select.having = Some(root),
    }
}

/// Nodes reachable from `root` through AND/OR only.
fn filter_positions(arena: &ExprArena, root: ExprId) -> Vec<ExprId> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        out.push(id);
        if let Expr::Binary {
            op: BinaryOp::And | BinaryOp::Or,
            left,
            right,
        } = &arena[id]
        {
            stack.push(*left);
            stack.push(*right);
        }
    }
    out
}

/// Rebuild `root` with every occurrence of `target` replaced.
fn replace_node(arena: &mut ExprArena, root: ExprId, target: ExprId, replacement: ExprId) -> ExprId {
    if root == target {
        return replacement;
    }
    let node = arena[root].clone();
    let children = node.children();
    if children.is_empty() {
        return root;
    }
    let replaced: Vec<ExprId> = children
        .iter()
        .map(|child| replace_node(arena, *child, target, replacement))
        .collect();
    if replaced == children {
        root
    } else {
        arena.push(node.with_children(&replaced))
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct RewriteEngine<'a> {
    config: &'a AnalysisConfig,
    mode: RewriteMode,
    snapshot: &'a StatsSnapshot,
}

impl<'a> RewriteEngine<'a> {
    pub fn new(config: &'a AnalysisConfig, mode: RewriteMode, snapshot: &'a StatsSnapshot) -> Self {
        Self {
            config,
            mode,
            snapshot,
        }
    }

    pub fn rewrite(&self, query: &Query) -> RewriteOutcome {
        let height = query.arena.max_height();
        if height > MAX_EXPR_HEIGHT {
            warn!(height, limit = MAX_EXPR_HEIGHT, "expression tree too tall to rewrite");
            return RewriteOutcome {
                original: query.source.clone(),
                rewritten: query.source.clone(),
                rewritten_query: query.clone(),
                mode: self.mode,
                suggestions: Vec::new(),
                findings: Vec::new(),
                warnings: vec![format!(
                    "expression tree of height {} exceeds {}; no rewrite attempted",
                    height, MAX_EXPR_HEIGHT
                )],
                skipped: Vec::new(),
                iterations: 0,
                converged: false,
            };
        }

        let original = query.to_sql();
        let schema = SchemaView::new(query, self.snapshot);
        let mut current = query.clone();
        let mut suggestions = Vec::new();
        let mut warnings = Vec::new();
        let mut iterations = 0usize;
        let mut converged = true;

        let mut cost = self.cost_of(&current);
        'iterate: loop {
            if current.arena.max_height() > MAX_EXPR_HEIGHT {
                converged = false;
                warn!(iterations, "rewritten expression tree grew too tall");
                warnings.push(format!(
                    "rewrite stopped after {} iterations; expression tree exceeds height {}",
                    iterations, MAX_EXPR_HEIGHT
                ));
                break;
            }
            for (priority, rule) in CATALOG.iter().enumerate() {
                let application = match rule {
                    Rule::Expression { .. } => self.apply_expression_rule(rule, &schema, &mut current, iterations),
                    Rule::Statement { .. } => self.apply_statement_rule(rule, &schema, &mut current, iterations),
                };
                match application {
                    Step::NoMatch => continue,
                    Step::BoundHit => {
                        converged = false;
                        let message = format!(
                            "rewrite stopped after {} iterations; rule `{}` still applies",
                            iterations,
                            rule.id()
                        );
                        warn!(limit = self.config.max_rewrite_iterations, rule = rule.id(), "rewrite iteration bound reached");
                        warnings.push(message);
                        break 'iterate;
                    }
                    Step::Applied(mut suggestion) => {
                        iterations += 1;
                        let next_cost = self.cost_of(&current);
                        suggestion.cost_delta = next_cost - cost;
                        cost = next_cost;
                        debug!(
                            rule = suggestion.rule_id,
                            priority,
                            original = %suggestion.original,
                            rewritten = %suggestion.rewritten,
                            "rewrite applied"
                        );
                        suggestions.push(suggestion);
                        continue 'iterate;
                    }
                }
            }
            break;
        }

        current.source = current.to_sql();
        let rewritten = current.source.clone();
        RewriteOutcome {
            findings: findings(query, self.mode, self.snapshot),
            original,
            rewritten,
            rewritten_query: current,
            mode: self.mode,
            suggestions,
            warnings,
            skipped: Vec::new(),
            iterations,
            converged,
        }
    }

    fn cost_of(&self, query: &Query) -> f64 {
        let extracted = extract_with_columns(query, &self.snapshot.column_lists());
        scan_cost(&extracted, self.snapshot, self.config).total
    }

    fn apply_expression_rule(
        &self,
        rule: &Rule,
        schema: &SchemaView<'_>,
        query: &mut Query,
        iterations: usize,
    ) -> Step {
        let Rule::Expression {
            id,
            scope,
            matches,
            produce,
        } = rule
        else {
            return Step::NoMatch;
        };

        for (site, root) in sites(&query.body) {
            let positions = filter_positions(&query.arena, root);
            for node in query.arena.post_order(root) {
                if query.arena.contains_opaque(node) {
                    continue;
                }
                let filter_position = positions.contains(&node);
                if *scope == RuleScope::FilterOnly && !filter_position {
                    continue;
                }
                let cx = RuleContext {
                    schema,
                    dialect: query.dialect,
                    filter_position,
                };
                let Some(safety) = matches(&cx, &query.arena, node) else {
                    continue;
                };
                if !safety.allowed_in(self.mode) {
                    continue;
                }
                if iterations >= self.config.max_rewrite_iterations {
                    return Step::BoundHit;
                }
                let Some(production) = produce(&cx, &mut query.arena, node) else {
                    continue;
                };

                let original = expr_to_sql(&query.arena, node);
                let rewritten = expr_to_sql(&query.arena, production.replacement);
                let new_root = replace_node(&mut query.arena, root, node, production.replacement);
                set_site(&mut query.body, site, new_root);
                return Step::Applied(RewriteSuggestion {
                    rule_id: *id,
                    safety,
                    clause: site.clause(),
                    original,
                    rewritten,
                    rationale: production.rationale,
                    cost_delta: 0.0,
                });
            }
        }
        Step::NoMatch
    }

    fn apply_statement_rule(
        &self,
        rule: &Rule,
        schema: &SchemaView<'_>,
        query: &mut Query,
        iterations: usize,
    ) -> Step {
        let Rule::Statement { id, matches, produce } = rule else {
            return Step::NoMatch;
        };
        let cx = RuleContext {
            schema,
            dialect: query.dialect,
            filter_position: false,
        };
        let Some(safety) = matches(&cx, &query.arena, &query.body) else {
            return Step::NoMatch;
        };
        if !safety.allowed_in(self.mode) {
            return Step::NoMatch;
        }
        if iterations >= self.config.max_rewrite_iterations {
            return Step::BoundHit;
        }
        let Some(production) = produce(&cx, &mut query.arena, &query.body) else {
            return Step::NoMatch;
        };
        query.body = production.select;
        Step::Applied(RewriteSuggestion {
            rule_id: *id,
            safety,
            clause: production.clause,
            original: production.original,
            rewritten: production.rewritten,
            rationale: production.rationale,
            cost_delta: 0.0,
        })
    }
}

enum Step {
    NoMatch,
    BoundHit,
    Applied(RewriteSuggestion),
}

/// Rewrite `query` with the given mode; statistics supply schema hints.
pub fn rewrite(query: &Query, mode: RewriteMode, snapshot: &StatsSnapshot, config: &AnalysisConfig) -> RewriteOutcome {
    RewriteEngine::new(config, mode, snapshot).rewrite(query)
}

// ============================================================================
// Findings
// ============================================================================

fn findings(query: &Query, mode: RewriteMode, snapshot: &StatsSnapshot) -> Vec<Finding> {
    let mut out = Vec::new();
    let arena = &query.arena;

    if query.body.has_wildcard() {
        out.push(Finding {
            code: "select-star",
            fragment: "*".to_string(),
            message: "SELECT * reads every column and prevents covering indexes".to_string(),
        });
    }

    if mode == RewriteMode::Safe {
        for (_, root) in sites(&query.body) {
            for node in arena.post_order(root) {
                if let Expr::Binary { op, left, right } = &arena[node] {
                    let null_operand = matches!(arena.as_literal(*left), Some(Literal::Null))
                        || matches!(arena.as_literal(*right), Some(Literal::Null));
                    if op.is_comparison() && *op != BinaryOp::NullSafeEq && null_operand {
                        out.push(Finding {
                            code: "comparison-with-null",
                            fragment: expr_to_sql(arena, node),
                            message: "comparison with NULL is never true; IS NULL / IS NOT NULL was probably meant"
                                .to_string(),
                        });
                    }
                }
            }
        }
    }

    let extracted = extract_with_columns(query, &snapshot.column_lists());
    for predicate in extracted.non_sargable() {
        let message = match &predicate.kind {
            PredicateKind::FunctionWrapped { .. } => format!(
                "column {}.{} is wrapped in an expression; an index on it cannot be used",
                predicate.table, predicate.column
            ),
            _ => format!(
                "leading wildcard on {}.{} forces a scan",
                predicate.table, predicate.column
            ),
        };
        out.push(Finding {
            code: "non-sargable-predicate",
            fragment: predicate.text.clone(),
            message,
        });
    }
    out
}
