// Arena AST
//
// Expressions live in an append-only arena and are addressed by `ExprId`.
// Nodes are never mutated after being pushed; a rewrite pushes replacement
// nodes and builds a new `Select` that points at them.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::ops::Index;

use crate::dialect::Dialect;

/// Stable index of a node inside an [`ExprArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExprId(u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// SQL identifier with its original spelling (quotes stripped).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Ident(pub String);

impl Ident {
    pub fn new(value: impl Into<String>) -> Self {
        Ident(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// MySQL column and alias names compare case-insensitively.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectName {
    pub schema: Option<Ident>,
    pub name: Ident,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnRef {
    /// Database of a three-part `db.table.column` reference.
    pub schema: Option<Ident>,
    pub qualifier: Option<Ident>,
    pub name: Ident,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalKind {
    Date,
    Time,
    Timestamp,
}

impl TemporalKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            TemporalKind::Date => "DATE",
            TemporalKind::Time => "TIME",
            TemporalKind::Timestamp => "TIMESTAMP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Literal {
    /// Numeric literal exactly as written (a leading `-` is folded in).
    Number(String),
    String(String),
    Null,
    Boolean(bool),
    Temporal { kind: TemporalKind, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOp {
    Or,
    Xor,
    And,
    Eq,
    NullSafeEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Regexp,
    Plus,
    Minus,
    Multiply,
    Divide,
    IntDivide,
    Modulo,
}

impl BinaryOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            BinaryOp::Or => "OR",
            BinaryOp::Xor => "XOR",
            BinaryOp::And => "AND",
            BinaryOp::Eq => "=",
            BinaryOp::NullSafeEq => "<=>",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Regexp => "REGEXP",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::IntDivide => "DIV",
            BinaryOp::Modulo => "%",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::Xor => 2,
            BinaryOp::And => 3,
            BinaryOp::Eq
            | BinaryOp::NullSafeEq
            | BinaryOp::NotEq
            | BinaryOp::Lt
            | BinaryOp::LtEq
            | BinaryOp::Gt
            | BinaryOp::GtEq
            | BinaryOp::Regexp => PREC_COMPARISON,
            BinaryOp::Plus | BinaryOp::Minus => PREC_ADDITIVE,
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::IntDivide | BinaryOp::Modulo => {
                PREC_MULTIPLICATIVE
            }
        }
    }

    /// `=`, `<>`, `<`, `<=`, `>`, `>=` and `<=>`.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NullSafeEq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    /// Operator that yields the logical complement under two-valued inputs.
    pub fn negated(&self) -> Option<BinaryOp> {
        Some(match self {
            BinaryOp::Eq => BinaryOp::NotEq,
            BinaryOp::NotEq => BinaryOp::Eq,
            BinaryOp::Lt => BinaryOp::GtEq,
            BinaryOp::LtEq => BinaryOp::Gt,
            BinaryOp::Gt => BinaryOp::LtEq,
            BinaryOp::GtEq => BinaryOp::Lt,
            _ => return None,
        })
    }

    /// Operator to use when the operands are swapped (`a < b` == `b > a`).
    pub fn flipped(&self) -> Option<BinaryOp> {
        Some(match self {
            BinaryOp::Eq => BinaryOp::Eq,
            BinaryOp::NullSafeEq => BinaryOp::NullSafeEq,
            BinaryOp::NotEq => BinaryOp::NotEq,
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::LtEq => BinaryOp::GtEq,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::GtEq => BinaryOp::LtEq,
            _ => return None,
        })
    }
}

/// Tallest expression tree a parsed query may contain. Every recursive walk
/// over the arena (serializer, extractor, rewrite rules) relies on it.
pub const MAX_EXPR_HEIGHT: usize = 512;

pub(crate) const PREC_NOT: u8 = 4;
pub(crate) const PREC_COMPARISON: u8 = 5;
pub(crate) const PREC_ADDITIVE: u8 = 7;
pub(crate) const PREC_MULTIPLICATIVE: u8 = 8;
pub(crate) const PREC_UNARY: u8 = 10;
pub(crate) const PREC_ATOM: u8 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum FunctionArgs {
    /// `COUNT(*)`
    Star,
    List { distinct: bool, args: Vec<ExprId> },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WindowSpec {
    pub partition_by: Vec<ExprId>,
    pub order_by: Vec<OrderByItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WhenClause {
    pub condition: ExprId,
    pub result: ExprId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Literal),
    /// `?` placeholder
    Param,
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    Binary {
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    },
    IsNull {
        operand: ExprId,
        negated: bool,
    },
    InList {
        operand: ExprId,
        list: Vec<ExprId>,
        negated: bool,
    },
    Between {
        operand: ExprId,
        low: ExprId,
        high: ExprId,
        negated: bool,
    },
    Like {
        operand: ExprId,
        pattern: ExprId,
        escape: Option<ExprId>,
        negated: bool,
    },
    Function {
        /// Upper-cased function name.
        name: String,
        args: FunctionArgs,
        over: Option<WindowSpec>,
    },
    Cast {
        operand: ExprId,
        /// Canonical upper-case type text, e.g. `DECIMAL(10,2)`.
        data_type: String,
    },
    Case {
        operand: Option<ExprId>,
        branches: Vec<WhenClause>,
        else_result: Option<ExprId>,
    },
    Interval {
        value: ExprId,
        unit: String,
    },
    /// Fragment recognised but not modelled; carries canonical text.
    /// `atomic` fragments bind like a primary, the rest like a comparison.
    Opaque {
        text: String,
        atomic: bool,
    },
}

impl Expr {
    pub fn column(qualifier: Option<&str>, name: &str) -> Self {
        Expr::Column(ColumnRef {
            schema: None,
            qualifier: qualifier.map(Ident::new),
            name: Ident::new(name),
        })
    }

    pub fn number(text: impl Into<String>) -> Self {
        Expr::Literal(Literal::Number(text.into()))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Expr::Literal(Literal::Boolean(value))
    }

    /// Direct children in source order.
    pub fn children(&self) -> Vec<ExprId> {
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::Param | Expr::Opaque { .. } => Vec::new(),
            Expr::Unary { operand, .. }
            | Expr::IsNull { operand, .. }
            | Expr::Cast { operand, .. } => vec![*operand],
            Expr::Interval { value, .. } => vec![*value],
            Expr::Binary { left, right, .. } => vec![*left, *right],
            Expr::InList { operand, list, .. } => {
                let mut out = vec![*operand];
                out.extend(list.iter().copied());
                out
            }
            Expr::Between {
                operand, low, high, ..
            } => vec![*operand, *low, *high],
            Expr::Like {
                operand,
                pattern,
                escape,
                ..
            } => {
                let mut out = vec![*operand, *pattern];
                out.extend(escape.iter().copied());
                out
            }
            Expr::Function { args, over, .. } => {
                let mut out = match args {
                    FunctionArgs::Star => Vec::new(),
                    FunctionArgs::List { args, .. } => args.clone(),
                };
                if let Some(window) = over {
                    out.extend(window.partition_by.iter().copied());
                    out.extend(window.order_by.iter().map(|o| o.expr));
                }
                out
            }
            Expr::Case {
                operand,
                branches,
                else_result,
            } => {
                let mut out: Vec<ExprId> = operand.iter().copied().collect();
                for branch in branches {
                    out.push(branch.condition);
                    out.push(branch.result);
                }
                out.extend(else_result.iter().copied());
                out
            }
        }
    }

    /// Copy of this node with its children replaced, in [`Expr::children`]
    /// order. Missing entries keep the original child.
    pub fn with_children(&self, children: &[ExprId]) -> Expr {
        let mut supplied = children.iter().copied();
        let mut next = |old: ExprId| supplied.next().unwrap_or(old);

        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::Param | Expr::Opaque { .. } => self.clone(),
            Expr::Unary { op, operand } => Expr::Unary {
                op: *op,
                operand: next(*operand),
            },
            Expr::IsNull { operand, negated } => Expr::IsNull {
                operand: next(*operand),
                negated: *negated,
            },
            Expr::Cast { operand, data_type } => Expr::Cast {
                operand: next(*operand),
                data_type: data_type.clone(),
            },
            Expr::Interval { value, unit } => Expr::Interval {
                value: next(*value),
                unit: unit.clone(),
            },
            Expr::Binary { op, left, right } => {
                let left = next(*left);
                let right = next(*right);
                Expr::Binary {
                    op: *op,
                    left,
                    right,
                }
            }
            Expr::InList {
                operand,
                list,
                negated,
            } => {
                let operand = next(*operand);
                let list = list.iter().map(|item| next(*item)).collect();
                Expr::InList {
                    operand,
                    list,
                    negated: *negated,
                }
            }
            Expr::Between {
                operand,
                low,
                high,
                negated,
            } => {
                let operand = next(*operand);
                let low = next(*low);
                let high = next(*high);
                Expr::Between {
                    operand,
                    low,
                    high,
                    negated: *negated,
                }
            }
            Expr::Like {
                operand,
                pattern,
                escape,
                negated,
            } => {
                let operand = next(*operand);
                let pattern = next(*pattern);
                let escape = escape.map(&mut next);
                Expr::Like {
                    operand,
                    pattern,
                    escape,
                    negated: *negated,
                }
            }
            Expr::Function { name, args, over } => {
                let args = match args {
                    FunctionArgs::Star => FunctionArgs::Star,
                    FunctionArgs::List { distinct, args } => FunctionArgs::List {
                        distinct: *distinct,
                        args: args.iter().map(|a| next(*a)).collect(),
                    },
                };
                let over = over.as_ref().map(|window| WindowSpec {
                    partition_by: window.partition_by.iter().map(|p| next(*p)).collect(),
                    order_by: window
                        .order_by
                        .iter()
                        .map(|o| OrderByItem {
                            expr: next(o.expr),
                            descending: o.descending,
                        })
                        .collect(),
                });
                Expr::Function {
                    name: name.clone(),
                    args,
                    over,
                }
            }
            Expr::Case {
                operand,
                branches,
                else_result,
            } => {
                let operand = operand.map(&mut next);
                let branches = branches
                    .iter()
                    .map(|b| {
                        let condition = next(b.condition);
                        let result = next(b.result);
                        WhenClause { condition, result }
                    })
                    .collect();
                let else_result = else_result.map(&mut next);
                Expr::Case {
                    operand,
                    branches,
                    else_result,
                }
            }
        }
    }

    /// The node with every child id zeroed, for shape comparison.
    fn shallow(&self) -> Expr {
        let zeros = vec![ExprId(0); self.children().len()];
        self.with_children(&zeros)
    }
}

/// Append-only storage for expression nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExprArena {
    nodes: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(expr);
        id
    }

    pub fn get(&self, id: ExprId) -> Option<&Expr> {
        self.nodes.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, id: ExprId) -> Vec<ExprId> {
        self.get(id).map(Expr::children).unwrap_or_default()
    }

    /// Height of the tallest tree stored in the arena; 0 when empty.
    ///
    /// Nodes only reference ids pushed before them, so one forward pass
    /// sees every child before its parent.
    pub fn max_height(&self) -> usize {
        let mut heights = vec![0usize; self.nodes.len()];
        let mut tallest = 0;
        for (i, node) in self.nodes.iter().enumerate() {
            let height = 1 + node
                .children()
                .iter()
                .map(|child| heights.get(child.index()).copied().unwrap_or(0))
                .max()
                .unwrap_or(0);
            heights[i] = height;
            tallest = tallest.max(height);
        }
        tallest
    }

    /// All nodes of the subtree rooted at `id`, children before parents.
    pub fn post_order(&self, id: ExprId) -> Vec<ExprId> {
        let mut out = Vec::new();
        let mut stack = vec![(id, false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                out.push(node);
                continue;
            }
            stack.push((node, true));
            for child in self.children(node).into_iter().rev() {
                stack.push((child, false));
            }
        }
        out
    }

    /// True when any node of the subtree satisfies `pred`.
    pub fn any(&self, id: ExprId, pred: impl Fn(&Expr) -> bool) -> bool {
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if let Some(expr) = self.get(node) {
                if pred(expr) {
                    return true;
                }
                stack.extend(expr.children());
            }
        }
        false
    }

    pub fn contains_opaque(&self, id: ExprId) -> bool {
        self.any(id, |e| matches!(e, Expr::Opaque { .. }))
    }

    pub fn contains_param(&self, id: ExprId) -> bool {
        self.any(id, |e| matches!(e, Expr::Param))
    }

    pub fn contains_aggregate(&self, id: ExprId) -> bool {
        self.any(id, |e| {
            matches!(e, Expr::Function { name, over: None, .. } if is_aggregate_function(name))
        })
    }

    pub fn contains_column(&self, id: ExprId) -> bool {
        self.any(id, |e| matches!(e, Expr::Column(_)))
    }

    /// Same input rows always yield the same value. Parameters count as
    /// non-deterministic since two placeholders may bind different values.
    pub fn is_deterministic(&self, id: ExprId) -> bool {
        !self.any(id, |e| match e {
            Expr::Param | Expr::Opaque { .. } => true,
            Expr::Function { name, over, .. } => {
                over.is_some() || is_nondeterministic_function(name)
            }
            _ => false,
        })
    }

    /// Structural equality of two subtrees, possibly living in different
    /// arenas.
    pub fn same_tree(&self, a: ExprId, other: &ExprArena, b: ExprId) -> bool {
        let (Some(left), Some(right)) = (self.get(a), other.get(b)) else {
            return false;
        };
        if left.shallow() != right.shallow() {
            return false;
        }
        let left_children = left.children();
        let right_children = right.children();
        left_children.len() == right_children.len()
            && left_children
                .iter()
                .zip(&right_children)
                .all(|(l, r)| self.same_tree(*l, other, *r))
    }

    /// Column reference at `id`, if the node is a bare column.
    pub fn as_column(&self, id: ExprId) -> Option<&ColumnRef> {
        match self.get(id) {
            Some(Expr::Column(column)) => Some(column),
            _ => None,
        }
    }

    pub fn as_literal(&self, id: ExprId) -> Option<&Literal> {
        match self.get(id) {
            Some(Expr::Literal(literal)) => Some(literal),
            _ => None,
        }
    }

    /// Literal or placeholder: a value known before execution.
    pub fn is_constant_operand(&self, id: ExprId) -> bool {
        matches!(self.get(id), Some(Expr::Literal(_)) | Some(Expr::Param))
    }
}

/// Panics on a foreign id; ids handed out by this arena are always valid.
impl Index<ExprId> for ExprArena {
    type Output = Expr;

    fn index(&self, id: ExprId) -> &Expr {
        &self.nodes[id.index()]
    }
}

static AGGREGATE_FUNCTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "AVG", "BIT_AND", "BIT_OR", "BIT_XOR", "COUNT", "GROUP_CONCAT", "JSON_ARRAYAGG",
        "JSON_OBJECTAGG", "MAX", "MIN", "STD", "STDDEV", "STDDEV_POP", "STDDEV_SAMP", "SUM",
        "VARIANCE", "VAR_POP", "VAR_SAMP",
    ]
    .into_iter()
    .collect()
});

static NONDETERMINISTIC_FUNCTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "BENCHMARK", "CONNECTION_ID", "FOUND_ROWS", "GET_LOCK", "LAST_INSERT_ID", "RAND",
        "RELEASE_LOCK", "ROW_COUNT", "SLEEP", "SYSDATE", "UUID", "UUID_SHORT",
    ]
    .into_iter()
    .collect()
});

pub fn is_aggregate_function(name: &str) -> bool {
    AGGREGATE_FUNCTIONS.contains(name.to_ascii_uppercase().as_str())
}

pub fn is_nondeterministic_function(name: &str) -> bool {
    NONDETERMINISTIC_FUNCTIONS.contains(name.to_ascii_uppercase().as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct OrderByItem {
    pub expr: ExprId,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum SelectItem {
    /// `*`
    Wildcard,
    /// `t.*`
    QualifiedWildcard(Ident),
    Expr { expr: ExprId, alias: Option<Ident> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IndexHintKind {
    Use,
    Force,
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IndexHint {
    pub kind: IndexHintKind,
    pub indexes: Vec<Ident>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum TableFactor {
    Table {
        name: ObjectName,
        alias: Option<Ident>,
        hints: Vec<IndexHint>,
    },
    /// Derived table or parenthesized join kept as text.
    Opaque { text: String, alias: Option<Ident> },
}

impl TableFactor {
    /// Name the rest of the query uses to refer to this table.
    pub fn exposed_name(&self) -> Option<&Ident> {
        match self {
            TableFactor::Table { name, alias, .. } => Some(alias.as_ref().unwrap_or(&name.name)),
            TableFactor::Opaque { alias, .. } => alias.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Inner,
    Cross,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum JoinConstraint {
    On(ExprId),
    Using(Vec<Ident>),
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Join {
    pub kind: JoinKind,
    pub relation: TableFactor,
    pub constraint: JoinConstraint,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableWithJoins {
    pub relation: TableFactor,
    pub joins: Vec<Join>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Limit {
    pub count: ExprId,
    pub offset: Option<ExprId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Select {
    pub distinct: bool,
    pub projection: Vec<SelectItem>,
    /// Comma-separated FROM items.
    pub from: Vec<TableWithJoins>,
    pub selection: Option<ExprId>,
    pub group_by: Vec<ExprId>,
    pub having: Option<ExprId>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<Limit>,
}

impl Select {
    /// Every table factor in FROM order, joins included.
    pub fn table_factors(&self) -> Vec<&TableFactor> {
        let mut out = Vec::new();
        for item in &self.from {
            out.push(&item.relation);
            for join in &item.joins {
                out.push(&join.relation);
            }
        }
        out
    }

    pub fn has_wildcard(&self) -> bool {
        self.projection
            .iter()
            .any(|item| matches!(item, SelectItem::Wildcard | SelectItem::QualifiedWildcard(_)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cte {
    pub name: Ident,
    pub columns: Vec<Ident>,
    pub body: Select,
}

/// A parsed SELECT statement together with the arena holding its
/// expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    /// Text the query was parsed from (canonical text for rewritten queries).
    pub source: String,
    pub dialect: Dialect,
    pub arena: ExprArena,
    pub ctes: Vec<Cte>,
    pub body: Select,
}

impl Query {
    /// Same statement shape and expressions, ignoring arena layout and
    /// source text.
    pub fn structurally_eq(&self, other: &Query) -> bool {
        self.ctes.len() == other.ctes.len()
            && self.ctes.iter().zip(&other.ctes).all(|(a, b)| {
                a.name == b.name
                    && a.columns == b.columns
                    && self.select_eq(&a.body, other, &b.body)
            })
            && self.select_eq(&self.body, other, &other.body)
    }

    fn select_eq(&self, a: &Select, other: &Query, b: &Select) -> bool {
        let expr = |x: ExprId, y: ExprId| self.arena.same_tree(x, &other.arena, y);
        let opt = |x: Option<ExprId>, y: Option<ExprId>| match (x, y) {
            (Some(x), Some(y)) => expr(x, y),
            (None, None) => true,
            _ => false,
        };
        let list = |x: &[ExprId], y: &[ExprId]| {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| expr(*x, *y))
        };
        let order = |x: &[OrderByItem], y: &[OrderByItem]| {
            x.len() == y.len()
                && x
                    .iter()
                    .zip(y)
                    .all(|(x, y)| x.descending == y.descending && expr(x.expr, y.expr))
        };

        let projection_eq = a.projection.len() == b.projection.len()
            && a.projection.iter().zip(&b.projection).all(|pair| match pair {
                (SelectItem::Expr { expr: x, alias: ax }, SelectItem::Expr { expr: y, alias: ay }) => {
                    ax == ay && expr(*x, *y)
                }
                (x, y) => x == y,
            });

        let join_eq = |x: &Join, y: &Join| {
            x.kind == y.kind
                && x.relation == y.relation
                && match (&x.constraint, &y.constraint) {
                    (JoinConstraint::On(l), JoinConstraint::On(r)) => expr(*l, *r),
                    (l, r) => l == r,
                }
        };
        let from_eq = a.from.len() == b.from.len()
            && a.from.iter().zip(&b.from).all(|(x, y)| {
                x.relation == y.relation
                    && x.joins.len() == y.joins.len()
                    && x.joins.iter().zip(&y.joins).all(|(l, r)| join_eq(l, r))
            });

        let limit_eq = match (&a.limit, &b.limit) {
            (Some(x), Some(y)) => expr(x.count, y.count) && opt(x.offset, y.offset),
            (None, None) => true,
            _ => false,
        };

        a.distinct == b.distinct
            && projection_eq
            && from_eq
            && opt(a.selection, b.selection)
            && list(&a.group_by, &b.group_by)
            && opt(a.having, b.having)
            && order(&a.order_by, &b.order_by)
            && limit_eq
    }
}
