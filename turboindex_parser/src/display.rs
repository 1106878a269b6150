// Canonical SQL serializer
//
// Keywords are upper-case, identifiers keep their spelling and are
// backtick-quoted only when reserved or not a plain identifier, strings are
// single-quoted, and parentheses appear only where precedence needs them.

use std::borrow::Cow;
use std::fmt::{self, Write};

use crate::ast::*;
use crate::token::{is_reserved, punctuation, Token, TokenKind};

/// Backtick-quote `name` when it cannot be written bare.
pub fn quote_ident(name: &str) -> Cow<'_, str> {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    };
    if plain && !is_reserved(name) {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("`{}`", name.replace('`', "``")))
    }
}

/// Single-quoted MySQL string literal.
pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{1a}' => out.push_str("\\Z"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Canonical text of one expression.
pub fn expr_to_sql(arena: &ExprArena, id: ExprId) -> String {
    let mut writer = SqlWriter::new(arena);
    writer.expr(id);
    writer.finish()
}

/// Like [`expr_to_sql`], parenthesized when the node binds looser than
/// `min_precedence`.
pub(crate) fn child_to_sql(arena: &ExprArena, id: ExprId, min_precedence: u8) -> String {
    let mut writer = SqlWriter::new(arena);
    writer.child(id, min_precedence);
    writer.finish()
}

/// Canonical text of a SELECT body with optional CTEs.
pub fn select_to_sql(arena: &ExprArena, ctes: &[Cte], select: &Select) -> String {
    let mut writer = SqlWriter::new(arena);
    writer.with_clause(ctes);
    writer.select(select);
    writer.finish()
}

impl Query {
    /// Canonical SQL for the whole statement.
    pub fn to_sql(&self) -> String {
        select_to_sql(&self.arena, &self.ctes, &self.body)
    }

    pub fn expr_sql(&self, id: ExprId) -> String {
        expr_to_sql(&self.arena, id)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Binding strength of a node as written.
fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Binary { op, .. } => op.precedence(),
        Expr::Unary { op: UnaryOp::Not, .. } => PREC_NOT,
        Expr::Unary { .. } => PREC_UNARY,
        Expr::IsNull { .. } | Expr::InList { .. } | Expr::Between { .. } | Expr::Like { .. } => {
            PREC_COMPARISON
        }
        Expr::Opaque { atomic: false, .. } => PREC_COMPARISON,
        _ => PREC_ATOM,
    }
}

struct SqlWriter<'a> {
    arena: &'a ExprArena,
    out: String,
}

impl<'a> SqlWriter<'a> {
    fn new(arena: &'a ExprArena) -> Self {
        Self {
            arena,
            out: String::new(),
        }
    }

    fn finish(self) -> String {
        self.out
    }

    fn push(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn ident(&mut self, ident: &Ident) {
        let quoted = quote_ident(ident.as_str());
        self.out.push_str(&quoted);
    }

    fn child(&mut self, id: ExprId, min_precedence: u8) {
        let Some(expr) = self.arena.get(id) else {
            return;
        };
        if precedence(expr) < min_precedence {
            self.push("(");
            self.expr(id);
            self.push(")");
        } else {
            self.expr(id);
        }
    }

    fn list(&mut self, ids: &[ExprId]) {
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(*id);
        }
    }

    fn order_by(&mut self, items: &[OrderByItem]) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(item.expr);
            if item.descending {
                self.push(" DESC");
            }
        }
    }

    fn expr(&mut self, id: ExprId) {
        let Some(expr) = self.arena.get(id) else {
            return;
        };

        match expr {
            Expr::Column(column) => {
                if let Some(schema) = &column.schema {
                    self.ident(schema);
                    self.push(".");
                }
                if let Some(qualifier) = &column.qualifier {
                    self.ident(qualifier);
                    self.push(".");
                }
                self.ident(&column.name);
            }
            Expr::Literal(literal) => self.literal(literal),
            Expr::Param => self.push("?"),
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => {
                    self.push("NOT ");
                    self.child(*operand, PREC_NOT);
                }
                UnaryOp::Minus | UnaryOp::Plus => {
                    self.push(if *op == UnaryOp::Minus { "-" } else { "+" });
                    let mut inner = SqlWriter::new(self.arena);
                    if matches!(self.arena.get(*operand), Some(Expr::Literal(Literal::Number(_)))) {
                        // `-5` would re-read as a single negative literal
                        inner.push("(");
                        inner.expr(*operand);
                        inner.push(")");
                    } else {
                        inner.child(*operand, PREC_UNARY);
                    }
                    let inner = inner.finish();
                    // keep `- -x` from reading as a comment
                    if inner.starts_with('-') || inner.starts_with('+') {
                        self.push(" ");
                    }
                    self.push(&inner);
                }
            },
            Expr::Binary { op, left, right } => {
                let p = op.precedence();
                let right_min = if p == PREC_COMPARISON {
                    PREC_ADDITIVE
                } else {
                    p + 1
                };
                self.child(*left, p);
                let _ = write!(self.out, " {} ", op.as_sql());
                self.child(*right, right_min);
            }
            Expr::IsNull { operand, negated } => {
                self.child(*operand, PREC_COMPARISON);
                self.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Expr::InList {
                operand,
                list,
                negated,
            } => {
                self.child(*operand, PREC_COMPARISON);
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                self.list(list);
                self.push(")");
            }
            Expr::Between {
                operand,
                low,
                high,
                negated,
            } => {
                self.child(*operand, PREC_COMPARISON);
                self.push(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
                self.child(*low, PREC_ADDITIVE);
                self.push(" AND ");
                self.child(*high, PREC_ADDITIVE);
            }
            Expr::Like {
                operand,
                pattern,
                escape,
                negated,
            } => {
                self.child(*operand, PREC_COMPARISON);
                self.push(if *negated { " NOT LIKE " } else { " LIKE " });
                self.child(*pattern, PREC_ADDITIVE);
                if let Some(escape) = escape {
                    self.push(" ESCAPE ");
                    self.child(*escape, PREC_ADDITIVE);
                }
            }
            Expr::Function { name, args, over } => {
                self.push(name);
                self.push("(");
                match args {
                    FunctionArgs::Star => self.push("*"),
                    FunctionArgs::List { distinct, args } => {
                        if *distinct {
                            self.push("DISTINCT ");
                        }
                        self.list(args);
                    }
                }
                self.push(")");
                if let Some(window) = over {
                    self.push(" OVER (");
                    if !window.partition_by.is_empty() {
                        self.push("PARTITION BY ");
                        self.list(&window.partition_by);
                    }
                    if !window.order_by.is_empty() {
                        if !window.partition_by.is_empty() {
                            self.push(" ");
                        }
                        self.push("ORDER BY ");
                        self.order_by(&window.order_by);
                    }
                    self.push(")");
                }
            }
            Expr::Cast { operand, data_type } => {
                self.push("CAST(");
                self.expr(*operand);
                let _ = write!(self.out, " AS {})", data_type);
            }
            Expr::Case {
                operand,
                branches,
                else_result,
            } => {
                self.push("CASE");
                if let Some(operand) = operand {
                    self.push(" ");
                    self.expr(*operand);
                }
                for branch in branches {
                    self.push(" WHEN ");
                    self.expr(branch.condition);
                    self.push(" THEN ");
                    self.expr(branch.result);
                }
                if let Some(else_result) = else_result {
                    self.push(" ELSE ");
                    self.expr(*else_result);
                }
                self.push(" END");
            }
            Expr::Interval { value, unit } => {
                self.push("INTERVAL ");
                self.child(*value, PREC_ADDITIVE);
                self.push(" ");
                self.push(unit);
            }
            Expr::Opaque { text, .. } => self.push(text),
        }
    }

    fn literal(&mut self, literal: &Literal) {
        match literal {
            Literal::Number(n) => self.push(n),
            Literal::String(s) => {
                let quoted = quote_string(s);
                self.push(&quoted);
            }
            Literal::Null => self.push("NULL"),
            Literal::Boolean(true) => self.push("TRUE"),
            Literal::Boolean(false) => self.push("FALSE"),
            Literal::Temporal { kind, value } => {
                let quoted = quote_string(value);
                let _ = write!(self.out, "{} {}", kind.as_sql(), quoted);
            }
        }
    }

    fn with_clause(&mut self, ctes: &[Cte]) {
        if ctes.is_empty() {
            return;
        }
        self.push("WITH ");
        for (i, cte) in ctes.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.ident(&cte.name);
            if !cte.columns.is_empty() {
                self.push(" (");
                self.ident_list(&cte.columns);
                self.push(")");
            }
            self.push(" AS (");
            self.select(&cte.body);
            self.push(")");
        }
        self.push(" ");
    }

    fn ident_list(&mut self, idents: &[Ident]) {
        for (i, ident) in idents.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.ident(ident);
        }
    }

    fn select(&mut self, select: &Select) {
        self.push("SELECT ");
        if select.distinct {
            self.push("DISTINCT ");
        }
        for (i, item) in select.projection.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            match item {
                SelectItem::Wildcard => self.push("*"),
                SelectItem::QualifiedWildcard(qualifier) => {
                    self.ident(qualifier);
                    self.push(".*");
                }
                SelectItem::Expr { expr, alias } => {
                    self.expr(*expr);
                    if let Some(alias) = alias {
                        self.push(" AS ");
                        self.ident(alias);
                    }
                }
            }
        }

        if !select.from.is_empty() {
            self.push(" FROM ");
            for (i, item) in select.from.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.table_factor(&item.relation);
                for join in &item.joins {
                    self.join(join);
                }
            }
        }

        if let Some(selection) = select.selection {
            self.push(" WHERE ");
            self.expr(selection);
        }
        if !select.group_by.is_empty() {
            self.push(" GROUP BY ");
            self.list(&select.group_by);
        }
        if let Some(having) = select.having {
            self.push(" HAVING ");
            self.expr(having);
        }
        if !select.order_by.is_empty() {
            self.push(" ORDER BY ");
            self.order_by(&select.order_by);
        }
        if let Some(limit) = &select.limit {
            self.push(" LIMIT ");
            self.expr(limit.count);
            if let Some(offset) = limit.offset {
                self.push(" OFFSET ");
                self.expr(offset);
            }
        }
    }

    fn table_factor(&mut self, factor: &TableFactor) {
        match factor {
            TableFactor::Table { name, alias, hints } => {
                if let Some(schema) = &name.schema {
                    self.ident(schema);
                    self.push(".");
                }
                self.ident(&name.name);
                if let Some(alias) = alias {
                    self.push(" AS ");
                    self.ident(alias);
                }
                for hint in hints {
                    self.push(match hint.kind {
                        IndexHintKind::Use => " USE INDEX (",
                        IndexHintKind::Force => " FORCE INDEX (",
                        IndexHintKind::Ignore => " IGNORE INDEX (",
                    });
                    for (i, index) in hint.indexes.iter().enumerate() {
                        if i > 0 {
                            self.push(", ");
                        }
                        // PRIMARY is written bare in index hints
                        if index.as_str() == "PRIMARY" {
                            self.push("PRIMARY");
                        } else {
                            self.ident(index);
                        }
                    }
                    self.push(")");
                }
            }
            TableFactor::Opaque { text, alias } => {
                self.push(text);
                if let Some(alias) = alias {
                    self.push(" AS ");
                    self.ident(alias);
                }
            }
        }
    }

    fn join(&mut self, join: &Join) {
        self.push(match join.kind {
            JoinKind::Inner => " JOIN ",
            JoinKind::Cross => " CROSS JOIN ",
            JoinKind::Left => " LEFT JOIN ",
            JoinKind::Right => " RIGHT JOIN ",
        });
        self.table_factor(&join.relation);
        match &join.constraint {
            JoinConstraint::On(on) => {
                self.push(" ON ");
                self.expr(*on);
            }
            JoinConstraint::Using(columns) => {
                self.push(" USING (");
                self.ident_list(columns);
                self.push(")");
            }
            JoinConstraint::None => {}
        }
    }
}

/// Canonical text for a raw token run (used for opaque fragments).
pub(crate) fn render_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev: Option<&TokenKind> = None;

    for token in tokens {
        let kind = &token.kind;
        if kind == &TokenKind::Eof {
            break;
        }

        let glue = match (prev, kind) {
            (None, _) => true,
            (Some(TokenKind::LParen), _) | (Some(TokenKind::Dot), _) => true,
            (_, TokenKind::RParen) | (_, TokenKind::Comma) | (_, TokenKind::Dot) => true,
            (Some(TokenKind::Word { value, quoted }), TokenKind::LParen) => {
                *quoted
                    || !is_reserved(value)
                    || ["LEFT", "RIGHT", "MOD"].contains(&value.to_ascii_uppercase().as_str())
            }
            _ => false,
        };
        if !glue {
            out.push(' ');
        }

        match kind {
            TokenKind::Word { value, quoted } => {
                if *quoted {
                    out.push_str(&quote_ident(value));
                } else if is_reserved(value) {
                    out.push_str(&value.to_ascii_uppercase());
                } else {
                    out.push_str(value);
                }
            }
            TokenKind::Number(n) => out.push_str(n),
            TokenKind::String(s) => out.push_str(&quote_string(s)),
            TokenKind::Variable(v) => out.push_str(v),
            other => out.push_str(punctuation(other)),
        }
        prev = Some(kind);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    fn canonical(sql: &str) -> String {
        parse(sql, Dialect::default()).unwrap().to_sql()
    }

    #[test]
    fn test_keywords_upper_and_quotes_removed() {
        assert_eq!(
            canonical("select `id`, \"x\" from `users` where `status`='a'"),
            "SELECT id, 'x' FROM users WHERE status = 'a'"
        );
    }

    #[test]
    fn test_reserved_identifiers_stay_quoted() {
        assert_eq!(
            canonical("SELECT `order`, `my col` FROM `group`"),
            "SELECT `order`, `my col` FROM `group`"
        );
    }

    #[test]
    fn test_redundant_parentheses_removed() {
        assert_eq!(
            canonical("SELECT * FROM t WHERE ((a = 1)) AND (b = 2 OR c = 3)"),
            "SELECT * FROM t WHERE a = 1 AND (b = 2 OR c = 3)"
        );
        assert_eq!(
            canonical("SELECT (a + b) * c, a - (b - c), (a - b) - c FROM t"),
            "SELECT (a + b) * c, a - (b - c), a - b - c FROM t"
        );
    }

    #[test]
    fn test_not_and_bang() {
        assert_eq!(
            canonical("SELECT * FROM t WHERE !(a = 1) AND NOT (b OR c)"),
            "SELECT * FROM t WHERE NOT a = 1 AND NOT (b OR c)"
        );
    }

    #[test]
    fn test_limit_comma_form_normalized() {
        assert_eq!(
            canonical("SELECT * FROM t ORDER BY a ASC, b desc LIMIT 5, 10"),
            "SELECT * FROM t ORDER BY a, b DESC LIMIT 10 OFFSET 5"
        );
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(quote_string("it's"), "'it''s'");
        assert_eq!(quote_string("a\\b"), "'a\\\\b'");
    }

    #[test]
    fn test_expression_forms() {
        assert_eq!(
            canonical(
                "SELECT COUNT(*), count(distinct a), cast(b as unsigned int), \
                 case when a > 1 then 'x' else 'y' end FROM t \
                 WHERE d >= now() - interval 7 day AND e not between 1 and 5 \
                 AND f like 'ab%' escape '!' AND g is not null AND h not in (1, 2)"
            ),
            "SELECT COUNT(*), COUNT(DISTINCT a), CAST(b AS UNSIGNED INTEGER), \
             CASE WHEN a > 1 THEN 'x' ELSE 'y' END FROM t \
             WHERE d >= NOW() - INTERVAL 7 DAY AND e NOT BETWEEN 1 AND 5 \
             AND f LIKE 'ab%' ESCAPE '!' AND g IS NOT NULL AND h NOT IN (1, 2)"
        );
    }

    #[test]
    fn test_schema_qualified_column_renders() {
        assert_eq!(
            canonical("select `shop`.`orders`.id from shop.orders where shop.orders.status = 'a'"),
            "SELECT shop.orders.id FROM shop.orders WHERE shop.orders.status = 'a'"
        );
    }

    #[test]
    fn test_joins_render() {
        assert_eq!(
            canonical("select * from a inner join b on a.id = b.a_id left outer join c using (id), d"),
            "SELECT * FROM a JOIN b ON a.id = b.a_id LEFT JOIN c USING (id), d"
        );
    }
}
