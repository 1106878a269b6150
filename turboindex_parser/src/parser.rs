// Recursive-descent parser for MySQL/MariaDB SELECT statements.
//
// Expression precedence, loosest first:
//   OR/||  <  XOR  <  AND/&&  <  NOT  <  comparison, IS, IN, BETWEEN, LIKE,
//   REGEXP  <  + -  <  * / % DIV MOD  <  unary - + !
//
// In lenient mode expression-level constructs that are not modelled
// (subqueries, row constructors, unsupported window syntax, ...) become
// opaque nodes and are reported. Statement-level constructs always fail.

use crate::ast::*;
use crate::dialect::Dialect;
use crate::display::{expr_to_sql, render_tokens};
use crate::error::{ParseError, Position, Result, UnsupportedConstruct};
use crate::lexer::Lexer;
use crate::token::{is_reserved, Token, TokenKind};

/// Deepest expression nesting the parser follows before giving up.
pub const MAX_NESTING_DEPTH: usize = 128;

const NON_SELECT_STATEMENTS: &[&str] = &[
    "ALTER", "ANALYZE", "BEGIN", "CALL", "COMMIT", "CREATE", "DEALLOCATE", "DECLARE", "DELETE",
    "DESCRIBE", "DO", "DROP", "EXECUTE", "EXPLAIN", "GRANT", "HANDLER", "INSERT", "LOAD", "LOCK",
    "OPTIMIZE", "PREPARE", "RENAME", "REPLACE", "REVOKE", "ROLLBACK", "SAVEPOINT", "SET", "SHOW",
    "START", "TABLE", "TRUNCATE", "UNLOCK", "UPDATE", "USE", "VALUES",
];

/// Parse a single SELECT statement, failing on anything not modelled.
pub fn parse(sql: &str, dialect: Dialect) -> Result<Query> {
    Parser::new(sql, dialect, false)?.parse_query()
}

/// A query parsed in lenient mode plus the fragments that were kept opaque.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub query: Query,
    pub skipped: Vec<UnsupportedConstruct>,
}

/// Parse a SELECT statement, turning unsupported expression-level fragments
/// and derived tables into opaque nodes.
pub fn parse_lenient(sql: &str, dialect: Dialect) -> Result<ParsedQuery> {
    let mut parser = Parser::new(sql, dialect, true)?;
    let query = parser.parse_query()?;
    Ok(ParsedQuery {
        query,
        skipped: parser.skipped,
    })
}

pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    dialect: Dialect,
    arena: ExprArena,
    lenient: bool,
    skipped: Vec<UnsupportedConstruct>,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, dialect: Dialect, lenient: bool) -> Result<Self> {
        Ok(Self {
            source,
            tokens: Lexer::tokenize(source)?,
            pos: 0,
            dialect,
            arena: ExprArena::new(),
            lenient,
            skipped: Vec::new(),
            depth: 0,
        })
    }

    pub fn parse_query(&mut self) -> Result<Query> {
        self.reject_non_select()?;

        let ctes = if self.peek().is_keyword("WITH") {
            self.parse_with()?
        } else {
            Vec::new()
        };
        let body = self.parse_select()?;
        self.reject_trailing_clauses()?;

        self.eat(&TokenKind::Semicolon);
        if self.peek().kind != TokenKind::Eof {
            return Err(self.unexpected("end of statement"));
        }

        let height = self.arena.max_height();
        if height > MAX_EXPR_HEIGHT {
            let start = self.tokens[0].position;
            return Err(self.fatal(
                self.excerpt(start),
                &format!(
                    "expression tree of height {} exceeds {}",
                    height, MAX_EXPR_HEIGHT
                ),
                start,
            ));
        }

        Ok(Query {
            source: self.source.to_string(),
            dialect: self.dialect,
            arena: std::mem::take(&mut self.arena),
            ctes,
            body,
        })
    }

    // ---- token helpers ----

    fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        ParseError::syntax(
            token.position,
            format!("expected {}, found {}", expected, token.describe()),
        )
    }

    /// Leading text of the statement from `position`, for error fragments.
    fn excerpt(&self, position: Position) -> String {
        let rest = self.source.get(position.offset..).unwrap_or("").trim();
        let mut fragment: String = rest.chars().take(80).collect();
        if rest.chars().count() > 80 {
            fragment.push_str("...");
        }
        fragment
    }

    fn fatal(&self, fragment: String, reason: &str, position: Position) -> ParseError {
        ParseError::Unsupported(UnsupportedConstruct {
            fragment,
            reason: reason.to_string(),
            position,
        })
    }

    /// Record an unsupported expression fragment, or fail in strict mode.
    fn unsupported_expr(
        &mut self,
        text: String,
        atomic: bool,
        reason: &str,
        position: Position,
    ) -> Result<ExprId> {
        let construct = UnsupportedConstruct {
            fragment: text.clone(),
            reason: reason.to_string(),
            position,
        };
        if !self.lenient {
            return Err(ParseError::Unsupported(construct));
        }
        self.skipped.push(construct);
        Ok(self.arena.push(Expr::Opaque { text, atomic }))
    }

    /// Consume a balanced `( ... )` group and return its canonical text.
    fn capture_parenthesized(&mut self) -> Result<String> {
        let start = self.pos;
        let open = self.peek().position;
        self.expect(&TokenKind::LParen, "`(`")?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.advance().kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth -= 1,
                TokenKind::Eof => return Err(ParseError::syntax(open, "unbalanced parentheses")),
                _ => {}
            }
        }
        Ok(render_tokens(&self.tokens[start..self.pos]))
    }

    fn starts_subquery(&self) -> bool {
        self.peek().kind == TokenKind::LParen
            && (self.peek_nth(1).is_keyword("SELECT") || self.peek_nth(1).is_keyword("WITH"))
    }

    fn parse_identifier(&mut self, what: &str) -> Result<Ident> {
        match &self.peek().kind {
            TokenKind::Word { value, quoted } if *quoted || !is_reserved(value) => {
                let ident = Ident::new(value.clone());
                self.advance();
                Ok(ident)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn at_identifier(&self) -> bool {
        matches!(&self.peek().kind, TokenKind::Word { value, quoted } if *quoted || !is_reserved(value))
    }

    fn parse_optional_alias(&mut self) -> Result<Option<Ident>> {
        if self.eat_keyword("AS") {
            if let TokenKind::String(value) = &self.peek().kind {
                let alias = Ident::new(value.clone());
                self.advance();
                return Ok(Some(alias));
            }
            return self.parse_identifier("alias").map(Some);
        }
        if self.at_identifier() {
            return self.parse_identifier("alias").map(Some);
        }
        Ok(None)
    }

    // ---- statement level ----

    fn reject_non_select(&mut self) -> Result<()> {
        let token = self.peek().clone();
        if token.kind == TokenKind::LParen {
            return Err(self.fatal(
                self.excerpt(token.position),
                "parenthesized query expression",
                token.position,
            ));
        }
        match &token.kind {
            TokenKind::Word { quoted: false, value }
                if value.eq_ignore_ascii_case("SELECT") || value.eq_ignore_ascii_case("WITH") =>
            {
                Ok(())
            }
            TokenKind::Word { quoted: false, value }
                if NON_SELECT_STATEMENTS.contains(&value.to_ascii_uppercase().as_str()) =>
            {
                Err(self.fatal(
                    self.excerpt(token.position),
                    &format!("{} statement", value.to_ascii_uppercase()),
                    token.position,
                ))
            }
            _ => Err(self.unexpected("SELECT")),
        }
    }

    fn reject_trailing_clauses(&mut self) -> Result<()> {
        let token = self.peek().clone();
        let reason = if token.is_keyword("UNION") {
            "UNION"
        } else if token.is_keyword("FOR")
            && (self.peek_nth(1).is_keyword("UPDATE") || self.peek_nth(1).is_keyword("SHARE"))
        {
            "locking read"
        } else if token.is_keyword("LOCK") {
            "locking read"
        } else if token.is_keyword("INTO") {
            "SELECT ... INTO"
        } else if token.is_keyword("WINDOW") {
            "named window clause"
        } else {
            return Ok(());
        };
        Err(self.fatal(self.excerpt(token.position), reason, token.position))
    }

    fn parse_with(&mut self) -> Result<Vec<Cte>> {
        let with = self.advance();
        if self.peek().is_keyword("RECURSIVE") {
            return Err(self.fatal(
                self.excerpt(with.position),
                "recursive common table expression",
                with.position,
            ));
        }
        if !self.dialect.supports_cte() {
            return Err(self.fatal(
                self.excerpt(with.position),
                &format!("common table expressions are not available on {}", self.dialect),
                with.position,
            ));
        }

        let mut ctes = Vec::new();
        loop {
            let name = self.parse_identifier("common table expression name")?;
            let mut columns = Vec::new();
            if self.eat(&TokenKind::LParen) {
                loop {
                    columns.push(self.parse_identifier("column name")?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RParen, "`)`")?;
            }
            self.expect_keyword("AS")?;
            self.expect(&TokenKind::LParen, "`(`")?;
            let body = self.parse_select()?;
            self.reject_trailing_clauses()?;
            self.expect(&TokenKind::RParen, "`)`")?;
            ctes.push(Cte {
                name,
                columns,
                body,
            });
            if !self.eat(&TokenKind::Comma) {
                return Ok(ctes);
            }
        }
    }

    fn parse_select(&mut self) -> Result<Select> {
        self.expect_keyword("SELECT")?;

        let mut select = Select::default();
        loop {
            if self.eat_keyword("DISTINCT") || self.eat_keyword("DISTINCTROW") {
                select.distinct = true;
                continue;
            }
            // modifiers with no effect on the result set
            if self.eat_keyword("ALL") || self.eat_keyword("SQL_NO_CACHE") || self.eat_keyword("SQL_CACHE") {
                continue;
            }
            break;
        }

        loop {
            select.projection.push(self.parse_select_item()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.reject_trailing_clauses()?;

        if self.eat_keyword("FROM") {
            loop {
                let item = self.parse_table_with_joins()?;
                let is_dual = item.joins.is_empty()
                    && matches!(&item.relation, TableFactor::Table { name, alias: None, hints }
                        if name.schema.is_none() && name.name.matches("DUAL") && hints.is_empty());
                if !is_dual {
                    select.from.push(item);
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }

        if self.eat_keyword("WHERE") {
            select.selection = Some(self.parse_expr()?);
        }

        if self.peek().is_keyword("GROUP") {
            self.advance();
            self.expect_keyword("BY")?;
            loop {
                select.group_by.push(self.parse_expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            if self.peek().is_keyword("WITH") && self.peek_nth(1).is_keyword("ROLLUP") {
                let position = self.peek().position;
                return Err(self.fatal(self.excerpt(position), "WITH ROLLUP", position));
            }
        }

        if self.eat_keyword("HAVING") {
            select.having = Some(self.parse_expr()?);
        }

        self.reject_trailing_clauses()?;

        if self.peek().is_keyword("ORDER") {
            self.advance();
            self.expect_keyword("BY")?;
            select.order_by = self.parse_order_by_list()?;
        }

        if self.eat_keyword("LIMIT") {
            let first = self.parse_limit_value()?;
            select.limit = Some(if self.eat(&TokenKind::Comma) {
                let count = self.parse_limit_value()?;
                Limit {
                    count,
                    offset: Some(first),
                }
            } else if self.eat_keyword("OFFSET") {
                let offset = self.parse_limit_value()?;
                Limit {
                    count: first,
                    offset: Some(offset),
                }
            } else {
                Limit {
                    count: first,
                    offset: None,
                }
            });
        }

        Ok(select)
    }

    fn parse_select_item(&mut self) -> Result<SelectItem> {
        if self.eat(&TokenKind::Star) {
            return Ok(SelectItem::Wildcard);
        }
        if self.at_identifier()
            && self.peek_nth(1).kind == TokenKind::Dot
            && self.peek_nth(2).kind == TokenKind::Star
        {
            let qualifier = self.parse_identifier("table name")?;
            self.advance();
            self.advance();
            return Ok(SelectItem::QualifiedWildcard(qualifier));
        }
        let expr = self.parse_expr()?;
        let alias = self.parse_optional_alias()?;
        Ok(SelectItem::Expr { expr, alias })
    }

    fn parse_order_by_list(&mut self) -> Result<Vec<OrderByItem>> {
        let mut items = Vec::new();
        loop {
            let expr = self.parse_expr()?;
            let descending = if self.eat_keyword("DESC") {
                true
            } else {
                self.eat_keyword("ASC");
                false
            };
            items.push(OrderByItem { expr, descending });
            if !self.eat(&TokenKind::Comma) {
                return Ok(items);
            }
        }
    }

    fn parse_limit_value(&mut self) -> Result<ExprId> {
        match &self.peek().kind {
            TokenKind::Number(n) => {
                let n = n.clone();
                self.advance();
                Ok(self.arena.push(Expr::number(n)))
            }
            TokenKind::Param => {
                self.advance();
                Ok(self.arena.push(Expr::Param))
            }
            _ => Err(self.unexpected("row count")),
        }
    }

    // ---- FROM clause ----

    fn parse_table_with_joins(&mut self) -> Result<TableWithJoins> {
        let relation = self.parse_table_factor()?;
        let mut joins = Vec::new();

        loop {
            let token = self.peek().clone();
            let kind = if token.is_keyword("JOIN") {
                self.advance();
                JoinKind::Inner
            } else if token.is_keyword("INNER") || token.is_keyword("CROSS") {
                self.advance();
                self.expect_keyword("JOIN")?;
                if token.is_keyword("CROSS") {
                    JoinKind::Cross
                } else {
                    JoinKind::Inner
                }
            } else if token.is_keyword("LEFT") || token.is_keyword("RIGHT") {
                self.advance();
                self.eat_keyword("OUTER");
                self.expect_keyword("JOIN")?;
                if token.is_keyword("LEFT") {
                    JoinKind::Left
                } else {
                    JoinKind::Right
                }
            } else if token.is_keyword("NATURAL") {
                return Err(self.fatal(self.excerpt(token.position), "NATURAL join", token.position));
            } else if token.is_keyword("STRAIGHT_JOIN") {
                return Err(self.fatal(self.excerpt(token.position), "STRAIGHT_JOIN", token.position));
            } else {
                break;
            };

            let relation = self.parse_table_factor()?;
            let constraint = if self.eat_keyword("ON") {
                JoinConstraint::On(self.parse_expr()?)
            } else if self.eat_keyword("USING") {
                self.expect(&TokenKind::LParen, "`(`")?;
                let mut columns = Vec::new();
                loop {
                    columns.push(self.parse_identifier("column name")?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RParen, "`)`")?;
                JoinConstraint::Using(columns)
            } else {
                JoinConstraint::None
            };

            let kind = match (kind, &constraint) {
                (JoinKind::Inner | JoinKind::Cross, JoinConstraint::None) => JoinKind::Cross,
                (JoinKind::Inner | JoinKind::Cross, _) => JoinKind::Inner,
                (_, JoinConstraint::None) => return Err(self.unexpected("ON or USING")),
                (outer, _) => outer,
            };

            joins.push(Join {
                kind,
                relation,
                constraint,
            });
        }

        Ok(TableWithJoins { relation, joins })
    }

    fn parse_table_factor(&mut self) -> Result<TableFactor> {
        let token = self.peek().clone();

        if token.kind == TokenKind::LParen {
            let reason = if self.starts_subquery() {
                "derived table"
            } else {
                "parenthesized table reference"
            };
            let text = self.capture_parenthesized()?;
            let alias = self.parse_optional_alias()?;
            let construct = UnsupportedConstruct {
                fragment: text.clone(),
                reason: reason.to_string(),
                position: token.position,
            };
            if !self.lenient {
                return Err(ParseError::Unsupported(construct));
            }
            self.skipped.push(construct);
            return Ok(TableFactor::Opaque { text, alias });
        }

        let first = self.parse_identifier("table name")?;
        let name = if self.eat(&TokenKind::Dot) {
            let table = self.parse_identifier("table name")?;
            ObjectName {
                schema: Some(first),
                name: table,
            }
        } else {
            ObjectName {
                schema: None,
                name: first,
            }
        };

        if self.peek().is_keyword("PARTITION") {
            let position = self.peek().position;
            return Err(self.fatal(self.excerpt(position), "partition selection", position));
        }

        let alias = self.parse_optional_alias()?;
        let hints = self.parse_index_hints()?;

        Ok(TableFactor::Table { name, alias, hints })
    }

    fn parse_index_hints(&mut self) -> Result<Vec<IndexHint>> {
        let mut hints = Vec::new();
        loop {
            let kind = if self.peek().is_keyword("USE") {
                IndexHintKind::Use
            } else if self.peek().is_keyword("FORCE") {
                IndexHintKind::Force
            } else if self.peek().is_keyword("IGNORE") {
                IndexHintKind::Ignore
            } else {
                return Ok(hints);
            };
            self.advance();
            if !self.eat_keyword("INDEX") && !self.eat_keyword("KEY") {
                return Err(self.unexpected("INDEX"));
            }
            if self.peek().is_keyword("FOR") {
                let position = self.peek().position;
                return Err(self.fatal(self.excerpt(position), "scoped index hint", position));
            }
            self.expect(&TokenKind::LParen, "`(`")?;
            let mut indexes = Vec::new();
            if !self.eat(&TokenKind::RParen) {
                loop {
                    // PRIMARY is reserved in MySQL but valid here
                    if self.peek().is_keyword("PRIMARY") {
                        self.advance();
                        indexes.push(Ident::new("PRIMARY"));
                    } else {
                        indexes.push(self.parse_identifier("index name")?);
                    }
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RParen, "`)`")?;
            }
            hints.push(IndexHint { kind, indexes });
        }
    }

    // ---- expressions ----

    pub fn parse_expr(&mut self) -> Result<ExprId> {
        self.nested(Self::parse_or)
    }

    /// Run one recursive step, failing once nesting passes
    /// [`MAX_NESTING_DEPTH`].
    fn nested<T>(&mut self, step: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            let position = self.peek().position;
            return Err(self.fatal(
                self.excerpt(position),
                &format!("expression nested deeper than {} levels", MAX_NESTING_DEPTH),
                position,
            ));
        }
        self.depth += 1;
        let result = step(self);
        self.depth -= 1;
        result
    }

    fn peek_operator(&self) -> Option<&'static str> {
        match self.peek().kind {
            TokenKind::Operator(op) => Some(op),
            _ => None,
        }
    }

    /// Opaque node for `left <op> right` with an operator that is not
    /// modelled.
    fn opaque_operator(
        &mut self,
        left: ExprId,
        op: &str,
        right: ExprId,
        atomic: bool,
        position: Position,
    ) -> Result<ExprId> {
        let left = crate::display::child_to_sql(&self.arena, left, PREC_UNARY);
        let right = crate::display::child_to_sql(&self.arena, right, PREC_UNARY);
        let text = if atomic {
            format!("{}{}{}", left, op, right)
        } else {
            format!("{} {} {}", left, op, right)
        };
        self.unsupported_expr(text, atomic, &format!("operator `{}`", op), position)
    }

    fn binary(&mut self, op: BinaryOp, left: ExprId, right: ExprId) -> ExprId {
        self.arena.push(Expr::Binary { op, left, right })
    }

    fn parse_or(&mut self) -> Result<ExprId> {
        let mut left = self.parse_xor()?;
        while self.eat_keyword("OR") || self.eat(&TokenKind::DoublePipe) {
            let right = self.parse_xor()?;
            left = self.binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_xor(&mut self) -> Result<ExprId> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("XOR") {
            let right = self.parse_and()?;
            left = self.binary(BinaryOp::Xor, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ExprId> {
        let mut left = self.parse_not()?;
        while self.eat_keyword("AND") || self.eat(&TokenKind::DoubleAmpersand) {
            let right = self.parse_not()?;
            left = self.binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<ExprId> {
        if self.eat_keyword("NOT") {
            let operand = self.nested(Self::parse_not)?;
            return Ok(self.arena.push(Expr::Unary {
                op: UnaryOp::Not,
                operand,
            }));
        }
        self.parse_comparison()
    }

    fn comparison_op(kind: &TokenKind) -> Option<BinaryOp> {
        Some(match kind {
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::NullSafeEq => BinaryOp::NullSafeEq,
            TokenKind::NotEq => BinaryOp::NotEq,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::LtEq => BinaryOp::LtEq,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::GtEq => BinaryOp::GtEq,
            _ => return None,
        })
    }

    fn parse_comparison(&mut self) -> Result<ExprId> {
        let mut left = self.parse_bitwise()?;

        loop {
            let token = self.peek().clone();

            if let Some(op) = Self::comparison_op(&token.kind) {
                self.advance();
                let right = self.parse_bitwise()?;
                left = self.binary(op, left, right);
                continue;
            }

            if token.is_keyword("SOUNDS") && self.peek_nth(1).is_keyword("LIKE") {
                self.advance();
                self.advance();
                let right = self.parse_bitwise()?;
                let text = format!(
                    "{} SOUNDS LIKE {}",
                    self.render_operand(left),
                    crate::display::child_to_sql(&self.arena, right, PREC_ADDITIVE)
                );
                left = self.unsupported_expr(text, false, "SOUNDS LIKE", token.position)?;
                continue;
            }

            if token.is_keyword("MEMBER") && self.peek_nth(1).is_keyword("OF") {
                self.advance();
                self.advance();
                let document = self.capture_parenthesized()?;
                let text = format!("{} MEMBER OF {}", self.render_operand(left), document);
                left = self.unsupported_expr(text, false, "MEMBER OF", token.position)?;
                continue;
            }

            if token.is_keyword("IS") {
                self.advance();
                let negated = self.eat_keyword("NOT");
                if self.eat_keyword("NULL") {
                    left = self.arena.push(Expr::IsNull {
                        operand: left,
                        negated,
                    });
                    continue;
                }
                let test = self.peek().clone();
                if test.is_keyword("TRUE") || test.is_keyword("FALSE") || test.is_keyword("UNKNOWN") {
                    self.advance();
                    let text = format!(
                        "{} IS {}{}",
                        self.render_operand(left),
                        if negated { "NOT " } else { "" },
                        render_tokens(std::slice::from_ref(&test))
                    );
                    left = self.unsupported_expr(text, false, "boolean IS test", token.position)?;
                    continue;
                }
                return Err(self.unexpected("NULL"));
            }

            let negated = token.is_keyword("NOT")
                && ["IN", "BETWEEN", "LIKE", "REGEXP", "RLIKE"]
                    .iter()
                    .any(|kw| self.peek_nth(1).is_keyword(kw));
            let token = if negated {
                self.advance();
                self.peek().clone()
            } else {
                token
            };

            if token.is_keyword("IN") {
                self.advance();
                left = self.parse_in_list(left, negated, token.position)?;
            } else if token.is_keyword("BETWEEN") {
                self.advance();
                let low = self.parse_bitwise()?;
                self.expect_keyword("AND")?;
                let high = self.parse_bitwise()?;
                left = self.arena.push(Expr::Between {
                    operand: left,
                    low,
                    high,
                    negated,
                });
            } else if token.is_keyword("LIKE") {
                self.advance();
                let pattern = self.parse_bitwise()?;
                let escape = if self.eat_keyword("ESCAPE") {
                    Some(self.parse_bitwise()?)
                } else {
                    None
                };
                left = self.arena.push(Expr::Like {
                    operand: left,
                    pattern,
                    escape,
                    negated,
                });
            } else if token.is_keyword("REGEXP") || token.is_keyword("RLIKE") {
                self.advance();
                let right = self.parse_bitwise()?;
                left = self.binary(BinaryOp::Regexp, left, right);
                if negated {
                    left = self.arena.push(Expr::Unary {
                        op: UnaryOp::Not,
                        operand: left,
                    });
                }
            } else {
                return Ok(left);
            }
        }
    }

    /// Operand text for opaque comparison-level fragments.
    fn render_operand(&self, id: ExprId) -> String {
        crate::display::child_to_sql(&self.arena, id, PREC_COMPARISON)
    }

    fn parse_in_list(&mut self, operand: ExprId, negated: bool, position: Position) -> Result<ExprId> {
        if self.starts_subquery() {
            let subquery = self.capture_parenthesized()?;
            let text = format!(
                "{} {}IN {}",
                self.render_operand(operand),
                if negated { "NOT " } else { "" },
                subquery
            );
            return self.unsupported_expr(text, false, "IN subquery", position);
        }

        self.expect(&TokenKind::LParen, "`(`")?;
        let mut list = Vec::new();
        loop {
            list.push(self.parse_expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "`)`")?;
        Ok(self.arena.push(Expr::InList {
            operand,
            list,
            negated,
        }))
    }

    /// `&`, `|`, `<<` and `>>` sit between comparison and `+ -`.
    fn parse_bitwise(&mut self) -> Result<ExprId> {
        let mut left = self.parse_additive()?;
        while let Some(op @ ("&" | "|" | "<<" | ">>")) = self.peek_operator() {
            let position = self.peek().position;
            self.advance();
            let right = self.parse_additive()?;
            left = self.opaque_operator(left, op, right, false, position)?;
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<ExprId> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Plus,
                TokenKind::Minus => BinaryOp::Minus,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = self.binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<ExprId> {
        let mut left = self.parse_unary()?;
        loop {
            let token = self.peek();
            let op = match &token.kind {
                TokenKind::Star => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                TokenKind::Percent => BinaryOp::Modulo,
                _ if token.is_keyword("DIV") => BinaryOp::IntDivide,
                _ if token.is_keyword("MOD") => BinaryOp::Modulo,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = self.binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<ExprId> {
        let token = self.peek().clone();
        let prefix = match &token.kind {
            TokenKind::Operator("~") => Some("~"),
            _ if token.is_keyword("BINARY")
                && !matches!(
                    self.peek_nth(1).kind,
                    TokenKind::Comma | TokenKind::RParen | TokenKind::Eof
                ) =>
            {
                Some("BINARY ")
            }
            _ => None,
        };
        if let Some(prefix) = prefix {
            self.advance();
            let operand = self.nested(Self::parse_unary)?;
            let text = format!(
                "{}{}",
                prefix,
                crate::display::child_to_sql(&self.arena, operand, PREC_UNARY)
            );
            let reason = format!("operator `{}`", prefix.trim_end());
            return self.unsupported_expr(text, true, &reason, token.position);
        }

        let op = match token.kind {
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        self.advance();

        if op == UnaryOp::Minus {
            if let TokenKind::Number(n) = &self.peek().kind {
                let text = format!("-{}", n);
                self.advance();
                return Ok(self.arena.push(Expr::number(text)));
            }
        }

        let operand = self.nested(Self::parse_unary)?;
        Ok(self.arena.push(Expr::Unary { op, operand }))
    }

    /// Primary followed by `->`, `->>`, `^` or `COLLATE`, all of which bind
    /// tighter than any modelled operator.
    fn parse_postfix(&mut self) -> Result<ExprId> {
        let mut expr = self.parse_primary()?;
        loop {
            let position = self.peek().position;
            if let Some(op @ ("->" | "->>" | "^")) = self.peek_operator() {
                self.advance();
                let right = self.parse_primary()?;
                let atomic = op != "^";
                expr = self.opaque_operator(expr, op, right, atomic, position)?;
            } else if self.eat_keyword("COLLATE") {
                let collation = match &self.peek().kind {
                    TokenKind::Word { value, .. } | TokenKind::String(value) => value.clone(),
                    _ => return Err(self.unexpected("collation name")),
                };
                self.advance();
                let text = format!(
                    "{} COLLATE {}",
                    crate::display::child_to_sql(&self.arena, expr, PREC_UNARY),
                    collation
                );
                expr = self.unsupported_expr(text, true, "COLLATE", position)?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<ExprId> {
        let token = self.peek().clone();

        match &token.kind {
            TokenKind::Number(n) => {
                self.advance();
                Ok(self.arena.push(Expr::number(n.clone())))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(self.arena.push(Expr::string(s.clone())))
            }
            TokenKind::Param => {
                self.advance();
                Ok(self.arena.push(Expr::Param))
            }
            TokenKind::Variable(name) => {
                let name = name.clone();
                self.advance();
                self.unsupported_expr(name, true, "variable reference", token.position)
            }
            TokenKind::LParen => self.parse_parenthesized(),
            TokenKind::Word { value, quoted } => {
                let value = value.clone();
                if *quoted {
                    return self.parse_column_ref();
                }
                let upper = value.to_ascii_uppercase();
                let next = self.peek_nth(1).kind.clone();
                // `N'x'`, `X'AB'`, `b'101'`: prefix glued to the quote
                let glued = self.peek_nth(1).position.offset == token.position.offset + value.len();
                match upper.as_str() {
                    "N" | "X" | "B" if glued && matches!(next, TokenKind::String(_)) => {
                        self.advance();
                        let literal = self.advance();
                        let text = format!("{}{}", upper, render_tokens(std::slice::from_ref(&literal)));
                        let reason = match upper.as_str() {
                            "N" => "national string literal",
                            "X" => "hexadecimal string literal",
                            _ => "bit string literal",
                        };
                        self.unsupported_expr(text, true, reason, token.position)
                    }
                    _ if value.starts_with('_') && matches!(next, TokenKind::String(_)) => {
                        self.advance();
                        let literal = self.advance();
                        let text = format!("{}{}", value, render_tokens(std::slice::from_ref(&literal)));
                        self.unsupported_expr(text, true, "character set introducer", token.position)
                    }
                    "MATCH" if next == TokenKind::LParen => {
                        self.advance();
                        let columns = self.capture_parenthesized()?;
                        self.expect_keyword("AGAINST")?;
                        let search = self.capture_parenthesized()?;
                        let text = format!("MATCH {} AGAINST {}", columns, search);
                        self.unsupported_expr(text, true, "full-text search", token.position)
                    }
                    "NULL" => {
                        self.advance();
                        Ok(self.arena.push(Expr::Literal(Literal::Null)))
                    }
                    "TRUE" | "FALSE" => {
                        self.advance();
                        Ok(self.arena.push(Expr::boolean(upper == "TRUE")))
                    }
                    "DATE" | "TIME" | "TIMESTAMP" if matches!(next, TokenKind::String(_)) => {
                        self.advance();
                        let kind = match upper.as_str() {
                            "DATE" => TemporalKind::Date,
                            "TIME" => TemporalKind::Time,
                            _ => TemporalKind::Timestamp,
                        };
                        let TokenKind::String(value) = self.advance().kind else {
                            return Err(self.unexpected("string literal"));
                        };
                        Ok(self.arena.push(Expr::Literal(Literal::Temporal { kind, value })))
                    }
                    "CASE" => self.parse_case(),
                    "INTERVAL" => self.parse_interval(),
                    "CAST" if next == TokenKind::LParen => self.parse_cast(),
                    "EXISTS" if next == TokenKind::LParen => {
                        self.advance();
                        let text = format!("EXISTS {}", self.capture_parenthesized()?);
                        self.unsupported_expr(text, true, "EXISTS subquery", token.position)
                    }
                    _ if next == TokenKind::LParen => {
                        self.advance();
                        self.parse_function(upper, token.position)
                    }
                    _ if is_reserved(&value) => Err(self.unexpected("expression")),
                    _ => self.parse_column_ref(),
                }
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_parenthesized(&mut self) -> Result<ExprId> {
        let position = self.peek().position;
        if self.starts_subquery() {
            let text = self.capture_parenthesized()?;
            return self.unsupported_expr(text, true, "subquery", position);
        }

        let start = self.pos;
        let skipped = self.skipped.len();
        self.advance();
        let inner = self.parse_expr()?;
        if self.peek().kind == TokenKind::Comma {
            self.pos = start;
            self.skipped.truncate(skipped);
            let text = self.capture_parenthesized()?;
            return self.unsupported_expr(text, true, "row constructor", position);
        }
        self.expect(&TokenKind::RParen, "`)`")?;
        Ok(inner)
    }

    fn parse_column_ref(&mut self) -> Result<ExprId> {
        let first = self.parse_identifier("column name")?;
        if !self.eat(&TokenKind::Dot) {
            return Ok(self.arena.push(Expr::Column(ColumnRef {
                schema: None,
                qualifier: None,
                name: first,
            })));
        }
        let second = self.parse_identifier("column name")?;
        let column = if self.eat(&TokenKind::Dot) {
            ColumnRef {
                schema: Some(first),
                qualifier: Some(second),
                name: self.parse_identifier("column name")?,
            }
        } else {
            ColumnRef {
                schema: None,
                qualifier: Some(first),
                name: second,
            }
        };
        Ok(self.arena.push(Expr::Column(column)))
    }

    fn parse_case(&mut self) -> Result<ExprId> {
        self.expect_keyword("CASE")?;
        let operand = if self.peek().is_keyword("WHEN") {
            None
        } else {
            Some(self.parse_expr()?)
        };

        let mut branches = Vec::new();
        while self.eat_keyword("WHEN") {
            let condition = self.parse_expr()?;
            self.expect_keyword("THEN")?;
            let result = self.parse_expr()?;
            branches.push(WhenClause { condition, result });
        }
        if branches.is_empty() {
            return Err(self.unexpected("WHEN"));
        }

        let else_result = if self.eat_keyword("ELSE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect_keyword("END")?;

        Ok(self.arena.push(Expr::Case {
            operand,
            branches,
            else_result,
        }))
    }

    fn parse_interval(&mut self) -> Result<ExprId> {
        self.expect_keyword("INTERVAL")?;
        let value = self.parse_additive()?;
        let unit = match &self.peek().kind {
            TokenKind::Word { value, quoted: false } => value.to_ascii_uppercase(),
            _ => return Err(self.unexpected("interval unit")),
        };
        self.advance();
        Ok(self.arena.push(Expr::Interval { value, unit }))
    }

    fn parse_cast(&mut self) -> Result<ExprId> {
        self.expect_keyword("CAST")?;
        self.expect(&TokenKind::LParen, "`(`")?;
        let operand = self.parse_expr()?;
        self.expect_keyword("AS")?;

        let mut data_type = match &self.peek().kind {
            TokenKind::Word { value, quoted: false } => value.to_ascii_uppercase(),
            _ => return Err(self.unexpected("type name")),
        };
        self.advance();
        if (data_type == "SIGNED" || data_type == "UNSIGNED")
            && (self.peek().is_keyword("INTEGER") || self.peek().is_keyword("INT"))
        {
            self.advance();
            data_type.push_str(" INTEGER");
        }
        if self.eat(&TokenKind::LParen) {
            let mut params = Vec::new();
            loop {
                match &self.peek().kind {
                    TokenKind::Number(n) => params.push(n.clone()),
                    _ => return Err(self.unexpected("type length")),
                }
                self.advance();
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, "`)`")?;
            data_type = format!("{}({})", data_type, params.join(","));
        }

        self.expect(&TokenKind::RParen, "`)`")?;
        Ok(self.arena.push(Expr::Cast { operand, data_type }))
    }

    /// Parse `name(args) [OVER ...]`; the name has been consumed.
    fn parse_function(&mut self, name: String, position: Position) -> Result<ExprId> {
        let start = self.pos;
        let skipped = self.skipped.len();

        let args = match self.parse_function_args() {
            Ok(args) => args,
            // special argument syntax such as TRIM(LEADING 'x' FROM a),
            // CONVERT(a USING utf8mb4) or GROUP_CONCAT(... SEPARATOR ...)
            Err(ParseError::Syntax { .. })
                if matches!(
                    self.peek().kind,
                    TokenKind::Word { quoted: false, .. } | TokenKind::String(_) | TokenKind::Number(_)
                ) =>
            {
                self.pos = start;
                self.skipped.truncate(skipped);
                let text = format!("{}{}", name, self.capture_parenthesized()?);
                return self.unsupported_expr(
                    text,
                    true,
                    "function call with special argument syntax",
                    position,
                );
            }
            Err(e) => return Err(e),
        };

        if !self.peek().is_keyword("OVER") {
            return Ok(self.arena.push(Expr::Function {
                name,
                args,
                over: None,
            }));
        }

        let over_position = self.peek().position;
        let call = self.arena.push(Expr::Function {
            name: name.clone(),
            args: args.clone(),
            over: None,
        });
        self.advance();

        if !self.dialect.supports_window_functions() {
            let window = self.capture_window_text()?;
            let text = format!("{} OVER {}", expr_to_sql(&self.arena, call), window);
            let reason = format!("window functions are not available on {}", self.dialect);
            return self.unsupported_expr(text, true, &reason, over_position);
        }

        if self.peek().kind != TokenKind::LParen {
            let window = self.capture_window_text()?;
            let text = format!("{} OVER {}", expr_to_sql(&self.arena, call), window);
            return self.unsupported_expr(text, true, "named window reference", over_position);
        }

        let window_start = self.pos;
        let skipped = self.skipped.len();
        match self.parse_window_spec()? {
            Some(window) => Ok(self.arena.push(Expr::Function {
                name,
                args,
                over: Some(window),
            })),
            None => {
                self.pos = window_start;
                self.skipped.truncate(skipped);
                let window = self.capture_parenthesized()?;
                let text = format!("{} OVER {}", expr_to_sql(&self.arena, call), window);
                self.unsupported_expr(text, true, "window frame clause", over_position)
            }
        }
    }

    fn capture_window_text(&mut self) -> Result<String> {
        if self.peek().kind == TokenKind::LParen {
            return self.capture_parenthesized();
        }
        let token = self.advance();
        match token.kind {
            TokenKind::Word { .. } => Ok(render_tokens(std::slice::from_ref(&token))),
            _ => Err(ParseError::syntax(token.position, "expected window specification")),
        }
    }

    fn parse_function_args(&mut self) -> Result<FunctionArgs> {
        self.expect(&TokenKind::LParen, "`(`")?;
        if self.eat(&TokenKind::RParen) {
            return Ok(FunctionArgs::List {
                distinct: false,
                args: Vec::new(),
            });
        }
        if self.peek().kind == TokenKind::Star && self.peek_nth(1).kind == TokenKind::RParen {
            self.advance();
            self.advance();
            return Ok(FunctionArgs::Star);
        }

        let distinct = self.eat_keyword("DISTINCT");
        let mut args = Vec::new();
        loop {
            args.push(self.parse_expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "`)`")?;
        Ok(FunctionArgs::List { distinct, args })
    }

    /// `None` when the window carries a frame clause.
    fn parse_window_spec(&mut self) -> Result<Option<WindowSpec>> {
        self.expect(&TokenKind::LParen, "`(`")?;
        let mut window = WindowSpec {
            partition_by: Vec::new(),
            order_by: Vec::new(),
        };

        if self.eat_keyword("PARTITION") {
            self.expect_keyword("BY")?;
            loop {
                window.partition_by.push(self.parse_expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            window.order_by = self.parse_order_by_list()?;
        }
        if self.peek().is_keyword("ROWS") || self.peek().is_keyword("RANGE") {
            return Ok(None);
        }
        self.expect(&TokenKind::RParen, "`)`")?;
        Ok(Some(window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(sql: &str) -> Query {
        parse(sql, Dialect::default()).unwrap()
    }

    fn where_expr(query: &Query) -> &Expr {
        &query.arena[query.body.selection.unwrap()]
    }

    #[test]
    fn test_simple_select() {
        let query = parse_ok("SELECT id, name FROM users WHERE status = 'active'");
        assert_eq!(query.body.projection.len(), 2);
        assert_eq!(query.body.from.len(), 1);
        assert!(matches!(
            where_expr(&query),
            Expr::Binary {
                op: BinaryOp::Eq,
                ..
            }
        ));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let query = parse_ok("SELECT * FROM t WHERE a = 1 OR b = 2 AND c = 3");
        let Expr::Binary { op, right, .. } = where_expr(&query) else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Or);
        assert!(matches!(
            query.arena[*right],
            Expr::Binary {
                op: BinaryOp::And,
                ..
            }
        ));
    }

    #[test]
    fn test_negative_number_folds_into_literal() {
        let query = parse_ok("SELECT * FROM t WHERE a > -5");
        let Expr::Binary { right, .. } = where_expr(&query) else {
            panic!("expected binary");
        };
        assert_eq!(query.arena[*right], Expr::number("-5"));
    }

    #[test]
    fn test_joins_and_aliases() {
        let query = parse_ok(
            "SELECT o.id FROM orders AS o LEFT OUTER JOIN customers c ON o.customer_id = c.id \
             JOIN items USING (order_id) CROSS JOIN regions",
        );
        let joins = &query.body.from[0].joins;
        assert_eq!(joins.len(), 3);
        assert_eq!(joins[0].kind, JoinKind::Left);
        assert_eq!(joins[1].kind, JoinKind::Inner);
        assert!(matches!(joins[1].constraint, JoinConstraint::Using(_)));
        assert_eq!(joins[2].kind, JoinKind::Cross);
        assert_eq!(
            query.body.from[0].relation.exposed_name(),
            Some(&Ident::new("o"))
        );
    }

    #[test]
    fn test_limit_forms() {
        let query = parse_ok("SELECT * FROM t LIMIT 10, 20");
        let limit = query.body.limit.unwrap();
        assert_eq!(query.arena[limit.count], Expr::number("20"));
        assert_eq!(query.arena[limit.offset.unwrap()], Expr::number("10"));
    }

    #[test]
    fn test_index_hints() {
        let query = parse_ok("SELECT * FROM t FORCE INDEX (idx_a, PRIMARY) WHERE a = 1");
        let TableFactor::Table { hints, .. } = &query.body.from[0].relation else {
            panic!("expected table");
        };
        assert_eq!(hints[0].kind, IndexHintKind::Force);
        assert_eq!(hints[0].indexes.len(), 2);
    }

    #[test]
    fn test_syntax_error_reports_position() {
        let err = parse("SELECT a FROM\n  WHERE", Dialect::default()).unwrap_err();
        match err {
            ParseError::Syntax { position, .. } => {
                assert_eq!(position.line, 2);
                assert_eq!(position.column, 3);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_rejects_non_select_statements() {
        for sql in [
            "UPDATE t SET a = 1",
            "DELETE FROM t",
            "INSERT INTO t VALUES (1)",
            "CALL proc()",
            "DROP TABLE t",
        ] {
            assert!(
                matches!(parse(sql, Dialect::default()), Err(ParseError::Unsupported(_))),
                "{sql}"
            );
        }
    }

    #[test]
    fn test_statement_level_constructs_fail_even_when_lenient() {
        for sql in [
            "SELECT a FROM t UNION SELECT a FROM u",
            "SELECT * FROM t FOR UPDATE",
            "SELECT * FROM t LOCK IN SHARE MODE",
            "WITH RECURSIVE r AS (SELECT 1) SELECT * FROM r",
            "SELECT * FROM a NATURAL JOIN b",
        ] {
            assert!(
                matches!(
                    parse_lenient(sql, Dialect::default()),
                    Err(ParseError::Unsupported(_))
                ),
                "{sql}"
            );
        }
    }

    #[test]
    fn test_cte_requires_capable_dialect() {
        let sql = "WITH recent AS (SELECT id FROM orders) SELECT * FROM recent";
        assert!(parse(sql, Dialect::mysql(8, 0)).is_ok());
        assert!(matches!(
            parse(sql, Dialect::mysql(5, 7)),
            Err(ParseError::Unsupported(_))
        ));
    }

    #[test]
    fn test_subquery_strict_vs_lenient() {
        let sql = "SELECT * FROM t WHERE a IN (SELECT b FROM u) AND c = 1";
        assert!(matches!(
            parse(sql, Dialect::default()),
            Err(ParseError::Unsupported(_))
        ));

        let parsed = parse_lenient(sql, Dialect::default()).unwrap();
        assert_eq!(parsed.skipped.len(), 1);
        assert_eq!(parsed.skipped[0].reason, "IN subquery");
        assert_eq!(parsed.skipped[0].fragment, "a IN (SELECT b FROM u)");
    }

    #[test]
    fn test_window_function_depends_on_dialect() {
        let sql = "SELECT ROW_NUMBER() OVER (PARTITION BY a ORDER BY b DESC) FROM t";
        let query = parse(sql, Dialect::mysql(8, 0)).unwrap();
        let SelectItem::Expr { expr, .. } = &query.body.projection[0] else {
            panic!("expected expression");
        };
        assert!(matches!(
            &query.arena[*expr],
            Expr::Function { over: Some(_), .. }
        ));

        let parsed = parse_lenient(sql, Dialect::mysql(5, 7)).unwrap();
        assert_eq!(parsed.skipped.len(), 1);
    }

    #[test]
    fn test_window_frame_is_unsupported() {
        let sql = "SELECT SUM(a) OVER (ORDER BY b ROWS BETWEEN 1 PRECEDING AND CURRENT ROW) FROM t";
        assert!(matches!(
            parse(sql, Dialect::default()),
            Err(ParseError::Unsupported(_))
        ));
        let parsed = parse_lenient(sql, Dialect::default()).unwrap();
        assert_eq!(parsed.skipped[0].reason, "window frame clause");
    }

    #[test]
    fn test_special_function_syntax_becomes_opaque() {
        let parsed = parse_lenient(
            "SELECT * FROM t WHERE TRIM(LEADING 'x' FROM name) = 'y'",
            Dialect::default(),
        )
        .unwrap();
        assert_eq!(parsed.skipped.len(), 1);
        assert!(parsed.skipped[0].fragment.starts_with("TRIM("));
    }

    #[test]
    fn test_mysql_specific_syntax_is_unsupported_not_a_syntax_error() {
        for (filter, reason) in [
            ("TRIM(LEADING 'x' FROM name) = 'y'", "function call with special argument syntax"),
            ("CONVERT(name USING utf8mb4) = 'y'", "function call with special argument syntax"),
            ("name = _utf8mb4'x'", "character set introducer"),
            ("name = N'x'", "national string literal"),
            ("flags = X'AB'", "hexadecimal string literal"),
            ("flags = b'101'", "bit string literal"),
            ("id = @v", "variable reference"),
            ("name COLLATE utf8mb4_bin = 'x'", "COLLATE"),
            ("BINARY name = 'x'", "operator `BINARY`"),
            ("flags & 4 = 4", "operator `&`"),
            ("flags | 1 = 3", "operator `|`"),
            ("~flags = 0", "operator `~`"),
            ("flags << 2 > 8", "operator `<<`"),
            ("doc->'$.a' = 1", "operator `->`"),
            ("doc->>'$.a' = 'x'", "operator `->>`"),
            ("MATCH (title, body) AGAINST ('x' IN BOOLEAN MODE)", "full-text search"),
            ("name SOUNDS LIKE 'x'", "SOUNDS LIKE"),
            ("3 MEMBER OF (doc->'$.ids')", "MEMBER OF"),
        ] {
            let sql = format!("SELECT id FROM t WHERE {} AND id = 1", filter);
            let parsed = parse_lenient(&sql, Dialect::default())
                .unwrap_or_else(|e| panic!("{sql}: {e}"));
            assert!(
                parsed.skipped.iter().any(|s| s.reason == reason),
                "{sql}: {:?}",
                parsed.skipped
            );
            assert!(
                matches!(parse(&sql, Dialect::default()), Err(ParseError::Unsupported(_))),
                "{sql}"
            );
        }
    }

    #[test]
    fn test_opaque_operator_keeps_the_rest_of_the_filter() {
        let parsed = parse_lenient(
            "SELECT id FROM t WHERE flags & 4 = 4 AND status = 'a'",
            Dialect::default(),
        )
        .unwrap();
        assert_eq!(
            parsed.query.to_sql(),
            "SELECT id FROM t WHERE flags & 4 = 4 AND status = 'a'"
        );
    }

    #[test]
    fn test_three_part_column_reference() {
        let query = parse_ok("SELECT shop.orders.id FROM shop.orders WHERE shop.orders.status = 'paid'");
        let Expr::Binary { left, .. } = where_expr(&query) else {
            panic!("expected binary");
        };
        let Expr::Column(column) = &query.arena[*left] else {
            panic!("expected column");
        };
        assert_eq!(column.schema, Some(Ident::new("shop")));
        assert_eq!(column.qualifier, Some(Ident::new("orders")));
        assert_eq!(column.name, Ident::new("status"));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let parens = format!("SELECT a FROM t WHERE {}a = 1{}", "(".repeat(1000), ")".repeat(1000));
        let nots = format!("SELECT a FROM t WHERE {}a = 1", "NOT ".repeat(1000));
        let minus = format!("SELECT {}a FROM t", "- ".repeat(1000));
        for sql in [parens, nots, minus] {
            for result in [
                parse(&sql, Dialect::default()),
                parse_lenient(&sql, Dialect::default()).map(|p| p.query),
            ] {
                match result {
                    Err(ParseError::Unsupported(construct)) => {
                        assert!(construct.reason.contains("nested deeper"), "{}", construct.reason)
                    }
                    other => panic!("unexpected result {:?}", other.map(|q| q.to_sql())),
                }
            }
        }

        let shallow = format!("SELECT a FROM t WHERE {}a = 1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(parse_ok(&shallow).to_sql(), "SELECT a FROM t WHERE a = 1");
    }

    #[test]
    fn test_overly_tall_expression_tree_is_rejected() {
        let chain = |n: usize| {
            let terms: Vec<String> = (0..n).map(|i| format!("a = {}", i)).collect();
            format!("SELECT a FROM t WHERE {}", terms.join(" OR "))
        };
        assert!(parse(&chain(200), Dialect::default()).is_ok());
        match parse(&chain(MAX_EXPR_HEIGHT + 10), Dialect::default()) {
            Err(ParseError::Unsupported(construct)) => {
                assert!(construct.reason.contains("exceeds"), "{}", construct.reason)
            }
            other => panic!("unexpected result {:?}", other.map(|q| q.to_sql())),
        }
    }

    #[test]
    fn test_row_constructor_is_unsupported() {
        let parsed =
            parse_lenient("SELECT * FROM t WHERE (a, b) = (1, 2)", Dialect::default()).unwrap();
        assert_eq!(parsed.skipped.len(), 2);
        assert!(parsed.skipped.iter().all(|s| s.reason == "row constructor"));
    }

    #[test]
    fn test_derived_table_lenient() {
        let parsed =
            parse_lenient("SELECT x.a FROM (SELECT a FROM t) AS x", Dialect::default()).unwrap();
        assert!(matches!(
            parsed.query.body.from[0].relation,
            TableFactor::Opaque { .. }
        ));
        assert_eq!(parsed.skipped[0].reason, "derived table");
    }

    #[test]
    fn test_select_from_dual_drops_from() {
        let query = parse_ok("SELECT 1 FROM DUAL");
        assert!(query.body.from.is_empty());
    }
}
