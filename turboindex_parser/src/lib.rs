//! MySQL/MariaDB SELECT parser with a canonical serializer.
//!
//! ```
//! use turboindex_parser::{parse, Dialect};
//!
//! let query = parse("select * from `users` where status='a'", Dialect::default()).unwrap();
//! assert_eq!(query.to_sql(), "SELECT * FROM users WHERE status = 'a'");
//! ```

pub mod ast;
pub mod dialect;
pub mod display;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{
    is_aggregate_function, is_nondeterministic_function, BinaryOp, ColumnRef, Cte, Expr, ExprArena, ExprId, FunctionArgs, Ident, IndexHint,
    IndexHintKind, Join, JoinConstraint, JoinKind, Limit, Literal, ObjectName, OrderByItem, Query,
    Select, SelectItem, TableFactor, TableWithJoins, TemporalKind, UnaryOp, WhenClause, WindowSpec,
    MAX_EXPR_HEIGHT,
};
pub use dialect::{Dialect, Flavor, IndexSyntax};
pub use display::{expr_to_sql, quote_ident, quote_string, select_to_sql};
pub use error::{DialectError, ParseError, Position, UnsupportedConstruct};
pub use parser::{parse, parse_lenient, ParsedQuery, MAX_NESTING_DEPTH};
