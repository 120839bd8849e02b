//! The SLQ front-end: lexer, parser, AST, inspector, and preprocessing.
//!
//! SLQ is a small dotted pipeline language. `@handle` picks a source,
//! `.name` selects tables and columns, `[n:m]` slices rows, and segments are
//! chained with `|`:
//!
//! ```text
//! @pg1 | .actor | .first_name, .last_name | .[0:10]
//! ```

pub mod ast;
mod inspect;
mod lexer;
mod parser;
mod preprocess;

pub use ast::{Ast, CmpOp, Func, Literal, Node, NodeTag, LIMIT_UNBOUNDED};
pub use inspect::Inspector;
pub use parser::parse;
pub use preprocess::{ensure_handle, leading_handle};
