//! # sqltpl - SQL templates with named parameters
//!
//! > **Keep SQL in `.sql` files. Call it with named parameters.**
//!
//! sqltpl compiles files of named SQL queries into positional statements
//! (`$1`, `$2`, ...) plus an ordered argument list.
//!
//! ## Quick Example
//!
//! ```
//! use sqltpl::prelude::*;
//!
//! let set = QuerySet::parse(
//!     "-- name: get_server\n\
//!      -- docs: Gets a server by hostname.\n\
//!      SELECT * FROM server WHERE hostname = :hostname\n",
//! )
//! .unwrap();
//!
//! let params = Params::new().with("hostname", "localhost");
//! let query = set.expand("get_server", &params, &Options::default()).unwrap();
//! assert_eq!(query.statement, "SELECT * FROM server WHERE hostname = $1");
//! assert_eq!(query.arguments, vec![Scalar::from("localhost")]);
//! ```
//!
//! ## Template Syntax
//!
//! | Syntax          | Meaning                                         |
//! |-----------------|-------------------------------------------------|
//! | `-- name: q`    | Starts query `q`                                |
//! | `-- docs: ...`  | Documents the query (directly after the name)   |
//! | `:param`        | Mandatory parameter                             |
//! | `:_param`       | Optional parameter, dropped when absent         |
//! | `:other_query`  | Inlines another query of the same file          |
//! | `-- ...`        | Comment                                         |

pub mod ast;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod expand;
pub mod lexer;
pub mod parser;
pub mod value;

pub mod prelude {
    pub use crate::compiler::{QuerySet, Template};
    pub use crate::engine::{Database, Outcome, Rows};
    pub use crate::error::*;
    pub use crate::expand::{Options, Query};
    pub use crate::value::{Params, QueryCall, QueryRef, Scalar, Value};
}

/// Compile a source of named queries.
///
/// # Example
///
/// ```
/// let set = sqltpl::compile("-- name: one\nSELECT 1;\n").unwrap();
/// assert!(set.contains("one"));
/// ```
pub fn compile(text: &str) -> error::CompileResult<compiler::QuerySet> {
    compiler::QuerySet::parse(text)
}
