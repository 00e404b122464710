//! Parameterized SQL building blocks.
//!
//! The `qb` module provides the three cooperating builders:
//!
//! - [`ParamsBuilder`]: ordinal `$n` placeholder assignment
//! - [`ConditionsBuilder`]: boolean condition lists (WHERE fragments)
//! - [`SelectBuilder`]: full SELECT statements
//!
//! All SQL is generated with `$n` placeholders computed at build time; values
//! never enter the SQL text.
//!
//! ```ignore
//! use modelsql::qb::SelectBuilder;
//!
//! let query = SelectBuilder::new()
//!     .from("city")
//!     .where_("population", ">", 100_000)?
//!     .order_by("name")
//!     .limit(10);
//! let (sql, args) = query.to_sql()?;
//! ```

pub mod conditions;
pub mod param;
pub mod select;

pub use conditions::{CondOperator, ConditionsBuilder, Operand};
pub use param::ParamsBuilder;
pub use select::{OrderDir, SelectBuilder};

use crate::error::ModelResult;

/// Identifier escaping hook injected into builders.
pub type EscapeFn = fn(&str) -> String;

/// Wrap a single identifier in double quotes.
pub fn escape_identifier(name: &str) -> String {
    format!("\"{name}\"")
}

/// Escape a possibly dotted key, leaving a bare `*` segment untouched.
///
/// `"table1.f"` becomes `"table1"."f"`; `"*"` stays `*`.
pub fn escape_key(key: &str, escape: EscapeFn) -> String {
    key.split('.')
        .map(|part| {
            if part == "*" {
                part.to_string()
            } else {
                escape(part)
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Anything that renders itself as a SQL fragment while binding parameters.
pub trait QueryBuilder {
    /// Produce the SQL text, appending bound values to `params`.
    fn build(&self, params: &mut ParamsBuilder) -> ModelResult<String>;
}
