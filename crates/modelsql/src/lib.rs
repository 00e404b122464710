//! # modelsql
//!
//! A schema-driven PostgreSQL toolkit for Rust.
//!
//! ## Features
//!
//! - **Schema compiler**: JSON entity definitions → a typed [`model::DomainModel`]
//! - **DDL generator**: entities → `CREATE TABLE` scripts with keys, indexes, and references
//! - **Migration tooling**: versioned history snapshots, migration stubs, and an async runner
//! - **Query builders**: parameterized SELECT and condition trees, strictly left-to-right `$n`
//! - **Runtime façade**: record-based select/insert/update/delete over an execution channel
//! - **Safe defaults**: UPDATE and DELETE require conditions, all values are bound parameters
//!
//! ## Query Builder (qb)
//!
//! ```ignore
//! use modelsql::qb::SelectBuilder;
//!
//! let (sql, args) = SelectBuilder::new()
//!     .from("city")
//!     .select(&["name", "population"])
//!     .where_("population", ">", 100_000)?
//!     .order_by("name")
//!     .limit(10)
//!     .to_sql()?;
//! ```

pub mod db;
pub mod ddl;
pub mod decl;
pub mod error;
pub mod load;
pub mod migrate;
pub mod model;
pub mod pg;
pub mod qb;
pub mod schema;
pub mod value;

pub use db::{Database, ExecutionChannel, Modify, Prepared, Query, Record, RowData, Statement};
pub use ddl::{create_entity, generate_database_sql};
pub use decl::to_interfaces;
pub use error::{ModelError, ModelResult};
pub use load::{load_database_config, load_model, save_version};
pub use migrate::{GeneratedMigration, generate, migrate};
pub use model::{DatabaseConfig, DomainModel};
pub use pg::{DriverRegistry, PgChannel, pg_types};
pub use qb::{ConditionsBuilder, ParamsBuilder, QueryBuilder, SelectBuilder};
pub use schema::{FieldDefinition, IndexDefinition, Kind, Schema, Scope};
pub use value::SqlValue;

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{PooledChannel, create_pool};
