//! Table Data Gateway over SQL databases.
//!
//! # Intention
//!
//! - One [`Gateway`] per table: insert, find, update, delete and filtered
//!   queries for one record type, without per-table CRUD boilerplate.
//! - Records declare their column mapping explicitly through [`Record`];
//!   optional fields (`Option<T>`) map to nullable columns.
//! - SQL is rendered per [`Dialect`]: `?` or `$n` placeholders, and
//!   `RETURNING` or last-insert-id for generated keys.
//!
//! # Architectural Boundaries
//!
//! - Connection management, pooling, transactions and migrations belong to
//!   the [`Handle`] the caller passes in, not to this crate.
//! - `rusqlite::Connection` is the bundled handle; other drivers plug in by
//!   implementing [`Handle`].
//! - No relationship mapping and no query planning.

pub mod config;
pub mod dialect;
pub mod error;
pub mod gateway;
pub mod handle;
pub mod query;
pub mod record;
pub mod value;

pub use config::{GatewayConfig, SqliteConfig};
pub use dialect::{Dialect, InsertStrategy};
pub use error::{BuildError, Error, MappingError, Operation, Result};
pub use gateway::{ChangeSet, Filters, Gateway, TableDataGateway};
pub use handle::Handle;
pub use query::{
    CreateOperation, CrudOperation, DeleteOperation, Direction, OrderBy, Query, QueryOperator,
    ReadOperation, SqlQuery, StatementBuilder, UpdateOperation,
};
pub use record::{Field, FieldEntry, FieldMap, Record, Row};
pub use value::{Column, Value, ValueKind};
