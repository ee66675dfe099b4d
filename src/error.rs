use std::fmt;

use thiserror::Error;

use crate::value::{Value, ValueKind};

/// Gateway operation an error was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Find,
    Update,
    Delete,
    FilterQuery,
    Query,
    Exec,
    GetId,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Insert => "insert",
            Operation::Find => "find",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::FilterQuery => "filter_query",
            Operation::Query => "query",
            Operation::Exec => "exec",
            Operation::GetId => "get_id",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by gateway operations.
///
/// Every variant names the operation and table it came from. Driver errors
/// are kept as the `source()` of [`Error::Execution`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("{op} on `{table}`: no row with {column} = {key}")]
    NotFound {
        op: Operation,
        table: String,
        column: String,
        key: Value,
    },

    #[error("{op} on `{table}`: {source}")]
    Mapping {
        op: Operation,
        table: String,
        #[source]
        source: MappingError,
    },

    #[error("{op} on `{table}`: could not build statement: {source}")]
    Build {
        op: Operation,
        table: String,
        #[source]
        source: BuildError,
    },

    #[error("{op} on `{table}` failed: {source}")]
    Execution {
        op: Operation,
        table: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn operation(&self) -> Operation {
        match self {
            Error::NotFound { op, .. }
            | Error::Mapping { op, .. }
            | Error::Build { op, .. }
            | Error::Execution { op, .. } => *op,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Error::NotFound { table, .. }
            | Error::Mapping { table, .. }
            | Error::Build { table, .. }
            | Error::Execution { table, .. } => table,
        }
    }
}

/// Record shape does not line up with the table or with a result row.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error("record has no field mapped to column `{column}`")]
    FieldNotFound { column: String },

    #[error("key column `{column}` has no integer representation")]
    UnsupportedKeyType { column: String },

    #[error("column `{column}` is mapped more than once")]
    DuplicateColumn { column: String },

    #[error("result row has no column `{column}`")]
    MissingColumn { column: String },

    #[error("column `{column}` is NULL but the field is not optional")]
    UnexpectedNull { column: String },

    #[error("column `{column}`: expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("column `{column}`: value out of range for the field type")]
    OutOfRange { column: String },
}

/// The query builder could not render a statement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("table name is empty")]
    EmptyTableName,

    #[error("invalid {kind} identifier: {ident:?}")]
    InvalidIdentifier { kind: &'static str, ident: String },

    #[error("update of `{table}` has no columns to set")]
    EmptyUpdate { table: String },

    #[error("IN list for `{column}` is empty")]
    EmptyInList { column: String },

    #[error("insert into `{table}` has {columns} columns but {values} values")]
    ColumnCountMismatch {
        table: String,
        columns: usize,
        values: usize,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
