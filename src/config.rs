use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;

/// Gateway configuration: which table, which key column, and optionally
/// a dialect that overrides driver-name detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub table: String,
    pub primary_key: String,
    #[serde(default)]
    pub dialect: Option<Dialect>,
}

impl GatewayConfig {
    pub fn new(table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
            dialect: None,
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }
}

/// SQLite connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file, or `:memory:`
    pub db_path: String,
}

impl SqliteConfig {
    pub const IN_MEMORY: &'static str = ":memory:";

    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Self::IN_MEMORY)
    }

    pub fn open(&self) -> rusqlite::Result<Connection> {
        if self.db_path == Self::IN_MEMORY {
            Connection::open_in_memory()
        } else {
            Connection::open(&self.db_path)
        }
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}
