use serde::{Deserialize, Serialize};

/// SQL dialect of the backend a gateway talks to.
///
/// Affects placeholder style, how a generated key is read back after an
/// insert, and how an offset without a limit is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Unknown driver: `?` placeholders, last-insert-id.
    Generic,
    Sqlite,
    MySql,
    /// `$1, $2, ...` placeholders, `RETURNING` for generated keys.
    Postgres,
}

/// How the key of a freshly inserted row is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertStrategy {
    /// `INSERT ... RETURNING pk`, fetched as a single scalar.
    Returning,
    /// Plain insert followed by the driver-reported last insert id.
    LastInsertId,
}

impl Dialect {
    /// Pick the dialect from a driver identifier such as `"postgres"` or `"sqlite3"`.
    pub fn from_driver_name(driver: &str) -> Self {
        match driver.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pgx" | "pq" => Dialect::Postgres,
            "mysql" | "mariadb" => Dialect::MySql,
            "sqlite" | "sqlite3" => Dialect::Sqlite,
            _ => Dialect::Generic,
        }
    }

    /// Placeholder for the `index`-th parameter, counting from 1.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Generic | Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    pub fn insert_strategy(self) -> InsertStrategy {
        match self {
            Dialect::Postgres => InsertStrategy::Returning,
            Dialect::Generic | Dialect::Sqlite | Dialect::MySql => InsertStrategy::LastInsertId,
        }
    }

    /// LIMIT clause standing for "all rows", when the dialect cannot express
    /// an OFFSET without one.
    pub(crate) fn unbounded_limit(self) -> Option<&'static str> {
        match self {
            Dialect::Postgres => None,
            Dialect::MySql => Some("LIMIT 18446744073709551615"),
            Dialect::Generic | Dialect::Sqlite => Some("LIMIT -1"),
        }
    }
}
