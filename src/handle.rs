//! Database handles the gateway executes statements against.
//!
//! A [`Handle`] runs one rendered statement per call. Connection pooling,
//! transactions and timeouts belong to the handle, not to the gateway.
//! `rusqlite::Connection` is the built-in backend; wrap it in a
//! `parking_lot::Mutex` (and an `Arc`) to share it between threads.

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection, OptionalExtension};

use crate::record::Row;
use crate::value::Value;

pub trait Handle {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Driver identifier used to pick a dialect, e.g. `"sqlite3"` or `"postgres"`.
    fn driver_name(&self) -> &'static str;

    /// Execute a statement and report the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, Self::Error>;

    /// Execute an INSERT and report the driver's last insert id.
    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64, Self::Error>;

    /// Prepare and execute a statement, fetching the first column of its first row.
    fn query_scalar(&self, sql: &str, params: &[Value]) -> Result<Option<Value>, Self::Error>;

    /// Fetch the first row of a query, if any.
    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, Self::Error>;

    fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Self::Error>;
}

fn read_row(columns: &[String], row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let mut values = Vec::with_capacity(columns.len());
    for idx in 0..columns.len() {
        values.push(row.get::<_, Value>(idx)?);
    }
    Ok(Row::new(columns.to_vec(), values))
}

fn column_names(stmt: &rusqlite::Statement<'_>) -> Vec<String> {
    stmt.column_names().into_iter().map(String::from).collect()
}

impl Handle for Connection {
    type Error = rusqlite::Error;

    fn driver_name(&self) -> &'static str {
        "sqlite3"
    }

    fn execute(&self, sql: &str, params: &[Value]) -> rusqlite::Result<u64> {
        let mut stmt = self.prepare_cached(sql)?;
        let affected = stmt.execute(params_from_iter(params.iter()))?;
        Ok(affected as u64)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> rusqlite::Result<i64> {
        let mut stmt = self.prepare_cached(sql)?;
        stmt.insert(params_from_iter(params.iter()))
    }

    fn query_scalar(&self, sql: &str, params: &[Value]) -> rusqlite::Result<Option<Value>> {
        let mut stmt = self.prepare(sql)?;
        stmt.query_row(params_from_iter(params.iter()), |row| row.get::<_, Value>(0))
            .optional()
    }

    fn query_one(&self, sql: &str, params: &[Value]) -> rusqlite::Result<Option<Row>> {
        let mut stmt = self.prepare_cached(sql)?;
        let columns = column_names(&stmt);
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        match rows.next()? {
            Some(row) => read_row(&columns, row).map(Some),
            None => Ok(None),
        }
    }

    fn query_all(&self, sql: &str, params: &[Value]) -> rusqlite::Result<Vec<Row>> {
        let mut stmt = self.prepare_cached(sql)?;
        let columns = column_names(&stmt);
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_row(&columns, row)?);
        }
        Ok(out)
    }
}

impl<H: Handle> Handle for Mutex<H> {
    type Error = H::Error;

    fn driver_name(&self) -> &'static str {
        self.lock().driver_name()
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, Self::Error> {
        self.lock().execute(sql, params)
    }

    // The id is read under the same lock as the insert, so a concurrent
    // insert on the shared connection cannot interleave.
    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64, Self::Error> {
        self.lock().insert(sql, params)
    }

    fn query_scalar(&self, sql: &str, params: &[Value]) -> Result<Option<Value>, Self::Error> {
        self.lock().query_scalar(sql, params)
    }

    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, Self::Error> {
        self.lock().query_one(sql, params)
    }

    fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Self::Error> {
        self.lock().query_all(sql, params)
    }
}

macro_rules! forward_handle {
    ($($ty:ty),*) => {
        $(
            impl<H: Handle + ?Sized> Handle for $ty {
                type Error = H::Error;

                fn driver_name(&self) -> &'static str {
                    (**self).driver_name()
                }

                fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, Self::Error> {
                    (**self).execute(sql, params)
                }

                fn insert(&self, sql: &str, params: &[Value]) -> Result<i64, Self::Error> {
                    (**self).insert(sql, params)
                }

                fn query_scalar(
                    &self,
                    sql: &str,
                    params: &[Value],
                ) -> Result<Option<Value>, Self::Error> {
                    (**self).query_scalar(sql, params)
                }

                fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, Self::Error> {
                    (**self).query_one(sql, params)
                }

                fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Self::Error> {
                    (**self).query_all(sql, params)
                }
            }
        )*
    };
}

forward_handle!(&H, Arc<H>);
