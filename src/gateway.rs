//! The table data gateway: one value per table, CRUD for one record type.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::OnceLock;

use tracing::{debug, trace};

use crate::config::GatewayConfig;
use crate::dialect::{Dialect, InsertStrategy};
use crate::error::{BuildError, Error, MappingError, Operation, Result};
use crate::handle::Handle;
use crate::query::{
    CreateOperation, CrudOperation, OrderBy, ReadOperation, SqlQuery, StatementBuilder,
};
use crate::record::{FieldMap, Record};
use crate::value::{Column, Value, ValueKind};

/// Equality filters for [`Gateway::filter_query`], AND-combined.
///
/// Keys are unique and rendered in column-name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters(BTreeMap<String, Value>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.0.insert(column.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Filters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Columns to change in [`Gateway::update`], with their new values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet(BTreeMap<String, Value>);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.0.insert(column.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// CRUD surface of a gateway, for code that should not depend on the
/// concrete handle type.
pub trait TableDataGateway<R> {
    fn insert(&self, record: &R) -> Result<i64>;
    fn find(&self, key: Value) -> Result<R>;
    fn update(&self, key: Value, changes: &ChangeSet) -> Result<u64>;
    fn delete(&self, key: Value) -> Result<u64>;
    fn filter_query(
        &self,
        filters: &Filters,
        order: &[OrderBy],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<R>>;
}

/// Insert column layout, derived from the first record inserted.
#[derive(Debug)]
struct Layout {
    columns: Vec<&'static str>,
}

/// Maps one table onto the record type `R` through the handle `H`.
///
/// The gateway is cheap to build and holds no connection state of its own;
/// pass `&Connection`, `Arc<Mutex<Connection>>` or any other [`Handle`].
///
/// The insert column list is derived once, from the first record passed to
/// [`insert`](Self::insert) or [`derive_columns`](Self::derive_columns), and
/// reused afterwards. Whether an unset auto-increment key is left out is
/// decided on every call.
///
/// ```
/// use rusqlite::Connection;
/// use table_gateway::{ChangeSet, Field, Gateway, MappingError, Record, Row};
///
/// struct Place {
///     id: Option<i64>,
///     country: String,
/// }
///
/// impl Record for Place {
///     fn fields(&self) -> Vec<Field> {
///         vec![Field::column("id", &self.id), Field::column("country", &self.country)]
///     }
///
///     fn from_row(row: &Row) -> Result<Self, MappingError> {
///         Ok(Place { id: row.get("id")?, country: row.get("country")? })
///     }
/// }
///
/// let conn = Connection::open_in_memory().unwrap();
/// conn.execute_batch("CREATE TABLE places (id INTEGER PRIMARY KEY, country TEXT)").unwrap();
///
/// let places = Gateway::<Place, _>::new(&conn, "places", "id");
/// let id = places.insert(&Place { id: None, country: "Italy".into() }).unwrap();
/// places.update(id, &ChangeSet::new().set("country", "Germany")).unwrap();
/// assert_eq!(places.find(id).unwrap().country, "Germany");
/// ```
pub struct Gateway<R, H> {
    handle: H,
    table: String,
    primary_key: String,
    dialect: Dialect,
    layout: OnceLock<Layout>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record, H: Handle> Gateway<R, H> {
    /// Bind a gateway to `table`, keyed by `primary_key`. The dialect is
    /// detected from the handle's driver name.
    pub fn new(handle: H, table: &str, primary_key: &str) -> Self {
        let dialect = Dialect::from_driver_name(handle.driver_name());
        Self {
            handle,
            table: table.to_string(),
            primary_key: primary_key.to_string(),
            dialect,
            layout: OnceLock::new(),
            _record: PhantomData,
        }
    }

    pub fn from_config(handle: H, config: &GatewayConfig) -> Self {
        let gateway = Self::new(handle, &config.table, &config.primary_key);
        match config.dialect {
            Some(dialect) => gateway.with_dialect(dialect),
            None => gateway,
        }
    }

    /// Override the detected dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn builder(&self) -> StatementBuilder {
        StatementBuilder::new(self.dialect)
    }

    /// `SELECT * FROM <table>`, ready for conditions, order and paging.
    pub fn select(&self) -> ReadOperation {
        ReadOperation::new(&self.table)
    }

    /// Columns an INSERT of `record` would write, in declaration order.
    ///
    /// An unset optional integer primary key is left out so the database can
    /// assign it.
    pub fn derive_columns(&self, record: &R) -> Result<Vec<&'static str>> {
        let fields = FieldMap::of(record).map_err(self.mapping_err(Operation::Insert))?;
        self.insert_columns(&fields).map_err(self.mapping_err(Operation::Insert))
    }

    fn insert_columns(&self, fields: &FieldMap) -> Result<Vec<&'static str>, MappingError> {
        let layout = self.layout.get_or_init(|| {
            let columns: Vec<_> = fields.columns().collect();
            debug!(table = %self.table, columns = ?columns, "derived insert column layout");
            Layout { columns }
        });

        let skip_key = fields
            .get(&self.primary_key)
            .is_some_and(|key| key.is_unset_optional_integer());

        let mut columns = Vec::with_capacity(layout.columns.len());
        for &column in &layout.columns {
            if skip_key && column == self.primary_key {
                continue;
            }
            if fields.get(column).is_none() {
                return Err(MappingError::FieldNotFound {
                    column: column.to_string(),
                });
            }
            columns.push(column);
        }
        Ok(columns)
    }

    /// The primary-key value of `record`, unwrapped from its optional
    /// wrapper (`Value::Null` when unset).
    pub fn get_id(&self, record: &R) -> Result<Value> {
        let fields = FieldMap::of(record).map_err(self.mapping_err(Operation::GetId))?;
        self.key_value(&fields).map_err(self.mapping_err(Operation::GetId))
    }

    fn key_value(&self, fields: &FieldMap) -> Result<Value, MappingError> {
        if let Some(entry) = fields.get(&self.primary_key) {
            return Ok(entry.value.clone());
        }
        if fields.is_embedded(&self.primary_key) {
            return Err(MappingError::UnsupportedKeyType {
                column: self.primary_key.clone(),
            });
        }
        Err(MappingError::FieldNotFound {
            column: self.primary_key.clone(),
        })
    }

    /// Checks that the key can be reported as an `i64` before anything runs.
    ///
    /// Required for RETURNING, which names the key column. Last-insert-id
    /// backends accept records without a key field.
    fn check_insert_key(&self, fields: &FieldMap, required: bool) -> Result<(), MappingError> {
        match fields.get(&self.primary_key) {
            Some(entry) if entry.kind == ValueKind::Integer => Ok(()),
            Some(_) => Err(MappingError::UnsupportedKeyType {
                column: self.primary_key.clone(),
            }),
            None if fields.is_embedded(&self.primary_key) || required => {
                self.key_value(fields).map(|_| ())
            }
            None => Ok(()),
        }
    }

    /// Insert `record` and return its key: the generated one, or the one it
    /// carried.
    ///
    /// The key column must be an integer; a record whose key maps to any
    /// other kind fails with [`MappingError::UnsupportedKeyType`] and nothing
    /// is written.
    pub fn insert(&self, record: &R) -> Result<i64> {
        let op = Operation::Insert;
        let strategy = self.dialect.insert_strategy();
        let fields = FieldMap::of(record).map_err(self.mapping_err(op))?;
        self.check_insert_key(&fields, strategy == InsertStrategy::Returning)
            .map_err(self.mapping_err(op))?;
        let columns = self.insert_columns(&fields).map_err(self.mapping_err(op))?;

        let mut create = CreateOperation::new(&self.table);
        for column in columns {
            let value = fields.get(column).map(|e| e.value.clone()).unwrap_or(Value::Null);
            create = create.value(column, value);
        }

        match strategy {
            InsertStrategy::Returning => {
                let create = create.returning(&self.primary_key);
                let sql = self.render(op, &CrudOperation::Create(create))?;
                let key = self
                    .handle
                    .query_scalar(&sql.statement, &sql.params)
                    .map_err(self.exec_err(op))?;
                match key {
                    Some(key) => i64::from_value(&self.primary_key, key)
                        .map_err(self.mapping_err(op)),
                    None => Err(self.mapping_err(op)(MappingError::UnexpectedNull {
                        column: self.primary_key.clone(),
                    })),
                }
            }
            InsertStrategy::LastInsertId => {
                let sql = self.render(op, &CrudOperation::Create(create))?;
                self.handle
                    .insert(&sql.statement, &sql.params)
                    .map_err(self.exec_err(op))
            }
        }
    }

    /// Fetch the row whose primary key equals `key`.
    pub fn find(&self, key: impl Into<Value>) -> Result<R> {
        let op = Operation::Find;
        let key = key.into();
        let read = self.select().where_eq(&self.primary_key, key.clone());
        let sql = self.render(op, &CrudOperation::Read(read))?;
        let row = self
            .handle
            .query_one(&sql.statement, &sql.params)
            .map_err(self.exec_err(op))?;
        match row {
            Some(row) => R::from_row(&row).map_err(self.mapping_err(op)),
            None => Err(Error::NotFound {
                op,
                table: self.table.clone(),
                column: self.primary_key.clone(),
                key,
            }),
        }
    }

    /// Set the given columns on the row keyed by `key`; returns affected rows.
    ///
    /// An empty change set is rejected with [`BuildError::EmptyUpdate`].
    pub fn update(&self, key: impl Into<Value>, changes: &ChangeSet) -> Result<u64> {
        let op = Operation::Update;
        let mut update = self.builder().update(&self.table);
        for (column, value) in changes.iter() {
            update = update.set(column, value.clone());
        }
        let update = update.where_eq(&self.primary_key, key);
        self.execute(op, &CrudOperation::Update(update))
    }

    /// Delete the row keyed by `key`; returns affected rows, 0 when absent.
    pub fn delete(&self, key: impl Into<Value>) -> Result<u64> {
        let delete = self
            .builder()
            .delete(&self.table)
            .where_eq(&self.primary_key, key);
        self.execute(Operation::Delete, &CrudOperation::Delete(delete))
    }

    /// Rows matching every equality filter, ordered and paged.
    ///
    /// Empty `filters` scan the whole table. Empty `order` leaves the row
    /// order to the database. A `limit` of 0 means no limit.
    pub fn filter_query(
        &self,
        filters: &Filters,
        order: &[OrderBy],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<R>> {
        let mut read = self.select();
        for (column, value) in filters.iter() {
            read = read.where_eq(column, value.clone());
        }
        for term in order {
            read = read.order_by(term.clone());
        }
        if limit > 0 {
            read = read.limit(limit);
        }
        if offset > 0 {
            read = read.offset(offset);
        }
        self.fetch_all(Operation::FilterQuery, &read)
    }

    /// Run a custom select, typically built from [`select`](Self::select).
    pub fn query(&self, read: &ReadOperation) -> Result<Vec<R>> {
        self.fetch_all(Operation::Query, read)
    }

    /// Run any non-select operation and return affected rows.
    pub fn exec(&self, op: &CrudOperation) -> Result<u64> {
        self.execute(Operation::Exec, op)
    }

    fn fetch_all(&self, op: Operation, read: &ReadOperation) -> Result<Vec<R>> {
        let sql = self.render(op, &CrudOperation::Read(read.clone()))?;
        let rows = self
            .handle
            .query_all(&sql.statement, &sql.params)
            .map_err(self.exec_err(op))?;
        rows.iter()
            .map(|row| R::from_row(row).map_err(self.mapping_err(op)))
            .collect()
    }

    fn execute(&self, op: Operation, crud: &CrudOperation) -> Result<u64> {
        let sql = self.render(op, crud)?;
        self.handle
            .execute(&sql.statement, &sql.params)
            .map_err(self.exec_err(op))
    }

    fn render(&self, op: Operation, crud: &CrudOperation) -> Result<SqlQuery> {
        let sql = crud.to_sql(self.dialect).map_err(self.build_err(op))?;
        debug!(table = %self.table, op = %op, sql = %sql.statement, "executing statement");
        trace!(params = ?sql.params, "statement parameters");
        Ok(sql)
    }

    fn mapping_err(&self, op: Operation) -> impl Fn(MappingError) -> Error + '_ {
        move |source| Error::Mapping {
            op,
            table: self.table.clone(),
            source,
        }
    }

    fn build_err(&self, op: Operation) -> impl Fn(BuildError) -> Error + '_ {
        move |source| Error::Build {
            op,
            table: self.table.clone(),
            source,
        }
    }

    fn exec_err(&self, op: Operation) -> impl Fn(H::Error) -> Error + '_ {
        move |source| Error::Execution {
            op,
            table: self.table.clone(),
            source: Box::new(source),
        }
    }
}

impl<R: Record, H: Handle> TableDataGateway<R> for Gateway<R, H> {
    fn insert(&self, record: &R) -> Result<i64> {
        Gateway::insert(self, record)
    }

    fn find(&self, key: Value) -> Result<R> {
        Gateway::find(self, key)
    }

    fn update(&self, key: Value, changes: &ChangeSet) -> Result<u64> {
        Gateway::update(self, key, changes)
    }

    fn delete(&self, key: Value) -> Result<u64> {
        Gateway::delete(self, key)
    }

    fn filter_query(
        &self,
        filters: &Filters,
        order: &[OrderBy],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<R>> {
        Gateway::filter_query(self, filters, order, offset, limit)
    }
}
