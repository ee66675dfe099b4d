//! Statement builder: CRUD operations rendered to SQL text plus positional
//! parameters, with dialect-aware placeholders.
//!
//! ```
//! use table_gateway::{Dialect, OrderBy, QueryOperator, StatementBuilder};
//!
//! let sql = StatementBuilder::new(Dialect::Postgres)
//!     .select("places")
//!     .where_eq("country", "Germany")
//!     .with_condition("telcode", QueryOperator::GreaterThan(50i64.into()))
//!     .order_by(OrderBy::asc("telcode"))
//!     .limit(10)
//!     .to_sql(Dialect::Postgres)
//!     .unwrap();
//! assert_eq!(
//!     sql.statement,
//!     "SELECT * FROM places WHERE country = $1 AND telcode > $2 ORDER BY telcode ASC LIMIT 10"
//! );
//! ```

use std::str::FromStr;

use crate::dialect::Dialect;
use crate::error::BuildError;
use crate::value::Value;

/// SQL text with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Vec<Value>,
}

/// Query operators for building conditions
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperator {
    /// `col = v`; a NULL value renders `col IS NULL`.
    Equal(Value),
    /// `col != v`; a NULL value renders `col IS NOT NULL`.
    NotEqual(Value),
    GreaterThan(Value),
    GreaterThanOrEqual(Value),
    LessThan(Value),
    LessThanOrEqual(Value),
    Like(String),
    In(Vec<Value>),
}

/// AND-combined conditions, rendered in insertion order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Query {
    pub conditions: Vec<(String, QueryOperator)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(mut self, field: &str, op: QueryOperator) -> Self {
        self.conditions.push((field.to_string(), op));
        self
    }

    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.with_condition(field, QueryOperator::Equal(value.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: Direction::Desc,
        }
    }
}

/// Ascending order on the named column.
impl From<&str> for OrderBy {
    fn from(column: &str) -> Self {
        OrderBy::asc(column)
    }
}

/// Parses `"col"`, `"col asc"` or `"col desc"`, case-insensitively.
impl FromStr for OrderBy {
    type Err = BuildError;

    fn from_str(term: &str) -> Result<Self, BuildError> {
        let invalid = || BuildError::InvalidIdentifier {
            kind: "order",
            ident: term.to_string(),
        };
        let mut parts = term.split_whitespace();
        let column = parts.next().ok_or_else(invalid)?;
        let order = match parts.next() {
            None => OrderBy::asc(column),
            Some(dir) if dir.eq_ignore_ascii_case("asc") => OrderBy::asc(column),
            Some(dir) if dir.eq_ignore_ascii_case("desc") => OrderBy::desc(column),
            Some(_) => return Err(invalid()),
        };
        match parts.next() {
            Some(_) => Err(invalid()),
            None => Ok(order),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateOperation {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Value>,
    pub returning: Option<String>,
}

impl CreateOperation {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            values: Vec::new(),
            returning: None,
        }
    }

    pub fn value(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.columns.push(column.to_string());
        self.values.push(value.into());
        self
    }

    pub fn returning(mut self, column: &str) -> Self {
        self.returning = Some(column.to_string());
        self
    }

    pub fn to_sql(&self, dialect: Dialect) -> Result<SqlQuery, BuildError> {
        let mut w = Writer::new(dialect);
        let table = table_ident(&self.table)?;
        if self.columns.len() != self.values.len() {
            return Err(BuildError::ColumnCountMismatch {
                table: self.table.clone(),
                columns: self.columns.len(),
                values: self.values.len(),
            });
        }

        w.push(&format!("INSERT INTO {table}"));
        if self.columns.is_empty() {
            match dialect {
                Dialect::MySql => w.push(" () VALUES ()"),
                Dialect::Generic | Dialect::Sqlite | Dialect::Postgres => {
                    w.push(" DEFAULT VALUES")
                }
            }
        } else {
            let mut columns = Vec::with_capacity(self.columns.len());
            for col in &self.columns {
                columns.push(checked(col, "column")?);
            }
            let placeholders: Vec<_> = self.values.iter().map(|v| w.bind(v.clone())).collect();
            w.push(&format!(
                " ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            ));
        }

        if let Some(col) = &self.returning {
            let col = checked(col, "column")?;
            w.push(&format!(" RETURNING {col}"));
        }
        Ok(w.finish())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadOperation {
    pub table: String,
    pub query: Query,
    pub fields: Option<Vec<String>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub order_by: Vec<OrderBy>,
}

impl ReadOperation {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            query: Query::new(),
            fields: None,
            limit: None,
            offset: None,
            order_by: Vec::new(),
        }
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn with_condition(mut self, field: &str, op: QueryOperator) -> Self {
        self.query = self.query.with_condition(field, op);
        self
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.query = self.query.where_eq(field, value);
        self
    }

    pub fn order_by(mut self, order: impl Into<OrderBy>) -> Self {
        self.order_by.push(order.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn to_sql(&self, dialect: Dialect) -> Result<SqlQuery, BuildError> {
        let mut w = Writer::new(dialect);
        let table = table_ident(&self.table)?;
        let fields = match &self.fields {
            Some(fields) if !fields.is_empty() => {
                let mut out = Vec::with_capacity(fields.len());
                for f in fields {
                    if f == "*" {
                        out.push(f.clone());
                    } else {
                        out.push(checked(f, "column")?);
                    }
                }
                out.join(", ")
            }
            _ => "*".to_string(),
        };
        w.push(&format!("SELECT {fields} FROM {table}"));
        w.write_where(&self.query)?;
        w.write_order(&self.order_by)?;
        w.write_limit_offset(self.limit, self.offset);
        Ok(w.finish())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOperation {
    pub table: String,
    pub query: Query,
    pub updates: Vec<(String, Value)>,
}

impl UpdateOperation {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            query: Query::new(),
            updates: Vec::new(),
        }
    }

    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.updates.push((column.to_string(), value.into()));
        self
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.query = self.query.where_eq(field, value);
        self
    }

    pub fn with_condition(mut self, field: &str, op: QueryOperator) -> Self {
        self.query = self.query.with_condition(field, op);
        self
    }

    pub fn to_sql(&self, dialect: Dialect) -> Result<SqlQuery, BuildError> {
        let mut w = Writer::new(dialect);
        let table = table_ident(&self.table)?;
        if self.updates.is_empty() {
            return Err(BuildError::EmptyUpdate {
                table: self.table.clone(),
            });
        }
        let mut assignments = Vec::with_capacity(self.updates.len());
        for (col, value) in &self.updates {
            let col = checked(col, "column")?;
            let placeholder = w.bind(value.clone());
            assignments.push(format!("{col} = {placeholder}"));
        }
        w.push(&format!("UPDATE {table} SET {}", assignments.join(", ")));
        w.write_where(&self.query)?;
        Ok(w.finish())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOperation {
    pub table: String,
    pub query: Query,
}

impl DeleteOperation {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            query: Query::new(),
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.query = self.query.where_eq(field, value);
        self
    }

    pub fn with_condition(mut self, field: &str, op: QueryOperator) -> Self {
        self.query = self.query.with_condition(field, op);
        self
    }

    pub fn to_sql(&self, dialect: Dialect) -> Result<SqlQuery, BuildError> {
        let mut w = Writer::new(dialect);
        let table = table_ident(&self.table)?;
        w.push(&format!("DELETE FROM {table}"));
        w.write_where(&self.query)?;
        Ok(w.finish())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrudOperation {
    Create(CreateOperation),
    Read(ReadOperation),
    Update(UpdateOperation),
    Delete(DeleteOperation),
}

impl CrudOperation {
    pub fn table(&self) -> &str {
        match self {
            CrudOperation::Create(op) => &op.table,
            CrudOperation::Read(op) => &op.table,
            CrudOperation::Update(op) => &op.table,
            CrudOperation::Delete(op) => &op.table,
        }
    }

    pub fn to_sql(&self, dialect: Dialect) -> Result<SqlQuery, BuildError> {
        match self {
            CrudOperation::Create(op) => op.to_sql(dialect),
            CrudOperation::Read(op) => op.to_sql(dialect),
            CrudOperation::Update(op) => op.to_sql(dialect),
            CrudOperation::Delete(op) => op.to_sql(dialect),
        }
    }
}

impl From<CreateOperation> for CrudOperation {
    fn from(op: CreateOperation) -> Self {
        CrudOperation::Create(op)
    }
}

impl From<ReadOperation> for CrudOperation {
    fn from(op: ReadOperation) -> Self {
        CrudOperation::Read(op)
    }
}

impl From<UpdateOperation> for CrudOperation {
    fn from(op: UpdateOperation) -> Self {
        CrudOperation::Update(op)
    }
}

impl From<DeleteOperation> for CrudOperation {
    fn from(op: DeleteOperation) -> Self {
        CrudOperation::Delete(op)
    }
}

/// Entry point for operations rendered with one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementBuilder {
    dialect: Dialect,
}

impl StatementBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn select(&self, table: &str) -> ReadOperation {
        ReadOperation::new(table)
    }

    pub fn insert(&self, table: &str) -> CreateOperation {
        CreateOperation::new(table)
    }

    pub fn update(&self, table: &str) -> UpdateOperation {
        UpdateOperation::new(table)
    }

    pub fn delete(&self, table: &str) -> DeleteOperation {
        DeleteOperation::new(table)
    }

    pub fn build(&self, op: &CrudOperation) -> Result<SqlQuery, BuildError> {
        op.to_sql(self.dialect)
    }
}

struct Writer {
    dialect: Dialect,
    sql: String,
    params: Vec<Value>,
}

impl Writer {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    /// Record a parameter and return its placeholder.
    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        self.dialect.placeholder(self.params.len())
    }

    fn write_where(&mut self, query: &Query) -> Result<(), BuildError> {
        if query.conditions.is_empty() {
            return Ok(());
        }
        let mut clauses = Vec::with_capacity(query.conditions.len());
        for (col, op) in &query.conditions {
            let col = checked(col, "column")?;
            let clause = match op {
                QueryOperator::Equal(Value::Null) => format!("{col} IS NULL"),
                QueryOperator::NotEqual(Value::Null) => format!("{col} IS NOT NULL"),
                QueryOperator::Equal(v) => format!("{col} = {}", self.bind(v.clone())),
                QueryOperator::NotEqual(v) => format!("{col} != {}", self.bind(v.clone())),
                QueryOperator::GreaterThan(v) => format!("{col} > {}", self.bind(v.clone())),
                QueryOperator::GreaterThanOrEqual(v) => {
                    format!("{col} >= {}", self.bind(v.clone()))
                }
                QueryOperator::LessThan(v) => format!("{col} < {}", self.bind(v.clone())),
                QueryOperator::LessThanOrEqual(v) => format!("{col} <= {}", self.bind(v.clone())),
                QueryOperator::Like(pattern) => {
                    format!("{col} LIKE {}", self.bind(Value::Text(pattern.clone())))
                }
                QueryOperator::In(values) => {
                    if values.is_empty() {
                        return Err(BuildError::EmptyInList { column: col });
                    }
                    let placeholders: Vec<_> =
                        values.iter().map(|v| self.bind(v.clone())).collect();
                    format!("{col} IN ({})", placeholders.join(", "))
                }
            };
            clauses.push(clause);
        }
        self.sql.push_str(" WHERE ");
        self.sql.push_str(&clauses.join(" AND "));
        Ok(())
    }

    fn write_order(&mut self, order: &[OrderBy]) -> Result<(), BuildError> {
        if order.is_empty() {
            return Ok(());
        }
        let mut clauses = Vec::with_capacity(order.len());
        for term in order {
            let col = checked(&term.column, "column")?;
            match term.direction {
                Direction::Asc => clauses.push(format!("{col} ASC")),
                Direction::Desc => clauses.push(format!("{col} DESC")),
            }
        }
        self.sql.push_str(" ORDER BY ");
        self.sql.push_str(&clauses.join(", "));
        Ok(())
    }

    fn write_limit_offset(&mut self, limit: Option<u64>, offset: Option<u64>) {
        let offset = offset.filter(|o| *o > 0);
        match (limit, offset) {
            (Some(limit), _) => self.sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(_)) => {
                if let Some(unbounded) = self.dialect.unbounded_limit() {
                    self.sql.push(' ');
                    self.sql.push_str(unbounded);
                }
            }
            (None, None) => {}
        }
        if let Some(offset) = offset {
            self.sql.push_str(&format!(" OFFSET {offset}"));
        }
    }

    fn finish(self) -> SqlQuery {
        SqlQuery {
            statement: self.sql,
            params: self.params,
        }
    }
}

fn table_ident(table: &str) -> Result<String, BuildError> {
    if table.is_empty() {
        return Err(BuildError::EmptyTableName);
    }
    checked(table, "table")
}

fn checked(ident: &str, kind: &'static str) -> Result<String, BuildError> {
    if is_valid_identifier(ident) {
        Ok(ident.to_string())
    } else {
        Err(BuildError::InvalidIdentifier {
            kind,
            ident: ident.to_string(),
        })
    }
}

/// Dotted identifier made of `[A-Za-z_][A-Za-z0-9_]*` segments.
fn is_valid_identifier(ident: &str) -> bool {
    !ident.is_empty() && ident.split('.').all(is_valid_segment)
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
