//! Declared column mapping for record types.
//!
//! A [`Record`] lists its fields with the column each one maps to and
//! decodes itself from a [`Row`]. Embedded sub-records contribute their own
//! columns in place, so the flattened [`FieldMap`] of a record is a flat,
//! ordered list of column names.

use crate::error::MappingError;
use crate::value::{Column, Value, ValueKind};

/// One declared field of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// A plain or optional scalar stored in one column.
    Column {
        name: &'static str,
        kind: ValueKind,
        nullable: bool,
        value: Value,
    },
    /// A sub-record whose fields are flattened into the parent's columns.
    Embedded {
        name: &'static str,
        fields: Vec<Field>,
    },
}

impl Field {
    pub fn column<C: Column>(name: &'static str, value: &C) -> Self {
        Field::Column {
            name,
            kind: C::KIND,
            nullable: C::NULLABLE,
            value: value.to_value(),
        }
    }

    pub fn embedded<R: Record>(name: &'static str, record: &R) -> Self {
        Field::Embedded {
            name,
            fields: record.fields(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Field::Column { name, .. } | Field::Embedded { name, .. } => name,
        }
    }
}

/// A struct-like value mapped onto the columns of one table.
///
/// # Example
///
/// ```
/// use table_gateway::{Field, MappingError, Record, Row};
///
/// struct Place {
///     id: Option<i64>,
///     country: String,
///     city: Option<String>,
///     telcode: i64,
/// }
///
/// impl Record for Place {
///     fn fields(&self) -> Vec<Field> {
///         vec![
///             Field::column("id", &self.id),
///             Field::column("country", &self.country),
///             Field::column("city", &self.city),
///             Field::column("telcode", &self.telcode),
///         ]
///     }
///
///     fn from_row(row: &Row) -> Result<Self, MappingError> {
///         Ok(Place {
///             id: row.get("id")?,
///             country: row.get("country")?,
///             city: row.get("city")?,
///             telcode: row.get("telcode")?,
///         })
///     }
/// }
/// ```
pub trait Record: Sized {
    /// Fields in declaration order, each tagged with its column.
    fn fields(&self) -> Vec<Field>;

    fn from_row(row: &Row) -> Result<Self, MappingError>;
}

/// One flattened column of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntry {
    pub column: &'static str,
    pub kind: ValueKind,
    pub nullable: bool,
    pub value: Value,
}

impl FieldEntry {
    /// An optional integer column holding no value: the auto-increment key case.
    pub fn is_unset_optional_integer(&self) -> bool {
        self.nullable && self.kind == ValueKind::Integer && self.value.is_null()
    }
}

/// Flattened view of a record: every column it maps, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    entries: Vec<FieldEntry>,
    groups: Vec<&'static str>,
}

impl FieldMap {
    pub fn of<R: Record>(record: &R) -> Result<Self, MappingError> {
        let mut map = FieldMap::default();
        map.flatten(record.fields())?;
        Ok(map)
    }

    fn flatten(&mut self, fields: Vec<Field>) -> Result<(), MappingError> {
        for field in fields {
            match field {
                Field::Column {
                    name,
                    kind,
                    nullable,
                    value,
                } => {
                    if self.get(name).is_some() {
                        return Err(MappingError::DuplicateColumn {
                            column: name.to_string(),
                        });
                    }
                    self.entries.push(FieldEntry {
                        column: name,
                        kind,
                        nullable,
                        value,
                    });
                }
                Field::Embedded { name, fields } => {
                    self.groups.push(name);
                    self.flatten(fields)?;
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, column: &str) -> Option<&FieldEntry> {
        self.entries.iter().find(|e| e.column == column)
    }

    /// Whether `name` is an embedded sub-record rather than a column.
    pub fn is_embedded(&self, name: &str) -> bool {
        self.groups.iter().any(|g| *g == name)
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.column)
    }

    pub fn entries(&self) -> &[FieldEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One result row: column names with their values, in result order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value of `column`. Falls back to a case-insensitive match for
    /// drivers that fold identifier case.
    pub fn value(&self, column: &str) -> Option<&Value> {
        let idx = self
            .columns
            .iter()
            .position(|c| c == column)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(column)))?;
        self.values.get(idx)
    }

    /// Decode `column` into a field type.
    pub fn get<C: Column>(&self, column: &str) -> Result<C, MappingError> {
        let value = self.value(column).ok_or_else(|| MappingError::MissingColumn {
            column: column.to_string(),
        })?;
        C::from_value(column, value.clone())
    }

    /// Decode an embedded sub-record from the same row.
    pub fn embedded<R: Record>(&self) -> Result<R, MappingError> {
        R::from_row(self)
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let (columns, values) = iter.into_iter().unzip();
        Self { columns, values }
    }
}
