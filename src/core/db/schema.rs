/// Schema Introspection Module
///
/// Reshapes the driver's "describe table" result into column descriptors.
/// Results are not cached; every call queries the database.

use crate::core::db::connection::Connection;
use crate::core::db::driver::Driver;
use crate::core::db::value::Row;
use crate::core::{DbError, Result};
use serde::Serialize;
use std::collections::HashMap;

/// Marker the describe query uses for nullable columns.
const NULLABLE_MARKER: &str = "YES";

/// Metadata for one table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared type, as the driver reports it
    pub type_string: String,
    pub nullable: bool,
    /// Default value expression, unmodified
    pub default_value: Option<String>,
    /// Key role, e.g. `PRI`; empty when the column is not part of a key
    pub key_role: String,
    /// Extra attributes, e.g. `auto_increment`
    pub extra: String,
}

impl ColumnDescriptor {
    /// Creates a ColumnDescriptor from a describe-table result row.
    ///
    /// Returns `None` when the row has no `Field` column.
    fn from_describe_row(row: &Row) -> Option<Self> {
        let name = row.get("Field").and_then(|v| v.to_text())?;
        let text = |column: &str| {
            row.get(column)
                .and_then(|v| v.to_text())
                .unwrap_or_default()
        };

        Some(ColumnDescriptor {
            name,
            type_string: text("Type"),
            nullable: row.get("Null").and_then(|v| v.as_str()) == Some(NULLABLE_MARKER),
            default_value: row.get("Default").and_then(|v| v.to_text()),
            key_role: text("Key"),
            extra: text("Extra"),
        })
    }
}

impl<D: Driver> Connection<D> {
    /// Describes the columns of `table`, keyed by column name.
    ///
    /// An unknown table yields an empty map.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Query` if the describe query fails or its result
    /// lacks a `Field` column.
    pub fn columns(&mut self, table: &str) -> Result<HashMap<String, ColumnDescriptor>> {
        let (sql, params) = self.driver().describe_columns(table);
        self.select(&sql, params)?
            .iter()
            .map(|row| {
                ColumnDescriptor::from_describe_row(row)
                    .map(|column| (column.name.clone(), column))
                    .ok_or_else(|| {
                        DbError::query(&sql, rusqlite::Error::InvalidColumnName("Field".to_string()))
                    })
            })
            .collect()
    }
}
