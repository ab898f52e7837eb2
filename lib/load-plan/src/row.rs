use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{metadata::SqlType, value::Value};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DataAccessError {
    #[error("Column '{0}' is not part of the result row")]
    ColumnNotFound(String),
    #[error("Column '{column}' holds a {found:?} value, expected {expected:?}")]
    TypeMismatch {
        column: String,
        expected: SqlType,
        found: SqlType,
    },
}

/// Columnar access to the current row of a query result.
///
/// Columns are addressed by the alias-qualified expression produced by the fragment
/// resolvers, e.g. `p1.street`.
pub trait ResultRow {
    fn value(&self, column: &str) -> Result<&Value, DataAccessError>;

    fn typed_value(&self, column: &str, expected: SqlType) -> Result<Value, DataAccessError> {
        let value = self.value(column)?;

        match value.sql_type() {
            Some(found) if found != expected => Err(DataAccessError::TypeMismatch {
                column: column.to_string(),
                expected,
                found,
            }),
            _ => Ok(value.clone()),
        }
    }
}

impl<R: ResultRow + ?Sized> ResultRow for &R {
    fn value(&self, column: &str) -> Result<&Value, DataAccessError> {
        (**self).value(column)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapResultRow {
    columns: IndexMap<String, Value>,
}

impl MapResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<Value>) {
        self.columns.insert(column.to_string(), value.into());
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for MapResultRow {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        MapResultRow {
            columns: iter
                .into_iter()
                .map(|(column, value)| (column.into(), value.into()))
                .collect(),
        }
    }
}

impl ResultRow for MapResultRow {
    fn value(&self, column: &str) -> Result<&Value, DataAccessError> {
        self.columns
            .get(column)
            .ok_or_else(|| DataAccessError::ColumnNotFound(column.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_value_checks_the_column_type() {
        let row = MapResultRow::new()
            .with("p1.id", 7)
            .with("p1.name", "Ada")
            .with("p1.nickname", Value::Null);

        assert_eq!(row.typed_value("p1.id", SqlType::Int), Ok(Value::Int(7)));
        assert_eq!(row.typed_value("p1.nickname", SqlType::Text), Ok(Value::Null));
        assert_eq!(
            row.typed_value("p1.name", SqlType::Int),
            Err(DataAccessError::TypeMismatch {
                column: "p1.name".to_string(),
                expected: SqlType::Int,
                found: SqlType::Text,
            })
        );
        assert_eq!(
            row.typed_value("p1.age", SqlType::Int),
            Err(DataAccessError::ColumnNotFound("p1.age".to_string()))
        );
    }

    #[test]
    fn rows_deserialize_from_json_objects() {
        let json = r#"{ "p1.id": 1, "p1.name": "Ada", "p1.active": true, "p1.note": null }"#;
        let row: MapResultRow = serde_json::from_str(json).expect("row should deserialize");

        assert_eq!(row.value("p1.id"), Ok(&Value::Int(1)));
        assert_eq!(row.value("p1.active"), Ok(&Value::Bool(true)));
        assert_eq!(row.value("p1.note"), Ok(&Value::Null));
    }
}
