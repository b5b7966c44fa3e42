//! Records and the values passed to writes.

use indexmap::IndexMap;
use serde::Serialize;
use tabula_schema::{Table, Value};

use crate::operation::Row;

/// Field values for a create or update, keyed by model field name.
pub type Values = IndexMap<String, Value>;

/// Build [`Values`] from `field => value` pairs.
///
/// ```
/// let values = tabula::values! { "title" => "Roughing It", "pages" => 464 };
/// assert_eq!(values.len(), 2);
/// ```
#[macro_export]
macro_rules! values {
    () => { $crate::Values::new() };
    ($($field:expr => $value:expr),+ $(,)?) => {{
        let mut values = $crate::Values::new();
        $(values.insert(::std::string::String::from($field), $crate::Value::from($value));)+
        values
    }};
}

/// A stored record of a model, keyed by field name in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub model: String,
    pub values: IndexMap<String, Value>,
}

impl Record {
    /// Map a store row (column names) back to model fields.
    pub(crate) fn from_row(table: &Table, mut row: Row) -> Self {
        let values = table
            .columns
            .iter()
            .map(|column| {
                let value = row.shift_remove(&column.name).unwrap_or(Value::Null);
                (column.field.clone(), value)
            })
            .collect();
        Record {
            model: table.model.clone(),
            values,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn into_values(self) -> IndexMap<String, Value> {
        self.values
    }

    /// Primary key columns and their values.
    pub(crate) fn key(&self, table: &Table) -> Vec<(String, Value)> {
        table
            .primary_key_columns()
            .map(|column| {
                let value = self.values.get(&column.field).cloned().unwrap_or(Value::Null);
                (column.name.clone(), value)
            })
            .collect()
    }
}
