//! Field, record and index descriptors.
//!
//! A [`Record`] describes the shape of a result row or a table: an ordered
//! list of [`Field`]s. An [`Index`] is a named record, used for primary keys.

use serde::Serialize;

use crate::value::ValueType;

/// Description of one column.
///
/// # Examples
///
/// ```
/// use cipher_sql_core::{Field, ValueType};
///
/// let id = Field::new("id", ValueType::Int32)
///     .with_table("users")
///     .with_auto_value(true)
///     .with_required(true);
/// assert!(id.auto_value);
/// assert_eq!(id.table.as_deref(), Some("users"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Inferred value type.
    pub value_type: ValueType,
    /// Source table, when known.
    pub table: Option<String>,
    /// Engine-specific per-row type tag the type was inferred from; `None`
    /// when no row was available to inspect.
    pub sql_type: Option<i32>,
    /// Whether the engine generates the value (e.g. an integer rowid alias).
    pub auto_value: bool,
    /// NOT NULL constraint; `None` when unknown.
    pub required: Option<bool>,
    /// Declared default value literal, unquoted.
    pub default_value: Option<String>,
}

impl Field {
    /// Creates a field with only a name and type.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            table: None,
            sql_type: None,
            auto_value: false,
            required: None,
            default_value: None,
        }
    }

    /// Sets the source table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Sets the engine type tag.
    pub fn with_sql_type(mut self, sql_type: Option<i32>) -> Self {
        self.sql_type = sql_type;
        self
    }

    /// Marks the field as engine-generated.
    pub fn with_auto_value(mut self, auto_value: bool) -> Self {
        self.auto_value = auto_value;
        self
    }

    /// Sets the NOT NULL state.
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    /// Sets the default value literal.
    pub fn with_default_value(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }
}

/// An ordered list of fields.
///
/// Name lookups are case-insensitive, matching how SQL treats unquoted
/// identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Record {
    fields: Vec<Field>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field.
    pub fn append(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// Removes all fields.
    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field at `index`.
    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Position of the field called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Field called `name`.
    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.index_of(name).and_then(|i| self.fields.get(i))
    }

    /// Field names in order.
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Iterates over the fields.
    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.fields.iter()
    }
}

impl FromIterator<Field> for Record {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// A named record, such as a table's primary key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Index {
    /// Index name; empty when the engine does not expose one.
    pub name: String,
    /// Indexed fields in key order.
    pub record: Record,
}

impl Index {
    /// Creates an index from a name and its fields.
    pub fn new(name: impl Into<String>, record: Record) -> Self {
        Self {
            name: name.into(),
            record,
        }
    }

    /// Returns `true` if the index has no fields.
    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let record: Record = [
            Field::new("Id", ValueType::Int32),
            Field::new("name", ValueType::Text),
        ]
        .into_iter()
        .collect();
        assert_eq!(record.index_of("ID"), Some(0));
        assert_eq!(record.field_by_name("NAME").unwrap().value_type, ValueType::Text);
        assert_eq!(record.index_of("missing"), None);
        assert_eq!(record.names(), vec!["Id", "name"]);
    }

    #[test]
    fn test_clear_empties_record() {
        let mut record = Record::new();
        record.append(Field::new("a", ValueType::Text));
        assert_eq!(record.len(), 1);
        record.clear();
        assert!(record.is_empty());
    }
}
