//! Catalog and column introspection.
//!
//! Both queries run through ordinary forward-only cursors on the connection.

use cipher_sql_core::{Driver, Field, IdentifierKind, Record, SqlResult, TableType, Value};
use tracing::debug;

use crate::coerce;
use crate::connection::Connection;
use crate::escape::escape_identifier;

/// The engine's catalog, reported as the only system table.
pub const MASTER_TABLE: &str = "sqlite_master";

/// Catalog query for the table and view bits of `kinds`, if any are set.
fn tables_query(kinds: TableType) -> Option<String> {
    let condition = match (
        kinds.contains(TableType::TABLES),
        kinds.contains(TableType::VIEWS),
    ) {
        (true, true) => "type='table' OR type='view'",
        (true, false) => "type='table'",
        (false, true) => "type='view'",
        (false, false) => return None,
    };
    Some(format!(
        "SELECT name FROM sqlite_master WHERE {condition} \
         UNION ALL SELECT name FROM sqlite_temp_master WHERE {condition}"
    ))
}

/// Names of tables and/or views in the main and temporary catalogs.
pub(crate) fn list_tables(conn: &Connection, kinds: TableType) -> Vec<String> {
    let mut names = Vec::new();
    if !conn.is_open() {
        return names;
    }

    if let Some(sql) = tables_query(kinds) {
        let mut cursor = conn.create_result();
        cursor.set_forward_only(true);
        match cursor.reset(&sql) {
            Ok(()) => {
                while let Ok(true) = cursor.next() {
                    if let Some(name) = cursor.value(0) {
                        names.push(name.to_string());
                    }
                }
            }
            Err(err) => debug!(%err, "catalog query failed"),
        }
    }

    if kinds.contains(TableType::SYSTEM_TABLES) {
        names.push(MASTER_TABLE.to_string());
    }
    names
}

/// Splits a possibly schema-qualified table name into the schema prefix
/// (including its trailing `.`) and the bare table name.
///
/// A bracketed table name after the schema keeps its brackets.
///
/// # Examples
///
/// ```
/// use cipher_sql_sqlite::split_table_name;
///
/// assert_eq!(split_table_name("users"), ("", "users"));
/// assert_eq!(split_table_name("aux.users"), ("aux.", "users"));
/// assert_eq!(split_table_name("aux.[odd.name]"), ("aux.", "[odd.name]"));
/// ```
pub fn split_table_name(name: &str) -> (&str, &str) {
    let Some(dot) = name.find('.') else {
        return ("", name);
    };
    if name.find(']') != Some(name.len() - 1) {
        return (&name[..=dot], &name[dot + 1..]);
    }
    match name.rfind('[') {
        Some(open) if open > 0 => (&name[..open], &name[open..]),
        _ => ("", name),
    }
}

/// Strips the quotes of a `'...'` default literal.
fn unquote_default(literal: &str) -> &str {
    if !literal.starts_with('\'') {
        return literal;
    }
    match literal.rfind('\'') {
        Some(end) if end > 0 => &literal[1..end],
        _ => literal,
    }
}

/// Column descriptors of `table`, optionally only its primary key columns.
pub(crate) fn table_info(conn: &Connection, table: &str, only_primary_key: bool) -> Record {
    let (schema, bare) = split_table_name(table);
    let sql = format!(
        "PRAGMA {schema}table_info ({})",
        escape_identifier(bare, IdentifierKind::TableName)
    );

    let mut cursor = conn.create_result();
    cursor.set_forward_only(true);
    if let Err(err) = cursor.reset(&sql) {
        debug!(%err, table, "table_info failed");
        return Record::new();
    }

    let mut record = Record::new();
    while let Ok(true) = cursor.next() {
        let column = |i| cursor.value(i).cloned().unwrap_or(Value::NULL);
        let primary_key = column(5).to_i64().unwrap_or(0) != 0;
        if only_primary_key && !primary_key {
            continue;
        }

        let declared = column(2).to_string().to_lowercase();
        let default = column(4);
        let mut field = Field::new(column(1).to_string(), coerce::type_from_declared(&declared))
            .with_table(table)
            .with_required(column(3).to_i64().unwrap_or(0) != 0)
            // Only INTEGER PRIMARY KEY aliases the rowid; INT PRIMARY KEY does not.
            .with_auto_value(primary_key && declared == "integer");
        if !default.is_null() {
            field = field.with_default_value(unquote_default(&default.to_string()));
        }
        record.append(field);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_query_conditions() {
        let both = tables_query(TableType::TABLES | TableType::VIEWS).unwrap();
        assert!(both.contains("type='table' OR type='view'"));
        assert!(both.contains("sqlite_temp_master"));
        assert!(tables_query(TableType::VIEWS).unwrap().contains("WHERE type='view'"));
        assert!(tables_query(TableType::SYSTEM_TABLES).is_none());
    }

    #[test]
    fn test_split_bracket_without_schema() {
        assert_eq!(split_table_name("[a.b]"), ("", "[a.b]"));
    }

    #[test]
    fn test_split_bracket_not_last() {
        assert_eq!(split_table_name("[a].b"), ("[a].", "b"));
    }

    #[test]
    fn test_unquote_default() {
        assert_eq!(unquote_default("'abc'"), "abc");
        assert_eq!(unquote_default("'it''s'"), "it''s");
        assert_eq!(unquote_default("42"), "42");
        assert_eq!(unquote_default("'"), "'");
    }
}
