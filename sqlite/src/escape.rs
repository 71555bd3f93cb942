//! Identifier quoting.

use cipher_sql_core::IdentifierKind;

/// Quotes `identifier` with double quotes, doubling embedded quotes.
///
/// Identifiers that contain a `[`...`]` pair, or that already start or end
/// with `"`, are returned unchanged. For table names each `.`-separated part
/// is quoted on its own.
///
/// # Examples
///
/// ```
/// use cipher_sql_core::IdentifierKind;
/// use cipher_sql_sqlite::escape_identifier;
///
/// assert_eq!(escape_identifier("name", IdentifierKind::FieldName), "\"name\"");
/// assert_eq!(escape_identifier("main.t", IdentifierKind::TableName), "\"main\".\"t\"");
/// assert_eq!(escape_identifier("[odd]", IdentifierKind::TableName), "[odd]");
/// ```
pub fn escape_identifier(identifier: &str, kind: IdentifierKind) -> String {
    if identifier.contains('[') && identifier.contains(']') {
        return identifier.to_string();
    }
    if identifier.is_empty() || identifier.starts_with('"') || identifier.ends_with('"') {
        return identifier.to_string();
    }

    let mut escaped = format!("\"{}\"", identifier.replace('"', "\"\""));
    if kind == IdentifierKind::TableName {
        escaped = escaped.replace('.', "\".\"");
    }
    escaped
}
