//! Bound parameter set and placeholder scanning.
//!
//! [`BoundValues`] holds the values a caller binds to a prepared query.
//! Values can be addressed positionally or by placeholder name. A name that
//! appears several times in the query owns several positions, all written by
//! a single [`bind_name`](BoundValues::bind_name) call; drivers whose engine
//! collapses repeated names into one slot use [`BoundValues::indexes`] to
//! de-duplicate before binding. Numbered placeholders (`?NNN`) are recorded
//! under their literal name for the same reason.

use std::collections::HashMap;

use crate::value::Value;

/// One placeholder occurrence in a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// A bare `?`.
    Positional,
    /// `?NNN`; the stored name keeps the `?`.
    Numbered(String),
    /// `:name`, `@name` or `$name`; the stored name keeps its prefix.
    Named(String),
}

/// Scans `sql` for placeholders, in order of appearance.
///
/// String literals, quoted and bracketed identifiers and comments are
/// skipped.
///
/// # Examples
///
/// ```
/// use cipher_sql_core::{scan_placeholders, Placeholder};
///
/// let found = scan_placeholders("SELECT ':x', :a, ? -- :b\n FROM t WHERE c = @c");
/// assert_eq!(
///     found,
///     vec![
///         Placeholder::Named(":a".into()),
///         Placeholder::Positional,
///         Placeholder::Named("@c".into()),
///     ]
/// );
/// ```
pub fn scan_placeholders(sql: &str) -> Vec<Placeholder> {
    let chars: Vec<char> = sql.chars().collect();
    let mut found = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            quote @ ('\'' | '"' | '`') => {
                i += 1;
                while i < chars.len() {
                    if chars[i] == quote {
                        // A doubled quote is an escaped quote inside the literal.
                        if chars.get(i + 1) == Some(&quote) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            '[' => {
                while i < chars.len() && chars[i] != ']' {
                    i += 1;
                }
                i += 1;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
            }
            '?' => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if i > start + 1 {
                    found.push(Placeholder::Numbered(chars[start..i].iter().collect()));
                } else {
                    found.push(Placeholder::Positional);
                }
            }
            prefix @ (':' | '@' | '$') => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                if i > start + 1 {
                    let name: String = chars[start..i].iter().collect();
                    found.push(Placeholder::Named(name));
                } else if prefix == ':' && chars.get(i) == Some(&':') {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }

    found
}

/// Values bound to a prepared query.
///
/// # Examples
///
/// ```
/// use cipher_sql_core::{BoundValues, Value};
///
/// let mut params = BoundValues::for_query("SELECT :a + :a + :b");
/// params.bind_name(":a", Value::Int64(2));
/// params.bind_name("b", Value::Int64(3));
///
/// assert_eq!(params.len(), 3);
/// assert_eq!(params.indexes()[":a"], vec![0, 1]);
/// assert_eq!(params.values()[2], Value::Int64(3));
/// ```
#[derive(Debug, Clone, Default)]
pub struct BoundValues {
    values: Vec<Value>,
    indexes: HashMap<String, Vec<usize>>,
    next: usize,
}

impl BoundValues {
    /// Creates an empty set with no named placeholders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set shaped after the placeholders of `sql`.
    ///
    /// Every placeholder gets a NULL slot; named and numbered placeholders
    /// are recorded in the name-to-positions map.
    pub fn for_query(sql: &str) -> Self {
        let mut bound = Self::new();
        for (pos, placeholder) in scan_placeholders(sql).into_iter().enumerate() {
            bound.values.push(Value::NULL);
            if let Placeholder::Named(name) | Placeholder::Numbered(name) = placeholder {
                bound.indexes.entry(name).or_default().push(pos);
            }
        }
        bound
    }

    /// Binds `value` at every position of the placeholder `name`.
    ///
    /// The prefix may be omitted, in which case `:`, `@` and `$` are tried in
    /// that order. Returns `false` if the query has no such placeholder.
    pub fn bind_name(&mut self, name: &str, value: Value) -> bool {
        let Some(key) = self.resolve_name(name) else {
            return false;
        };
        let positions = self.indexes[&key].clone();
        for pos in positions {
            self.values[pos] = value.clone();
        }
        true
    }

    /// Binds `value` at `pos`, growing the list with NULLs if needed.
    pub fn bind_at(&mut self, pos: usize, value: Value) {
        if pos >= self.values.len() {
            self.values.resize(pos + 1, Value::NULL);
        }
        self.values[pos] = value;
    }

    /// Binds `value` at the next position in sequence.
    ///
    /// The first call writes position 0 and each call moves on by one,
    /// filling the slots of the placeholder layout before growing it.
    pub fn push(&mut self, value: Value) {
        self.bind_at(self.next, value);
        self.next += 1;
    }

    /// Resets every value to NULL, keeping the placeholder layout.
    pub fn clear_values(&mut self) {
        for v in &mut self.values {
            *v = Value::NULL;
        }
        self.next = 0;
    }

    /// Removes all values and placeholder names.
    pub fn clear(&mut self) {
        self.values.clear();
        self.indexes.clear();
        self.next = 0;
    }

    /// The bound values in position order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value bound to the placeholder `name`.
    pub fn value_of(&self, name: &str) -> Option<&Value> {
        let key = self.resolve_name(name)?;
        self.indexes[&key].first().and_then(|&pos| self.values.get(pos))
    }

    /// Name (with prefix) to positions map.
    pub fn indexes(&self) -> &HashMap<String, Vec<usize>> {
        &self.indexes
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn resolve_name(&self, name: &str) -> Option<String> {
        if self.indexes.contains_key(name) {
            return Some(name.to_string());
        }
        [':', '@', '$']
            .iter()
            .map(|prefix| format!("{prefix}{name}"))
            .find(|candidate| self.indexes.contains_key(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_skips_literals_and_comments() {
        let sql = "SELECT '?', \"a:b\", [x?], `y:z` /* :c ? */ FROM t WHERE a = ?1";
        assert_eq!(scan_placeholders(sql), vec![Placeholder::Numbered("?1".into())]);
    }

    #[test]
    fn test_scan_handles_escaped_quotes() {
        let sql = "SELECT 'it''s :x', :real";
        assert_eq!(
            scan_placeholders(sql),
            vec![Placeholder::Named(":real".into())]
        );
    }

    #[test]
    fn test_scan_ignores_lone_prefix() {
        assert!(scan_placeholders("SELECT 1 : 2, $ ").is_empty());
    }

    #[test]
    fn test_for_query_records_repeated_names() {
        let params = BoundValues::for_query("SELECT :a, ?, :a, :b");
        assert_eq!(params.len(), 4);
        assert_eq!(params.indexes()[":a"], vec![0, 2]);
        assert_eq!(params.indexes()[":b"], vec![3]);
    }

    #[test]
    fn test_bind_name_unknown_returns_false() {
        let mut params = BoundValues::for_query("SELECT :a");
        assert!(!params.bind_name(":nope", Value::Int32(1)));
        assert!(params.bind_name("a", Value::Int32(1)));
        assert_eq!(params.value_of(":a"), Some(&Value::Int32(1)));
    }

    #[test]
    fn test_bind_at_grows() {
        let mut params = BoundValues::new();
        params.bind_at(2, Value::Bool(true));
        assert_eq!(params.values(), &[Value::NULL, Value::NULL, Value::Bool(true)]);
        params.clear_values();
        assert!(params.values().iter().all(Value::is_null));
    }

    #[test]
    fn test_push_fills_layout_slots_in_order() {
        let mut params = BoundValues::for_query("SELECT ?, ?");
        params.push(Value::Int32(1));
        assert_eq!(params.values(), &[Value::Int32(1), Value::NULL]);
        params.push(Value::Int32(2));
        params.push(Value::Int32(3));
        assert_eq!(params.values(), &[Value::Int32(1), Value::Int32(2), Value::Int32(3)]);

        params.clear_values();
        params.push(Value::Int32(9));
        assert_eq!(params.values()[0], Value::Int32(9));
    }

    #[test]
    fn test_numbered_placeholders_share_a_name() {
        let mut params = BoundValues::for_query("SELECT ?2, ?, ?2");
        assert_eq!(params.len(), 3);
        assert_eq!(params.indexes()["?2"], vec![0, 2]);
        assert!(params.bind_name("?2", Value::from("x")));
        assert_eq!(params.values(), &[Value::from("x"), Value::NULL, Value::from("x")]);
    }
}
