//! Row buffering on top of a driver's step-wise fetcher.
//!
//! Engines hand out rows one at a time. [`ResultBuffer`] turns that into
//! cursor navigation: in forward-only mode it keeps just the current row, in
//! scrollable mode it caches every row fetched so far so earlier rows can be
//! revisited without re-running the query.

use crate::value::Value;

/// Source of rows for a [`ResultBuffer`].
pub trait RowFetcher {
    /// Steps to the next row.
    ///
    /// With `Some(row)` the row's values are written into `row` (one slot per
    /// column). With `None` the caller only needs to know whether a row exists
    /// and the values need not be materialized. Returns `false` when no row
    /// was produced, either because the rows are exhausted or because the
    /// fetch failed; the fetcher records the failure itself.
    fn goto_next(&mut self, row: Option<&mut [Value]>) -> bool;
}

/// Position of a result within its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Location {
    /// Before the first row (freshly executed).
    #[default]
    BeforeFirst,
    /// On the zero-based row.
    Row(usize),
    /// Past the last row.
    AfterLast,
}

/// Buffered navigation over a [`RowFetcher`].
///
/// # Examples
///
/// ```
/// use cipher_sql_core::{Location, ResultBuffer, RowFetcher, Value};
///
/// struct Counter(i64);
///
/// impl RowFetcher for Counter {
///     fn goto_next(&mut self, row: Option<&mut [Value]>) -> bool {
///         if self.0 == 3 {
///             return false;
///         }
///         self.0 += 1;
///         if let Some(row) = row {
///             row[0] = Value::Int64(self.0);
///         }
///         true
///     }
/// }
///
/// let mut fetcher = Counter(0);
/// let mut buffer = ResultBuffer::new(false);
/// buffer.init(1);
///
/// assert!(buffer.fetch_last(&mut fetcher));
/// assert_eq!(buffer.value(0), Some(&Value::Int64(3)));
/// assert!(buffer.fetch_first(&mut fetcher));
/// assert_eq!(buffer.value(0), Some(&Value::Int64(1)));
/// assert_eq!(buffer.at(), Location::Row(0));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResultBuffer {
    columns: usize,
    forward_only: bool,
    requested_forward_only: bool,
    cache: Vec<Value>,
    rows_cached: usize,
    at: Location,
    exhausted: bool,
}

impl ResultBuffer {
    /// Creates an empty buffer.
    pub fn new(forward_only: bool) -> Self {
        Self {
            forward_only,
            requested_forward_only: forward_only,
            ..Self::default()
        }
    }

    /// Whether only the current row is kept, as last requested.
    pub fn is_forward_only(&self) -> bool {
        self.requested_forward_only
    }

    /// Switches between forward-only and scrollable mode. Takes effect on the
    /// next [`init`](Self::init); the rows of a live result keep the mode
    /// they were started with.
    pub fn set_forward_only(&mut self, forward_only: bool) {
        self.requested_forward_only = forward_only;
    }

    /// Prepares the buffer for a fresh result with `columns` columns.
    pub fn init(&mut self, columns: usize) {
        self.forward_only = self.requested_forward_only;
        self.columns = columns;
        self.cache.clear();
        if self.forward_only {
            self.cache.resize(columns, Value::NULL);
        }
        self.rows_cached = 0;
        self.at = Location::BeforeFirst;
        self.exhausted = false;
    }

    /// Drops all rows and column information.
    pub fn clear(&mut self) {
        self.init(0);
    }

    /// Number of columns per row.
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Current position.
    pub fn at(&self) -> Location {
        self.at
    }

    /// Forces the position, e.g. after the fetcher ran out of rows.
    pub fn set_at(&mut self, at: Location) {
        self.at = at;
    }

    /// Moves to the next row.
    pub fn fetch_next<F: RowFetcher + ?Sized>(&mut self, fetcher: &mut F) -> bool {
        match self.at {
            Location::BeforeFirst => self.fetch(fetcher, 0),
            Location::Row(n) => self.fetch(fetcher, n + 1),
            Location::AfterLast => false,
        }
    }

    /// Moves to the previous row. Always fails in forward-only mode.
    pub fn fetch_previous<F: RowFetcher + ?Sized>(&mut self, fetcher: &mut F) -> bool {
        if self.forward_only {
            return false;
        }
        match self.at {
            Location::Row(0) => {
                self.at = Location::BeforeFirst;
                false
            }
            Location::Row(n) => self.fetch(fetcher, n - 1),
            Location::AfterLast if self.rows_cached > 0 => self.fetch(fetcher, self.rows_cached - 1),
            _ => false,
        }
    }

    /// Moves to the first row.
    pub fn fetch_first<F: RowFetcher + ?Sized>(&mut self, fetcher: &mut F) -> bool {
        self.fetch(fetcher, 0)
    }

    /// Moves to the last row, consuming every remaining row.
    pub fn fetch_last<F: RowFetcher + ?Sized>(&mut self, fetcher: &mut F) -> bool {
        if self.forward_only {
            let mut last = match self.at {
                Location::Row(n) => Some(n),
                Location::BeforeFirst => None,
                Location::AfterLast => return false,
            };
            loop {
                let snapshot = self.cache.clone();
                if self.fetch_next(fetcher) {
                    last = match self.at {
                        Location::Row(n) => Some(n),
                        _ => last,
                    };
                    continue;
                }
                return match last {
                    Some(n) => {
                        self.cache = snapshot;
                        self.at = Location::Row(n);
                        true
                    }
                    None => false,
                };
            }
        }

        while self.fetch_next(fetcher) {}
        match self.rows_cached {
            0 => false,
            n => {
                self.at = Location::Row(n - 1);
                true
            }
        }
    }

    /// Moves to the zero-based row `index`.
    ///
    /// In forward-only mode rows between the current position and `index`
    /// are skipped without being materialized, and moving backwards fails.
    pub fn fetch<F: RowFetcher + ?Sized>(&mut self, fetcher: &mut F, index: usize) -> bool {
        if self.forward_only {
            return self.fetch_forward(fetcher, index);
        }

        if index < self.rows_cached {
            self.at = Location::Row(index);
            return true;
        }
        if self.exhausted {
            self.at = Location::AfterLast;
            return false;
        }
        while self.rows_cached <= index {
            let start = self.rows_cached * self.columns;
            self.cache.resize(start + self.columns, Value::NULL);
            if !fetcher.goto_next(Some(&mut self.cache[start..])) {
                self.cache.truncate(start);
                self.exhausted = true;
                self.at = Location::AfterLast;
                return false;
            }
            self.rows_cached += 1;
        }
        self.at = Location::Row(index);
        true
    }

    fn fetch_forward<F: RowFetcher + ?Sized>(&mut self, fetcher: &mut F, index: usize) -> bool {
        let mut next = match self.at {
            Location::Row(n) if n == index => return true,
            Location::Row(n) if n > index => return false,
            Location::Row(n) => n + 1,
            Location::BeforeFirst => 0,
            Location::AfterLast => return false,
        };
        if self.exhausted {
            self.at = Location::AfterLast;
            return false;
        }
        while next < index {
            if !fetcher.goto_next(None) {
                self.exhausted = true;
                self.at = Location::AfterLast;
                return false;
            }
            next += 1;
        }
        if !fetcher.goto_next(Some(self.cache.as_mut_slice())) {
            self.exhausted = true;
            self.at = Location::AfterLast;
            return false;
        }
        self.at = Location::Row(index);
        true
    }

    /// Value of column `index` in the current row.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.row()?.get(index)
    }

    /// All values of the current row.
    pub fn row(&self) -> Option<&[Value]> {
        let Location::Row(n) = self.at else {
            return None;
        };
        let start = if self.forward_only { 0 } else { n * self.columns };
        self.cache.get(start..start + self.columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Yields `rows` rows of one column; counts materialized vs skipped steps.
    struct Steps {
        produced: i64,
        rows: i64,
        skipped: usize,
    }

    impl Steps {
        fn new(rows: i64) -> Self {
            Self {
                produced: 0,
                rows,
                skipped: 0,
            }
        }
    }

    impl RowFetcher for Steps {
        fn goto_next(&mut self, row: Option<&mut [Value]>) -> bool {
            if self.produced == self.rows {
                return false;
            }
            self.produced += 1;
            match row {
                Some(row) => row[0] = Value::Int64(self.produced),
                None => self.skipped += 1,
            }
            true
        }
    }

    #[test]
    fn test_forward_only_iterates_in_order() {
        let mut fetcher = Steps::new(3);
        let mut buffer = ResultBuffer::new(true);
        buffer.init(1);

        let mut seen = Vec::new();
        while buffer.fetch_next(&mut fetcher) {
            seen.push(buffer.value(0).cloned().unwrap());
        }
        assert_eq!(seen, vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)]);
        assert_eq!(buffer.at(), Location::AfterLast);
        assert!(!buffer.fetch_next(&mut fetcher));
    }

    #[test]
    fn test_forward_only_skip_does_not_materialize() {
        let mut fetcher = Steps::new(5);
        let mut buffer = ResultBuffer::new(true);
        buffer.init(1);

        assert!(buffer.fetch(&mut fetcher, 3));
        assert_eq!(fetcher.skipped, 3);
        assert_eq!(buffer.value(0), Some(&Value::Int64(4)));
        assert!(!buffer.fetch(&mut fetcher, 1));
        assert!(!buffer.fetch_previous(&mut fetcher));
    }

    #[test]
    fn test_forward_only_fetch_last_keeps_last_row() {
        let mut fetcher = Steps::new(4);
        let mut buffer = ResultBuffer::new(true);
        buffer.init(1);

        assert!(buffer.fetch_last(&mut fetcher));
        assert_eq!(buffer.at(), Location::Row(3));
        assert_eq!(buffer.value(0), Some(&Value::Int64(4)));
    }

    #[test]
    fn test_scrollable_revisits_cached_rows() {
        let mut fetcher = Steps::new(3);
        let mut buffer = ResultBuffer::new(false);
        buffer.init(1);

        assert!(buffer.fetch(&mut fetcher, 2));
        assert!(buffer.fetch_previous(&mut fetcher));
        assert_eq!(buffer.value(0), Some(&Value::Int64(2)));
        assert!(buffer.fetch_first(&mut fetcher));
        assert_eq!(buffer.value(0), Some(&Value::Int64(1)));
        assert_eq!(fetcher.produced, 3);
    }

    #[test]
    fn test_empty_result() {
        let mut fetcher = Steps::new(0);
        let mut buffer = ResultBuffer::new(false);
        buffer.init(1);

        assert!(!buffer.fetch_next(&mut fetcher));
        assert!(!buffer.fetch_last(&mut fetcher));
        assert_eq!(buffer.value(0), None);
    }

    #[test]
    fn test_mode_switch_waits_for_next_init() {
        let mut fetcher = Steps::new(3);
        let mut buffer = ResultBuffer::new(false);
        buffer.init(1);

        buffer.set_forward_only(true);
        assert!(buffer.is_forward_only());
        assert!(buffer.fetch_next(&mut fetcher));
        assert_eq!(buffer.value(0), Some(&Value::Int64(1)));
        assert!(buffer.fetch_next(&mut fetcher));
        assert!(buffer.fetch_previous(&mut fetcher));
        assert_eq!(buffer.value(0), Some(&Value::Int64(1)));

        buffer.init(1);
        assert!(buffer.fetch_next(&mut fetcher));
        assert_eq!(buffer.value(0), Some(&Value::Int64(3)));
        assert!(!buffer.fetch_previous(&mut fetcher));
    }
}
