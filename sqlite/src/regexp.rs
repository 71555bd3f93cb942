//! Compiled-pattern cache backing the `REGEXP` SQL function.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use tracing::warn;

use crate::options::DEFAULT_REGEXP_CACHE_SIZE;

/// Bounded cache of compiled patterns, keyed by pattern text.
///
/// A pattern is compiled once and reused until evicted. Owned by the engine
/// once registered.
pub(crate) struct RegexCache {
    patterns: Mutex<LruCache<String, Regex>>,
}

impl RegexCache {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_REGEXP_CACHE_SIZE))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            patterns: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Whether `pattern` matches anywhere in `subject`. Invalid patterns
    /// never match.
    pub(crate) fn is_match(&self, pattern: &str, subject: &str) -> bool {
        let mut patterns = self.patterns.lock();
        if let Some(regex) = patterns.get(pattern) {
            return regex.is_match(subject);
        }
        match Regex::new(pattern) {
            Ok(regex) => {
                let found = regex.is_match(subject);
                patterns.put(pattern.to_string(), regex);
                found
            }
            Err(err) => {
                warn!(pattern, %err, "invalid REGEXP pattern");
                false
            }
        }
    }

    #[cfg(test)]
    fn cached(&self) -> usize {
        self.patterns.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unanchored_match() {
        let cache = RegexCache::new(4);
        assert!(cache.is_match("b+", "abbbc"));
        assert!(!cache.is_match("^b", "abbbc"));
    }

    #[test]
    fn test_pattern_compiled_once() {
        let cache = RegexCache::new(4);
        for _ in 0..10 {
            assert!(cache.is_match("[0-9]{3}", "call 555"));
        }
        assert_eq!(cache.cached(), 1);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = RegexCache::new(2);
        cache.is_match("a", "a");
        cache.is_match("b", "b");
        cache.is_match("c", "c");
        assert_eq!(cache.cached(), 2);
    }

    #[test]
    fn test_invalid_pattern_never_matches() {
        let cache = RegexCache::new(0);
        assert!(!cache.is_match("(", "("));
        assert_eq!(cache.cached(), 0);
    }
}
