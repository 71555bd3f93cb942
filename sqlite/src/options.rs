//! Connection options.
//!
//! [`Connection::open`](crate::Connection) accepts a flat option string of
//! `;`-separated `KEY` or `KEY=value` tokens. [`ConnectOptions`] is its typed
//! form.
//!
//! | Token | Effect |
//! |-------|--------|
//! | `BUSY_TIMEOUT=<ms>` | Busy wait before reporting a locked database (default 5000) |
//! | `OPEN_READONLY` | Open read-only instead of read-write/create |
//! | `OPEN_URI` | Interpret the path as a `file:` URI |
//! | `ENABLE_SHARED_CACHE` | Use the shared page cache |
//! | `NO_USE_EXTENDED_RESULT_CODES` | Report primary result codes only |
//! | `ENABLE_REGEXP[=<size>]` | Register `REGEXP` with a pattern cache of `size` entries (default 25) |
//!
//! Every token may also carry a `QSQLITE_` prefix (`QSQLITE_BUSY_TIMEOUT=100`),
//! so option strings written for Qt's SQLite drivers keep working.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::error::OptionsError;
use crate::ffi;

/// Busy timeout applied when none is given, in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT: i32 = 5000;

/// Pattern cache size used by `ENABLE_REGEXP` without a size.
pub const DEFAULT_REGEXP_CACHE_SIZE: usize = 25;

/// Prefix accepted in front of every option name.
const QT_PREFIX: &str = "QSQLITE_";

/// Typed connection options.
///
/// # Examples
///
/// ```
/// use cipher_sql_sqlite::ConnectOptions;
///
/// let opts: ConnectOptions = "BUSY_TIMEOUT=250; OPEN_READONLY; ENABLE_REGEXP".parse().unwrap();
/// assert_eq!(opts.busy_timeout, 250);
/// assert!(opts.read_only);
/// assert_eq!(opts.regexp_cache_size, Some(25));
/// assert_eq!(opts.to_string(), "BUSY_TIMEOUT=250;OPEN_READONLY;ENABLE_REGEXP=25");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Busy timeout in milliseconds.
    pub busy_timeout: i32,
    /// Open without write access.
    pub read_only: bool,
    /// Interpret the path as a URI.
    pub uri: bool,
    /// Use the shared page cache.
    pub shared_cache: bool,
    /// Report extended result codes.
    pub extended_result_codes: bool,
    /// Register `REGEXP` with a cache of this many compiled patterns.
    pub regexp_cache_size: Option<usize>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            read_only: false,
            uri: false,
            shared_cache: false,
            extended_result_codes: true,
            regexp_cache_size: None,
        }
    }
}

impl ConnectOptions {
    /// Parses an option string, ignoring (and logging) malformed or unknown
    /// tokens.
    pub fn parse(options: &str) -> Self {
        let mut parsed = Self::default();
        for token in tokens(options) {
            if let Err(err) = parsed.apply(token) {
                warn!(%err, "ignoring connection option");
            }
        }
        parsed
    }

    /// Parses an option string, failing on the first malformed or unknown
    /// token.
    ///
    /// # Errors
    ///
    /// Returns an [`OptionsError`] describing the offending token.
    pub fn parse_strict(options: &str) -> Result<Self, OptionsError> {
        let mut parsed = Self::default();
        for token in tokens(options) {
            parsed.apply(token)?;
        }
        Ok(parsed)
    }

    fn apply(&mut self, token: &str) -> Result<(), OptionsError> {
        let (key, value) = match token.split_once('=') {
            Some((key, value)) => (key.trim(), Some(value.trim())),
            None => (token, None),
        };
        let key = key.strip_prefix(QT_PREFIX).unwrap_or(key);

        match (key, value) {
            ("BUSY_TIMEOUT", Some(value)) => {
                self.busy_timeout = value.parse().map_err(|_| invalid(key, value))?;
            }
            ("ENABLE_REGEXP", None) => self.regexp_cache_size = Some(DEFAULT_REGEXP_CACHE_SIZE),
            ("ENABLE_REGEXP", Some(value)) => {
                let size: i64 = value.parse().map_err(|_| invalid(key, value))?;
                let size = usize::try_from(size)
                    .ok()
                    .filter(|&size| size > 0)
                    .unwrap_or(DEFAULT_REGEXP_CACHE_SIZE);
                self.regexp_cache_size = Some(size);
            }
            ("OPEN_READONLY", None) => self.read_only = true,
            ("OPEN_URI", None) => self.uri = true,
            ("ENABLE_SHARED_CACHE", None) => self.shared_cache = true,
            ("NO_USE_EXTENDED_RESULT_CODES", None) => self.extended_result_codes = false,
            (
                "OPEN_READONLY" | "OPEN_URI" | "ENABLE_SHARED_CACHE"
                | "NO_USE_EXTENDED_RESULT_CODES",
                Some(_),
            ) => return Err(OptionsError::UnexpectedValue(key.to_string())),
            ("BUSY_TIMEOUT", None) => return Err(invalid(key, "")),
            _ => return Err(OptionsError::UnknownOption(token.to_string())),
        }
        Ok(())
    }

    /// Sets the busy timeout in milliseconds.
    pub fn busy_timeout(mut self, millis: i32) -> Self {
        self.busy_timeout = millis;
        self
    }

    /// Opens read-only.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Interprets the path as a URI.
    pub fn uri(mut self, uri: bool) -> Self {
        self.uri = uri;
        self
    }

    /// Uses the shared page cache.
    pub fn shared_cache(mut self, shared_cache: bool) -> Self {
        self.shared_cache = shared_cache;
        self
    }

    /// Enables or disables extended result codes.
    pub fn extended_result_codes(mut self, enabled: bool) -> Self {
        self.extended_result_codes = enabled;
        self
    }

    /// Registers `REGEXP` with a cache of `cache_size` patterns.
    pub fn enable_regexp(mut self, cache_size: usize) -> Self {
        self.regexp_cache_size = Some(if cache_size == 0 {
            DEFAULT_REGEXP_CACHE_SIZE
        } else {
            cache_size
        });
        self
    }

    /// Engine open flags for these options. Engine-level mutexes are always
    /// disabled.
    pub fn open_flags(&self) -> i32 {
        let mut flags = if self.read_only {
            ffi::SQLITE_OPEN_READONLY
        } else {
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE
        };
        flags |= if self.shared_cache {
            ffi::SQLITE_OPEN_SHAREDCACHE
        } else {
            ffi::SQLITE_OPEN_PRIVATECACHE
        };
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        flags | ffi::SQLITE_OPEN_NOMUTEX
    }
}

fn tokens(options: &str) -> impl Iterator<Item = &str> {
    options.split(';').map(str::trim).filter(|t| !t.is_empty())
}

fn invalid(option: &str, value: &str) -> OptionsError {
    OptionsError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
    }
}

impl FromStr for ConnectOptions {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.busy_timeout != DEFAULT_BUSY_TIMEOUT {
            parts.push(format!("BUSY_TIMEOUT={}", self.busy_timeout));
        }
        if self.read_only {
            parts.push("OPEN_READONLY".to_string());
        }
        if self.uri {
            parts.push("OPEN_URI".to_string());
        }
        if self.shared_cache {
            parts.push("ENABLE_SHARED_CACHE".to_string());
        }
        if !self.extended_result_codes {
            parts.push("NO_USE_EXTENDED_RESULT_CODES".to_string());
        }
        if let Some(size) = self.regexp_cache_size {
            parts.push(format!("ENABLE_REGEXP={size}"));
        }
        f.write_str(&parts.join(";"))
    }
}
