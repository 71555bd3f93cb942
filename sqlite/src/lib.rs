//! SQLCipher driver for the `cipher-sql` abstraction.
//!
//! This crate binds [`cipher_sql_core`]'s [`Driver`](cipher_sql_core::Driver)
//! and [`SqlResult`](cipher_sql_core::SqlResult) traits to an encrypted
//! SQLite database, compiled with SQLCipher through `rusqlite`'s bundled
//! build.
//!
//! # Architecture
//!
//! - **`ffi`**: the only module with `unsafe` code; owns engine and
//!   statement handles
//! - **`coerce`**: [`Value`](cipher_sql_core::Value) ↔ engine value
//!   conversion and type inference
//! - **`statement`**: one prepared statement with its column cache and
//!   the peek-ahead row consumed during execution
//! - **`cursor`**: [`Cursor`], the per-query state machine
//! - **`connection`**: [`Connection`]: open with key check, close,
//!   transactions, notifications, introspection
//! - **`schema`**, **`escape`**, **`options`**, **`regexp`**, **`notify`**:
//!   catalog queries, identifier quoting, [`ConnectOptions`], the `REGEXP`
//!   function and change notifications
//!
//! # Quick start
//!
//! ```no_run
//! use cipher_sql_core::{Driver, SqlResult, Value};
//! use cipher_sql_sqlite::Connection;
//!
//! let mut conn = Connection::new();
//! conn.open("secrets.db", "passphrase", "BUSY_TIMEOUT=2000").unwrap();
//!
//! let mut cursor = conn.create_result();
//! cursor.prepare("INSERT INTO secrets(name, value) VALUES (:name, :value)").unwrap();
//! cursor.bound_values_mut().bind_name(":name", Value::from("api"));
//! cursor.bound_values_mut().bind_name(":value", Value::from(vec![1u8, 2, 3]));
//! cursor.exec().unwrap();
//! println!("inserted row {:?}", cursor.last_insert_id());
//! ```
//!
//! # Threading
//!
//! Connections and cursors are single-threaded (`!Send`). The engine is
//! opened without internal mutexes; the owner serializes all calls.

mod coerce;
mod connection;
mod cursor;
mod error;
mod escape;
mod ffi;
mod notify;
mod options;
mod regexp;
mod schema;
mod statement;

pub use coerce::type_from_declared;
pub use connection::Connection;
pub use cursor::Cursor;
pub use error::OptionsError;
pub use escape::escape_identifier;
pub use notify::NotificationHandler;
pub use options::{ConnectOptions, DEFAULT_BUSY_TIMEOUT, DEFAULT_REGEXP_CACHE_SIZE};
pub use schema::{MASTER_TABLE, split_table_name};
