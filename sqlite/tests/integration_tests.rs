use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{NaiveDate, NaiveTime};
use cipher_sql_core::{
    ChangeOperation, Driver, ErrorKind, PrecisionPolicy, SqlResult, TableType, Value, ValueType,
};
use cipher_sql_sqlite::{ConnectOptions, Connection};
use tempfile::TempDir;

const PASSWORD: &str = "correct horse battery staple";

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("vault.db")
}

fn open(path: &Path) -> Connection {
    let mut conn = Connection::new();
    conn.open(path.to_str().unwrap(), PASSWORD, "")
        .expect("failed to open encrypted database");
    conn
}

/// Opens the same file through rusqlite's safe API for cross-checking.
fn direct(path: &Path) -> rusqlite::Connection {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.pragma_update(None, "key", PASSWORD).unwrap();
    conn
}

fn run(conn: &Connection, sql: &str) {
    let mut cursor = conn.create_result();
    cursor
        .reset(sql)
        .unwrap_or_else(|err| panic!("{sql}: {err}"));
}

fn collect(cursor: &mut cipher_sql_sqlite::Cursor) -> Vec<Vec<Value>> {
    let mut rows = Vec::new();
    while cursor.next().unwrap() {
        rows.push(cursor.row().unwrap().to_vec());
    }
    rows
}

// ---------------------------------------------------------------------------
// Binding and reading back
// ---------------------------------------------------------------------------

#[test]
fn bound_values_round_trip_through_encrypted_file() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    let conn = open(&path);
    run(
        &conn,
        "CREATE TABLE samples (i INTEGER, big INTEGER, d REAL, t TEXT, b BLOB, n TEXT, flag INTEGER, at TEXT, day TEXT, clock TEXT, u INTEGER)",
    );

    let when = NaiveDate::from_ymd_opt(2024, 5, 6)
        .unwrap()
        .and_hms_milli_opt(7, 8, 9, 123)
        .unwrap();
    let mut cursor = conn.create_result();
    cursor
        .prepare("INSERT INTO samples VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)")
        .unwrap();
    let values = [
        Value::Int32(-7),
        Value::Int64(1 << 40),
        Value::Double(2.5),
        Value::from("héllo"),
        Value::Bytes(vec![0, 1, 254, 255]),
        Value::Null(ValueType::Text),
        Value::Bool(true),
        Value::DateTime(when),
        Value::Date(NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()),
        Value::Time(NaiveTime::from_hms_milli_opt(7, 8, 9, 5).unwrap()),
        Value::UInt32(4_000_000_000),
    ];
    for (pos, value) in values.into_iter().enumerate() {
        cursor.bound_values_mut().bind_at(pos, value);
    }
    cursor.exec().unwrap();
    assert_eq!(cursor.rows_affected(), 1);

    let mut select = conn.create_result();
    select.reset("SELECT * FROM samples").unwrap();
    let rows = collect(&mut select);
    assert_eq!(
        rows,
        vec![vec![
            Value::Int64(-7),
            Value::Int64(1 << 40),
            Value::Double(2.5),
            Value::from("héllo"),
            Value::Bytes(vec![0, 1, 254, 255]),
            Value::Null(ValueType::Text),
            Value::Int64(1),
            Value::from("2024-05-06T07:08:09.123"),
            Value::from("2024-05-06"),
            Value::from("07:08:09.005"),
            Value::Int64(4_000_000_000),
        ]]
    );
    drop(select);
    drop(cursor);
    drop(conn);

    let raw = direct(&path);
    let (t, b, n): (String, Vec<u8>, Option<String>) = raw
        .query_row("SELECT t, b, n FROM samples", [], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .unwrap();
    assert_eq!(t, "héllo");
    assert_eq!(b, vec![0, 1, 254, 255]);
    assert_eq!(n, None);
}

#[test]
fn repeated_named_placeholder_binds_once() {
    let dir = TempDir::new().unwrap();
    let conn = open(&db_path(&dir));

    let mut cursor = conn.create_result();
    cursor.prepare("SELECT :a, :b, :a").unwrap();
    assert!(cursor.bound_values_mut().bind_name(":a", Value::Int64(1)));
    assert!(cursor.bound_values_mut().bind_name(":b", Value::from("two")));
    cursor.exec().unwrap();

    assert_eq!(
        collect(&mut cursor),
        vec![vec![Value::Int64(1), Value::from("two"), Value::Int64(1)]]
    );
}

#[test]
fn too_few_values_is_a_count_mismatch() {
    let dir = TempDir::new().unwrap();
    let conn = open(&db_path(&dir));

    let mut cursor = conn.create_result();
    cursor.prepare("SELECT ?, ?").unwrap();
    cursor.bound_values_mut().clear();
    cursor.bound_values_mut().push(Value::Int32(1));
    let err = cursor.exec().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Statement);
    assert!(err.to_string().contains("Parameter count mismatch"));
    assert!(!cursor.is_active());

    // The statement survives the mismatch and can run once fixed.
    cursor.bound_values_mut().push(Value::Int32(2));
    cursor.exec().unwrap();
    assert_eq!(
        collect(&mut cursor),
        vec![vec![Value::Int64(1), Value::Int64(2)]]
    );
}

// ---------------------------------------------------------------------------
// Statements and cursors
// ---------------------------------------------------------------------------

#[test]
fn empty_result_reports_declared_types() {
    let dir = TempDir::new().unwrap();
    let conn = open(&db_path(&dir));
    run(&conn, "CREATE TABLE typed (a INTEGER, b TEXT, c REAL, d BLOB, e BOOLEAN)");

    let mut cursor = conn.create_result();
    cursor.reset("SELECT a, b, c, d, e FROM typed WHERE 0").unwrap();
    assert!(cursor.is_select());

    let record = cursor.record();
    let types: Vec<ValueType> = record.iter().map(|f| f.value_type).collect();
    assert_eq!(
        types,
        vec![
            ValueType::Int32,
            ValueType::Text,
            ValueType::Double,
            ValueType::Bytes,
            ValueType::Bool
        ]
    );
    assert!(record.iter().all(|f| f.sql_type.is_none()));
    assert!(!cursor.next().unwrap());
}

#[test]
fn only_one_statement_per_prepare() {
    let dir = TempDir::new().unwrap();
    let conn = open(&db_path(&dir));

    let mut cursor = conn.create_result();
    let err = cursor.prepare("SELECT 1; SELECT 2").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Statement);
    assert!(err.to_string().contains("Unable to execute multiple statements at a time"));

    cursor.prepare("SELECT 1; -- trailing note").unwrap();
    cursor.prepare("SELECT 1;   \n").unwrap();
}

#[test]
fn peek_ahead_returns_rows_in_engine_order() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    let conn = open(&path);
    run(&conn, "CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT)");
    let mut insert = conn.create_result();
    insert.prepare("INSERT INTO items (label) VALUES (?)").unwrap();
    let labels: Vec<Vec<Value>> = ["gamma", "alpha", "beta", "delta"]
        .iter()
        .map(|l| vec![Value::from(*l)])
        .collect();
    insert.exec_batch(&labels).unwrap();

    let mut cursor = conn.create_result();
    cursor.set_forward_only(true);
    cursor.reset("SELECT id, label FROM items ORDER BY label").unwrap();
    let via_cursor: Vec<(i64, String)> = collect(&mut cursor)
        .into_iter()
        .map(|row| (row[0].to_i64().unwrap(), row[1].to_string()))
        .collect();

    let raw = direct(&path);
    let mut stmt = raw.prepare("SELECT id, label FROM items ORDER BY label").unwrap();
    let via_engine: Vec<(i64, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(via_cursor.len(), 4);
    assert_eq!(via_cursor, via_engine);
}

#[test]
fn precision_policy_shapes_floats() {
    let dir = TempDir::new().unwrap();
    let conn = open(&db_path(&dir));

    let mut cursor = conn.create_result();
    cursor.set_precision_policy(PrecisionPolicy::LowInt32);
    cursor.reset("SELECT 3.7").unwrap();
    assert!(cursor.next().unwrap());
    assert_eq!(cursor.value(0), Some(&Value::Int32(3)));

    cursor.set_precision_policy(PrecisionPolicy::High);
    cursor.reset("SELECT 3.7").unwrap();
    assert!(cursor.next().unwrap());
    assert_eq!(cursor.value(0), Some(&Value::Double(3.7)));
}

#[test]
fn close_invalidates_every_cursor() {
    let dir = TempDir::new().unwrap();
    let mut conn = open(&db_path(&dir));

    let mut first = conn.create_result();
    first.reset("SELECT 1 UNION ALL SELECT 2").unwrap();
    let mut second = conn.create_result();
    second.reset("SELECT 'x'").unwrap();
    assert!(first.raw_statement().is_some());
    assert!(second.raw_statement().is_some());

    conn.close().unwrap();
    assert!(!conn.is_open());
    assert!(first.raw_statement().is_none());
    assert!(second.raw_statement().is_none());

    let err = first.next().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Connection);
    assert!(second.next().is_err());

    let err = second.prepare("SELECT 1").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Connection);
    assert!(err.to_string().contains("Database not open"));
}

// ---------------------------------------------------------------------------
// Opening
// ---------------------------------------------------------------------------

#[test]
fn wrong_password_is_reported_distinctly() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    {
        let conn = open(&path);
        run(&conn, "CREATE TABLE t (x)");
    }

    let mut conn = Connection::new();
    let err = conn
        .open(path.to_str().unwrap(), "wrong", "")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Connection);
    assert_eq!(err.message, "Incorrect password");
    assert!(!conn.is_open());
    assert!(conn.is_open_error());
    assert_eq!(conn.last_error(), Some(err));

    let mut cursor = conn.create_result();
    assert!(cursor.prepare("SELECT 1").is_err());

    conn.open(path.to_str().unwrap(), PASSWORD, "").unwrap();
    assert!(conn.is_open());
    assert!(!conn.is_open_error());
}

#[test]
fn missing_file_read_only_fails_to_open() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.db");

    let mut conn = Connection::new();
    let options = ConnectOptions::default().read_only(true);
    let err = conn
        .open_with(path.to_str().unwrap(), PASSWORD, &options)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Connection);
    assert_eq!(err.message, "Error opening database");
    assert!(!conn.is_open());
    assert!(conn.is_open_error());
    assert!(!path.exists());
}

#[test]
fn file_is_unreadable_without_the_key() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    {
        let conn = open(&path);
        run(&conn, "CREATE TABLE hidden (x)");
    }

    let plain = rusqlite::Connection::open(&path).unwrap();
    let probe: rusqlite::Result<i64> =
        plain.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get(0));
    assert!(probe.is_err());
}

// ---------------------------------------------------------------------------
// Introspection, transactions and notifications
// ---------------------------------------------------------------------------

#[test]
fn introspection_on_encrypted_file() {
    let dir = TempDir::new().unwrap();
    let conn = open(&db_path(&dir));
    run(
        &conn,
        "CREATE TABLE accounts (id INTEGER PRIMARY KEY, owner TEXT NOT NULL, balance REAL DEFAULT '0.0')",
    );

    assert_eq!(conn.tables(TableType::TABLES), vec!["accounts"]);

    let record = conn.record("\"accounts\"");
    assert_eq!(record.names(), vec!["id", "owner", "balance"]);
    let balance = record.field_by_name("balance").unwrap();
    assert_eq!(balance.value_type, ValueType::Double);
    assert_eq!(balance.default_value.as_deref(), Some("0.0"));
    assert_eq!(record.field_by_name("owner").unwrap().required, Some(true));

    let pk = conn.primary_index("accounts");
    assert_eq!(pk.record.names(), vec!["id"]);
    assert!(pk.record.field(0).unwrap().auto_value);
}

#[test]
fn failed_transaction_rolls_back() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    let conn = open(&path);
    run(&conn, "CREATE TABLE ledger (n INTEGER)");

    let result: cipher_sql_core::Result<()> = conn.transaction(|conn| {
        run(conn, "INSERT INTO ledger VALUES (1)");
        let mut cursor = conn.create_result();
        cursor.reset("INSERT INTO missing VALUES (2)")
    });
    assert!(result.is_err());

    conn.transaction(|conn| {
        run(conn, "INSERT INTO ledger VALUES (3)");
        Ok(())
    })
    .unwrap();

    let count: i64 = direct(&path)
        .query_row("SELECT count(*) FROM ledger", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn notifications_reach_the_handler() {
    let dir = TempDir::new().unwrap();
    let conn = open(&db_path(&dir));
    run(&conn, "CREATE TABLE events (id INTEGER PRIMARY KEY, v TEXT)");
    run(&conn, "CREATE TABLE ignored (x)");

    assert!(conn.subscribe("events"));
    assert!(!conn.subscribe("events"));
    assert_eq!(conn.subscribed(), vec!["events"]);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    conn.set_notification_handler(move |n| sink.borrow_mut().push((n.row_id, n.operation)));

    run(&conn, "INSERT INTO events (v) VALUES ('a')");
    run(&conn, "INSERT INTO ignored VALUES (1)");
    run(&conn, "UPDATE events SET v = 'b' WHERE id = 1");

    let delivered = conn.poll_notifications();
    assert_eq!(delivered.len(), 2);
    assert!(delivered.iter().all(|n| n.name == "events" && n.database == "main"));
    assert_eq!(
        *seen.borrow(),
        vec![(1, ChangeOperation::Insert), (1, ChangeOperation::Update)]
    );
    assert!(conn.poll_notifications().is_empty());

    assert!(conn.unsubscribe("events"));
    assert!(!conn.unsubscribe("events"));
    run(&conn, "DELETE FROM events WHERE id = 1");
    assert!(conn.poll_notifications().is_empty());
}
