use std::path::PathBuf;

use cipher_sql_core::{Driver, Field, IdentifierKind, SqlResult, TableType, Value};
use cipher_sql_sqlite::{ConnectOptions, Connection};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cipher-sql")]
#[command(about = "Query and inspect SQLCipher-encrypted databases", version)]
struct Cli {
    /// Log driver activity to stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a single SQL statement and print its rows.
    Query(QueryArgs),
    /// List the tables (and optionally views) of a database.
    Tables(TablesArgs),
    /// Print the column descriptors and primary key of a table.
    Schema(SchemaArgs),
}

/// Connection arguments shared by every subcommand.
#[derive(Debug, Args)]
struct ConnectArgs {
    /// Path to the database file.
    #[arg(long)]
    db: PathBuf,
    /// Encryption passphrase.
    #[arg(long, default_value = "")]
    password: String,
    /// Connection option string, e.g. "BUSY_TIMEOUT=2000;OPEN_READONLY".
    #[arg(long, default_value = "")]
    options: String,
}

#[derive(Debug, Args)]
struct QueryArgs {
    #[command(flatten)]
    connect: ConnectArgs,
    /// SQL text of exactly one statement.
    sql: String,
    /// Positional parameter value, in placeholder order (repeatable).
    #[arg(short, long = "param")]
    params: Vec<String>,
    /// Named parameter as NAME=VALUE, e.g. ":id=3" (repeatable).
    #[arg(short, long = "bind")]
    binds: Vec<String>,
    /// Print one JSON object per row instead of a table.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct TablesArgs {
    #[command(flatten)]
    connect: ConnectArgs,
    /// Include views.
    #[arg(long)]
    views: bool,
    /// Include the engine catalog.
    #[arg(long)]
    system: bool,
}

#[derive(Debug, Args)]
struct SchemaArgs {
    #[command(flatten)]
    connect: ConnectArgs,
    /// Table name, optionally schema-qualified.
    table: String,
    /// Print the descriptors as JSON.
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Query(args) => run_query(args),
        Command::Tables(args) => run_tables(args),
        Command::Schema(args) => run_schema(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// query command
// ---------------------------------------------------------------------------

fn run_query(args: QueryArgs) -> Result<(), String> {
    let conn = open_connection(&args.connect)?;
    let mut cursor = conn.create_result();
    cursor.set_forward_only(true);
    cursor.prepare(&args.sql).map_err(|e| e.to_string())?;

    for (pos, raw) in args.params.iter().enumerate() {
        cursor.bound_values_mut().bind_at(pos, parse_param(raw));
    }
    for bind in &args.binds {
        let (name, raw) = bind
            .split_once('=')
            .ok_or_else(|| format!("Invalid --bind '{bind}': expected NAME=VALUE"))?;
        if !cursor.bound_values_mut().bind_name(name, parse_param(raw)) {
            return Err(format!("Query has no placeholder named '{name}'"));
        }
    }

    cursor.exec().map_err(|e| e.to_string())?;

    if !cursor.is_select() {
        println!("{} row(s) affected", cursor.rows_affected());
        if let Some(id) = cursor.last_insert_id() {
            println!("last insert id: {id}");
        }
        return Ok(());
    }

    let columns: Vec<String> = cursor.record().iter().map(|f| f.name.clone()).collect();
    let mut rows = Vec::new();
    while cursor.next().map_err(|e| e.to_string())? {
        if let Some(row) = cursor.row() {
            rows.push(row.to_vec());
        }
    }
    debug!(rows = rows.len(), "query finished");

    if args.json {
        for row in &rows {
            let object: serde_json::Map<String, serde_json::Value> = columns
                .iter()
                .cloned()
                .zip(row.iter().map(json_value))
                .collect();
            let line = serde_json::to_string(&object)
                .map_err(|e| format!("Failed to serialize row: {e}"))?;
            println!("{line}");
        }
    } else {
        print!("{}", render_table(&columns, &rows));
    }
    Ok(())
}

/// Interprets a command-line parameter: `NULL`, an integer, a float, or text.
fn parse_param(raw: &str) -> Value {
    if raw == "NULL" {
        return Value::NULL;
    }
    if let Ok(v) = raw.parse::<i64>() {
        return Value::Int64(v);
    }
    if let Ok(v) = raw.parse::<f64>() {
        return Value::Double(v);
    }
    Value::from(raw)
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null(_) => serde_json::Value::Null,
        Value::Bool(b) => (*b).into(),
        Value::Int32(v) => (*v).into(),
        Value::UInt32(v) => (*v).into(),
        Value::Int64(v) => (*v).into(),
        Value::UInt64(v) => (*v).into(),
        Value::Double(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        other => other.to_string().into(),
    }
}

/// Renders rows as a left-aligned text table with a header rule.
fn render_table(columns: &[String], rows: &[Vec<Value>]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| if v.is_null() { "NULL".to_string() } else { v.to_string() })
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let line = |values: &[String]| {
        let padded: Vec<String> = values
            .iter()
            .zip(&widths)
            .map(|(v, &w)| format!("{v:<w$}"))
            .collect();
        format!("{}\n", padded.join(" | ").trim_end())
    };

    let mut out = line(columns);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&format!("{}\n", rule.join("-+-")));
    for row in &cells {
        out.push_str(&line(row));
    }
    out.push_str(&format!("({} row{})\n", rows.len(), if rows.len() == 1 { "" } else { "s" }));
    out
}

// ---------------------------------------------------------------------------
// tables command
// ---------------------------------------------------------------------------

fn run_tables(args: TablesArgs) -> Result<(), String> {
    let conn = open_connection(&args.connect)?;
    let mut kinds = TableType::TABLES;
    if args.views {
        kinds = kinds | TableType::VIEWS;
    }
    if args.system {
        kinds = kinds | TableType::SYSTEM_TABLES;
    }
    for name in conn.tables(kinds) {
        println!("{name}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// schema command
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SchemaReport<'a> {
    table: &'a str,
    columns: &'a [Field],
    primary_key: Vec<&'a str>,
}

fn run_schema(args: SchemaArgs) -> Result<(), String> {
    let conn = open_connection(&args.connect)?;
    let record = conn.record(&args.table);
    if record.is_empty() {
        return Err(format!(
            "Table {} not found",
            conn.escape_identifier(&args.table, IdentifierKind::TableName)
        ));
    }
    let primary = conn.primary_index(&args.table);
    let columns: Vec<Field> = record.iter().cloned().collect();

    if args.json {
        let report = SchemaReport {
            table: &args.table,
            columns: &columns,
            primary_key: primary.record.names(),
        };
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Failed to serialize schema: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    println!("Table: {}", args.table);
    for field in &columns {
        let mut notes = Vec::new();
        if field.required == Some(true) {
            notes.push("not null".to_string());
        }
        if field.auto_value {
            notes.push("auto".to_string());
        }
        if let Some(default) = &field.default_value {
            notes.push(format!("default {default}"));
        }
        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!(" ({})", notes.join(", "))
        };
        println!("  {} {}{notes}", field.name, field.value_type);
    }
    if !primary.is_empty() {
        println!("Primary key: {}", primary.record.names().join(", "));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn open_connection(args: &ConnectArgs) -> Result<Connection, String> {
    let options = ConnectOptions::parse_strict(&args.options)
        .map_err(|e| format!("Invalid --options: {e}"))?;
    let path = args
        .db
        .to_str()
        .ok_or_else(|| format!("Database path '{}' is not valid UTF-8", args.db.display()))?;

    let mut conn = Connection::new();
    conn.open_with(path, &args.password, &options)
        .map_err(|e| format!("Failed to open database '{}': {e}", args.db.display()))?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param_kinds() {
        assert_eq!(parse_param("NULL"), Value::NULL);
        assert_eq!(parse_param("42"), Value::Int64(42));
        assert_eq!(parse_param("2.5"), Value::Double(2.5));
        assert_eq!(parse_param("abc"), Value::from("abc"));
    }

    #[test]
    fn test_json_value_mapping() {
        assert_eq!(json_value(&Value::NULL), serde_json::Value::Null);
        assert_eq!(json_value(&Value::Int64(7)), serde_json::json!(7));
        assert_eq!(json_value(&Value::from("x")), serde_json::json!("x"));
        assert_eq!(json_value(&Value::Bytes(vec![0xab, 0x01])), serde_json::json!("ab01"));
    }

    #[test]
    fn test_render_table_aligns_columns() {
        let columns = vec!["id".to_string(), "name".to_string()];
        let rows = vec![
            vec![Value::Int64(1), Value::from("alice")],
            vec![Value::Int64(22), Value::NULL],
        ];
        let table = render_table(&columns, &rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "id | name");
        assert_eq!(lines[1], "---+------");
        assert_eq!(lines[2], "1  | alice");
        assert_eq!(lines[3], "22 | NULL");
        assert_eq!(lines[4], "(2 rows)");
    }

    #[test]
    fn test_cli_parses_global_verbose() {
        let cli = Cli::parse_from(["cipher-sql", "tables", "--db", "x.db", "-v"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Tables(_)));
    }
}
