/// Driver Module
///
/// The seam between `Connection` and a concrete database backend. A
/// `Driver` knows how to open a handle and how to ask for a table's column
/// layout; a `DriverHandle` runs statements on one live connection.
///
/// `SqliteDriver` is the built-in backend, on top of rusqlite.

use crate::core::db::source::{ConnectionOptions, Credentials, DataSource};
use crate::core::db::value::{Params, Row, Value};
use crate::core::{DbError, Result};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{OpenFlags, ToSql};
use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;
use tracing::debug;

/// A database backend.
pub trait Driver {
    type Handle: DriverHandle;

    /// Prefix of the DSN, e.g. `sqlite`.
    fn name(&self) -> &str;

    /// Opens a new physical connection.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the backend rejects the parameters.
    fn connect(
        &self,
        dsn: &str,
        source: &DataSource,
        credentials: &Credentials,
        options: &ConnectionOptions,
    ) -> Result<Self::Handle>;

    /// Query and parameters describing the columns of `table`.
    ///
    /// The result set must carry the columns `Field`, `Type`, `Null`,
    /// `Default`, `Key` and `Extra`, one row per table column.
    fn describe_columns(&self, table: &str) -> (String, Params);
}

/// One live connection owned by a `Connection`.
pub trait DriverHandle {
    /// Prepares `sql`, binds `params`, runs it and materializes the result.
    fn execute(&mut self, sql: &str, params: &Params) -> Result<StatementHandle>;

    /// The identifier generated by the most recent insert, as the backend
    /// reports it.
    fn last_insert_id(&mut self) -> Result<String>;

    /// Escapes `literal` into a quoted SQL string literal.
    fn quote(&self, literal: &str) -> String;

    fn begin(&mut self) -> Result<()> {
        self.execute("BEGIN", &Params::None).map(drop)
    }

    fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT", &Params::None).map(drop)
    }

    fn rollback(&mut self) -> Result<()> {
        self.execute("ROLLBACK", &Params::None).map(drop)
    }

    fn savepoint(&mut self, name: &str) -> Result<()> {
        self.execute(&format!("SAVEPOINT {}", name), &Params::None).map(drop)
    }

    fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.execute(&format!("RELEASE SAVEPOINT {}", name), &Params::None)
            .map(drop)
    }

    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.execute(&format!("ROLLBACK TO SAVEPOINT {}", name), &Params::None)
            .map(drop)
    }
}

/// The materialized outcome of one executed statement.
///
/// Rows are read eagerly, so the handle does not borrow the connection;
/// `fetch` hands them out one at a time and they cannot be re-read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementHandle {
    columns: Vec<String>,
    rows: VecDeque<Row>,
    affected: u64,
}

impl StatementHandle {
    pub fn new(columns: Vec<String>, rows: Vec<Row>, affected: u64) -> Self {
        StatementHandle {
            columns,
            rows: rows.into(),
            affected,
        }
    }

    /// Column names of the result set; empty for statements without one.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Takes the next unread row.
    pub fn fetch(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }

    /// Takes every unread row.
    pub fn fetch_all(self) -> Vec<Row> {
        self.rows.into()
    }

    /// Rows changed by the statement; zero for read-only statements.
    pub fn row_count(&self) -> u64 {
        self.affected
    }

    /// Number of rows not yet fetched.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

/// SQLite backend.
///
/// `database` is the file path (`:memory:` for an in-memory database).
/// `host` and `port` only shape the DSN and credentials are ignored, since
/// SQLite has neither a network endpoint nor authentication.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    type Handle = SqliteHandle;

    fn name(&self) -> &str {
        "sqlite"
    }

    fn connect(
        &self,
        dsn: &str,
        source: &DataSource,
        credentials: &Credentials,
        options: &ConnectionOptions,
    ) -> Result<SqliteHandle> {
        let connection_error = |err: rusqlite::Error| DbError::Connection {
            dsn: dsn.to_string(),
            source: err,
        };

        if credentials.user.is_some() {
            debug!("SQLite ignores credentials for {}", dsn);
        }
        let encoding = sqlite_encoding(&source.charset).ok_or_else(|| {
            connection_error(sqlite_failure(format!(
                "unsupported charset `{}`",
                source.charset
            )))
        })?;

        let flags = if options.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::default()
        };
        let conn = rusqlite::Connection::open_with_flags(&source.database, flags)
            .map_err(connection_error)?;

        if !options.read_only {
            // Only takes effect before the database file has any content.
            run_pragma(&conn, "encoding", encoding).map_err(connection_error)?;
        }
        if let Some(ms) = options.busy_timeout_ms {
            conn.busy_timeout(Duration::from_millis(ms))
                .map_err(connection_error)?;
        }
        for (key, value) in &options.pragmas {
            run_pragma(&conn, key, value).map_err(connection_error)?;
        }
        if let Some(command) = &options.init_command {
            conn.execute_batch(command).map_err(connection_error)?;
        }

        Ok(SqliteHandle { conn })
    }

    fn describe_columns(&self, table: &str) -> (String, Params) {
        let sql = r#"
            SELECT name AS "Field",
                   type AS "Type",
                   CASE WHEN "notnull" = 0 AND pk = 0 THEN 'YES' ELSE 'NO' END AS "Null",
                   dflt_value AS "Default",
                   CASE WHEN pk > 0 THEN 'PRI' ELSE '' END AS "Key",
                   CASE WHEN pk = 1 AND upper(type) = 'INTEGER'
                             AND (SELECT count(*) FROM pragma_table_info(?1) WHERE pk > 0) = 1
                        THEN 'auto_increment' ELSE '' END AS "Extra"
            FROM pragma_table_info(?1)
            ORDER BY cid
        "#;
        (sql.to_string(), Params::positional([table]))
    }
}

fn total_changes(conn: &rusqlite::Connection, sql: &str) -> Result<i64> {
    conn.query_row("SELECT total_changes()", [], |row| row.get(0))
        .map_err(|e| DbError::query(sql, e))
}

/// Rows written by the statement that just ran.
///
/// `changes()` keeps the count of the last INSERT, UPDATE or DELETE, so a
/// statement that wrote nothing (DDL, SELECT) would inherit it. The running
/// total only moves when something was written.
fn changes_since(conn: &rusqlite::Connection, sql: &str, before: i64) -> Result<u64> {
    if total_changes(conn, sql)? == before {
        Ok(0)
    } else {
        Ok(conn.changes() as u64)
    }
}

/// Maps a configured charset onto an SQLite text encoding.
fn sqlite_encoding(charset: &str) -> Option<&'static str> {
    let normalized: String = charset
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect::<String>()
        .to_ascii_lowercase();
    match normalized.as_str() {
        "utf8" | "utf8mb3" | "utf8mb4" => Some("UTF-8"),
        "utf16" => Some("UTF-16"),
        "utf16le" => Some("UTF-16le"),
        "utf16be" => Some("UTF-16be"),
        _ => None,
    }
}

fn sqlite_failure(message: String) -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
        Some(message),
    )
}

/// Runs `PRAGMA key = value`, draining whatever rows the pragma reports.
fn run_pragma(conn: &rusqlite::Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    let literal = if value.parse::<i64>().is_ok() {
        value.to_string()
    } else {
        quote_literal(value)
    };
    let mut stmt = conn.prepare(&format!("PRAGMA {} = {}", key, literal))?;
    let mut rows = stmt.raw_query();
    while rows.next()?.is_some() {}
    Ok(())
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// A live SQLite connection.
#[derive(Debug)]
pub struct SqliteHandle {
    conn: rusqlite::Connection,
}

impl SqliteHandle {
    /// The underlying rusqlite connection.
    pub fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }
}

impl DriverHandle for SqliteHandle {
    fn execute(&mut self, sql: &str, params: &Params) -> Result<StatementHandle> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| DbError::query(sql, e))?;
        bind_params(&mut stmt, params)?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let before = total_changes(&self.conn, sql)?;
        if columns.is_empty() {
            stmt.raw_execute().map_err(|e| DbError::query(sql, e))?;
            let affected = changes_since(&self.conn, sql, before)?;
            return Ok(StatementHandle::new(columns, Vec::new(), affected));
        }

        let mut rows = Vec::new();
        {
            let mut cursor = stmt.raw_query();
            while let Some(row) = cursor.next().map_err(|e| DbError::query(sql, e))? {
                let mut fetched = Row::new();
                for (i, name) in columns.iter().enumerate() {
                    let value = row.get_ref(i).map_err(|e| DbError::query(sql, e))?;
                    fetched.insert(name.clone(), Value::from(value));
                }
                rows.push(fetched);
            }
        }

        let affected = changes_since(&self.conn, sql, before)?;
        Ok(StatementHandle::new(columns, rows, affected))
    }

    fn last_insert_id(&mut self) -> Result<String> {
        Ok(self.conn.last_insert_rowid().to_string())
    }

    fn quote(&self, literal: &str) -> String {
        quote_literal(literal)
    }
}

fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &Params) -> Result<()> {
    let expected = stmt.parameter_count();
    let binding_error = |e: rusqlite::Error| DbError::Binding(e.to_string());

    match params {
        Params::None if expected == 0 => Ok(()),
        Params::None => Err(DbError::Binding(format!(
            "statement expects {} parameter(s), none given",
            expected
        ))),
        Params::Positional(values) => {
            if values.len() != expected {
                return Err(DbError::Binding(format!(
                    "statement expects {} parameter(s), {} given",
                    expected,
                    values.len()
                )));
            }
            for (index, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(index + 1, value)
                    .map_err(binding_error)?;
            }
            Ok(())
        }
        Params::Named(pairs) => {
            let mut bound = BTreeSet::new();
            for (name, value) in pairs {
                let index = stmt
                    .parameter_index(name)
                    .map_err(binding_error)?
                    .ok_or_else(|| {
                        DbError::Binding(format!("statement has no parameter named {}", name))
                    })?;
                stmt.raw_bind_parameter(index, value).map_err(binding_error)?;
                bound.insert(index);
            }
            if bound.len() != expected {
                return Err(DbError::Binding(format!(
                    "statement expects {} parameter(s), {} bound",
                    expected,
                    bound.len()
                )));
            }
            Ok(())
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}
