/// Connection Management Module
///
/// This module provides the `Connection` wrapper: lazy connect/reconnect,
/// the statement-execution primitive, and the thin query operations layered
/// on it. Transaction coordination lives in `transaction.rs` and schema
/// introspection in `schema.rs`.

use crate::config::DbConfig;
use crate::core::db::driver::{Driver, DriverHandle, SqliteDriver, StatementHandle};
use crate::core::db::source::{ConnectionOptions, Credentials, DataSource};
use crate::core::db::value::{InsertId, Params, Row, Value};
use crate::core::Result;
use tracing::{debug, warn};

/// A lazily opened database connection.
///
/// Owns at most one driver handle. The handle is created on first use and
/// released by `close()`; nothing is shared between `Connection` values.
///
/// A `Connection` is meant for one thread of control at a time: every
/// method takes `&mut self` and blocks until the driver answers. Callers
/// that need concurrency wrap it in a mutex or open one per unit of work.
#[derive(Debug)]
pub struct Connection<D: Driver = SqliteDriver> {
    driver: D,
    source: DataSource,
    dsn: String,
    credentials: Credentials,
    options: ConnectionOptions,
    pub(crate) handle: Option<D::Handle>,
    pub(crate) transaction_depth: usize,
}

impl Connection<SqliteDriver> {
    /// Creates an SQLite-backed connection. Does not connect yet.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Config` if `host`, `database` or `charset` is
    /// missing, or if the driver options are invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlconn::{Connection, DbConfig};
    ///
    /// let conn = Connection::new(DbConfig::new("localhost", ":memory:", "utf8"))?;
    /// assert_eq!(conn.dsn(), "sqlite:host=localhost;dbname=:memory:;charset=utf8");
    /// assert!(!conn.is_open());
    /// # Ok::<(), sqlconn::DbError>(())
    /// ```
    pub fn new(config: DbConfig) -> Result<Self> {
        Connection::with_driver(config, SqliteDriver)
    }
}

impl<D: Driver> Connection<D> {
    /// Creates a connection that will open its handle through `driver`.
    pub fn with_driver(config: DbConfig, driver: D) -> Result<Self> {
        let source = DataSource::from_config(&config)?;
        let options = ConnectionOptions::from_config(&config.options)?;
        let credentials = Credentials::from_config(&config);
        let dsn = source.dsn(driver.name());

        Ok(Connection {
            driver,
            source,
            dsn,
            credentials,
            options,
            handle: None,
            transaction_depth: 0,
        })
    }

    /// The connection string built from the data source.
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    pub fn data_source(&self) -> &DataSource {
        &self.source
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Number of `transaction()` scopes currently running.
    pub fn transaction_depth(&self) -> usize {
        self.transaction_depth
    }

    /// Connects, unless a handle is already open.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the driver rejects the parameters.
    pub fn open(&mut self) -> Result<()> {
        self.handle()?;
        Ok(())
    }

    /// Drops the handle. Safe to call when already closed.
    pub fn close(&mut self) {
        if self.handle.take().is_some() {
            if self.transaction_depth > 0 {
                warn!(
                    "Closed {} inside transaction() at depth {}; the open transaction is abandoned",
                    self.dsn, self.transaction_depth
                );
            }
            debug!("Closed connection to {}", self.dsn);
        }
    }

    /// Closes and connects again.
    pub fn reopen(&mut self) -> Result<()> {
        self.close();
        self.open()
    }

    /// The live driver handle, connecting first if needed.
    ///
    /// Statements sent straight to the handle bypass transaction
    /// bookkeeping: `begin()`, `commit()` and `rollback()` called here are
    /// not checked against the depth counter and can end a transaction that
    /// a `transaction()` scope still owns. Use the methods on `Connection`
    /// for transaction control.
    pub fn handle(&mut self) -> Result<&mut D::Handle> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => {
                debug!("Opening connection to {}", self.dsn);
                self.driver
                    .connect(&self.dsn, &self.source, &self.credentials, &self.options)?
            }
        };
        Ok(self.handle.insert(handle))
    }

    /// Prepares, binds and executes `sql`.
    ///
    /// Every other query operation goes through this primitive.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Binding` for parameters that cannot be bound and
    /// `DbError::Query` for driver failures.
    pub fn run(&mut self, sql: &str, params: impl Into<Params>) -> Result<StatementHandle> {
        let params = params.into();
        params.validate()?;
        debug!(params = params.len(), "Executing: {}", sql);
        self.handle()?.execute(sql, &params)
    }

    /// Runs a query and returns every row.
    pub fn select(&mut self, sql: &str, params: impl Into<Params>) -> Result<Vec<Row>> {
        Ok(self.run(sql, params)?.fetch_all())
    }

    /// Runs a query and returns its first row, or `None` when nothing matched.
    pub fn select_one(&mut self, sql: &str, params: impl Into<Params>) -> Result<Option<Row>> {
        Ok(self.run(sql, params)?.fetch())
    }

    /// Runs an insert; `true` iff at least one row was affected.
    pub fn insert(&mut self, sql: &str, params: impl Into<Params>) -> Result<bool> {
        Ok(self.run(sql, params)?.row_count() > 0)
    }

    /// Runs an insert and returns the generated id.
    ///
    /// If the statement returns a row (`INSERT ... RETURNING id`), its first
    /// column is the id; otherwise the driver's last insert id is used.
    pub fn insert_and_get_id(&mut self, sql: &str, params: impl Into<Params>) -> Result<InsertId> {
        let mut stmt = self.run(sql, params)?;
        let returned = stmt
            .fetch()
            .and_then(|row| row.iter().next().map(|(_, value)| value.clone()));
        match returned {
            Some(Value::Integer(id)) => Ok(InsertId::Int(id)),
            Some(value) => match value.to_text() {
                Some(text) => Ok(InsertId::from_driver(text)),
                None => self.insert_id(),
            },
            None => self.insert_id(),
        }
    }

    /// The id generated by the most recent insert on this connection.
    pub fn insert_id(&mut self) -> Result<InsertId> {
        let raw = self.handle()?.last_insert_id()?;
        Ok(InsertId::from_driver(raw))
    }

    /// Runs an update and returns the number of affected rows.
    pub fn update(&mut self, sql: &str, params: impl Into<Params>) -> Result<u64> {
        Ok(self.run(sql, params)?.row_count())
    }

    /// Runs a delete and returns the number of affected rows.
    pub fn delete(&mut self, sql: &str, params: impl Into<Params>) -> Result<u64> {
        Ok(self.run(sql, params)?.row_count())
    }

    /// Escapes `literal` as a quoted SQL string for hand-built fragments.
    pub fn quote(&mut self, literal: &str) -> Result<String> {
        Ok(self.handle()?.quote(literal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DbError;
    use crate::test_utils::{memory_config, RecordingDriver};

    fn memory_connection() -> Connection {
        Connection::new(memory_config()).unwrap()
    }

    fn setup_items(conn: &mut Connection) {
        conn.run(
            "CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, qty INTEGER)",
            (),
        )
        .unwrap();
        conn.run(
            "INSERT INTO items (name, qty) VALUES ('bolt', 10), ('nut', 20), ('gear', 5)",
            (),
        )
        .unwrap();
    }

    #[test]
    fn test_connection_is_lazy() {
        let mut conn = memory_connection();
        assert!(!conn.is_open());

        conn.select("SELECT 1 AS one", ()).unwrap();
        assert!(conn.is_open());
    }

    #[test]
    fn test_open_twice_connects_once() {
        let driver = RecordingDriver::default();
        let mut conn = Connection::with_driver(memory_config(), driver.clone()).unwrap();

        conn.open().unwrap();
        conn.open().unwrap();
        conn.select("SELECT 1", ()).unwrap();
        assert_eq!(driver.stats().connects, 1);
    }

    #[test]
    fn test_close_is_idempotent_and_reopen_reconnects() {
        let driver = RecordingDriver::default();
        let mut conn = Connection::with_driver(memory_config(), driver.clone()).unwrap();

        conn.close();
        conn.open().unwrap();
        conn.close();
        conn.close();
        assert!(!conn.is_open());

        conn.reopen().unwrap();
        assert!(conn.is_open());
        assert_eq!(driver.stats().connects, 2);
    }

    #[test]
    fn test_reopen_discards_in_memory_state() {
        let mut conn = memory_connection();
        setup_items(&mut conn);
        conn.reopen().unwrap();

        let result = conn.select("SELECT * FROM items", ());
        assert!(matches!(result, Err(DbError::Query { .. })));
    }

    #[test]
    fn test_connection_error_on_open() {
        let mut conn =
            Connection::new(DbConfig::new("localhost", "/nonexistent/path/database.db", "utf8"))
                .unwrap();

        match conn.open().unwrap_err() {
            DbError::Connection { dsn, .. } => {
                assert!(dsn.contains("/nonexistent/path/database.db"));
            }
            other => panic!("Expected Connection error, got {:?}", other),
        }
        assert!(!conn.is_open());
    }

    #[test]
    fn test_config_error_at_construction() {
        let mut config = memory_config();
        config.charset = None;
        assert!(matches!(Connection::new(config), Err(DbError::Config(_))));
    }

    #[test]
    fn test_select_and_select_one() {
        let mut conn = memory_connection();
        setup_items(&mut conn);

        let rows = conn
            .select("SELECT name FROM items WHERE qty >= ? ORDER BY id", [10])
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("name"), Some(&Value::from("nut")));

        let none = conn
            .select_one("SELECT * FROM items WHERE name = ?", ["washer"])
            .unwrap();
        assert!(none.is_none());

        let first = conn
            .select_one("SELECT name FROM items ORDER BY id", ())
            .unwrap()
            .unwrap();
        assert_eq!(first.get("name"), Some(&Value::from("bolt")));
    }

    #[test]
    fn test_insert_update_delete() {
        let mut conn = memory_connection();
        setup_items(&mut conn);

        assert!(conn
            .insert("INSERT INTO items (name, qty) VALUES (?, ?)", [Value::from("spring"), Value::from(3)])
            .unwrap());
        assert_eq!(conn.insert_id().unwrap(), InsertId::Int(4));

        assert_eq!(conn.update("UPDATE items SET qty = 1 WHERE id = ?", [5]).unwrap(), 0);
        assert_eq!(conn.update("UPDATE items SET qty = 1 WHERE id = ?", [4]).unwrap(), 1);
        assert_eq!(
            conn.update("UPDATE items SET qty = qty + 1 WHERE qty > :min", Params::named([("min", 0)]))
                .unwrap(),
            4
        );
        assert_eq!(conn.delete("DELETE FROM items WHERE qty > ?", [10]).unwrap(), 2);
        assert_eq!(conn.delete("DELETE FROM items WHERE qty > ?", [10]).unwrap(), 0);
    }

    #[test]
    fn test_insert_or_ignore_reports_false() {
        let mut conn = memory_connection();
        conn.run("CREATE TABLE tags (name TEXT PRIMARY KEY)", ()).unwrap();

        assert!(conn.insert("INSERT OR IGNORE INTO tags VALUES (?)", ["red"]).unwrap());
        assert!(!conn.insert("INSERT OR IGNORE INTO tags VALUES (?)", ["red"]).unwrap());
    }

    #[test]
    fn test_insert_and_get_id() {
        let mut conn = memory_connection();
        setup_items(&mut conn);
        conn.run("CREATE TABLE tokens (id TEXT PRIMARY KEY, label TEXT)", ())
            .unwrap();

        let id = conn
            .insert_and_get_id("INSERT INTO items (name) VALUES (?)", ["washer"])
            .unwrap();
        assert_eq!(id, InsertId::Int(4));

        let id = conn
            .insert_and_get_id(
                "INSERT INTO tokens (id, label) VALUES ('tok_' || lower(hex(randomblob(4))), ?) RETURNING id",
                ["api"],
            )
            .unwrap();
        match id {
            InsertId::Text(text) => assert!(text.starts_with("tok_")),
            other => panic!("Expected text id, got {:?}", other),
        }

        let id = conn
            .insert_and_get_id("INSERT INTO tokens (id) VALUES ('77') RETURNING id", ())
            .unwrap();
        assert_eq!(id, InsertId::Int(77));
    }

    #[test]
    fn test_query_error_is_not_retried() {
        let driver = RecordingDriver::default();
        let mut conn = Connection::with_driver(memory_config(), driver.clone()).unwrap();

        let err = conn.select("SELEC * FROM nowhere", ()).unwrap_err();
        assert!(matches!(err, DbError::Query { .. }));
        assert!(err.driver_error().is_some());
        assert_eq!(driver.stats().statements, 1);
        assert!(conn.is_open());
    }

    #[test]
    fn test_non_finite_parameter_is_binding_error() {
        let mut conn = memory_connection();
        let result = conn.select("SELECT ? AS x", [f64::INFINITY]);
        assert!(matches!(result, Err(DbError::Binding(_))));
    }

    #[test]
    fn test_handle_opens_lazily_and_shares_the_transaction() {
        let mut conn = memory_connection();
        assert!(!conn.is_open());
        conn.handle().unwrap();
        assert!(conn.is_open());

        setup_items(&mut conn);
        conn.transaction(|c| -> Result<()> {
            c.run("INSERT INTO items (name) VALUES ('cog')", ())?;
            let mut stmt = c
                .handle()?
                .execute("SELECT count(*) AS n FROM items", &Params::None)?;
            assert_eq!(stmt.fetch().unwrap().get("n"), Some(&Value::Integer(4)));
            assert_eq!(c.transaction_depth(), 1);
            Ok(())
        })
        .unwrap();
        assert_eq!(conn.transaction_depth(), 0);
    }

    #[test]
    fn test_quote_opens_connection() {
        let mut conn = memory_connection();
        assert_eq!(conn.quote("it's").unwrap(), "'it''s'");
        assert!(conn.is_open());
    }
}
