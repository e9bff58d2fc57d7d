/// # Test Utilities Module
///
/// Shared fixtures for the unit tests:
/// - in-memory connection configuration
/// - a standard sample schema
/// - `RecordingDriver`, an SQLite driver that counts physical operations

use crate::config::DbConfig;
use crate::core::db::driver::{Driver, DriverHandle, SqliteDriver, SqliteHandle, StatementHandle};
use crate::core::db::source::{ConnectionOptions, Credentials, DataSource};
use crate::core::db::value::Params;
use crate::core::db::Connection;
use crate::core::{DbError, Result};
use std::cell::RefCell;
use std::rc::Rc;

/// Configuration for a private in-memory SQLite database.
pub fn memory_config() -> DbConfig {
    DbConfig::new("localhost", ":memory:", "utf8mb4")
}

/// Creates the standard test schema.
pub fn setup_test_schema<D: Driver>(conn: &mut Connection<D>) {
    let statements = [
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT UNIQUE,
            age INTEGER,
            status TEXT DEFAULT 'active'
        )",
        "CREATE TABLE memberships (
            user_id INTEGER NOT NULL,
            group_id INTEGER NOT NULL,
            since INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, group_id)
        )",
    ];
    for sql in statements {
        conn.run(sql, ()).unwrap();
    }
}

/// Physical operations observed by a `RecordingDriver`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub connects: usize,
    pub statements: usize,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub savepoints: usize,
    pub savepoint_releases: usize,
    pub savepoint_rollbacks: usize,
}

/// SQLite driver that counts what reaches the database.
///
/// Clones share their counters, so a test keeps one clone and hands the
/// other to the `Connection`.
#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    stats: Rc<RefCell<DriverStats>>,
    required_password: Option<String>,
}

impl RecordingDriver {
    /// A driver that refuses to connect unless given `password`.
    pub fn requiring_password(password: &str) -> Self {
        RecordingDriver {
            required_password: Some(password.to_string()),
            ..RecordingDriver::default()
        }
    }

    pub fn stats(&self) -> DriverStats {
        *self.stats.borrow()
    }
}

impl Driver for RecordingDriver {
    type Handle = RecordingHandle;

    fn name(&self) -> &str {
        "recording"
    }

    fn connect(
        &self,
        dsn: &str,
        source: &DataSource,
        credentials: &Credentials,
        options: &ConnectionOptions,
    ) -> Result<RecordingHandle> {
        if let Some(required) = &self.required_password {
            if credentials.password.as_ref() != Some(required) {
                return Err(DbError::Connection {
                    dsn: dsn.to_string(),
                    source: rusqlite::Error::SqliteFailure(
                        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_AUTH),
                        Some("access denied".to_string()),
                    ),
                });
            }
        }
        let inner = SqliteDriver.connect(dsn, source, credentials, options)?;
        self.stats.borrow_mut().connects += 1;
        Ok(RecordingHandle {
            inner,
            stats: Rc::clone(&self.stats),
        })
    }

    fn describe_columns(&self, table: &str) -> (String, Params) {
        SqliteDriver.describe_columns(table)
    }
}

#[derive(Debug)]
pub struct RecordingHandle {
    inner: SqliteHandle,
    stats: Rc<RefCell<DriverStats>>,
}

impl DriverHandle for RecordingHandle {
    fn execute(&mut self, sql: &str, params: &Params) -> Result<StatementHandle> {
        self.stats.borrow_mut().statements += 1;
        self.inner.execute(sql, params)
    }

    fn last_insert_id(&mut self) -> Result<String> {
        self.inner.last_insert_id()
    }

    fn quote(&self, literal: &str) -> String {
        self.inner.quote(literal)
    }

    fn begin(&mut self) -> Result<()> {
        self.stats.borrow_mut().begins += 1;
        self.inner.begin()
    }

    fn commit(&mut self) -> Result<()> {
        self.stats.borrow_mut().commits += 1;
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<()> {
        self.stats.borrow_mut().rollbacks += 1;
        self.inner.rollback()
    }

    fn savepoint(&mut self, name: &str) -> Result<()> {
        self.stats.borrow_mut().savepoints += 1;
        self.inner.savepoint(name)
    }

    fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.stats.borrow_mut().savepoint_releases += 1;
        self.inner.release_savepoint(name)
    }

    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.stats.borrow_mut().savepoint_rollbacks += 1;
        self.inner.rollback_to_savepoint(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_driver_rejects_wrong_password() {
        let mut config = memory_config();
        config.user = Some("app".to_string());
        config.password = Some("wrong".to_string());
        let mut conn =
            Connection::with_driver(config, RecordingDriver::requiring_password("secret")).unwrap();

        match conn.open().unwrap_err() {
            DbError::Connection { dsn, .. } => {
                assert_eq!(dsn, "recording:host=localhost;dbname=:memory:;charset=utf8mb4")
            }
            other => panic!("Expected Connection error, got {:?}", other),
        }
        assert!(!conn.is_open());
    }

    #[test]
    fn test_recording_driver_accepts_password() {
        let mut config = memory_config();
        config.password = Some("secret".to_string());
        let driver = RecordingDriver::requiring_password("secret");
        let mut conn = Connection::with_driver(config, driver.clone()).unwrap();

        setup_test_schema(&mut conn);
        assert_eq!(driver.stats().connects, 1);
        assert_eq!(driver.stats().statements, 2);
    }
}
