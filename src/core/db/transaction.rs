/// Transaction Coordination Module
///
/// Nested `transaction()` calls share one physical transaction. A counter
/// tracks how many scopes are running; only the outermost scope begins,
/// commits or rolls back, so a failure anywhere aborts the whole unit of
/// work.
///
/// With `nested_savepoints` enabled, inner scopes additionally wrap their
/// slice in a savepoint. The outermost scope still owns the physical
/// transaction.

use crate::core::db::connection::Connection;
use crate::core::db::driver::{Driver, DriverHandle};
use crate::core::{DbError, Result};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info};

fn savepoint_name(depth: usize) -> String {
    format!("sqlconn_sp_{}", depth)
}

impl<D: Driver> Connection<D> {
    /// Runs `work` inside a transaction.
    ///
    /// The outermost call begins the transaction, then commits if `work`
    /// returns `Ok` or rolls back if it returns `Err` or panics. Nested calls
    /// only adjust the depth counter. The error returned by `work` is passed
    /// back unchanged, and a panic is resumed after the rollback.
    ///
    /// `work` must not call `reopen()` or `close()`: the depth counter would
    /// no longer match the physical connection.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlconn::{Connection, DbConfig, DbError};
    ///
    /// let mut conn = Connection::new(DbConfig::new("localhost", ":memory:", "utf8"))?;
    /// conn.run("CREATE TABLE t (x INTEGER)", ())?;
    /// conn.transaction(|c| {
    ///     c.insert("INSERT INTO t VALUES (?)", [1])?;
    ///     c.transaction(|c| c.insert("INSERT INTO t VALUES (?)", [2]))
    /// })?;
    /// assert_eq!(conn.select("SELECT x FROM t", ())?.len(), 2);
    /// # Ok::<(), DbError>(())
    /// ```
    pub fn transaction<T, E, F>(&mut self, work: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Self) -> std::result::Result<T, E>,
        E: From<DbError>,
    {
        if self.transaction_depth == 0 {
            self.begin_transaction()?;
        } else if self.options().nested_savepoints {
            let name = savepoint_name(self.transaction_depth);
            self.handle()?.savepoint(&name)?;
        }

        self.transaction_depth += 1;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(&mut *self)));
        self.transaction_depth -= 1;

        match outcome {
            Ok(Ok(value)) => {
                self.complete_scope()?;
                Ok(value)
            }
            Ok(Err(err)) => {
                self.abort_scope();
                Err(err)
            }
            Err(payload) => {
                self.abort_scope();
                panic::resume_unwind(payload)
            }
        }
    }

    /// Ends the current scope successfully. A failed outermost commit is
    /// followed by a rollback so the handle never keeps a dangling
    /// transaction; the commit error is what the caller sees.
    fn complete_scope(&mut self) -> Result<()> {
        if self.transaction_depth == 0 {
            let committed = self.commit();
            if committed.is_err() {
                if let Err(e) = self.roll_back() {
                    error!("Rollback after failed commit on {} failed: {}", self.dsn(), e);
                }
            }
            committed
        } else if self.options().nested_savepoints {
            let name = savepoint_name(self.transaction_depth);
            self.handle()?.release_savepoint(&name)
        } else {
            Ok(())
        }
    }

    /// Undoes the current scope. Failures are logged so that the error that
    /// caused the abort reaches the caller.
    fn abort_scope(&mut self) {
        let result = if self.transaction_depth == 0 {
            self.roll_back()
        } else if self.options().nested_savepoints {
            let name = savepoint_name(self.transaction_depth);
            self.handle().and_then(|handle| {
                handle.rollback_to_savepoint(&name)?;
                handle.release_savepoint(&name)
            })
        } else {
            return;
        };

        if let Err(e) = result {
            error!(
                "Rollback at depth {} failed on {}: {}",
                self.transaction_depth,
                self.dsn(),
                e
            );
        }
    }

    /// Begins a transaction manually.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Logic` when called inside a `transaction()` callback.
    pub fn begin_transaction(&mut self) -> Result<()> {
        self.ensure_unmanaged("begin_transaction")?;
        info!("Beginning transaction on {}", self.dsn());
        self.handle()?.begin()
    }

    /// Commits a manually begun transaction.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Logic` when called inside a `transaction()` callback.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_unmanaged("commit")?;
        info!("Committing transaction on {}", self.dsn());
        self.handle()?.commit()
    }

    /// Rolls back a manually begun transaction.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Logic` when called inside a `transaction()` callback.
    pub fn roll_back(&mut self) -> Result<()> {
        self.ensure_unmanaged("roll_back")?;
        info!("Rolling back transaction on {}", self.dsn());
        self.handle()?.rollback()
    }

    fn ensure_unmanaged(&self, method: &str) -> Result<()> {
        if self.transaction_depth == 0 {
            return Ok(());
        }
        debug!(
            "{}() rejected at transaction depth {}",
            method, self.transaction_depth
        );
        Err(DbError::Logic(format!(
            "{}() call is forbidden inside a transaction() callback",
            method
        )))
    }
}
