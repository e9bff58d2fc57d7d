/// Data Source Module
///
/// Validated connection inputs: the data-source descriptor that shapes the
/// DSN, credentials, and driver options. All validation happens here, at
/// construction time, so that a `Connection` never holds a config it cannot
/// use.

use crate::config::{DbConfig, OptionsConfig};
use crate::core::{DbError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

/// Option keys fixed by the connection itself: failures are always returned
/// as errors and rows are always fetched by column name.
pub const RESERVED_OPTION_KEYS: [&str; 2] = ["error_mode", "fetch_mode"];

static OPTION_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid option key pattern"));

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSource {
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
    pub charset: String,
}

impl DataSource {
    /// Validates the required descriptor fields of `config`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Config` if `host`, `database` or `charset` is
    /// missing or blank.
    pub fn from_config(config: &DbConfig) -> Result<Self> {
        Ok(DataSource {
            host: required("host", &config.host)?,
            port: config.port,
            database: required("database", &config.database)?,
            charset: required("charset", &config.charset)?,
        })
    }

    /// Builds the canonical connection string for `driver`.
    ///
    /// The port segment is present only when a port is configured.
    pub fn dsn(&self, driver: &str) -> String {
        match self.port {
            Some(port) => format!(
                "{}:host={};port={};dbname={};charset={}",
                driver, self.host, port, self.database, self.charset
            ),
            None => format!(
                "{}:host={};dbname={};charset={}",
                driver, self.host, self.database, self.charset
            ),
        }
    }
}

fn required(field: &str, value: &Option<String>) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(DbError::Config(format!("`{}` is required", field))),
    }
}

/// Optional user and password handed to the driver.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn from_config(config: &DbConfig) -> Self {
        Credentials {
            user: non_empty(&config.user),
            password: non_empty(&config.password),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

/// Driver options after validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub busy_timeout_ms: Option<u64>,
    pub init_command: Option<String>,
    pub read_only: bool,
    pub nested_savepoints: bool,
    pub pragmas: BTreeMap<String, String>,
}

impl ConnectionOptions {
    /// Validates the free-form pragma map.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Config` for keys that are not plain identifiers and
    /// for the reserved `error_mode` / `fetch_mode` keys.
    pub fn from_config(config: &OptionsConfig) -> Result<Self> {
        for key in config.pragmas.keys() {
            if RESERVED_OPTION_KEYS.contains(&key.to_ascii_lowercase().as_str()) {
                return Err(DbError::Config(format!(
                    "option `{}` is fixed by the connection and cannot be overridden",
                    key
                )));
            }
            if !OPTION_KEY.is_match(key) {
                return Err(DbError::Config(format!("invalid option name `{}`", key)));
            }
        }

        Ok(ConnectionOptions {
            busy_timeout_ms: config.busy_timeout_ms,
            init_command: config.init_command.clone().filter(|c| !c.trim().is_empty()),
            read_only: config.read_only.unwrap_or(false),
            nested_savepoints: config.nested_savepoints.unwrap_or(false),
            pragmas: config.pragmas.clone(),
        })
    }
}
