use crate::core::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub database: DbConfig,
}

/// Connection settings: where the database lives and how to reach it.
///
/// The required fields are optional here so that a missing value is
/// reported as a configuration error by `Connection::new` instead of a
/// TOML parse failure.
#[derive(Clone, Default, Deserialize)]
pub struct DbConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub charset: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub options: OptionsConfig,
}

impl DbConfig {
    /// Shorthand for the three required fields.
    pub fn new(host: &str, database: &str, charset: &str) -> Self {
        DbConfig {
            host: Some(host.to_string()),
            database: Some(database.to_string()),
            charset: Some(charset.to_string()),
            ..DbConfig::default()
        }
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("charset", &self.charset)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("options", &self.options)
            .finish()
    }
}

/// Driver options.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptionsConfig {
    /// How long a statement waits on a locked database, in milliseconds.
    pub busy_timeout_ms: Option<u64>,
    /// SQL run once right after connecting.
    pub init_command: Option<String>,
    pub read_only: Option<bool>,
    /// Use savepoints for nested `transaction()` calls.
    pub nested_savepoints: Option<bool>,
    /// Free-form driver switches, applied as `PRAGMA key = value`.
    #[serde(default)]
    pub pragmas: BTreeMap<String, String>,
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Example
///
/// ```no_run
/// let config = sqlconn::config::load_config("sqlconn.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}
