// Core infrastructure modules
pub mod core;

pub mod config;

#[cfg(test)]
mod test_utils;

pub use crate::config::{load_config, Config, DbConfig, OptionsConfig};
pub use crate::core::db::{
    ColumnDescriptor, Connection, ConnectionOptions, Credentials, DataSource, Driver,
    DriverHandle, InsertId, Params, Row, SqliteDriver, SqliteHandle, StatementHandle, Value,
};
pub use crate::core::{DbError, Result};
