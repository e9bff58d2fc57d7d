/// Core Module for sqlconn
///
/// This module contains the connection wrapper and the error types shared
/// by every database operation.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DbError, Result};
