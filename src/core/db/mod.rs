/// Database Module
///
/// ## Architecture
///
/// - **Data Source** (`source.rs`): validated DSN fields, credentials and driver options
/// - **Values** (`value.rs`): parameters, rows and generated ids
/// - **Driver** (`driver.rs`): the backend seam and the built-in SQLite driver
/// - **Connection Management** (`connection.rs`): lazy open/close and statement execution
/// - **Transactions** (`transaction.rs`): reference-counted nested transactions
/// - **Schema Introspection** (`schema.rs`): column descriptors
///
/// ## Error Handling
///
/// All database operations return `DbError` for consistent error propagation.
pub mod connection;
pub mod driver;
pub mod schema;
pub mod source;
pub mod transaction;
pub mod value;

pub use connection::*;
pub use driver::*;
pub use schema::*;
pub use source::*;
pub use value::*;
