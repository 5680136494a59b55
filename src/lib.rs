//! Multi-statement SQL execution against local SQLite stores.
//!
//! # Intention
//!
//! - Run caller-supplied query text, statement by statement, against one store
//!   and hand back the results of every statement that ran.
//! - Unlock the protected store with a key derived from embedded material
//!   before anything touches it.
//! - Always release the store, whatever happened during the run.
//!
//! # Architectural Boundaries
//!
//! - Only query execution and store access belong here.
//! - No presentation of results, no editor integration, no configuration
//!   lookup beyond mapping store paths to setup statements.

pub mod config;
pub mod error;
pub mod executor;
pub mod key;
pub mod result;
pub mod session;
pub mod sqlite;
pub mod statement;
pub mod stores;

pub use config::SetupDatabaseConfig;
pub use error::{ErrorKind, QueryError, Result};
pub use executor::{QueryExecutionOptions, QueryExecutor};
pub use key::{derive_key, KeyMaterial};
pub use result::{QueryOutcome, ResultSet, Row, StatementResult};
pub use session::{Connector, Database};
pub use sqlite::{SqliteConfig, SqliteConnector, SqliteSession};
pub use statement::{split_statements, Statement};
pub use stores::{GameStores, MdbTable};
