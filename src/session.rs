//! Driver seam between the query orchestrator and a concrete store.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::result::Row;

/// An open store session.
///
/// A session belongs to a single query run and is never shared.
#[async_trait]
pub trait Database: Send {
    /// Run one statement.
    ///
    /// Row-producing statements return the column names as the first row,
    /// followed by the data rows. Other statements return no rows. A failing
    /// statement leaves the session usable.
    async fn execute(&mut self, sql: &str) -> Result<Vec<Row>>;

    /// Release the store. Closing twice, or closing a session that never
    /// opened, succeeds.
    async fn close(&mut self) -> Result<()>;
}

/// Opens sessions. A session is only handed out once it is fully usable.
#[async_trait]
pub trait Connector: Send + Sync {
    type Database: Database;

    async fn open(&self, path: &Path) -> Result<Self::Database>;
}
