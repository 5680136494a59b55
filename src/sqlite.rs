use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{ffi, types::ValueRef, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, warn};

use crate::error::{QueryError, Result};
use crate::key::KeyMaterial;
use crate::result::Row;
use crate::session::{Connector, Database};

/// File name that marks the protected store.
pub const PROTECTED_STORE_NAME: &str = "meta";

/// Cipher the protected store is encrypted with.
pub const PROTECTED_STORE_CIPHER: &str = "chacha20";

/// A single cell as read from SQLite.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        }
    }
}

/// Text form of a cell, as it appears in a result row.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
            Value::Blob(bytes) => write!(f, "X'{}'", hex::encode_upper(bytes)),
        }
    }
}

/// SQLite session configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqliteConfig {
    /// Create the store file when it does not exist. Off by default, so a
    /// missing store (or ATTACH target) is an error.
    pub create_if_missing: bool,
    /// Material the protected store's key is derived from
    pub keys: KeyMaterial,
}

impl SqliteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_create_if_missing(mut self, create_if_missing: bool) -> Self {
        self.create_if_missing = create_if_missing;
        self
    }

    pub fn with_keys(mut self, keys: KeyMaterial) -> Self {
        self.keys = keys;
        self
    }

    fn open_flags(&self) -> OpenFlags {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if self.create_if_missing {
            flags | OpenFlags::SQLITE_OPEN_CREATE
        } else {
            flags
        }
    }
}

/// Whether `path` names the protected store. Only the file name is looked at.
pub fn is_protected_store(path: &Path) -> bool {
    path.file_name()
        .map_or(false, |name| name == PROTECTED_STORE_NAME)
}

/// A rusqlite connection bound to one query run.
#[derive(Debug)]
pub struct SqliteSession {
    path: PathBuf,
    connection: Option<Connection>,
}

impl SqliteSession {
    /// Open the store at `path`, unlocking it first when it is the protected
    /// store. Blocks the calling thread.
    pub fn open(path: impl AsRef<Path>, config: &SqliteConfig) -> Result<Self> {
        let path = path.as_ref();
        let shown = path.display().to_string();

        // Derive before touching the file so a bad key setup never opens it.
        let key = if is_protected_store(path) {
            Some(config.keys.derive()?)
        } else {
            None
        };

        let connection = Connection::open_with_flags(path, config.open_flags()).map_err(|source| {
            warn!(path = %shown, error = %source, "failed to open database");
            QueryError::Open {
                path: shown.clone(),
                source,
            }
        })?;

        match key {
            Some(key) => {
                debug!(path = %shown, cipher = PROTECTED_STORE_CIPHER, "unlocking protected database");
                unlock(&connection, &key).map_err(|reason| {
                    warn!(path = %shown, %reason, "failed to unlock database");
                    QueryError::Decryption {
                        path: shown.clone(),
                        reason,
                    }
                })?;
            }
            None => probe_schema(&connection).map_err(|source| QueryError::Open {
                path: shown.clone(),
                source,
            })?,
        }

        debug!(path = %shown, "opened database");
        Ok(Self {
            path: path.to_path_buf(),
            connection: Some(connection),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }
}

#[async_trait]
impl Database for SqliteSession {
    async fn execute(&mut self, sql: &str) -> Result<Vec<Row>> {
        let Some(connection) = self.connection.take() else {
            return Err(QueryError::Execution {
                statement: sql.to_string(),
                source: rusqlite::Error::SqliteFailure(
                    ffi::Error::new(ffi::SQLITE_MISUSE),
                    Some("database is closed".to_string()),
                ),
            });
        };

        let statement = sql.to_string();
        let (connection, rows) = tokio::task::spawn_blocking(move || {
            let rows = run_statement(&connection, &statement);
            (connection, rows)
        })
        .await?;
        self.connection = Some(connection);

        rows.map_err(|source| QueryError::Execution {
            statement: sql.to_string(),
            source,
        })
    }

    async fn close(&mut self) -> Result<()> {
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };

        tokio::task::spawn_blocking(move || connection.close())
            .await?
            .map_err(|(_connection, source)| QueryError::Close(source))?;
        debug!(path = %self.path.display(), "closed database");
        Ok(())
    }
}

/// Opens [`SqliteSession`]s on tokio's blocking pool.
#[derive(Debug, Clone, Default)]
pub struct SqliteConnector {
    config: SqliteConfig,
}

impl SqliteConnector {
    pub fn new(config: SqliteConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    type Database = SqliteSession;

    async fn open(&self, path: &Path) -> Result<SqliteSession> {
        let path = path.to_path_buf();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || SqliteSession::open(path, &config)).await?
    }
}

/// Select the cipher, apply the key and check the store reads back cleanly.
fn unlock(connection: &Connection, key: &[u8]) -> std::result::Result<(), String> {
    connection
        .execute_batch(&format!("PRAGMA cipher = '{PROTECTED_STORE_CIPHER}';"))
        .map_err(|e| format!("cannot select cipher: {e}"))?;
    let selected = selected_cipher(connection).map_err(|e| format!("cannot read cipher: {e}"))?;
    if selected.as_deref() != Some(PROTECTED_STORE_CIPHER) {
        return Err(format!(
            "engine did not switch to {PROTECTED_STORE_CIPHER}, cipher is {}",
            selected.as_deref().unwrap_or("unsupported")
        ));
    }
    connection
        .execute_batch(&format!("PRAGMA hexkey = '{}';", hex::encode(key)))
        .map_err(|e| format!("cannot apply key: {e}"))?;

    let verdict: String = connection
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(|e| format!("verification failed: {e}"))?;
    if verdict != "ok" {
        return Err(format!("verification failed: {verdict}"));
    }
    Ok(())
}

/// The cipher the connection is set to use; `None` when the engine has no
/// cipher support.
pub fn selected_cipher(connection: &Connection) -> rusqlite::Result<Option<String>> {
    connection
        .query_row("PRAGMA cipher", [], |row| row.get(0))
        .optional()
}

/// Reading the schema forces SQLite to look at the file header.
fn probe_schema(connection: &Connection) -> rusqlite::Result<()> {
    connection.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(())
}

fn run_statement(connection: &Connection, sql: &str) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = connection.prepare(sql)?;
    let column_count = stmt.column_count();
    if column_count == 0 {
        stmt.execute([])?;
        return Ok(Vec::new());
    }

    let header: Row = stmt.column_names().into_iter().map(String::from).collect();
    let mut result = vec![header];
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let cells = (0..column_count)
            .map(|i| row.get_ref(i).map(|value| Value::from(value).to_string()))
            .collect::<rusqlite::Result<Row>>()?;
        result.push(cells);
    }
    Ok(result)
}
