//! The two stores shipped with the game data: the master database and the
//! protected `meta` index.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use futures::future::try_join_all;

use crate::config::SetupDatabaseConfig;
use crate::executor::{QueryExecutionOptions, QueryExecutor};
use crate::result::{ResultSet, Row};
use crate::session::Connector;
use crate::sqlite::{SqliteConnector, PROTECTED_STORE_NAME};

/// Master tables that can be loaded whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MdbTable {
    TextData,
    CharacterSystemText,
    RaceJikkyoComment,
    RaceJikkyoMessage,
}

impl MdbTable {
    pub const ALL: [MdbTable; 4] = [
        MdbTable::TextData,
        MdbTable::CharacterSystemText,
        MdbTable::RaceJikkyoComment,
        MdbTable::RaceJikkyoMessage,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MdbTable::TextData => "text_data",
            MdbTable::CharacterSystemText => "character_system_text",
            MdbTable::RaceJikkyoComment => "race_jikkyo_comment",
            MdbTable::RaceJikkyoMessage => "race_jikkyo_message",
        }
    }

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            MdbTable::TextData => &["category", "index", "text"],
            MdbTable::CharacterSystemText => &["character_id", "voice_id", "text"],
            MdbTable::RaceJikkyoComment | MdbTable::RaceJikkyoMessage => &["id", "message"],
        }
    }

    /// Selects every column, ordered by all but the last one.
    pub fn select_sql(self) -> String {
        let columns = self.columns();
        let quoted = |names: &[&str]| {
            names
                .iter()
                .map(|name| format!("\"{name}\""))
                .collect::<Vec<_>>()
                .join(",")
        };
        format!(
            "SELECT {} FROM {} ORDER BY {}",
            quoted(columns),
            self.name(),
            quoted(&columns[..columns.len() - 1])
        )
    }
}

/// Query context for one game data directory.
///
/// Passed explicitly to whoever needs the stores; there is no global
/// instance.
#[derive(Debug, Clone)]
pub struct GameStores<C = SqliteConnector> {
    executor: QueryExecutor<C>,
    mdb_path: Option<PathBuf>,
    meta_path: Option<PathBuf>,
    setup: SetupDatabaseConfig,
    workspace_root: Option<PathBuf>,
}

impl<C: Connector> GameStores<C> {
    pub fn new(connector: C, game_data_dir: Option<&Path>) -> Self {
        Self {
            executor: QueryExecutor::new(connector),
            mdb_path: game_data_dir.map(|dir| dir.join("master").join("master.mdb")),
            meta_path: game_data_dir.map(|dir| dir.join(PROTECTED_STORE_NAME)),
            setup: SetupDatabaseConfig::default(),
            workspace_root: None,
        }
    }

    /// Setup statements to apply, keyed by paths relative to `workspace_root`.
    pub fn with_setup(
        mut self,
        setup: SetupDatabaseConfig,
        workspace_root: Option<PathBuf>,
    ) -> Self {
        self.setup = setup;
        self.workspace_root = workspace_root;
        self
    }

    pub fn mdb_path(&self) -> Option<&Path> {
        self.mdb_path.as_deref()
    }

    pub fn meta_path(&self) -> Option<&Path> {
        self.meta_path.as_deref()
    }

    pub fn options_for(&self, db_path: &Path) -> QueryExecutionOptions {
        self.setup
            .options_for(self.workspace_root.as_deref(), db_path)
    }

    /// Run `query` against `db_path`. Partial results are dropped on error.
    pub async fn query(
        &self,
        db_path: &Path,
        query: &str,
        options: &QueryExecutionOptions,
    ) -> Result<ResultSet> {
        Ok(self
            .executor
            .execute_query(db_path, query, options)
            .await
            .into_result()?)
    }

    pub async fn query_mdb(&self, query: &str) -> Result<ResultSet> {
        let path = self.mdb_path.as_deref().ok_or_else(not_configured)?;
        self.query(path, query, &self.options_for(path)).await
    }

    pub async fn query_meta(&self, query: &str) -> Result<ResultSet> {
        let path = self.meta_path.as_deref().ok_or_else(not_configured)?;
        self.query(path, query, &self.options_for(path)).await
    }

    pub async fn load_mdb_table(&self, table: MdbTable) -> Result<Vec<Row>> {
        let mut result_set = self.query_mdb(&table.select_sql()).await?;
        if result_set.is_empty() {
            return Err(anyhow!("loading {} produced no result", table.name()));
        }
        Ok(result_set.swap_remove(0).rows)
    }

    /// Load several tables; each load is its own independent run.
    pub async fn load_mdb_tables(&self, tables: &[MdbTable]) -> Result<Vec<Vec<Row>>> {
        try_join_all(tables.iter().map(|&table| self.load_mdb_table(table))).await
    }
}

fn not_configured() -> anyhow::Error {
    anyhow!("query cannot be performed because the game data directory is not set")
}
