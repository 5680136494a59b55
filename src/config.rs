//! Setup statements configured per store.
//!
//! Configuration maps a store path, relative to the workspace root, to the
//! statements that must run before any query against that store:
//!
//! ```json
//! { "data/master.mdb": { "sql": ["ATTACH DATABASE 'data/extra.db' AS extra"] } }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::executor::QueryExecutionOptions;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SetupDatabaseConfig {
    pub databases: BTreeMap<String, QueryExecutionOptions>,
}

impl SetupDatabaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(
        mut self,
        path: impl Into<String>,
        sql: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.databases
            .insert(path.into(), QueryExecutionOptions::new(sql));
        self
    }

    /// Options for the store at `db_path`.
    ///
    /// An entry applies when `workspace_root` joined with its configured path
    /// names `db_path`. Without a workspace root, or without a matching entry,
    /// no setup statements run.
    pub fn options_for(
        &self,
        workspace_root: Option<&Path>,
        db_path: &Path,
    ) -> QueryExecutionOptions {
        let Some(root) = workspace_root else {
            return QueryExecutionOptions::default();
        };

        self.databases
            .iter()
            .find(|(configured, _)| root.join(configured) == db_path)
            .map(|(_, options)| options.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn matches_paths_relative_to_workspace() {
        let config = SetupDatabaseConfig::new()
            .with_database("data/master.mdb", ["PRAGMA foreign_keys = ON"])
            .with_database("data/other.db", ["ATTACH DATABASE 'x.db' AS x"]);
        let root = PathBuf::from("/work");

        let options = config.options_for(Some(&root), Path::new("/work/data/master.mdb"));
        assert_eq!(options.sql, vec!["PRAGMA foreign_keys = ON"]);

        let options = config.options_for(Some(&root), Path::new("/work/data/missing.db"));
        assert!(options.sql.is_empty());
    }

    #[test]
    fn no_workspace_means_no_setup() {
        let config =
            SetupDatabaseConfig::new().with_database("a.db", ["PRAGMA foreign_keys = ON"]);
        assert!(config.options_for(None, Path::new("a.db")).sql.is_empty());
    }

    #[test]
    fn absolute_configured_path_replaces_root() {
        let config = SetupDatabaseConfig::new().with_database("/abs/a.db", ["SELECT 1"]);
        let options = config.options_for(Some(Path::new("/work")), Path::new("/abs/a.db"));
        assert_eq!(options.sql, vec!["SELECT 1"]);
    }
}
