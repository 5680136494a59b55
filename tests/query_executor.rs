use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::lock::Mutex;
use sqlite_query::{
    Connector, Database, ErrorKind, QueryError, QueryExecutionOptions, QueryExecutor, Row,
    SqliteConnector, StatementResult,
};
use tempfile::{NamedTempFile, TempDir};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn failure(message: &str) -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(1), Some(message.to_string()))
}

/// Records every driver call so tests can check what ran and in which order.
#[derive(Clone, Default)]
struct RecordingConnector {
    journal: Arc<Mutex<Vec<String>>>,
    fail_open: bool,
    fail_on: Option<&'static str>,
    fail_close: bool,
}

impl RecordingConnector {
    async fn journal(&self) -> Vec<String> {
        self.journal.lock().await.clone()
    }
}

struct RecordingDatabase {
    journal: Arc<Mutex<Vec<String>>>,
    fail_on: Option<&'static str>,
    fail_close: bool,
}

#[async_trait]
impl Connector for RecordingConnector {
    type Database = RecordingDatabase;

    async fn open(&self, path: &Path) -> sqlite_query::Result<RecordingDatabase> {
        self.journal
            .lock()
            .await
            .push(format!("open {}", path.display()));
        if self.fail_open {
            return Err(QueryError::Open {
                path: path.display().to_string(),
                source: failure("unable to open database file"),
            });
        }
        Ok(RecordingDatabase {
            journal: self.journal.clone(),
            fail_on: self.fail_on,
            fail_close: self.fail_close,
        })
    }
}

#[async_trait]
impl Database for RecordingDatabase {
    async fn execute(&mut self, sql: &str) -> sqlite_query::Result<Vec<Row>> {
        self.journal.lock().await.push(format!("execute {sql}"));
        if self.fail_on.map_or(false, |needle| sql.contains(needle)) {
            return Err(QueryError::Execution {
                statement: sql.to_string(),
                source: failure("no such table: nosuchtable"),
            });
        }
        if sql.starts_with("SELECT") {
            Ok(vec![vec!["value".to_string()], vec![sql.to_string()]])
        } else {
            Ok(Vec::new())
        }
    }

    async fn close(&mut self) -> sqlite_query::Result<()> {
        self.journal.lock().await.push("close".to_string());
        if self.fail_close {
            return Err(QueryError::Close(failure("unable to close due to unfinalized statements")));
        }
        Ok(())
    }
}

fn no_setup() -> QueryExecutionOptions {
    QueryExecutionOptions::default()
}

#[tokio::test]
async fn test_parse_error_never_opens_the_store() {
    let connector = RecordingConnector::default();
    let executor = QueryExecutor::new(connector.clone());

    let outcome = executor
        .execute_query("store.db", "SELECT 'unterminated;", &no_setup())
        .await;

    assert!(outcome.result_set().is_empty());
    assert_eq!(outcome.error().unwrap().kind(), ErrorKind::Parse);
    assert!(connector.journal().await.is_empty());
}

#[tokio::test]
async fn test_open_failure_returns_empty_result_set() {
    let connector = RecordingConnector {
        fail_open: true,
        ..Default::default()
    };
    let executor = QueryExecutor::new(connector.clone());

    let outcome = executor
        .execute_query("store.db", "SELECT 1;", &no_setup())
        .await;

    assert!(outcome.result_set().is_empty());
    assert_eq!(outcome.error().unwrap().kind(), ErrorKind::Open);
    assert_eq!(connector.journal().await, vec!["open store.db"]);
}

#[tokio::test]
async fn test_setup_runs_first_and_never_reports_results() {
    let connector = RecordingConnector::default();
    let executor = QueryExecutor::new(connector.clone());
    let options = QueryExecutionOptions::new(["PRAGMA foreign_keys = ON", "SELECT 'setup'"]);

    let outcome = executor
        .execute_query("store.db", "SELECT 1; SELECT 2;", &options)
        .await;

    assert!(outcome.is_ok());
    let statements: Vec<_> = outcome
        .result_set()
        .iter()
        .map(|result| result.statement.as_str())
        .collect();
    assert_eq!(statements, vec!["SELECT 1;", "SELECT 2;"]);
    assert_eq!(
        connector.journal().await,
        vec![
            "open store.db",
            "execute PRAGMA foreign_keys = ON",
            "execute SELECT 'setup'",
            "execute SELECT 1;",
            "execute SELECT 2;",
            "close",
        ]
    );
}

#[tokio::test]
async fn test_setup_failure_skips_everything_but_close() {
    let connector = RecordingConnector {
        fail_on: Some("ATTACH"),
        ..Default::default()
    };
    let executor = QueryExecutor::new(connector.clone());
    let options = QueryExecutionOptions::new([
        "ATTACH DATABASE 'missing.db' AS x",
        "PRAGMA foreign_keys = ON",
    ]);

    let outcome = executor
        .execute_query("store.db", "SELECT 1;", &options)
        .await;

    assert!(outcome.result_set().is_empty());
    let error = outcome.error().unwrap();
    assert!(matches!(error, QueryError::Setup { .. }));
    assert!(error.to_string().starts_with("failed to setup database"));
    assert_eq!(
        connector.journal().await,
        vec![
            "open store.db",
            "execute ATTACH DATABASE 'missing.db' AS x",
            "close",
        ]
    );
}

#[tokio::test]
async fn test_first_failing_statement_short_circuits() {
    let connector = RecordingConnector {
        fail_on: Some("nosuchtable"),
        ..Default::default()
    };
    let executor = QueryExecutor::new(connector.clone());

    let outcome = executor
        .execute_query(
            "store.db",
            "SELECT 1; SELECT * FROM nosuchtable; SELECT 3;",
            &no_setup(),
        )
        .await;

    let (result_set, error) = outcome.into_parts();
    assert_eq!(
        result_set,
        vec![StatementResult {
            statement: "SELECT 1;".to_string(),
            header: vec!["value".to_string()],
            rows: vec![vec!["SELECT 1;".to_string()]],
        }]
    );
    let error = error.unwrap();
    assert_eq!(error.kind(), ErrorKind::Execution);
    assert_eq!(error.statement(), Some("SELECT * FROM nosuchtable;"));
    assert_eq!(connector.journal().await.last().unwrap(), "close");
    assert!(!connector
        .journal()
        .await
        .contains(&"execute SELECT 3;".to_string()));
}

#[tokio::test]
async fn test_close_failure_is_reported_when_nothing_else_failed() {
    let connector = RecordingConnector {
        fail_close: true,
        ..Default::default()
    };
    let executor = QueryExecutor::new(connector);

    let outcome = executor
        .execute_query("store.db", "SELECT 1; SELECT 2;", &no_setup())
        .await;

    assert_eq!(outcome.result_set().len(), 2);
    assert_eq!(outcome.error().unwrap().kind(), ErrorKind::Close);
}

#[tokio::test]
async fn test_earlier_error_wins_over_close_failure() {
    init_tracing();
    let connector = RecordingConnector {
        fail_on: Some("nosuchtable"),
        fail_close: true,
        ..Default::default()
    };
    let executor = QueryExecutor::new(connector.clone());

    let outcome = executor
        .execute_query("store.db", "SELECT * FROM nosuchtable;", &no_setup())
        .await;

    assert_eq!(outcome.error().unwrap().kind(), ErrorKind::Execution);
    assert_eq!(connector.journal().await.last().unwrap(), "close");
}

#[tokio::test]
async fn test_empty_query_still_opens_and_closes() {
    let connector = RecordingConnector::default();
    let executor = QueryExecutor::new(connector.clone());

    let outcome = executor
        .execute_query("store.db", "  -- nothing\n", &no_setup())
        .await;

    assert!(outcome.is_ok());
    assert!(outcome.result_set().is_empty());
    assert_eq!(connector.journal().await, vec!["open store.db", "close"]);
}

// The scenarios below run against real SQLite files.

#[tokio::test]
async fn test_create_insert_select_on_fresh_store() {
    init_tracing();
    let file = NamedTempFile::new().unwrap();
    let executor = QueryExecutor::new(SqliteConnector::default());

    let result_set = executor
        .execute_query(file.path(), "CREATE TABLE t(a,b);", &no_setup())
        .await
        .into_result()
        .unwrap();
    assert_eq!(
        result_set,
        vec![StatementResult {
            statement: "CREATE TABLE t(a,b);".to_string(),
            header: Vec::new(),
            rows: Vec::new(),
        }]
    );

    let result_set = executor
        .execute_query(
            file.path(),
            "INSERT INTO t VALUES(1,2); SELECT a,b FROM t;",
            &no_setup(),
        )
        .await
        .into_result()
        .unwrap();
    assert_eq!(
        result_set,
        vec![
            StatementResult {
                statement: "INSERT INTO t VALUES(1,2);".to_string(),
                header: Vec::new(),
                rows: Vec::new(),
            },
            StatementResult {
                statement: "SELECT a,b FROM t;".to_string(),
                header: vec!["a".to_string(), "b".to_string()],
                rows: vec![vec!["1".to_string(), "2".to_string()]],
            },
        ]
    );
}

#[tokio::test]
async fn test_unknown_table_is_an_execution_error() {
    let file = NamedTempFile::new().unwrap();
    let executor = QueryExecutor::new(SqliteConnector::default());

    let outcome = executor
        .execute_query(file.path(), "SELECT * FROM nosuchtable;", &no_setup())
        .await;

    assert!(outcome.result_set().is_empty());
    let error = outcome.error().unwrap();
    assert_eq!(error.kind(), ErrorKind::Execution);
    assert!(error.to_string().contains("nosuchtable"));

    // The store was released, so it can be written again straight away.
    let outcome = executor
        .execute_query(file.path(), "CREATE TABLE after(x);", &no_setup())
        .await;
    assert!(outcome.is_ok());
}

#[tokio::test]
async fn test_attach_of_missing_store_aborts_setup() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("main.db");
    std::fs::File::create(&store).unwrap();
    let missing = dir.path().join("missing.db");
    let options =
        QueryExecutionOptions::new([format!("ATTACH DATABASE '{}' AS x", missing.display())]);
    let executor = QueryExecutor::new(SqliteConnector::default());

    let outcome = executor
        .execute_query(&store, "CREATE TABLE never(a);", &options)
        .await;

    assert!(outcome.result_set().is_empty());
    assert!(matches!(outcome.error(), Some(QueryError::Setup { .. })));
    assert!(!missing.exists());

    let tables = executor
        .execute_query(
            &store,
            "SELECT name FROM sqlite_master WHERE name = 'never';",
            &no_setup(),
        )
        .await
        .into_result()
        .unwrap();
    assert!(tables[0].rows.is_empty());
}

#[tokio::test]
async fn test_attached_store_is_visible_to_user_statements() {
    let dir = TempDir::new().unwrap();
    let extra = dir.path().join("extra.db");
    let conn = rusqlite::Connection::open(&extra).unwrap();
    conn.execute_batch("CREATE TABLE names(n TEXT); INSERT INTO names VALUES ('attached');")
        .unwrap();
    conn.close().unwrap();

    let store = NamedTempFile::new().unwrap();
    let options =
        QueryExecutionOptions::new([format!("ATTACH DATABASE '{}' AS extra", extra.display())]);
    let executor = QueryExecutor::new(SqliteConnector::default());

    let result_set = executor
        .execute_query(store.path(), "SELECT n FROM extra.names;", &options)
        .await
        .into_result()
        .unwrap();
    assert_eq!(result_set.len(), 1);
    assert_eq!(result_set[0].rows, vec![vec!["attached"]]);
}

#[tokio::test]
async fn test_partial_results_survive_a_later_failure() {
    let file = NamedTempFile::new().unwrap();
    let executor = QueryExecutor::new(SqliteConnector::default());

    let outcome = executor
        .execute_query(
            file.path(),
            "CREATE TABLE t(a UNIQUE); INSERT INTO t VALUES(1); INSERT INTO t VALUES(1); INSERT INTO t VALUES(2);",
            &no_setup(),
        )
        .await;

    assert_eq!(outcome.result_set().len(), 2);
    assert_eq!(outcome.error().unwrap().kind(), ErrorKind::Execution);

    let rows = executor
        .execute_query(file.path(), "SELECT a FROM t;", &no_setup())
        .await
        .into_result()
        .unwrap();
    assert_eq!(rows[0].rows, vec![vec!["1"]]);
}

#[tokio::test]
async fn test_runs_on_different_stores_are_independent() {
    let first = NamedTempFile::new().unwrap();
    let second = NamedTempFile::new().unwrap();
    let executor = QueryExecutor::new(SqliteConnector::default());

    let setup = no_setup();

    let (a, b) = futures::join!(
        executor.execute_query(first.path(), "CREATE TABLE a(x); SELECT 'first';", &setup),
        executor.execute_query(second.path(), "SELECT * FROM nothing;", &setup),
    );

    assert!(a.is_ok());
    assert_eq!(a.result_set()[1].rows, vec![vec!["first"]]);
    assert_eq!(b.error().unwrap().kind(), ErrorKind::Execution);
}

#[tokio::test]
async fn test_result_set_serializes_for_viewers() {
    let file = NamedTempFile::new().unwrap();
    let executor = QueryExecutor::new(SqliteConnector::default());

    let result_set = executor
        .execute_query(file.path(), "SELECT 1 AS one, NULL AS missing;", &no_setup())
        .await
        .into_result()
        .unwrap();

    let json = serde_json::to_value(&result_set).unwrap();
    assert_eq!(
        json,
        serde_json::json!([{
            "stmt": "SELECT 1 AS one, NULL AS missing;",
            "header": ["one", "missing"],
            "rows": [["1", "NULL"]]
        }])
    );
}

#[allow(dead_code)]
fn assert_executor_is_send(executor: QueryExecutor, path: PathBuf) {
    fn is_send<T: Send>(_: T) {}
    is_send(async move {
        executor
            .execute_query(path, "SELECT 1;", &QueryExecutionOptions::default())
            .await
    });
}
