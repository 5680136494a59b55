use serde::Serialize;

use crate::error::QueryError;

/// One row of text cells.
pub type Row = Vec<String>;

/// The result of one user statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementResult {
    #[serde(rename = "stmt")]
    pub statement: String,
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

impl StatementResult {
    /// Build a result from driver rows, where the first row (if any) is the
    /// column header.
    pub fn from_driver_rows(statement: impl Into<String>, mut rows: Vec<Row>) -> Self {
        let header = if rows.is_empty() {
            Vec::new()
        } else {
            rows.remove(0)
        };
        Self {
            statement: statement.into(),
            header,
            rows,
        }
    }
}

pub type ResultSet = Vec<StatementResult>;

/// What a query run hands back: the results gathered so far and, on failure,
/// the error that stopped the run.
#[derive(Debug)]
pub enum QueryOutcome {
    Completed(ResultSet),
    Failed {
        result_set: ResultSet,
        error: QueryError,
    },
}

impl QueryOutcome {
    pub fn new(result_set: ResultSet, error: Option<QueryError>) -> Self {
        match error {
            Some(error) => QueryOutcome::Failed { result_set, error },
            None => QueryOutcome::Completed(result_set),
        }
    }

    pub fn result_set(&self) -> &ResultSet {
        match self {
            QueryOutcome::Completed(result_set) | QueryOutcome::Failed { result_set, .. } => {
                result_set
            }
        }
    }

    pub fn error(&self) -> Option<&QueryError> {
        match self {
            QueryOutcome::Completed(_) => None,
            QueryOutcome::Failed { error, .. } => Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, QueryOutcome::Completed(_))
    }

    pub fn into_parts(self) -> (ResultSet, Option<QueryError>) {
        match self {
            QueryOutcome::Completed(result_set) => (result_set, None),
            QueryOutcome::Failed { result_set, error } => (result_set, Some(error)),
        }
    }

    /// Drops partial results when the run failed.
    pub fn into_result(self) -> Result<ResultSet, QueryError> {
        match self {
            QueryOutcome::Completed(result_set) => Ok(result_set),
            QueryOutcome::Failed { error, .. } => Err(error),
        }
    }
}
