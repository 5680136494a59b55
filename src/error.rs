use thiserror::Error;

/// Classification of a [`QueryError`], independent of where it was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Open,
    Decryption,
    Configuration,
    Execution,
    Close,
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("unable to execute query: {0}")]
    Parse(String),

    #[error("unable to open database '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("unable to unlock database '{path}': {reason}")]
    Decryption { path: String, reason: String },

    #[error("invalid key configuration: {0}")]
    Configuration(String),

    #[error("{source}")]
    Execution {
        statement: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to setup database: {source}")]
    Setup {
        statement: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("unable to close database: {0}")]
    Close(#[source] rusqlite::Error),

    #[error("database worker stopped: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::Parse(_) => ErrorKind::Parse,
            QueryError::Open { .. } => ErrorKind::Open,
            QueryError::Decryption { .. } => ErrorKind::Decryption,
            QueryError::Configuration(_) => ErrorKind::Configuration,
            QueryError::Execution { .. } | QueryError::Setup { .. } | QueryError::Worker(_) => {
                ErrorKind::Execution
            }
            QueryError::Close(_) => ErrorKind::Close,
        }
    }

    /// The statement text a failure is tied to, if any.
    pub fn statement(&self) -> Option<&str> {
        match self {
            QueryError::Execution { statement, .. } | QueryError::Setup { statement, .. } => {
                Some(statement)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
