//! CLI-specific error types and exit code mapping

use snortmon_core::error::{SnortmonError, StorageError};
use snortmon_ingest::IngestError;
use snortmon_query::QueryError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed or was refused.
    #[error("{0}")]
    Command(String),

    /// Event store could not be opened or queried.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Ingestion or rule refresh failed.
    #[error("{0}")]
    Ingest(#[from] IngestError),

    /// Query arguments were rejected.
    #[error("{0}")]
    Query(#[from] QueryError),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SnortmonError> for CliError {
    fn from(err: SnortmonError) -> Self {
        match err {
            SnortmonError::Config(e) => Self::Config(e.to_string()),
            SnortmonError::Storage(e) => Self::Storage(e),
            SnortmonError::Io(e) => Self::Io(e),
            SnortmonError::Pipeline(e) => Self::Command(e.to_string()),
        }
    }
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                     |
    /// |------|-----------------------------|
    /// | 0    | Success                     |
    /// | 1    | General / command error     |
    /// | 2    | Configuration error         |
    /// | 3    | Storage error               |
    /// | 4    | Invalid query arguments     |
    /// | 10   | IO error                    |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Ingest(IngestError::Config { .. }) => 2,
            Self::Storage(_) => 3,
            Self::Query(QueryError::Storage(_)) => 3,
            Self::Query(_) => 4,
            Self::Io(_) => 10,
            Self::Command(_) | Self::Ingest(_) | Self::JsonSerialize(_) => 1,
        }
    }
}
