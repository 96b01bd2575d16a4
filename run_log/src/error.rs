//! Errors raised while parsing a run log and projecting it to CSV or SQLite

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The log file to parse does not exist.
    #[error("could not find log file: {}", path.display())]
    InputNotFound { path: PathBuf },

    /// A recognized line carried a value that is not a valid number for its field.
    #[error("line {line}: malformed value for '{label}': {value:?}")]
    Parse {
        line: usize,
        label: &'static str,
        value: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// The output file could not be created or written.
    #[error("could not write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing to run a statement that writes to the database: {sql}")]
    NotReadOnly { sql: String },

    #[error("invalid query: {message}")]
    InvalidQuery { message: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("invalid database pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl Error {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Errors caused by the input rather than the environment.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Error::InputNotFound { .. } | Error::Parse { .. })
    }

    /// Failures of the sink rows are written to, file or database.
    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Output { .. })
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Error {
        Error::Config {
            message: e.to_string(),
        }
    }
}
