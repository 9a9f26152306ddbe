use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Gerrit HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gerrit API returned {status} for {path}")]
    Api { status: u16, path: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timed out after {0:?} waiting for {1}")]
    Timeout(Duration, &'static str),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for errors caused by bad caller input rather than a backend failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidFilter(_) | Error::InvalidLimit(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
