//! Error taxonomy for the session and access-control core.

use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Malformed request data.
    InvalidInput(String),
    /// No valid session, or credentials did not match.
    Unauthorized,
    /// Session, token or record absent.
    NotFound,
    /// Conflicting input, e.g. a password and its confirmation differ.
    Conflict(String),
    /// The store was unavailable or returned an unexpected error.
    Storage(sqlx::Error),
    /// The operating system random source failed.
    RandomnessUnavailable(rand::rand_core::OsError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Error::Unauthorized => write!(f, "unauthorized"),
            Error::NotFound => write!(f, "not found"),
            Error::Conflict(msg) => write!(f, "conflict: {msg}"),
            Error::Storage(e) => write!(f, "storage failure: {e}"),
            Error::RandomnessUnavailable(e) => write!(f, "secure randomness unavailable: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Storage(e) => Some(e),
            Error::RandomnessUnavailable(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Storage(e)
    }
}

impl From<rand::rand_core::OsError> for Error {
    fn from(e: rand::rand_core::OsError) -> Self {
        Error::RandomnessUnavailable(e)
    }
}
