//! Error types surfaced by Finger queries

use std::{io, time::Duration};

use thiserror::Error;

pub type FingerResult<T> = Result<T, FingerError>;

/// Every way a single Finger query can fail
///
/// None of these are retried; the caller decides whether to try again.
#[derive(Debug, Error)]
pub enum FingerError {
    /// Neither the query nor the caller named a host to connect to
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The outgoing query contains a character that cannot be sent as ASCII
    #[error("Cannot encode query {query:?}: non-ASCII character {character:?} at byte {position}")]
    EncodeFailure {
        query: String,
        character: char,
        position: usize,
    },

    /// Connecting failed, or the connection broke before the server closed it cleanly
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailure {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Response exceeds maximum size of {limit} bytes")]
    ResponseTooLarge { limit: usize },
}

