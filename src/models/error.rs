//! Defines basic error and result types used throughout the crate.

use std::{error::Error, fmt};

use redis::RedisError;

/// Result type used throughout the crate.
pub type ConvoyResult<T> = Result<T, ConvoyError>;

/// Error type used throughout the crate.
#[derive(Debug, PartialEq)]
pub enum ConvoyError {
    /// Error occurred during interaction with Redis.
    Redis(RedisError),

    /// Error occurred while trying to establish a connection to Redis.
    Connection(String),

    /// Operation attempted with an invalid queue name.
    InvalidQueueName(String),
}

impl From<RedisError> for ConvoyError {
    fn from(err: RedisError) -> Self {
        ConvoyError::Redis(err)
    }
}

impl fmt::Display for ConvoyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConvoyError::Redis(err) => err.fmt(f),
            ConvoyError::Connection(msg) => write!(f, "Failed to connect to Redis: {}", msg),
            ConvoyError::InvalidQueueName(name) => {
                write!(f, "Invalid queue name '{}', valid characters: a-zA-Z0-9_.-", name)
            }
        }
    }
}

impl Error for ConvoyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConvoyError::Redis(err) => Some(err),
            _ => None,
        }
    }
}
