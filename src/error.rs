//! Error types for the cache facade and its backends.
//!
//! A missing or expired key is never an error: the facade reports it as
//! `None` / `false`. Everything in here is a real failure of the backend,
//! the configuration, or the instance lifecycle.

use std::io;

use thiserror::Error;

/// The main error type for cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// An I/O error occurred (file system, socket, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The embedded store reported a failure.
    #[error("embedded store error: {0}")]
    Embedded(#[from] sled::Error),

    /// The remote server or its client reported a failure.
    #[error("remote store error: {0}")]
    Remote(#[from] redis::RedisError),

    /// The construction descriptor could not be turned into a backend.
    #[error("invalid cache configuration: {0}")]
    Config(String),

    /// A stored record could not be decoded.
    #[error("corrupted entry: {0}")]
    Corrupted(String),

    /// The instance has been closed and its backend handle released.
    #[error("cache is closed")]
    Closed,
}

impl CacheError {
    /// Whether the error came from talking to the storage engine rather than
    /// from configuration or lifecycle misuse.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            CacheError::Io(_) | CacheError::Embedded(_) | CacheError::Remote(_)
        )
    }
}

/// A specialized Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
