//! Error types shared across the crate.
//!
//! Each subsystem gets its own `thiserror` enum; [`AppError`] is the
//! top-level type `main` deals with.

use std::io;

use thiserror::Error;

/// Failures while loading or validating `config.json`.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be opened.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was opened.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The file did not contain a JSON object.
    #[error("failed to parse {path} as JSON: {source}")]
    Parse {
        /// Path that was parsed.
        path: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// Violations of the length-prefix framing protocol.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProtocolError {
    /// The decoded length prefix had its high bit set.
    #[error("negative length prefix {0}")]
    NegativeLength(i32),

    /// The decoded length prefix exceeded the configured maximum.
    #[error("message length {got} exceeds configured maximum {max}")]
    TooLarge {
        /// Decoded length.
        got: u32,
        /// Configured maximum.
        max: u32,
    },
}

/// Failures from the fixed-size worker pool.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum PoolError {
    /// `add_task` was called before `start`, or `start` was called twice.
    #[error("worker pool is not running")]
    NotRunning,

    /// Admission control rejected the task: queue and in-flight count are at
    /// capacity and the pool was constructed with `overload = false`.
    #[error("worker pool is at capacity")]
    Exhausted,
}

/// Errors surfaced by the listener/reactor while running the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Binding or configuring the listening socket failed.
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        /// Address the server attempted to bind.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// `mio::Poll` setup or a poll iteration failed.
    #[error("readiness poll failed: {0}")]
    Poll(#[source] io::Error),

    /// The DB connection pool could not be initialized.
    #[error("failed to initialize database pool: {0}")]
    DbInit(#[source] mysql::Error),
}

/// Top-level error type for the binary.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The server failed to start or crashed.
    #[error(transparent)]
    Server(#[from] ServerError),
}
