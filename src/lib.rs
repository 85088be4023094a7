//! A length-prefixed TCP request/response server: an edge-triggered
//! readiness loop feeding a bounded worker pool, with a companion MySQL
//! connection pool for handlers that need one.
//!
//! Grounded throughout on `xjj::Server` (`include/server.hpp` /
//! `src/server.cpp`) and its collaborators; see `DESIGN.md` for the
//! per-module grounding ledger.

pub mod config;
pub mod connection;
pub mod dbpool;
pub mod error;
pub mod framing;
pub mod handler;
pub mod protocol;
pub mod reactor;
pub mod server;
pub mod sync;
pub mod workerpool;

pub use config::Config;
pub use dbpool::DbPool;
pub use error::{AppError, ConfigError, PoolError, ProtocolError, ServerError};
pub use handler::{BusinessHandler, Request, Response};
pub use protocol::reference_handler;
pub use reactor::ShutdownHandle;
pub use server::Server;
