//! Fixed-capacity pool of pre-opened MySQL connections.
//!
//! Grounded on `xjj::MySQLConnectionPool` (`include/mysql_connection_pool.hpp`
//! / `src/mysql_connection_pool.cpp`): eagerly open `pool_size` connections
//! at construction, then hand them out from a list guarded by a mutex.
//! The source pops from that list unconditionally, which races and panics
//! on an empty pool under load; this implementation blocks `check_out` on a
//! condition variable instead, fed by `check_in` — the fix called out in
//! the design notes. The source's doubly-checked singleton is replaced by
//! an ordinary owned instance, constructed once and shared via `Arc`.

use crate::config::Config;
use crate::sync::queue::BlockingQueue;

/// A single leased database connection.
pub type DbConnection = mysql::Conn;

/// Fixed-size pool of eagerly-opened MySQL connections.
///
/// `check_out`/`check_in` are built directly on [`BlockingQueue`]: an
/// unbounded queue's `pop` already blocks until something is pushed, which
/// is exactly the check-out/check-in contract this pool needs.
pub struct DbPool {
    connections: BlockingQueue<DbConnection>,
    pool_size: usize,
}

impl DbPool {
    /// Opens `config.db_pool_size` connections against `config`'s DB fields.
    pub fn new(config: &Config) -> Result<Self, mysql::Error> {
        let opts = mysql::OptsBuilder::new()
            .ip_or_hostname(Some(config.db_host.clone()))
            .user(Some(config.db_user.clone()))
            .pass(Some(config.db_passwd.clone()))
            .db_name((!config.db_name.is_empty()).then(|| config.db_name.clone()))
            .tcp_port(if config.db_port == 0 { 3306 } else { config.db_port });

        let connections = BlockingQueue::new();
        for _ in 0..config.db_pool_size {
            connections.push(mysql::Conn::new(opts.clone())?);
        }

        Ok(Self {
            connections,
            pool_size: config.db_pool_size,
        })
    }

    /// Removes and returns the front connection, blocking until one is
    /// available (i.e. until a concurrent `check_in` happens).
    pub fn check_out(&self) -> DbConnection {
        self.connections.pop()
    }

    /// Returns a connection to the pool.
    pub fn check_in(&self, conn: DbConnection) {
        self.connections.push(conn);
    }

    /// Number of connections currently idle in the pool.
    pub fn idle_len(&self) -> usize {
        self.connections.len()
    }

    /// The pool's fixed capacity, i.e. `|checked_out| + |idle|` at every
    /// quiescent moment.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }
}
