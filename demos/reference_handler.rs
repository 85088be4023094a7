//! Runs the server with the reference insert/select/update/delete handler
//! against a real MySQL instance described by `./config.json`.
//!
//! Mirrors `rask`'s own `examples/example_server.rs` in spirit: a small
//! `main` that wires library pieces together rather than a test harness.

use std::env;
use std::sync::Arc;

use packetbeam::{reference_handler, Config, DbPool, Server};

fn main() {
    env_logger::init();

    let config_path = env::args().nth(1).unwrap_or_else(|| "./config.json".to_string());
    let config = Config::load(&config_path).expect("failed to load config");

    let db = Arc::new(DbPool::new(&config).expect("failed to open database pool"));
    let handler = reference_handler(db);

    let mut server = Server::new(&config, handler).expect("failed to bind server");
    println!("listening on {}", server.local_addr().unwrap());
    server.run().expect("server loop failed");
}
