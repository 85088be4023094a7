//! Binary entry point: load configuration, start logging, run the server
//! with the reference insert/select/update/delete handler until shutdown.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info};
use packetbeam::{reference_handler, AppError, Config, DbPool, Server};

const DEFAULT_CONFIG_PATH: &str = "./config.json";
const USAGE: &str = "usage: packetbeam [CONFIG_PATH]\n\n\
    Runs the length-prefixed request/response server.\n\
    CONFIG_PATH defaults to ./config.json.";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    let config_path = args.first().cloned().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    match run(&config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: &str) -> Result<(), AppError> {
    let config = Config::load(config_path)?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    let db = Arc::new(
        DbPool::new(&config).map_err(|e| AppError::Server(packetbeam::ServerError::DbInit(e)))?,
    );
    let handler = reference_handler(db);

    let mut server = Server::new(&config, handler).map_err(AppError::Server)?;
    info!(
        "listening on {}",
        server.local_addr().map(|a| a.to_string()).unwrap_or_else(|_| "?".to_string())
    );

    server.run().map_err(AppError::Server)
}
