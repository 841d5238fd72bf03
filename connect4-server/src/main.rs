//! Connect-four game server binary.

mod cli;

use clap::Parser;
use connect4_collab::GameServer;
use log::info;

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = CliArgs::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(ref filter) = args.log_level {
        logger.parse_filters(filter);
    }
    logger.init();

    let config = args.server_config();
    info!(
        "Starting connect-four server: {}x{} boards, at most {} sessions",
        config.registry.rows, config.registry.cols, config.registry.max_sessions
    );

    let server = GameServer::new(config);
    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            let stats = server.stats().await;
            info!(
                "Shutting down: {} connections served, {} messages, {} live sessions",
                stats.total_connections, stats.total_messages, stats.active_sessions
            );
            Ok(())
        }
    }
}
