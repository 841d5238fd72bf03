//! Command-line arguments for the game server.

use std::time::Duration;

use clap::Parser;
use connect4_collab::ServerConfig;

/// Connect-four game server arguments.
///
/// Every flag falls back to a `CONNECT4_*` environment variable; values
/// given override the built-in defaults.
#[derive(Parser, Debug, Default)]
#[command(name = "connect4-server", about = "Connect-four WebSocket game server")]
pub struct CliArgs {
    /// Address to listen on.
    #[arg(long, env = "CONNECT4_BIND")]
    pub bind: Option<String>,

    /// Board rows for new games.
    #[arg(long, env = "CONNECT4_ROWS")]
    pub rows: Option<usize>,

    /// Board columns for new games.
    #[arg(long, env = "CONNECT4_COLS")]
    pub cols: Option<usize>,

    /// Broadcast buffer per participant, in messages.
    #[arg(long, env = "CONNECT4_BROADCAST_CAPACITY")]
    pub broadcast_capacity: Option<usize>,

    /// Seconds an empty session survives before eviction.
    #[arg(long, env = "CONNECT4_IDLE_TIMEOUT_SECS")]
    pub idle_timeout_secs: Option<u64>,

    /// Seconds between idle sweeps.
    #[arg(long, env = "CONNECT4_SWEEP_INTERVAL_SECS")]
    pub sweep_interval_secs: Option<u64>,

    /// Maximum number of live sessions.
    #[arg(long, env = "CONNECT4_MAX_SESSIONS")]
    pub max_sessions: Option<usize>,

    /// Maximum bytes of name plus message per chat line.
    #[arg(long, env = "CONNECT4_MAX_CHAT_BYTES")]
    pub max_chat_bytes: Option<usize>,

    /// Create sessions for unknown tokens on join.
    #[arg(long, env = "CONNECT4_CREATE_ON_JOIN")]
    pub create_on_join: Option<bool>,

    /// Log filter (error, warn, info, debug, trace or a RUST_LOG directive).
    #[arg(long, env = "CONNECT4_LOG")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Apply CLI overrides to a config.
    pub fn apply_overrides(&self, config: &mut ServerConfig) {
        if let Some(ref bind) = self.bind {
            config.bind_addr = bind.clone();
        }
        let registry = &mut config.registry;
        if let Some(rows) = self.rows {
            registry.rows = rows;
        }
        if let Some(cols) = self.cols {
            registry.cols = cols;
        }
        if let Some(capacity) = self.broadcast_capacity {
            registry.broadcast_capacity = capacity;
        }
        if let Some(secs) = self.idle_timeout_secs {
            registry.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.sweep_interval_secs {
            registry.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(max) = self.max_sessions {
            registry.max_sessions = max;
        }
        if let Some(max) = self.max_chat_bytes {
            registry.max_chat_bytes = max;
        }
        if let Some(create) = self.create_on_join {
            registry.create_on_join = create;
        }
    }

    /// Build the server config from defaults plus overrides.
    pub fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::default();
        self.apply_overrides(&mut config);
        config
    }
}
