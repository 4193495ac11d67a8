use std::net::SocketAddr;

use thiserror::Error;
use tokio::task::JoinError;
use vakthund_config::ConfigError;
use vakthund_core::GateError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("startup resync failed: {0}")]
    Startup(#[source] GateError),

    #[error("expiry sweep failed: {0}")]
    Sweep(#[source] GateError),

    #[error("task failed: {0}")]
    Task(#[from] JoinError),
}
