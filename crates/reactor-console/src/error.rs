//! Runtime errors

use thiserror::Error;

/// Errors from the console runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("bus error: {0}")]
    Bus(#[from] reactor_bus::BusError),

    #[error("sync error: {0}")]
    Sync(#[from] reactor_core::SyncError),

    #[error("configuration error: {0}")]
    Config(String),
}
