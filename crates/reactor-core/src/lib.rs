//! reactor-core - Core types for the reactor console
//!
//! This crate provides the shared domain types used by the bus layer, the
//! console runtime and the daemon: the backend game-state document, the
//! commit/arm state machine and the backend client abstraction.

pub mod backend;
pub mod commit;
pub mod error;
pub mod state;

pub use backend::GameBackend;
pub use commit::CommitState;
pub use error::{SyncError, SyncResult};
pub use state::{GameState, GameStatus};
