//! GameBackend trait - the abstraction over the game-state server
//!
//! The central backend owns one state document per task box. Different
//! deployments talk to it differently (HTTP in production, a state file
//! during bench testing), so the sync layer works against this trait.

use async_trait::async_trait;

use crate::error::SyncResult;
use crate::state::GameState;

/// Client-side view of the game-state backend.
///
/// Implementations must be cheap to share (`Arc<dyn GameBackend>`); the
/// task runner is the only caller but effects may hold a clone.
#[async_trait]
pub trait GameBackend: Send + Sync {
    /// Identifier of this task box in the backend
    fn box_id(&self) -> &str;

    /// Fetch the current state document.
    ///
    /// `None` means the backend has no document for this box yet; the
    /// runtime then falls back to a hardcoded initial state.
    async fn read(&self) -> SyncResult<Option<GameState>>;

    /// Write the state document back.
    ///
    /// Fails with [`SyncError::ConcurrentModification`] when the backend
    /// copy changed since the last read; the caller must discard its local
    /// state and re-poll.
    ///
    /// [`SyncError::ConcurrentModification`]: crate::error::SyncError::ConcurrentModification
    async fn write(&self, state: &GameState) -> SyncResult<()>;
}
