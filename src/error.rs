use thiserror::Error;
use uuid::Uuid;

use crate::room::RoomError;

/// Errors reported back to callers of the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// `start` was called on an engine that is already running.
    #[error("engine already started")]
    AlreadyStarted,
    /// The engine loop is not accepting players (closed or never started and dropped).
    #[error("engine is not running")]
    NotRunning,
    /// No room could be opened or joined for the player's challenge.
    #[error("no room available for challenge `{challenge_id}`")]
    Room {
        challenge_id: Uuid,
        #[source]
        source: RoomError,
    },
}
