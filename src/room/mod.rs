//! Per-challenge game rooms: lifecycle status, player registry and the room event loop.

pub mod default_room;
pub mod players_map;
pub mod status;

use std::sync::Arc;

use futures::{FutureExt, future::BoxFuture};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    config::RoomConfig,
    dao::{challenge_store::ChallengeStore, membership::RoomMembershipStore, storage::StorageError},
    player::SharedPlayer,
    quiz::{PrizeDistribution, QuestionContainer, QuestionError},
};

pub use self::default_room::DefaultRoom;
pub use self::players_map::PlayersMap;
pub use self::status::{InvalidTransition, RoomStatus, StatusTransactor};

/// Shared handle to a running room.
pub type SharedRoom = Arc<dyn Room>;

/// Failures of room creation and of handing players to a room.
#[derive(Debug, Error)]
pub enum RoomError {
    /// The challenge could not be loaded; no room is started.
    #[error("failed to load challenge questions")]
    Questions(#[from] QuestionError),
    /// The membership store rejected a write.
    #[error("room storage unavailable")]
    Storage(#[from] StorageError),
    /// The room stopped and takes no more players.
    #[error("room `{0}` is closed")]
    Closed(Uuid),
    /// The room loop was already spawned.
    #[error("room `{0}` already started")]
    AlreadyStarted(Uuid),
}

/// Contract the engine relies on to route players into a game.
pub trait Room: Send + Sync {
    /// Challenge the room plays.
    fn challenge_id(&self) -> Uuid;
    /// Unique id of this room instance.
    fn room_id(&self) -> Uuid;
    /// Queue a player for the room loop. Fails once the room is closed.
    fn add_player(&self, player: SharedPlayer) -> BoxFuture<'_, Result<(), RoomError>>;
    /// Whether the player threshold is reached.
    fn is_full(&self) -> bool;
    /// Current lifecycle phase.
    fn status(&self) -> RoomStatus;
    /// Stop the room. Calling it again has no effect.
    fn close(&self);
    /// Receiver flipping to `true` once the room is closed.
    fn closed(&self) -> watch::Receiver<bool>;

    /// Snapshot of [`Room::closed`].
    fn is_closed(&self) -> bool {
        *self.closed().borrow()
    }
}

/// Consumer of a finished room's prize distribution.
pub trait RewardsSink: Send + Sync {
    /// Record the outcome of one game: `participants` played, `distribution` won.
    fn settle(
        &self,
        challenge_id: Uuid,
        distribution: PrizeDistribution,
        participants: Vec<Uuid>,
    ) -> BoxFuture<'static, Result<(), StorageError>>;
}

/// Builds and starts rooms on behalf of the engine.
pub trait RoomFactory: Send + Sync {
    /// Open a running room for `challenge_id`.
    fn create(&self, challenge_id: Uuid) -> BoxFuture<'_, Result<SharedRoom, RoomError>>;
}

/// Production factory: loads the challenge, then starts a [`DefaultRoom`].
pub struct DefaultRoomFactory {
    challenges: Arc<dyn ChallengeStore>,
    membership: Arc<dyn RoomMembershipStore>,
    rewards: Arc<dyn RewardsSink>,
    config: RoomConfig,
}

impl DefaultRoomFactory {
    pub fn new(
        challenges: Arc<dyn ChallengeStore>,
        membership: Arc<dyn RoomMembershipStore>,
        rewards: Arc<dyn RewardsSink>,
        config: RoomConfig,
    ) -> Self {
        Self {
            challenges,
            membership,
            rewards,
            config,
        }
    }
}

impl RoomFactory for DefaultRoomFactory {
    fn create(&self, challenge_id: Uuid) -> BoxFuture<'_, Result<SharedRoom, RoomError>> {
        async move {
            let questions = QuestionContainer::load(self.challenges.as_ref(), challenge_id).await?;
            let room = DefaultRoom::new(
                questions,
                self.membership.clone(),
                self.rewards.clone(),
                self.config.clone(),
            );
            room.start()?;
            Ok(Arc::new(room) as SharedRoom)
        }
        .boxed()
    }
}
