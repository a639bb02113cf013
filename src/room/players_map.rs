use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::{membership::RoomMembershipStore, storage::StorageResult},
    dto::ws::Message,
    player::SharedPlayer,
};

/// Players of one room in join order, mirrored into the membership store.
pub struct PlayersMap {
    challenge_id: Uuid,
    players: Mutex<IndexMap<Uuid, SharedPlayer>>,
    membership: Arc<dyn RoomMembershipStore>,
}

impl PlayersMap {
    /// Empty map for one room of `challenge_id`.
    pub fn new(challenge_id: Uuid, membership: Arc<dyn RoomMembershipStore>) -> Self {
        Self {
            challenge_id,
            players: Mutex::new(IndexMap::new()),
            membership,
        }
    }

    /// Register a player, store first so the in-memory map never runs ahead of it.
    pub async fn add(&self, player: SharedPlayer) -> StorageResult<()> {
        let user_id = player.id();
        self.membership
            .register_new_player(self.challenge_id, user_id)
            .await?;
        self.lock().insert(user_id, player);
        debug!(challenge_id = %self.challenge_id, user_id = %user_id, "player registered");
        Ok(())
    }

    /// Unregister a player; `None` when it was not in the room.
    pub async fn remove(&self, user_id: Uuid) -> StorageResult<Option<SharedPlayer>> {
        let removed = self.lock().shift_remove(&user_id);
        if removed.is_some() {
            self.membership
                .unregister_player(self.challenge_id, user_id)
                .await?;
        }
        Ok(removed)
    }

    pub fn get(&self, user_id: Uuid) -> Option<SharedPlayer> {
        self.lock().get(&user_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the players in join order.
    pub fn all(&self) -> Vec<SharedPlayer> {
        self.lock().values().cloned().collect()
    }

    pub fn username(&self, user_id: Uuid) -> Option<String> {
        self.lock()
            .get(&user_id)
            .map(|player| player.username().to_string())
    }

    /// Send a message to every player, logging those that cannot be reached.
    pub fn broadcast(&self, message: &Message) {
        for player in self.all() {
            if let Err(err) = player.send_message(message) {
                warn!(
                    challenge_id = %self.challenge_id,
                    user_id = %player.id(),
                    error = %err,
                    "failed to deliver room message"
                );
            }
        }
    }

    /// Close and unregister everyone, leaving the map empty.
    pub async fn drain(&self) {
        let players: Vec<SharedPlayer> = self.lock().drain(..).map(|(_, player)| player).collect();
        for player in players {
            let user_id = player.id();
            if let Err(err) = player.close().await {
                warn!(user_id = %user_id, error = %err, "failed to close player");
            }
            if let Err(err) = self
                .membership
                .unregister_player(self.challenge_id, user_id)
                .await
            {
                warn!(user_id = %user_id, error = %err, "failed to unregister player");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<Uuid, SharedPlayer>> {
        self.players.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
