use std::{collections::HashSet, sync::Arc};

use dashmap::DashMap;
use futures::{FutureExt, future::BoxFuture};
use uuid::Uuid;

use crate::dao::storage::StorageResult;

/// Side-channel mirror of room occupancy, queryable without touching a room.
pub trait RoomMembershipStore: Send + Sync {
    /// Record that `user_id` sits in a room of `challenge_id`.
    fn register_new_player(&self, challenge_id: Uuid, user_id: Uuid) -> BoxFuture<'static, StorageResult<()>>;
    /// Forget the player; unknown players are ignored.
    fn unregister_player(&self, challenge_id: Uuid, user_id: Uuid) -> BoxFuture<'static, StorageResult<()>>;
    fn count_players(&self, challenge_id: Uuid) -> BoxFuture<'static, StorageResult<usize>>;
}

/// Membership store kept in process memory.
#[derive(Clone, Default)]
pub struct InMemoryRoomMembers {
    members: Arc<DashMap<Uuid, HashSet<Uuid>>>,
}

impl InMemoryRoomMembers {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoomMembershipStore for InMemoryRoomMembers {
    fn register_new_player(&self, challenge_id: Uuid, user_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        self.members.entry(challenge_id).or_default().insert(user_id);
        async { Ok(()) }.boxed()
    }

    fn unregister_player(&self, challenge_id: Uuid, user_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        if let Some(mut room) = self.members.get_mut(&challenge_id) {
            room.remove(&user_id);
        }
        self.members.remove_if(&challenge_id, |_, room| room.is_empty());
        async { Ok(()) }.boxed()
    }

    fn count_players(&self, challenge_id: Uuid) -> BoxFuture<'static, StorageResult<usize>> {
        let count = self
            .members
            .get(&challenge_id)
            .map(|room| room.len())
            .unwrap_or(0);
        async move { Ok(count) }.boxed()
    }
}
