pub mod memory;

use crate::dao::models::{AttemptEntity, EarnedRewardEntity, QuestionEntity, RawChallenge};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

pub use self::memory::InMemoryChallengeStore;

/// Abstraction over the challenges service: challenge metadata, question sets and
/// the reward/attempt bookkeeping consulted before and after a room runs.
pub trait ChallengeStore: Send + Sync {
    fn get_raw_challenge(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RawChallenge>>>;
    /// Questions of the challenge, in no particular order.
    fn get_questions(&self, challenge_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>>;
    fn find_earned_reward(
        &self,
        challenge_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<EarnedRewardEntity>>>;
    fn count_attempts(&self, challenge_id: Uuid, user_id: Uuid) -> BoxFuture<'static, StorageResult<u32>>;
    fn register_earned_reward(&self, reward: EarnedRewardEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn register_attempt(&self, attempt: AttemptEntity) -> BoxFuture<'static, StorageResult<()>>;
}
