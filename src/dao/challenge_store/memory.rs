use std::{fs, path::Path, sync::Arc};

use dashmap::DashMap;
use futures::{FutureExt, future::BoxFuture};
use tracing::info;
use uuid::Uuid;

use crate::dao::{
    challenge_store::ChallengeStore,
    models::{AttemptEntity, ChallengeFixture, EarnedRewardEntity, QuestionEntity, RawChallenge},
    storage::{StorageError, StorageResult},
};

/// Process-local challenge store, seeded from fixtures.
#[derive(Clone, Default)]
pub struct InMemoryChallengeStore {
    challenges: Arc<DashMap<Uuid, RawChallenge>>,
    questions: Arc<DashMap<Uuid, Vec<QuestionEntity>>>,
    rewards: Arc<DashMap<(Uuid, Uuid), EarnedRewardEntity>>,
    attempts: Arc<DashMap<(Uuid, Uuid), Vec<AttemptEntity>>>,
}

impl InMemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a challenge together with its questions.
    pub fn insert_challenge(&self, challenge: RawChallenge, questions: Vec<QuestionEntity>) {
        self.questions.insert(challenge.id, questions);
        self.challenges.insert(challenge.id, challenge);
    }

    /// Load a JSON array of [`ChallengeFixture`] documents.
    pub fn load_fixtures(&self, path: &Path) -> StorageResult<usize> {
        let contents = fs::read_to_string(path).map_err(|err| {
            StorageError::unavailable(format!("reading {}", path.display()), err)
        })?;
        let fixtures: Vec<ChallengeFixture> = serde_json::from_str(&contents)
            .map_err(|err| StorageError::Malformed(format!("{}: {err}", path.display())))?;

        let count = fixtures.len();
        for fixture in fixtures {
            self.insert_challenge(fixture.challenge, fixture.questions);
        }
        info!(path = %path.display(), count, "loaded challenge fixtures");
        Ok(count)
    }
}

impl ChallengeStore for InMemoryChallengeStore {
    fn get_raw_challenge(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RawChallenge>>> {
        let found = self.challenges.get(&id).map(|entry| entry.value().clone());
        async move { Ok(found) }.boxed()
    }

    fn get_questions(&self, challenge_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let found = self
            .questions
            .get(&challenge_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        async move { Ok(found) }.boxed()
    }

    fn find_earned_reward(
        &self,
        challenge_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<EarnedRewardEntity>>> {
        let found = self
            .rewards
            .get(&(challenge_id, user_id))
            .map(|entry| entry.value().clone());
        async move { Ok(found) }.boxed()
    }

    fn count_attempts(&self, challenge_id: Uuid, user_id: Uuid) -> BoxFuture<'static, StorageResult<u32>> {
        let count = self
            .attempts
            .get(&(challenge_id, user_id))
            .map(|entry| entry.len() as u32)
            .unwrap_or(0);
        async move { Ok(count) }.boxed()
    }

    fn register_earned_reward(&self, reward: EarnedRewardEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.rewards
            .insert((reward.challenge_id, reward.user_id), reward);
        async { Ok(()) }.boxed()
    }

    fn register_attempt(&self, attempt: AttemptEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.attempts
            .entry((attempt.challenge_id, attempt.user_id))
            .or_default()
            .push(attempt);
        async { Ok(()) }.boxed()
    }
}
