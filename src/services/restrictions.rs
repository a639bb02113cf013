//! Gate consulted before a player is handed to the engine, and post-game bookkeeping.

use std::{fmt, sync::Arc};

use futures::{FutureExt, future::BoxFuture};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        challenge_store::ChallengeStore,
        models::{AttemptEntity, EarnedRewardEntity},
        storage::StorageError,
    },
    dto::format_timestamp,
    quiz::PrizeDistribution,
    room::RewardsSink,
};

/// Why a user may not play a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestrictionReason {
    /// The user already won a share of this challenge's prize.
    RewardAlreadyEarned { earned_at: OffsetDateTime },
    /// Every allowed attempt was played.
    AttemptsExhausted { attempts: u32, max_attempts: u32 },
}

impl fmt::Display for RestrictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestrictionReason::RewardAlreadyEarned { earned_at } => write!(
                f,
                "reward already earned at {}",
                format_timestamp(*earned_at)
            ),
            RestrictionReason::AttemptsExhausted {
                attempts,
                max_attempts,
            } => write!(f, "{attempts} of {max_attempts} attempts used"),
        }
    }
}

/// Outcome of a restriction check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restriction {
    /// The user may join a room.
    Allowed,
    /// The user may not play, for the given reason.
    Restricted(RestrictionReason),
}

/// Failures of a restriction check or of bookkeeping writes.
#[derive(Debug, Error)]
pub enum RestrictionError {
    #[error("challenge store unavailable")]
    Storage(#[from] StorageError),
    #[error("challenge `{0}` not found")]
    ChallengeNotFound(Uuid),
    /// Raised instead of [`Restriction::Restricted`] when access was mandatory.
    #[error("access denied: {0}")]
    Denied(RestrictionReason),
}

/// Reward/attempt history checks backed by the challenge store.
#[derive(Clone)]
pub struct RestrictionManager {
    store: Arc<dyn ChallengeStore>,
}

impl RestrictionManager {
    /// Gate backed by `store`.
    pub fn new(store: Arc<dyn ChallengeStore>) -> Self {
        Self { store }
    }

    /// Decide whether `user_id` may play `challenge_id`.
    ///
    /// A user who already earned a reward, or used every allowed attempt, is restricted. With
    /// `must_access` the restriction is reported as [`RestrictionError::Denied`] so callers that
    /// cannot proceed without access can simply propagate it.
    pub async fn is_user_restricted(
        &self,
        challenge_id: Uuid,
        user_id: Uuid,
        must_access: bool,
    ) -> Result<Restriction, RestrictionError> {
        let challenge = self
            .store
            .get_raw_challenge(challenge_id)
            .await?
            .ok_or(RestrictionError::ChallengeNotFound(challenge_id))?;

        let restriction = if let Some(reward) = self
            .store
            .find_earned_reward(challenge_id, user_id)
            .await?
        {
            Restriction::Restricted(RestrictionReason::RewardAlreadyEarned {
                earned_at: reward.earned_at,
            })
        } else if let Some(max_attempts) = challenge.user_max_attempts {
            let attempts = self.store.count_attempts(challenge_id, user_id).await?;
            if attempts >= max_attempts {
                Restriction::Restricted(RestrictionReason::AttemptsExhausted {
                    attempts,
                    max_attempts,
                })
            } else {
                Restriction::Allowed
            }
        } else {
            Restriction::Allowed
        };

        match restriction {
            Restriction::Restricted(reason) if must_access => {
                info!(challenge_id = %challenge_id, user_id = %user_id, %reason, "access denied");
                Err(RestrictionError::Denied(reason))
            }
            other => Ok(other),
        }
    }

    /// Record that `user_id` won `amount` in `challenge_id`.
    pub async fn register_earned_reward(
        &self,
        challenge_id: Uuid,
        user_id: Uuid,
        amount: f64,
    ) -> Result<(), RestrictionError> {
        self.store
            .register_earned_reward(EarnedRewardEntity {
                challenge_id,
                user_id,
                amount,
                earned_at: OffsetDateTime::now_utc(),
            })
            .await?;
        Ok(())
    }

    /// Count one more played game for `user_id`.
    pub async fn register_attempt(&self, challenge_id: Uuid, user_id: Uuid) -> Result<(), RestrictionError> {
        self.store
            .register_attempt(AttemptEntity {
                challenge_id,
                user_id,
                attempted_at: OffsetDateTime::now_utc(),
            })
            .await?;
        Ok(())
    }
}

impl RewardsSink for RestrictionManager {
    fn settle(
        &self,
        challenge_id: Uuid,
        distribution: PrizeDistribution,
        participants: Vec<Uuid>,
    ) -> BoxFuture<'static, Result<(), StorageError>> {
        let manager = self.clone();
        async move {
            let total = participants.len() + distribution.len();
            let mut failed = 0;
            for user_id in participants {
                if let Err(err) = manager.register_attempt(challenge_id, user_id).await {
                    warn!(challenge_id = %challenge_id, user_id = %user_id, error = %err, "failed to record attempt");
                    failed += 1;
                }
            }
            for (user_id, amount) in distribution {
                if let Err(err) = manager
                    .register_earned_reward(challenge_id, user_id, amount)
                    .await
                {
                    warn!(challenge_id = %challenge_id, user_id = %user_id, amount, error = %err, "failed to record reward");
                    failed += 1;
                }
            }
            if failed > 0 {
                return Err(StorageError::Incomplete { failed, total });
            }
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::atomic::{AtomicBool, Ordering},
    };

    use super::*;
    use crate::{
        dao::{
            challenge_store::InMemoryChallengeStore,
            models::{QuestionEntity, RawChallenge},
            storage::StorageResult,
        },
        quiz::questions::fixtures,
    };

    /// Delegates to the in-memory store but loses the first reward write.
    struct DropsFirstReward {
        inner: InMemoryChallengeStore,
        tripped: AtomicBool,
    }

    impl ChallengeStore for DropsFirstReward {
        fn get_raw_challenge(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RawChallenge>>> {
            self.inner.get_raw_challenge(id)
        }

        fn get_questions(&self, challenge_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
            self.inner.get_questions(challenge_id)
        }

        fn find_earned_reward(
            &self,
            challenge_id: Uuid,
            user_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<EarnedRewardEntity>>> {
            self.inner.find_earned_reward(challenge_id, user_id)
        }

        fn count_attempts(&self, challenge_id: Uuid, user_id: Uuid) -> BoxFuture<'static, StorageResult<u32>> {
            self.inner.count_attempts(challenge_id, user_id)
        }

        fn register_earned_reward(&self, reward: EarnedRewardEntity) -> BoxFuture<'static, StorageResult<()>> {
            if !self.tripped.swap(true, Ordering::SeqCst) {
                let err = io::Error::new(io::ErrorKind::ConnectionReset, "connection reset");
                return async move { Err(StorageError::unavailable("reward write".into(), err)) }.boxed();
            }
            self.inner.register_earned_reward(reward)
        }

        fn register_attempt(&self, attempt: AttemptEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.register_attempt(attempt)
        }
    }

    fn setup(max_attempts: Option<u32>) -> (RestrictionManager, Uuid) {
        let store = InMemoryChallengeStore::new();
        let mut challenge = fixtures::challenge(2);
        challenge.user_max_attempts = max_attempts;
        let challenge_id = challenge.id;
        store.insert_challenge(challenge, fixtures::questions(1));
        (RestrictionManager::new(Arc::new(store)), challenge_id)
    }

    #[tokio::test]
    async fn fresh_users_are_allowed() {
        let (manager, challenge_id) = setup(Some(2));
        let restriction = manager
            .is_user_restricted(challenge_id, Uuid::new_v4(), true)
            .await
            .unwrap();
        assert_eq!(restriction, Restriction::Allowed);
    }

    #[tokio::test]
    async fn exhausted_attempts_restrict() {
        let (manager, challenge_id) = setup(Some(2));
        let user = Uuid::new_v4();
        manager.register_attempt(challenge_id, user).await.unwrap();
        assert_eq!(
            manager.is_user_restricted(challenge_id, user, false).await.unwrap(),
            Restriction::Allowed
        );

        manager.register_attempt(challenge_id, user).await.unwrap();
        assert_eq!(
            manager.is_user_restricted(challenge_id, user, false).await.unwrap(),
            Restriction::Restricted(RestrictionReason::AttemptsExhausted {
                attempts: 2,
                max_attempts: 2
            })
        );
        assert!(matches!(
            manager.is_user_restricted(challenge_id, user, true).await,
            Err(RestrictionError::Denied(RestrictionReason::AttemptsExhausted { .. }))
        ));
    }

    #[tokio::test]
    async fn earned_reward_restricts_even_without_attempt_limit() {
        let (manager, challenge_id) = setup(None);
        let user = Uuid::new_v4();
        manager
            .register_earned_reward(challenge_id, user, 42.0)
            .await
            .unwrap();

        assert!(matches!(
            manager.is_user_restricted(challenge_id, user, false).await,
            Ok(Restriction::Restricted(RestrictionReason::RewardAlreadyEarned { .. }))
        ));
    }

    #[tokio::test]
    async fn settle_records_attempts_and_rewards() {
        let (manager, challenge_id) = setup(Some(5));
        let (winner, loser) = (Uuid::new_v4(), Uuid::new_v4());
        let mut distribution = PrizeDistribution::new();
        distribution.insert(winner, 250.0);

        manager
            .settle(challenge_id, distribution, vec![winner, loser])
            .await
            .unwrap();

        assert!(matches!(
            manager.is_user_restricted(challenge_id, winner, false).await,
            Ok(Restriction::Restricted(RestrictionReason::RewardAlreadyEarned { .. }))
        ));
        assert_eq!(
            manager.is_user_restricted(challenge_id, loser, false).await.unwrap(),
            Restriction::Allowed
        );
        assert_eq!(
            manager.store.count_attempts(challenge_id, loser).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn settle_keeps_recording_after_a_failed_reward() {
        let inner = InMemoryChallengeStore::new();
        let challenge = fixtures::challenge(2);
        let challenge_id = challenge.id;
        inner.insert_challenge(challenge, fixtures::questions(1));
        let store = Arc::new(DropsFirstReward {
            inner: inner.clone(),
            tripped: AtomicBool::new(false),
        });
        let manager = RestrictionManager::new(store);

        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let mut distribution = PrizeDistribution::new();
        distribution.insert(first, 150.0);
        distribution.insert(second, 100.0);

        let result = manager
            .settle(challenge_id, distribution, vec![first, second])
            .await;
        assert!(matches!(
            result,
            Err(StorageError::Incomplete { failed: 1, total: 4 })
        ));

        assert!(inner.find_earned_reward(challenge_id, first).await.unwrap().is_none());
        let reward = inner
            .find_earned_reward(challenge_id, second)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reward.amount, 100.0);
        assert_eq!(inner.count_attempts(challenge_id, first).await.unwrap(), 1);
        assert_eq!(inner.count_attempts(challenge_id, second).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_challenge_is_an_error() {
        let (manager, _) = setup(None);
        assert!(matches!(
            manager
                .is_user_restricted(Uuid::new_v4(), Uuid::new_v4(), false)
                .await,
            Err(RestrictionError::ChallengeNotFound(_))
        ));
    }
}
