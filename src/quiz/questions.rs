//! Question set of a challenge together with its authoritative answers.

use std::collections::HashMap;

use thiserror::Error;
use uuid::Uuid;

use crate::dao::{
    challenge_store::ChallengeStore,
    models::{QuestionEntity, RawChallenge},
    storage::StorageError,
};

/// Failures of loading a challenge or checking an answer against it.
#[derive(Debug, Error)]
pub enum QuestionError {
    #[error("challenge store unavailable")]
    Storage(#[from] StorageError),
    #[error("challenge `{0}` not found")]
    ChallengeNotFound(Uuid),
    #[error("challenge `{0}` has no questions")]
    NoQuestions(Uuid),
    #[error("question `{question_id}` has invalid order {order} (expected 1..={count}, unique)")]
    InvalidOrder {
        question_id: Uuid,
        order: u32,
        count: usize,
    },
    #[error("question `{0}` not found")]
    QuestionNotFound(Uuid),
    #[error("answer `{answer_id}` not found for question `{question_id}`")]
    AnswerNotFound { question_id: Uuid, answer_id: Uuid },
}

/// Immutable, indexed view of a challenge's questions loaded once per room.
#[derive(Debug, Clone)]
pub struct QuestionContainer {
    challenge: RawChallenge,
    /// Questions sorted by their persisted order.
    questions: Vec<QuestionEntity>,
    /// Question id to zero-based question number.
    numbers: HashMap<Uuid, usize>,
    /// Question id to answer id to correctness.
    answers: HashMap<Uuid, HashMap<Uuid, bool>>,
}

impl QuestionContainer {
    /// Fetch challenge metadata and questions from the store and index them.
    pub async fn load(store: &dyn ChallengeStore, challenge_id: Uuid) -> Result<Self, QuestionError> {
        let challenge = store
            .get_raw_challenge(challenge_id)
            .await?
            .ok_or(QuestionError::ChallengeNotFound(challenge_id))?;
        let questions = store.get_questions(challenge_id).await?;
        Self::new(challenge, questions)
    }

    /// Index an already fetched question set.
    ///
    /// Orders must be unique and cover `1..=questions.len()` so that every question maps to
    /// exactly one result-table column.
    pub fn new(challenge: RawChallenge, mut questions: Vec<QuestionEntity>) -> Result<Self, QuestionError> {
        if questions.is_empty() {
            return Err(QuestionError::NoQuestions(challenge.id));
        }

        questions.sort_by_key(|question| question.order);
        let count = questions.len();
        let mut numbers = HashMap::with_capacity(count);
        let mut answers = HashMap::with_capacity(count);

        for (index, question) in questions.iter().enumerate() {
            if question.order as usize != index + 1 {
                return Err(QuestionError::InvalidOrder {
                    question_id: question.id,
                    order: question.order,
                    count,
                });
            }
            numbers.insert(question.id, index);
            answers.insert(
                question.id,
                question
                    .answer_options
                    .iter()
                    .map(|option| (option.id, option.is_correct))
                    .collect(),
            );
        }

        Ok(Self {
            challenge,
            questions,
            numbers,
            answers,
        })
    }

    /// Challenge metadata the questions belong to.
    pub fn challenge(&self) -> &RawChallenge {
        &self.challenge
    }

    /// Questions in the order they are streamed to players.
    pub fn questions(&self) -> &[QuestionEntity] {
        &self.questions
    }

    /// Number of questions in the challenge.
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Whether `answer_id` is a correct option of `question_id`.
    pub fn check_answer(&self, question_id: Uuid, answer_id: Uuid) -> Result<bool, QuestionError> {
        self.answers
            .get(&question_id)
            .ok_or(QuestionError::QuestionNotFound(question_id))?
            .get(&answer_id)
            .copied()
            .ok_or(QuestionError::AnswerNotFound {
                question_id,
                answer_id,
            })
    }

    /// Zero-based number of a question, derived from its 1-based order.
    pub fn get_question_num_by_id(&self, question_id: Uuid) -> Result<usize, QuestionError> {
        self.numbers
            .get(&question_id)
            .copied()
            .ok_or(QuestionError::QuestionNotFound(question_id))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use uuid::Uuid;

    use crate::dao::models::{AnswerOptionEntity, QuestionEntity, RawChallenge};

    /// Challenge used across quiz, room and engine tests.
    pub fn challenge(players_to_start: u32) -> RawChallenge {
        RawChallenge {
            id: Uuid::new_v4(),
            prize_pool_amount: 250.0,
            time_per_question_sec: 8,
            players_to_start: Some(players_to_start),
            winners_number: Some(2),
            user_max_attempts: Some(1),
        }
    }

    /// `count` questions with two options each, the first one being correct.
    pub fn questions(count: u32) -> Vec<QuestionEntity> {
        (1..=count)
            .rev()
            .map(|order| QuestionEntity {
                id: Uuid::new_v4(),
                question: format!("question #{order}"),
                order,
                time_for_answer: 8,
                answer_options: vec![
                    AnswerOptionEntity {
                        id: Uuid::new_v4(),
                        option: "right".into(),
                        is_correct: true,
                    },
                    AnswerOptionEntity {
                        id: Uuid::new_v4(),
                        option: "wrong".into(),
                        is_correct: false,
                    },
                ],
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::challenge_store::InMemoryChallengeStore;

    #[tokio::test]
    async fn load_sorts_questions_by_order() {
        let store = InMemoryChallengeStore::new();
        let challenge = fixtures::challenge(2);
        let challenge_id = challenge.id;
        store.insert_challenge(challenge, fixtures::questions(3));

        let container = QuestionContainer::load(&store, challenge_id).await.unwrap();
        let orders: Vec<u32> = container.questions().iter().map(|q| q.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);

        for (index, question) in container.questions().iter().enumerate() {
            assert_eq!(container.get_question_num_by_id(question.id).unwrap(), index);
        }
    }

    #[tokio::test]
    async fn load_fails_for_unknown_challenge() {
        let store = InMemoryChallengeStore::new();
        let missing = Uuid::new_v4();
        let err = QuestionContainer::load(&store, missing).await.unwrap_err();
        assert!(matches!(err, QuestionError::ChallengeNotFound(id) if id == missing));
    }

    #[test]
    fn check_answer_uses_the_correct_flags() {
        let container =
            QuestionContainer::new(fixtures::challenge(2), fixtures::questions(2)).unwrap();
        let question = &container.questions()[0];
        let (right, wrong) = (
            question.answer_options[0].id,
            question.answer_options[1].id,
        );

        assert!(container.check_answer(question.id, right).unwrap());
        assert!(!container.check_answer(question.id, wrong).unwrap());
        assert!(matches!(
            container.check_answer(question.id, Uuid::new_v4()),
            Err(QuestionError::AnswerNotFound { .. })
        ));
        assert!(matches!(
            container.check_answer(Uuid::new_v4(), right),
            Err(QuestionError::QuestionNotFound(_))
        ));
    }

    #[test]
    fn gaps_in_order_are_rejected() {
        let mut questions = fixtures::questions(2);
        questions[0].order = 5;
        let err = QuestionContainer::new(fixtures::challenge(2), questions).unwrap_err();
        assert!(matches!(err, QuestionError::InvalidOrder { order: 5, .. }));
    }
}
