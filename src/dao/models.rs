use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Challenge metadata as stored by the challenges service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawChallenge {
    /// Stable identifier for the challenge.
    pub id: Uuid,
    /// Amount split between the winners of a room.
    pub prize_pool_amount: f64,
    /// Answer window granted for every question, in seconds.
    pub time_per_question_sec: i64,
    /// Number of connected players required before the countdown starts.
    #[serde(default)]
    pub players_to_start: Option<u32>,
    /// Number of top-ranked players sharing the prize pool.
    #[serde(default)]
    pub winners_number: Option<u32>,
    /// Maximum number of games a user may play for this challenge.
    #[serde(default)]
    pub user_max_attempts: Option<u32>,
}

/// Question entry of a challenge, including the authoritative answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Stable identifier for the question.
    pub id: Uuid,
    /// Question text shown to players.
    pub question: String,
    /// Position of the question inside the challenge, starting at 1.
    pub order: u32,
    /// Answer time advertised to clients, in seconds.
    pub time_for_answer: u32,
    /// Options offered to players.
    pub answer_options: Vec<AnswerOptionEntity>,
}

/// One selectable answer of a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerOptionEntity {
    /// Stable identifier for the option.
    pub id: Uuid,
    /// Option text shown to players.
    pub option: String,
    /// Whether choosing this option is a correct answer.
    pub is_correct: bool,
}

/// Reward granted to a user at the end of a room.
#[derive(Debug, Clone, PartialEq)]
pub struct EarnedRewardEntity {
    pub challenge_id: Uuid,
    pub user_id: Uuid,
    /// Share of the prize pool won by the user.
    pub amount: f64,
    pub earned_at: OffsetDateTime,
}

/// Record of a user having played a challenge once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptEntity {
    pub challenge_id: Uuid,
    pub user_id: Uuid,
    pub attempted_at: OffsetDateTime,
}

/// Seed document describing a challenge and its questions, used by the fixture loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeFixture {
    #[serde(flatten)]
    pub challenge: RawChallenge,
    pub questions: Vec<QuestionEntity>,
}
