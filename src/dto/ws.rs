use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{dao::models::QuestionEntity, dto::validation::validate_username};

/// Payload exchanged with a player over whatever transport carries it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Someone entered the room.
    PlayerJoined {
        user_id: Uuid,
        username: String,
        players_count: usize,
    },
    /// Seconds left before the first question.
    Countdown { seconds_left: u32 },
    Question(QuestionPayload),
    /// Answer submitted by a player. Identifiers stay raw until the room parses them.
    Answer {
        user_id: String,
        question_id: String,
        answer_id: String,
    },
    /// Private verdict for the player who answered.
    AnswerReply {
        question_id: Uuid,
        success: bool,
        segment: u8,
        is_fastest: bool,
        points: u32,
    },
    /// Final standings: username to prize amount, best ranked first.
    WinnersTable { winners: IndexMap<String, f64> },
    /// The room for this challenge already started without the player.
    RoomUnavailable { challenge_id: Uuid },
    #[serde(other)]
    Unknown,
}

impl Message {
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Question as shown to players, without the correctness flags.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct QuestionPayload {
    pub question_id: Uuid,
    pub question: String,
    /// Zero-based position in the challenge.
    pub question_num: usize,
    pub questions_total: usize,
    pub time_for_answer: u32,
    pub answer_options: Vec<AnswerOptionPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AnswerOptionPayload {
    pub id: Uuid,
    pub option: String,
}

impl QuestionPayload {
    pub fn from_entity(entity: &QuestionEntity, question_num: usize, questions_total: usize) -> Self {
        Self {
            question_id: entity.id,
            question: entity.question.clone(),
            question_num,
            questions_total,
            time_for_answer: entity.time_for_answer,
            answer_options: entity
                .answer_options
                .iter()
                .map(|option| AnswerOptionPayload {
                    id: option.id,
                    option: option.option.clone(),
                })
                .collect(),
        }
    }
}

/// First frame a WebSocket client must send.
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct Identification {
    pub user_id: Uuid,
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    pub challenge_id: Uuid,
}

#[derive(Debug, Error)]
pub enum IdentificationError {
    #[error("malformed identification: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid identification: {0}")]
    Invalid(#[from] ValidationErrors),
}

impl Identification {
    /// Parse and validate an identification frame.
    pub fn from_json_str(raw: &str) -> Result<Self, IdentificationError> {
        let identification: Self = serde_json::from_str(raw)?;
        identification.validate()?;
        Ok(identification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_messages_keep_raw_identifiers() {
        let raw = r#"{"type":"answer","user_id":"not-a-uuid","question_id":"q","answer_id":"a"}"#;
        assert_eq!(
            Message::from_json_str(raw).unwrap(),
            Message::Answer {
                user_id: "not-a-uuid".into(),
                question_id: "q".into(),
                answer_id: "a".into(),
            }
        );
    }

    #[test]
    fn unknown_kinds_are_tolerated() {
        let raw = r#"{"type":"emoji"}"#;
        assert_eq!(Message::from_json_str(raw).unwrap(), Message::Unknown);
    }

    #[test]
    fn winners_table_serializes_in_rank_order() {
        let mut winners = IndexMap::new();
        winners.insert("zoe".to_string(), 150.0);
        winners.insert("adam".to_string(), 100.0);
        let json = serde_json::to_string(&Message::WinnersTable { winners }).unwrap();
        assert_eq!(
            json,
            r#"{"type":"winners_table","winners":{"zoe":150.0,"adam":100.0}}"#
        );
    }

    #[test]
    fn identification_rejects_blank_usernames() {
        let raw = format!(
            r#"{{"user_id":"{}","username":"  ","challenge_id":"{}"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        assert!(matches!(
            Identification::from_json_str(&raw),
            Err(IdentificationError::Invalid(_))
        ));
    }
}
