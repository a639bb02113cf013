//! Per-room matrix of scored answers and the prize pool split derived from it.

use indexmap::IndexMap;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::quiz::cell::Cell;

/// Prize amount per winning user, highest ranked first.
pub type PrizeDistribution = IndexMap<Uuid, f64>;

/// Static parameters of a result table.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTableConfig {
    pub question_num: usize,
    pub winners_num: usize,
    pub prize_pool: f64,
    pub time_per_question_sec: i64,
}

/// Lookup and registration failures of a [`ResultTable`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResultTableError {
    /// The question index is past the last column.
    #[error("question index {index} out of range (question count {len})")]
    IndexOutOfRange { index: usize, len: usize },
    /// The user never joined the room.
    #[error("row not found for user {0}")]
    RowNotFound(Uuid),
    /// The user has not answered that question.
    #[error("cell not found for user {user_id} at question {question_num}")]
    CellNotFound { user_id: Uuid, question_num: usize },
    /// Answers are only accepted once the question went out.
    #[error("question {0} has not been sent yet")]
    QuestionNotSent(usize),
    /// Only the first answer of a user counts.
    #[error("user {user_id} already answered question {question_num}")]
    AlreadyAnswered { user_id: Uuid, question_num: usize },
}

/// Answers of every player of a room, one row per player and one cell per question.
///
/// Rows keep insertion order, which doubles as the tie-break when ranking players with
/// equal points: the player whose row was created first ranks higher.
#[derive(Debug, Clone)]
pub struct ResultTable {
    config: ResultTableConfig,
    table: IndexMap<Uuid, Vec<Option<Cell>>>,
    question_sent_at: Vec<Option<OffsetDateTime>>,
}

impl ResultTable {
    /// Empty table sized for `config.question_num` questions.
    pub fn new(config: ResultTableConfig) -> Self {
        let question_sent_at = vec![None; config.question_num];
        Self {
            config,
            table: IndexMap::new(),
            question_sent_at,
        }
    }

    /// Create an empty row for a player who joined, if none exists yet.
    pub fn register_player(&mut self, user_id: Uuid) {
        let question_num = self.config.question_num;
        self.table
            .entry(user_id)
            .or_insert_with(|| vec![None; question_num]);
    }

    /// Record the current time as the moment question `question_num` went out.
    pub fn register_question_sending_event(&mut self, question_num: usize) -> Result<(), ResultTableError> {
        self.register_question_sending_event_at(question_num, OffsetDateTime::now_utc())
    }

    pub fn register_question_sending_event_at(
        &mut self,
        question_num: usize,
        sent_at: OffsetDateTime,
    ) -> Result<(), ResultTableError> {
        let len = self.question_sent_at.len();
        let slot = self
            .question_sent_at
            .get_mut(question_num)
            .ok_or(ResultTableError::IndexOutOfRange {
                index: question_num,
                len,
            })?;
        *slot = Some(sent_at);
        Ok(())
    }

    /// Score and store an answer, returning the stored cell.
    pub fn register_answer(
        &mut self,
        user_id: Uuid,
        question_num: usize,
        is_correct: bool,
        answered_at: OffsetDateTime,
    ) -> Result<Cell, ResultTableError> {
        let sent_at = self
            .question_sent_at
            .get(question_num)
            .copied()
            .ok_or(ResultTableError::IndexOutOfRange {
                index: question_num,
                len: self.question_sent_at.len(),
            })?
            .ok_or(ResultTableError::QuestionNotSent(question_num))?;

        let is_first_correct_answer = is_correct && !self.has_correct_answer(question_num);

        self.register_player(user_id);
        let slot = self
            .table
            .get_mut(&user_id)
            .and_then(|row| row.get_mut(question_num))
            .ok_or(ResultTableError::CellNotFound {
                user_id,
                question_num,
            })?;
        if slot.is_some() {
            return Err(ResultTableError::AlreadyAnswered {
                user_id,
                question_num,
            });
        }

        let cell = Cell::new(
            is_correct,
            is_first_correct_answer,
            sent_at,
            answered_at,
            self.config.time_per_question_sec,
        );
        *slot = Some(cell);
        Ok(cell)
    }

    /// Cell of a user for a question; unanswered questions read as [`Cell::default`].
    pub fn get_answer(&self, user_id: Uuid, question_num: usize) -> Result<Cell, ResultTableError> {
        let row = self
            .table
            .get(&user_id)
            .ok_or(ResultTableError::RowNotFound(user_id))?;
        row.get(question_num)
            .map(|cell| cell.unwrap_or_default())
            .ok_or(ResultTableError::CellNotFound {
                user_id,
                question_num,
            })
    }

    /// Total points per user, in row order.
    pub fn points(&self) -> IndexMap<Uuid, u32> {
        self.table
            .iter()
            .map(|(user_id, row)| (*user_id, row.iter().flatten().map(Cell::pts).sum::<u32>()))
            .collect()
    }

    /// Top `winners_num` users by points; users without points never win.
    pub fn winners(&self) -> Vec<(Uuid, u32)> {
        let mut ranking: Vec<(Uuid, u32)> = self
            .points()
            .into_iter()
            .filter(|(_, points)| *points > 0)
            .collect();
        // Stable sort keeps row order among equal scores.
        ranking.sort_by(|a, b| b.1.cmp(&a.1));
        ranking.truncate(self.config.winners_num);
        ranking
    }

    /// Split the prize pool between the winners proportionally to their points.
    pub fn get_prize_pool_distribution(&self) -> PrizeDistribution {
        let winners = self.winners();
        let total: u32 = winners.iter().map(|(_, points)| points).sum();
        if total == 0 {
            return PrizeDistribution::new();
        }

        let per_point = self.config.prize_pool / f64::from(total);
        winners
            .into_iter()
            .map(|(user_id, points)| (user_id, per_point * f64::from(points)))
            .collect()
    }

    fn has_correct_answer(&self, question_num: usize) -> bool {
        self.table.values().any(|row| {
            row.get(question_num)
                .and_then(|cell| cell.as_ref())
                .is_some_and(Cell::is_correct)
        })
    }
}
