use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::quiz::{
    cell::Cell,
    questions::{QuestionContainer, QuestionError},
    result_table::{PrizeDistribution, ResultTable, ResultTableConfig, ResultTableError},
};

/// Errors of answer checking and scoring.
#[derive(Debug, Error)]
pub enum QuizError {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Table(#[from] ResultTableError),
}

/// Verdict returned to the room after an answer was scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub question_num: usize,
    pub cell: Cell,
}

impl AnswerOutcome {
    /// Shortcut for the scored cell's correctness.
    pub fn is_correct(&self) -> bool {
        self.cell.is_correct()
    }
}

/// Questions and results of one room behind a single contract.
///
/// Owned by the room task; nothing here is shared across tasks.
#[derive(Debug)]
pub struct QuizEngine {
    questions: QuestionContainer,
    table: ResultTable,
}

impl QuizEngine {
    /// Result table sized from the challenge behind `questions`.
    pub fn new(questions: QuestionContainer, winners_num: usize) -> Self {
        let challenge = questions.challenge();
        let table = ResultTable::new(ResultTableConfig {
            question_num: questions.len(),
            winners_num,
            prize_pool: challenge.prize_pool_amount,
            time_per_question_sec: challenge.time_per_question_sec,
        });
        Self { questions, table }
    }

    pub fn questions(&self) -> &QuestionContainer {
        &self.questions
    }

    /// Open an empty result row for a joining player.
    pub fn register_player(&mut self, user_id: Uuid) {
        self.table.register_player(user_id);
    }

    /// Resolve correctness and question number, then record the answer.
    pub fn check_and_register_answer(
        &mut self,
        question_id: Uuid,
        answer_id: Uuid,
        user_id: Uuid,
        answered_at: OffsetDateTime,
    ) -> Result<AnswerOutcome, QuizError> {
        let is_correct = self.questions.check_answer(question_id, answer_id)?;
        let question_num = self.questions.get_question_num_by_id(question_id)?;
        let cell = self
            .table
            .register_answer(user_id, question_num, is_correct, answered_at)?;
        Ok(AnswerOutcome { question_num, cell })
    }

    pub fn register_question_sending_event(&mut self, question_num: usize) -> Result<(), QuizError> {
        Ok(self.table.register_question_sending_event(question_num)?)
    }

    pub fn get_answer(&self, user_id: Uuid, question_num: usize) -> Result<Cell, QuizError> {
        Ok(self.table.get_answer(user_id, question_num)?)
    }

    pub fn get_prize_pool_distribution(&self) -> PrizeDistribution {
        self.table.get_prize_pool_distribution()
    }
}
