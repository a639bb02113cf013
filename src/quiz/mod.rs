//! Scoring core of a room: cells, the result table, the question set and their composition.

pub mod cell;
pub mod questions;
pub mod quiz_engine;
pub mod result_table;

pub use self::cell::Cell;
pub use self::questions::{QuestionContainer, QuestionError};
pub use self::quiz_engine::{AnswerOutcome, QuizEngine, QuizError};
pub use self::result_table::{PrizeDistribution, ResultTable, ResultTableConfig, ResultTableError};
