//! Scoring unit for one player's answer to one question.

use time::{Duration, OffsetDateTime};

/// Number of equal slices the answer window is cut into.
pub const SEGMENTS: i64 = 4;
/// Points granted to every correct answer before bonuses.
const BASE_POINTS: u32 = 1;
/// Extra points for the first correct answer of the room on a question.
const FIRST_CORRECT_BONUS: u32 = 2;

/// Immutable outcome of a single answer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    is_correct: bool,
    is_first_correct_answer: bool,
    question_sent_at: OffsetDateTime,
    answered_at: OffsetDateTime,
    time_per_question_seconds: i64,
}

impl Cell {
    /// Capture an answer event together with the window it was scored against.
    pub fn new(
        is_correct: bool,
        is_first_correct_answer: bool,
        question_sent_at: OffsetDateTime,
        answered_at: OffsetDateTime,
        time_per_question_seconds: i64,
    ) -> Self {
        Self {
            is_correct,
            is_first_correct_answer,
            question_sent_at,
            answered_at,
            time_per_question_seconds,
        }
    }

    /// Whether the chosen option was a correct one.
    pub fn is_correct(&self) -> bool {
        self.is_correct
    }

    /// Whether this was the room's first correct answer to the question.
    pub fn is_first_correct_answer(&self) -> bool {
        self.is_first_correct_answer
    }

    /// Server time the answer was registered.
    pub fn answered_at(&self) -> OffsetDateTime {
        self.answered_at
    }

    /// Quartile of the answer window the answer landed in, from 1 (fastest) to 4.
    ///
    /// Answers registered before the send timestamp count as segment 1, answers after the
    /// window as segment 4. A non-positive window has no speed bonus at all.
    pub fn find_segment_num(&self) -> u8 {
        if self.time_per_question_seconds <= 0 {
            return SEGMENTS as u8;
        }

        let elapsed = self.answered_at - self.question_sent_at;
        if elapsed <= Duration::ZERO {
            return 1;
        }

        let window = Duration::seconds(self.time_per_question_seconds);
        // elapsed * SEGMENTS / window, computed in nanoseconds to keep sub-second precision.
        let slice = elapsed.whole_nanoseconds() * i128::from(SEGMENTS) / window.whole_nanoseconds();
        (slice.clamp(0, i128::from(SEGMENTS) - 1) + 1) as u8
    }

    /// Points earned by this answer; zero whenever the answer is wrong.
    pub fn pts(&self) -> u32 {
        if !self.is_correct {
            return 0;
        }

        let first_bonus = if self.is_first_correct_answer {
            FIRST_CORRECT_BONUS
        } else {
            0
        };
        BASE_POINTS + segment_bonus(self.find_segment_num()) + first_bonus
    }
}

impl Default for Cell {
    /// Placeholder for a question the user has not answered.
    fn default() -> Self {
        Self::new(
            false,
            false,
            OffsetDateTime::UNIX_EPOCH,
            OffsetDateTime::UNIX_EPOCH,
            0,
        )
    }
}

/// Speed bonus for a segment: 3 for the fastest quartile down to 0 for the slowest.
pub fn segment_bonus(segment: u8) -> u32 {
    match segment {
        1 => 3,
        2 => 2,
        3 => 1,
        _ => 0,
    }
}
