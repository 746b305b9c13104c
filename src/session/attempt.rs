// src/session/attempt.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::session::answer::{AnswerEntry, AnswerSheet, AnswerSlot, AnswerValue};
use crate::session::question::{ExamQuestion, PublicQuestion};
use crate::session::score::{AnswerReport, ScoreSummary, score_attempt};
use crate::session::shuffle::{ShuffleMap, build_shuffle_map};

/// Lifecycle of an attempt, as a tagged union so every transition site has
/// to handle all states. `NotStarted` is what the store reports when no
/// session exists for a (user, olympiad) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AttemptStatus {
    NotStarted,
    InProgress { deadline: DateTime<Utc> },
    Submitted { summary: ScoreSummary },
}

/// Navigation direction for the question cursor.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Prev,
    Next,
}

/// Wall-clock time budget left on an attempt, never negative.
pub fn remaining_seconds(
    started_at: DateTime<Utc>,
    duration_secs: i64,
    now: DateTime<Utc>,
) -> i64 {
    (duration_secs - (now - started_at).num_seconds()).max(0)
}

/// A live attempt: the ordered question set (copied at start), the shuffle
/// map, the answer sheet, the cursor and the fixed start time.
///
/// Owned exclusively by the session store; all mutation goes through its
/// methods, so an expired or submitted attempt can never accept writes.
#[derive(Debug, Clone)]
pub struct AttemptSession {
    olympiad_id: i64,
    user_id: i64,
    questions: Vec<ExamQuestion>,
    shuffle: ShuffleMap,
    sheet: AnswerSheet,
    cursor: usize,
    started_at: DateTime<Utc>,
    duration_secs: i64,
    status: AttemptStatus,
}

/// Everything the student-facing screens need: shuffled public questions,
/// recorded answers, cursor and the ticking remainder.
#[derive(Debug, Serialize)]
pub struct AttemptView {
    pub olympiad_id: i64,
    pub status: AttemptStatus,
    pub remaining_seconds: i64,
    pub cursor: usize,
    pub questions: Vec<PublicQuestion>,
    pub answers: Vec<AnswerEntry>,
}

impl AttemptSession {
    /// Starts a fresh attempt: fixes the start time and computes the option
    /// shuffle exactly once, before the first question is shown.
    pub fn new(
        olympiad_id: i64,
        user_id: i64,
        questions: Vec<ExamQuestion>,
        duration_secs: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let shuffle = build_shuffle_map(&questions);
        AttemptSession {
            olympiad_id,
            user_id,
            questions,
            shuffle,
            sheet: AnswerSheet::new(),
            cursor: 0,
            started_at: now,
            duration_secs,
            status: AttemptStatus::InProgress {
                deadline: now + Duration::seconds(duration_secs),
            },
        }
    }

    pub fn olympiad_id(&self) -> i64 {
        self.olympiad_id
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> i64 {
        remaining_seconds(self.started_at, self.duration_secs, now)
    }

    /// True while the attempt is in progress but its time budget is spent.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            AttemptStatus::InProgress { .. } => self.remaining(now) == 0,
            AttemptStatus::NotStarted | AttemptStatus::Submitted { .. } => false,
        }
    }

    /// Records an answer. The slot must resolve to a question, sub-question
    /// or matching cell of this session's own question set.
    pub fn record(
        &mut self,
        slot: AnswerSlot,
        value: AnswerValue,
        allow_revision: bool,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        match self.status {
            AttemptStatus::NotStarted => {
                Err(AppError::Conflict("Attempt has not started".to_string()))
            }
            AttemptStatus::Submitted { .. } => Err(AppError::Conflict(
                "Attempt has already been submitted".to_string(),
            )),
            AttemptStatus::InProgress { .. } => {
                if self.remaining(now) == 0 {
                    return Err(AppError::Conflict("Time is up".to_string()));
                }
                self.validate_slot(&slot, &value)?;
                self.sheet.record(slot, value, allow_revision)
            }
        }
    }

    /// Moves the cursor one step, clamped to the question range. Has no
    /// effect on answers.
    pub fn advance(&mut self, direction: Direction) -> Result<usize, AppError> {
        match self.status {
            AttemptStatus::NotStarted => {
                Err(AppError::Conflict("Attempt has not started".to_string()))
            }
            AttemptStatus::Submitted { .. } => Err(AppError::Conflict(
                "Attempt has already been submitted".to_string(),
            )),
            AttemptStatus::InProgress { .. } => {
                let last = self.questions.len().saturating_sub(1);
                self.cursor = match direction {
                    Direction::Next => (self.cursor + 1).min(last),
                    Direction::Prev => self.cursor.saturating_sub(1),
                };
                Ok(self.cursor)
            }
        }
    }

    /// Scores the sheet and transitions to `Submitted`. Fires exactly once:
    /// a second call (from a duplicate submit or a later expiry tick) is
    /// rejected.
    pub fn finalize(&mut self) -> Result<(ScoreSummary, Vec<AnswerReport>), AppError> {
        match self.status {
            AttemptStatus::NotStarted => {
                Err(AppError::Conflict("Attempt has not started".to_string()))
            }
            AttemptStatus::Submitted { .. } => Err(AppError::Conflict(
                "Attempt has already been submitted".to_string(),
            )),
            AttemptStatus::InProgress { .. } => {
                let (summary, reports) = score_attempt(&self.questions, &self.sheet);
                self.status = AttemptStatus::Submitted { summary };
                Ok((summary, reports))
            }
        }
    }

    pub fn view(&self, now: DateTime<Utc>) -> AttemptView {
        AttemptView {
            olympiad_id: self.olympiad_id,
            status: self.status,
            remaining_seconds: self.remaining(now),
            cursor: self.cursor,
            questions: self
                .questions
                .iter()
                .map(|q| PublicQuestion::from_exam(q, &self.shuffle))
                .collect(),
            answers: self.sheet.entries(),
        }
    }

    fn validate_slot(&self, slot: &AnswerSlot, value: &AnswerValue) -> Result<(), AppError> {
        match slot {
            AnswerSlot::Question { question_id } => {
                let q = self.top_level(*question_id)?;
                if !q.sub_questions.is_empty() {
                    return Err(AppError::BadRequest(
                        "This question is answered through its sub-questions".to_string(),
                    ));
                }
                if q.kind == crate::models::question::QuestionKind::Matching {
                    return Err(AppError::BadRequest(
                        "Matching questions are answered per left item".to_string(),
                    ));
                }
                match value {
                    AnswerValue::Text(_) => Ok(()),
                    AnswerValue::Pick(_) => Err(AppError::BadRequest(
                        "This question expects a text answer".to_string(),
                    )),
                }
            }
            AnswerSlot::MatchingCell { question_id, left } => {
                let q = self.top_level(*question_id)?;
                let spec = q.matching.as_ref().ok_or_else(|| {
                    AppError::BadRequest("Not a matching question".to_string())
                })?;
                if *left >= spec.left.len() {
                    return Err(AppError::BadRequest("Unknown left item".to_string()));
                }
                match value {
                    AnswerValue::Pick(right) if *right < spec.right.len() => Ok(()),
                    AnswerValue::Pick(_) => {
                        Err(AppError::BadRequest("Unknown right item".to_string()))
                    }
                    AnswerValue::Text(_) => Err(AppError::BadRequest(
                        "Matching cells expect a right-side index".to_string(),
                    )),
                }
            }
            AnswerSlot::SubQuestion {
                question_id,
                sub_question_id,
            } => {
                let q = self.top_level(*question_id)?;
                let exists = q.sub_questions.iter().any(|s| s.id == *sub_question_id);
                if !exists {
                    return Err(AppError::BadRequest("Unknown sub-question".to_string()));
                }
                match value {
                    AnswerValue::Text(_) => Ok(()),
                    AnswerValue::Pick(_) => Err(AppError::BadRequest(
                        "Sub-questions expect a text answer".to_string(),
                    )),
                }
            }
        }
    }

    fn top_level(&self, question_id: i64) -> Result<&ExamQuestion, AppError> {
        self.questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| AppError::BadRequest("Unknown question".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionKind;

    fn closed(id: i64, correct: &str) -> ExamQuestion {
        ExamQuestion {
            id,
            kind: QuestionKind::ClosedEnded,
            content: format!("Question {}", id),
            options: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            image_options: Vec::new(),
            matching: None,
            correct_answer: Some(correct.to_string()),
            points: 1,
            sub_questions: Vec::new(),
        }
    }

    fn session(now: DateTime<Utc>) -> AttemptSession {
        AttemptSession::new(1, 42, vec![closed(1, "B"), closed(2, "A")], 3600, now)
    }

    fn text(s: &str) -> AnswerValue {
        AnswerValue::Text(s.to_string())
    }

    #[test]
    fn remaining_counts_down_and_clamps_at_zero() {
        let start = Utc::now();
        assert_eq!(remaining_seconds(start, 3600, start), 3600);
        assert_eq!(
            remaining_seconds(start, 3600, start + Duration::seconds(3599)),
            1
        );
        assert_eq!(
            remaining_seconds(start, 3600, start + Duration::seconds(3601)),
            0
        );
    }

    #[test]
    fn expired_attempt_finalizes_exactly_once() {
        let start = Utc::now();
        let mut s = session(start);
        let late = start + Duration::seconds(3601);

        assert!(s.is_expired(late));
        assert!(s.finalize().is_ok());

        // A later tick must not fire the forced submit again.
        assert!(!s.is_expired(late));
        assert!(s.finalize().is_err());
    }

    #[test]
    fn record_rejected_after_deadline() {
        let start = Utc::now();
        let mut s = session(start);
        let late = start + Duration::seconds(3601);

        let res = s.record(AnswerSlot::Question { question_id: 1 }, text("B"), true, late);
        assert!(res.is_err());
    }

    #[test]
    fn record_rejects_unknown_slots() {
        let start = Utc::now();
        let mut s = session(start);

        let unknown = s.record(AnswerSlot::Question { question_id: 99 }, text("B"), true, start);
        assert!(unknown.is_err());

        let wrong_shape = s.record(
            AnswerSlot::MatchingCell {
                question_id: 1,
                left: 0,
            },
            AnswerValue::Pick(0),
            true,
            start,
        );
        assert!(wrong_shape.is_err());
    }

    #[test]
    fn cursor_clamps_at_both_ends() {
        let start = Utc::now();
        let mut s = session(start);

        assert_eq!(s.advance(Direction::Prev).unwrap(), 0);
        assert_eq!(s.advance(Direction::Next).unwrap(), 1);
        assert_eq!(s.advance(Direction::Next).unwrap(), 1);
        assert_eq!(s.advance(Direction::Prev).unwrap(), 0);
    }

    #[test]
    fn view_is_stable_across_reads() {
        let start = Utc::now();
        let mut s = session(start);
        s.record(AnswerSlot::Question { question_id: 1 }, text("B"), true, start)
            .unwrap();
        s.advance(Direction::Next).unwrap();

        // Re-reading the session (a "reload") must reproduce the identical
        // question order, option order, answers and cursor.
        let a = s.view(start);
        let b = s.view(start);
        let order_a: Vec<i64> = a.questions.iter().map(|q| q.id).collect();
        let order_b: Vec<i64> = b.questions.iter().map(|q| q.id).collect();
        assert_eq!(order_a, order_b);
        assert_eq!(a.questions[0].options, b.questions[0].options);
        assert_eq!(a.answers, b.answers);
        assert_eq!(a.cursor, b.cursor);
        assert_eq!(a.cursor, 1);
    }

    #[test]
    fn finalize_scores_the_sheet() {
        let start = Utc::now();
        let mut s = session(start);
        s.record(AnswerSlot::Question { question_id: 1 }, text("B"), true, start)
            .unwrap();
        s.record(AnswerSlot::Question { question_id: 2 }, text("C"), true, start)
            .unwrap();

        let (summary, reports) = s.finalize().unwrap();
        assert_eq!(summary.correct_count, 1);
        assert_eq!(summary.total_count, 2);
        assert_eq!(reports.len(), 2);
        assert!(matches!(s.status(), AttemptStatus::Submitted { .. }));

        // Submitted attempts accept no further writes.
        let res = s.record(AnswerSlot::Question { question_id: 2 }, text("A"), true, start);
        assert!(res.is_err());
    }
}
