// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::question::QuestionKind;
use crate::session::score::Verdict;

/// Represents the 'attempts' table: one finished (submitted or expired)
/// attempt per user and olympiad.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: i64,
    pub olympiad_id: i64,
    pub user_id: i64,
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub earned_points: i64,
    pub total_points: i64,
    pub correct_count: i64,
    pub total_count: i64,
    pub percentage: i64,
    /// True when the wall clock, not the student, ended the attempt.
    pub expired: bool,
}

/// Represents the 'attempt_answers' table: one scored unit of an attempt.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AttemptAnswerRow {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    pub sub_question_id: Option<i64>,
    /// Submitted value as JSON (text, or matching pairs).
    pub submitted: String,
    pub verdict: Verdict,
    pub auto_points: i64,
}

/// Represents the 'manual_scores' table: append-only review history for one
/// answer. The newest entry supersedes the auto score; the auto-scoring
/// path never writes here.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ManualScore {
    pub id: i64,
    pub answer_id: i64,
    pub reviewer_id: i64,
    pub score: i64,
    pub feedback: String,
    pub created_at: DateTime<Utc>,
}

/// DTO for recording one answer. Exactly one addressing shape applies:
/// a plain question, a sub-question, or one matching cell.
#[derive(Debug, Deserialize)]
pub struct RecordAnswerRequest {
    pub question_id: i64,
    pub sub_question_id: Option<i64>,
    /// Left-item index of a matching cell.
    pub left_index: Option<usize>,
    /// Picked right-item index for a matching cell.
    pub right_index: Option<usize>,
    /// Chosen option text or free text, for non-matching slots.
    pub value: Option<String>,
}

/// DTO for moving the question cursor.
#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    pub direction: crate::session::attempt::Direction,
}

/// DTO for adding a manual score to an answer.
#[derive(Debug, Deserialize, Validate)]
pub struct ManualScoreRequest {
    #[validate(range(min = 0))]
    pub score: i64,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub feedback: String,
}

/// One answer awaiting manual review, joined with the context a human
/// needs to judge it.
#[derive(Debug, FromRow, Serialize)]
pub struct PendingAnswer {
    pub answer_id: i64,
    pub attempt_id: i64,
    pub olympiad_id: i64,
    pub student: String,
    pub question_id: i64,
    pub sub_question_id: Option<i64>,
    pub kind: QuestionKind,
    pub content: String,
    pub points: i64,
    pub submitted: String,
    /// How many manual scores already exist for this answer.
    pub manual_score_count: i64,
}

/// One answer row of a reviewed attempt, with the question context and the
/// full manual score history.
#[derive(Debug, Serialize)]
pub struct ReviewAnswer {
    pub answer_id: i64,
    pub question_id: i64,
    pub sub_question_id: Option<i64>,
    pub kind: QuestionKind,
    pub content: String,
    pub options: Vec<String>,
    pub correct_answer: Option<String>,
    pub submitted: serde_json::Value,
    pub verdict: Verdict,
    pub auto_points: i64,
    pub manual_scores: Vec<ManualScore>,
    /// Latest manual score if any, otherwise the auto score.
    pub effective_points: i64,
}

/// Full review view of a submitted attempt.
#[derive(Debug, Serialize)]
pub struct AttemptReview {
    pub attempt: AttemptRecord,
    pub answers: Vec<ReviewAnswer>,
    /// Sum of effective points over all answers.
    pub effective_total: i64,
}
