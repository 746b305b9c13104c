// src/session/score.rs

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::question::{MatchingSpec, QuestionKind};
use crate::session::answer::{AnswerSheet, AnswerSlot, AnswerValue};
use crate::session::question::ExamQuestion;

/// Per-unit auto-scoring outcome. `Pending` marks answers that only a human
/// reviewer can judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    Incorrect,
    Pending,
}

/// One scored unit: a top-level question without sub-questions, or one
/// sub-question of a composite question. Persisted as an answer row.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerReport {
    pub question_id: i64,
    pub sub_question_id: Option<i64>,
    /// What the student submitted, as JSON (text, or matching pairs).
    pub submitted: serde_json::Value,
    pub verdict: Verdict,
    /// Auto-awarded points. 0 unless the verdict is `Correct`.
    pub points: i64,
}

/// Aggregate result of auto-scoring an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub earned_points: i64,
    pub total_points: i64,
    pub correct_count: i64,
    pub total_count: i64,
    /// round(100 * correct_count / total_count)
    pub percentage: i64,
}

/// Scores a full answer sheet against the attempt's question set.
///
/// Returns the aggregate summary and one report per scored unit. A question
/// with sub-questions is scored through its sub-questions only.
pub fn score_attempt(
    questions: &[ExamQuestion],
    sheet: &AnswerSheet,
) -> (ScoreSummary, Vec<AnswerReport>) {
    let mut reports = Vec::new();
    let mut total_points = 0;

    for q in questions {
        if q.sub_questions.is_empty() {
            total_points += q.points;
            reports.push(judge_question(q, sheet));
        } else {
            for sub in &q.sub_questions {
                total_points += sub.points;
                reports.push(judge_sub_question(q.id, sub, sheet));
            }
        }
    }

    let correct_count = reports
        .iter()
        .filter(|r| r.verdict == Verdict::Correct)
        .count() as i64;
    let earned_points: i64 = reports.iter().map(|r| r.points).sum();
    let total_count = reports.len() as i64;

    let percentage = if total_count == 0 {
        0
    } else {
        ((correct_count as f64 / total_count as f64) * 100.0).round() as i64
    };

    let summary = ScoreSummary {
        earned_points,
        total_points,
        correct_count,
        total_count,
        percentage,
    };

    (summary, reports)
}

fn judge_question(q: &ExamQuestion, sheet: &AnswerSheet) -> AnswerReport {
    let slot = AnswerSlot::Question { question_id: q.id };

    let (verdict, submitted) = match q.kind {
        QuestionKind::ClosedEnded => judge_choice(q, sheet.get(&slot)),
        QuestionKind::Matching => match &q.matching {
            Some(spec) => judge_matching(q.id, spec, sheet),
            None => (Verdict::Incorrect, serde_json::Value::Null),
        },
        QuestionKind::TextAnalysis | QuestionKind::MapAnalysis | QuestionKind::OpenEnded => {
            (Verdict::Pending, recorded_text(sheet.get(&slot)))
        }
    };

    report(q, None, q.id, verdict, submitted)
}

fn judge_sub_question(parent_id: i64, sub: &ExamQuestion, sheet: &AnswerSheet) -> AnswerReport {
    let slot = AnswerSlot::SubQuestion {
        question_id: parent_id,
        sub_question_id: sub.id,
    };

    let (verdict, submitted) = match sub.kind {
        QuestionKind::ClosedEnded => judge_choice(sub, sheet.get(&slot)),
        // Matching sub-questions are rejected at authoring time; anything
        // that is not a plain choice goes to manual review.
        _ => (Verdict::Pending, recorded_text(sheet.get(&slot))),
    };

    report(sub, Some(sub.id), parent_id, verdict, submitted)
}

/// Exact string equality against the canonical answer. No case or
/// whitespace normalization: "Paris" and "paris" do not match.
fn judge_choice(
    q: &ExamQuestion,
    recorded: Option<&AnswerValue>,
) -> (Verdict, serde_json::Value) {
    let verdict = match (q.correct_answer.as_deref(), recorded) {
        (Some(correct), Some(AnswerValue::Text(text))) if text == correct => Verdict::Correct,
        _ => Verdict::Incorrect,
    };
    (verdict, recorded_text(recorded))
}

/// Reconstructs the recorded (left, right) pairs in left order and compares
/// them to the canonical pairing by value. A left item with no recorded
/// cell is omitted, so an incomplete pairing can never match.
fn judge_matching(
    question_id: i64,
    spec: &MatchingSpec,
    sheet: &AnswerSheet,
) -> (Verdict, serde_json::Value) {
    let mut recorded: Vec<(usize, usize)> = Vec::new();
    for left in 0..spec.left.len() {
        let slot = AnswerSlot::MatchingCell { question_id, left };
        if let Some(AnswerValue::Pick(right)) = sheet.get(&slot) {
            recorded.push((left, *right));
        }
    }

    let verdict = if recorded == spec.pairs {
        Verdict::Correct
    } else {
        Verdict::Incorrect
    };

    (verdict, json!(recorded))
}

fn recorded_text(recorded: Option<&AnswerValue>) -> serde_json::Value {
    match recorded {
        Some(AnswerValue::Text(text)) => json!(text),
        Some(AnswerValue::Pick(i)) => json!(i),
        None => serde_json::Value::Null,
    }
}

fn report(
    q: &ExamQuestion,
    sub_question_id: Option<i64>,
    question_id: i64,
    verdict: Verdict,
    submitted: serde_json::Value,
) -> AnswerReport {
    let points = if verdict == Verdict::Correct {
        q.points
    } else {
        0
    };
    AnswerReport {
        question_id,
        sub_question_id,
        submitted,
        verdict,
        points,
    }
}
