// src/handlers/review.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        attempt::{
            AttemptAnswerRow, AttemptRecord, AttemptReview, ManualScore, ManualScoreRequest,
            PendingAnswer, ReviewAnswer,
        },
        question::QuestionKind,
    },
    session::score::Verdict,
    utils::jwt::Claims,
};

/// Helper struct for fetching answer rows joined with question context.
#[derive(sqlx::FromRow)]
struct ReviewAnswerRow {
    answer_id: i64,
    question_id: i64,
    sub_question_id: Option<i64>,
    kind: QuestionKind,
    content: String,
    options: sqlx::types::Json<Vec<String>>,
    correct_answer: Option<String>,
    submitted: String,
    verdict: Verdict,
    auto_points: i64,
}

/// Lists every answer awaiting manual review, with the context a reviewer
/// needs to judge it.
pub async fn list_pending(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let pending = sqlx::query_as::<_, PendingAnswer>(
        r#"
        SELECT aa.id AS answer_id, aa.attempt_id, a.olympiad_id,
               u.username AS student, aa.question_id, aa.sub_question_id,
               q.kind, q.content, q.points, aa.submitted,
               (SELECT COUNT(*) FROM manual_scores ms WHERE ms.answer_id = aa.id) AS manual_score_count
        FROM attempt_answers aa
        JOIN attempts a ON aa.attempt_id = a.id
        JOIN users u ON a.user_id = u.id
        JOIN questions q ON q.id = COALESCE(aa.sub_question_id, aa.question_id)
        WHERE aa.verdict = 'pending'
        ORDER BY aa.attempt_id, aa.id
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list pending answers: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(pending))
}

/// Full review view of one submitted attempt: every answer with the
/// question tuple (content, options, canonical answer), its verdict, the
/// manual score history and the effective total.
pub async fn get_attempt_review(
    State(pool): State<SqlitePool>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = sqlx::query_as::<_, AttemptRecord>(
        r#"
        SELECT id, olympiad_id, user_id, started_at, submitted_at,
               earned_points, total_points, correct_count, total_count,
               percentage, expired
        FROM attempts
        WHERE id = ?
        "#,
    )
    .bind(attempt_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    let rows = sqlx::query_as::<_, ReviewAnswerRow>(
        r#"
        SELECT aa.id AS answer_id, aa.question_id, aa.sub_question_id,
               q.kind, q.content, q.options, q.correct_answer,
               aa.submitted, aa.verdict, aa.auto_points
        FROM attempt_answers aa
        JOIN questions q ON q.id = COALESCE(aa.sub_question_id, aa.question_id)
        WHERE aa.attempt_id = ?
        ORDER BY aa.id
        "#,
    )
    .bind(attempt_id)
    .fetch_all(&pool)
    .await?;

    let scores = sqlx::query_as::<_, ManualScore>(
        r#"
        SELECT ms.id, ms.answer_id, ms.reviewer_id, ms.score, ms.feedback, ms.created_at
        FROM manual_scores ms
        JOIN attempt_answers aa ON ms.answer_id = aa.id
        WHERE aa.attempt_id = ?
        ORDER BY ms.created_at, ms.id
        "#,
    )
    .bind(attempt_id)
    .fetch_all(&pool)
    .await?;

    let mut by_answer: HashMap<i64, Vec<ManualScore>> = HashMap::new();
    for score in scores {
        by_answer.entry(score.answer_id).or_default().push(score);
    }

    let mut answers = Vec::with_capacity(rows.len());
    let mut effective_total = 0;

    for row in rows {
        let manual_scores = by_answer.remove(&row.answer_id).unwrap_or_default();
        // The newest manual score supersedes the auto score; the auto path
        // never touches this history.
        let effective_points = manual_scores
            .last()
            .map(|m| m.score)
            .unwrap_or(row.auto_points);
        effective_total += effective_points;

        let submitted = serde_json::from_str(&row.submitted)
            .unwrap_or(serde_json::Value::String(row.submitted.clone()));

        answers.push(ReviewAnswer {
            answer_id: row.answer_id,
            question_id: row.question_id,
            sub_question_id: row.sub_question_id,
            kind: row.kind,
            content: row.content,
            options: row.options.0,
            correct_answer: row.correct_answer,
            submitted,
            verdict: row.verdict,
            auto_points: row.auto_points,
            manual_scores,
            effective_points,
        });
    }

    Ok(Json(AttemptReview {
        attempt,
        answers,
        effective_total,
    }))
}

/// Appends a manual score for an answer.
pub async fn add_manual_score(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(answer_id): Path<i64>,
    Json(payload): Json<ManualScoreRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let answer = sqlx::query_as::<_, AttemptAnswerRow>(
        r#"
        SELECT id, attempt_id, question_id, sub_question_id, submitted,
               verdict, auto_points
        FROM attempt_answers
        WHERE id = ?
        "#,
    )
    .bind(answer_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Answer not found".to_string()))?;

    let result = sqlx::query(
        r#"
        INSERT INTO manual_scores (answer_id, reviewer_id, score, feedback, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(answer.id)
    .bind(claims.user_id())
    .bind(payload.score)
    .bind(&payload.feedback)
    .bind(chrono::Utc::now())
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to add manual score: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::info!(
        "Manual score recorded: answer {} of attempt {} by reviewer {}",
        answer.id,
        answer.attempt_id,
        claims.user_id()
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": result.last_insert_rowid() })),
    ))
}
