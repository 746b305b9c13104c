// src/handlers/attempt.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::SqlitePool;

use crate::{
    config::EXPIRY_SWEEP_INTERVAL_SECS,
    error::AppError,
    models::{
        attempt::{AdvanceRequest, AttemptRecord, RecordAnswerRequest},
        olympiad::Olympiad,
        question::Question,
    },
    session::{
        answer::{AnswerSlot, AnswerValue},
        attempt::{AttemptSession, AttemptStatus},
        question::ExamQuestion,
        score::{AnswerReport, ScoreSummary},
    },
    state::AppState,
    utils::jwt::Claims,
};

/// Starts an attempt, or resumes the caller's live one.
///
/// Starting is only valid inside the olympiad's time window and only once:
/// a live unexpired session is resumed as-is (same questions, same option
/// order, same answers, same cursor), an expired one is force-submitted,
/// and a persisted record blocks any further start.
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(olympiad_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let user_id = claims.user_id();

    if finalize_if_expired(&state, user_id, olympiad_id, now).await? {
        return Err(AppError::Conflict(
            "Time expired; the attempt was submitted".to_string(),
        ));
    }

    if let Some(view) = state
        .sessions
        .with(user_id, olympiad_id, |s| s.view(now))
    {
        return Ok(Json(json!({ "resumed": true, "attempt": view })));
    }

    let submitted = sqlx::query_as::<_, AttemptRecord>(
        r#"
        SELECT id, olympiad_id, user_id, started_at, submitted_at,
               earned_points, total_points, correct_count, total_count,
               percentage, expired
        FROM attempts
        WHERE olympiad_id = ? AND user_id = ?
        "#,
    )
    .bind(olympiad_id)
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?;

    if submitted.is_some() {
        return Err(AppError::Conflict(
            "Attempt has already been submitted".to_string(),
        ));
    }

    let olympiad = sqlx::query_as::<_, Olympiad>(
        r#"
        SELECT id, title, description, subject, package_id,
               start_date, end_date, duration_secs, created_at
        FROM olympiads
        WHERE id = ?
        "#,
    )
    .bind(olympiad_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("Olympiad not found".to_string()))?;

    if now < olympiad.start_date || now > olympiad.end_date {
        return Err(AppError::BadRequest(
            "Olympiad is not open for attempts".to_string(),
        ));
    }

    let questions = load_exam_questions(&state.pool, olympiad.package_id).await?;
    if questions.is_empty() {
        return Err(AppError::BadRequest(
            "Olympiad has no questions yet".to_string(),
        ));
    }

    let session = AttemptSession::new(olympiad_id, user_id, questions, olympiad.duration_secs, now);
    let view = session.view(now);

    if !state.sessions.insert_new(session) {
        // A concurrent start won the race; hand back the existing session.
        let view = state
            .sessions
            .with(user_id, olympiad_id, |s| s.view(now))
            .ok_or_else(|| {
                AppError::InternalServerError("Session vanished during start".to_string())
            })?;
        return Ok(Json(json!({ "resumed": true, "attempt": view })));
    }

    tracing::info!(
        "Attempt started: user {} olympiad {} ({} questions)",
        user_id,
        olympiad_id,
        view.questions.len()
    );

    Ok(Json(json!({ "resumed": false, "attempt": view })))
}

/// Current state of the caller's attempt: the live session view, the
/// persisted result, or `not_started`.
pub async fn get_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(olympiad_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let user_id = claims.user_id();

    finalize_if_expired(&state, user_id, olympiad_id, now).await?;

    if let Some(view) = state
        .sessions
        .with(user_id, olympiad_id, |s| s.view(now))
    {
        return Ok(Json(json!({ "attempt": view })));
    }

    let record = sqlx::query_as::<_, AttemptRecord>(
        r#"
        SELECT id, olympiad_id, user_id, started_at, submitted_at,
               earned_points, total_points, correct_count, total_count,
               percentage, expired
        FROM attempts
        WHERE olympiad_id = ? AND user_id = ?
        "#,
    )
    .bind(olympiad_id)
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?;

    match record {
        Some(r) => {
            let status = AttemptStatus::Submitted {
                summary: ScoreSummary {
                    earned_points: r.earned_points,
                    total_points: r.total_points,
                    correct_count: r.correct_count,
                    total_count: r.total_count,
                    percentage: r.percentage,
                },
            };
            Ok(Json(json!({
                "olympiad_id": olympiad_id,
                "status": status,
                "record": r
            })))
        }
        None => Ok(Json(json!({
            "olympiad_id": olympiad_id,
            "status": AttemptStatus::NotStarted
        }))),
    }
}

/// Records one answer of the caller's live attempt.
pub async fn record_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(olympiad_id): Path<i64>,
    Json(payload): Json<RecordAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let user_id = claims.user_id();

    if finalize_if_expired(&state, user_id, olympiad_id, now).await? {
        return Err(AppError::Conflict(
            "Time is up; the attempt was submitted".to_string(),
        ));
    }

    let (slot, value) = slot_from_request(payload)?;
    let allow_revision = state.config.allow_answer_revision;

    state
        .sessions
        .with(user_id, olympiad_id, |s| {
            s.record(slot, value, allow_revision, now)
        })
        .ok_or(AppError::NotFound("No active attempt".to_string()))??;

    Ok(StatusCode::OK)
}

/// Moves the caller's question cursor one step.
pub async fn advance(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(olympiad_id): Path<i64>,
    Json(payload): Json<AdvanceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let user_id = claims.user_id();

    if finalize_if_expired(&state, user_id, olympiad_id, now).await? {
        return Err(AppError::Conflict(
            "Time is up; the attempt was submitted".to_string(),
        ));
    }

    let cursor = state
        .sessions
        .with(user_id, olympiad_id, |s| s.advance(payload.direction))
        .ok_or(AppError::NotFound("No active attempt".to_string()))??;

    Ok(Json(json!({ "cursor": cursor })))
}

/// Submits the caller's live attempt, scores it and persists the result.
pub async fn submit_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(olympiad_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let user_id = claims.user_id();

    let mut session = state
        .sessions
        .remove(user_id, olympiad_id)
        .ok_or(AppError::NotFound("No active attempt".to_string()))?;

    let expired = session.is_expired(now);
    let (summary, reports) = session.finalize()?;

    persist_submission(
        &state.pool,
        olympiad_id,
        user_id,
        session.started_at(),
        now,
        &summary,
        &reports,
        expired,
    )
    .await?;

    tracing::info!(
        "Attempt submitted: user {} olympiad {} scored {}/{}",
        user_id,
        olympiad_id,
        summary.earned_points,
        summary.total_points
    );

    Ok(Json(json!({
        "earned_points": summary.earned_points,
        "total_points": summary.total_points,
        "correct_count": summary.correct_count,
        "total_count": summary.total_count,
        "percentage": summary.percentage,
        "message": "Attempt submitted successfully"
    })))
}

/// Maps the flat wire DTO onto a typed answer slot and value.
fn slot_from_request(req: RecordAnswerRequest) -> Result<(AnswerSlot, AnswerValue), AppError> {
    if let Some(left) = req.left_index {
        let right = req.right_index.ok_or(AppError::BadRequest(
            "right_index is required for matching cells".to_string(),
        ))?;
        return Ok((
            AnswerSlot::MatchingCell {
                question_id: req.question_id,
                left,
            },
            AnswerValue::Pick(right),
        ));
    }

    let value = req.value.ok_or(AppError::BadRequest(
        "value is required for this answer".to_string(),
    ))?;

    match req.sub_question_id {
        Some(sub_question_id) => Ok((
            AnswerSlot::SubQuestion {
                question_id: req.question_id,
                sub_question_id,
            },
            AnswerValue::Text(value),
        )),
        None => Ok((
            AnswerSlot::Question {
                question_id: req.question_id,
            },
            AnswerValue::Text(value),
        )),
    }
}

/// Force-submits the caller's live session if its time budget is spent.
/// Returns true when a forced submit happened on this call.
async fn finalize_if_expired(
    state: &AppState,
    user_id: i64,
    olympiad_id: i64,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    let expired = state
        .sessions
        .with(user_id, olympiad_id, |s| s.is_expired(now))
        .unwrap_or(false);

    if !expired {
        return Ok(false);
    }

    let Some(mut session) = state.sessions.remove(user_id, olympiad_id) else {
        return Ok(false);
    };

    let (summary, reports) = session.finalize()?;
    persist_submission(
        &state.pool,
        olympiad_id,
        user_id,
        session.started_at(),
        now,
        &summary,
        &reports,
        true,
    )
    .await?;

    Ok(true)
}

/// Loads a package's top-level questions and their sub-questions in
/// position order, assembled into the session's own question type.
pub(crate) async fn load_exam_questions(
    pool: &SqlitePool,
    package_id: i64,
) -> Result<Vec<ExamQuestion>, AppError> {
    let parents = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, package_id, parent_id, position, kind, subject, content,
               options, image_options, matching, correct_answer, points,
               created_by, created_at
        FROM questions
        WHERE package_id = ? AND parent_id IS NULL
        ORDER BY position, id
        "#,
    )
    .bind(package_id)
    .fetch_all(pool)
    .await?;

    let subs = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, package_id, parent_id, position, kind, subject, content,
               options, image_options, matching, correct_answer, points,
               created_by, created_at
        FROM questions
        WHERE parent_id IN (
            SELECT id FROM questions WHERE package_id = ? AND parent_id IS NULL
        )
        ORDER BY position, id
        "#,
    )
    .bind(package_id)
    .fetch_all(pool)
    .await?;

    let mut by_parent: HashMap<i64, Vec<Question>> = HashMap::new();
    for sub in subs {
        if let Some(parent_id) = sub.parent_id {
            by_parent.entry(parent_id).or_default().push(sub);
        }
    }

    Ok(parents
        .into_iter()
        .map(|p| {
            let children = by_parent.remove(&p.id).unwrap_or_default();
            ExamQuestion::from_rows(p, children)
        })
        .collect())
}

/// Writes a finished attempt and its per-unit answer rows in one
/// transaction. A unique-key violation means the attempt was already
/// persisted by another path and maps to a conflict.
pub(crate) async fn persist_submission(
    pool: &SqlitePool,
    olympiad_id: i64,
    user_id: i64,
    started_at: DateTime<Utc>,
    submitted_at: DateTime<Utc>,
    summary: &ScoreSummary,
    reports: &[AnswerReport],
    expired: bool,
) -> Result<i64, AppError> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO attempts
        (olympiad_id, user_id, started_at, submitted_at, earned_points,
         total_points, correct_count, total_count, percentage, expired)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(olympiad_id)
    .bind(user_id)
    .bind(started_at)
    .bind(submitted_at)
    .bind(summary.earned_points)
    .bind(summary.total_points)
    .bind(summary.correct_count)
    .bind(summary.total_count)
    .bind(summary.percentage)
    .bind(expired)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            AppError::Conflict("Attempt has already been submitted".to_string())
        } else {
            tracing::error!("Failed to persist attempt: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    let attempt_id = result.last_insert_rowid();

    for report in reports {
        sqlx::query(
            r#"
            INSERT INTO attempt_answers
            (attempt_id, question_id, sub_question_id, submitted, verdict, auto_points)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attempt_id)
        .bind(report.question_id)
        .bind(report.sub_question_id)
        .bind(report.submitted.to_string())
        .bind(report.verdict)
        .bind(report.points)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(attempt_id)
}

/// Spawns the background task that force-submits abandoned attempts once
/// their wall-clock budget runs out, whether or not the student is still
/// connected.
pub fn spawn_expiry_sweeper(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(EXPIRY_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let now = Utc::now();
            for mut session in state.sessions.take_expired(now) {
                let olympiad_id = session.olympiad_id();
                let user_id = session.user_id();
                let started_at = session.started_at();

                let (summary, reports) = match session.finalize() {
                    Ok(scored) => scored,
                    Err(e) => {
                        tracing::error!("Failed to finalize expired attempt: {:?}", e);
                        continue;
                    }
                };

                match persist_submission(
                    &state.pool,
                    olympiad_id,
                    user_id,
                    started_at,
                    now,
                    &summary,
                    &reports,
                    true,
                )
                .await
                {
                    Ok(_) => tracing::info!(
                        "Auto-submitted expired attempt: user {} olympiad {}",
                        user_id,
                        olympiad_id
                    ),
                    Err(e) => tracing::error!(
                        "Failed to persist expired attempt for user {}: {:?}",
                        user_id,
                        e
                    ),
                }
            }
        }
    })
}
