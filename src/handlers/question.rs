// src/handlers/question.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    error::AppError,
    models::question::{CreateQuestionRequest, Question, QuestionDetail, UpdateQuestionRequest},
    utils::{html::clean_html, jwt::Claims},
};

/// Creates a new question, optionally with sub-questions.
/// Teachers and admins.
pub async fn create_question(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if let Some(message) = payload.shape_error() {
        return Err(AppError::BadRequest(message));
    }

    let position = match payload.package_id {
        Some(package_id) => {
            let exists = sqlx::query("SELECT id FROM packages WHERE id = ?")
                .bind(package_id)
                .fetch_optional(&pool)
                .await?;
            if exists.is_none() {
                return Err(AppError::NotFound("Package not found".to_string()));
            }

            sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COALESCE(MAX(position) + 1, 0)
                FROM questions
                WHERE package_id = ? AND parent_id IS NULL
                "#,
            )
            .bind(package_id)
            .fetch_one(&pool)
            .await?
        }
        None => 0,
    };

    let matching_json = payload
        .matching
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let now = chrono::Utc::now();

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO questions
        (package_id, parent_id, position, kind, subject, content, options,
         image_options, matching, correct_answer, points, created_by, created_at)
        VALUES (?, NULL, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.package_id)
    .bind(position)
    .bind(payload.kind)
    .bind(&payload.subject)
    .bind(clean_html(&payload.content))
    .bind(serde_json::to_string(&payload.options)?)
    .bind(serde_json::to_string(&payload.image_options)?)
    .bind(matching_json)
    .bind(&payload.correct_answer)
    .bind(payload.points)
    .bind(claims.user_id())
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let question_id = result.last_insert_rowid();

    for (index, sub) in payload.sub_questions.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO questions
            (package_id, parent_id, position, kind, subject, content, options,
             image_options, matching, correct_answer, points, created_by, created_at)
            VALUES (NULL, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?, ?)
            "#,
        )
        .bind(question_id)
        .bind(index as i64)
        .bind(sub.kind)
        .bind(&payload.subject)
        .bind(clean_html(&sub.content))
        .bind(serde_json::to_string(&sub.options)?)
        .bind(serde_json::to_string(&sub.image_options)?)
        .bind(&sub.correct_answer)
        .bind(sub.points)
        .bind(claims.user_id())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create sub-question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;
    }

    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": question_id})),
    ))
}

/// Query parameters for listing questions.
#[derive(Debug, Deserialize)]
pub struct ListQuestionParams {
    pub subject: Option<String>,
    pub package_id: Option<i64>,
}

/// Lists top-level questions with their sub-questions, optionally filtered
/// by subject and package. Teachers and admins.
pub async fn list_questions(
    State(pool): State<SqlitePool>,
    Query(params): Query<ListQuestionParams>,
) -> Result<impl IntoResponse, AppError> {
    let parents = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, package_id, parent_id, position, kind, subject, content,
               options, image_options, matching, correct_answer, points,
               created_by, created_at
        FROM questions
        WHERE parent_id IS NULL
          AND (?1 IS NULL OR subject = ?1)
          AND (?2 IS NULL OR package_id = ?2)
        ORDER BY package_id, position, id
        "#,
    )
    .bind(params.subject)
    .bind(params.package_id)
    .fetch_all(&pool)
    .await?;

    let subs = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, package_id, parent_id, position, kind, subject, content,
               options, image_options, matching, correct_answer, points,
               created_by, created_at
        FROM questions
        WHERE parent_id IS NOT NULL
        ORDER BY position, id
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let mut by_parent: HashMap<i64, Vec<Question>> = HashMap::new();
    for sub in subs {
        if let Some(parent_id) = sub.parent_id {
            by_parent.entry(parent_id).or_default().push(sub);
        }
    }

    let details: Vec<QuestionDetail> = parents
        .into_iter()
        .map(|question| {
            let sub_questions = by_parent.remove(&question.id).unwrap_or_default();
            QuestionDetail {
                question,
                sub_questions,
            }
        })
        .collect();

    Ok(Json(details))
}

/// Updates a question by ID.
/// Admin only.
pub async fn update_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.subject.is_none()
        && payload.content.is_none()
        && payload.options.is_none()
        && payload.image_options.is_none()
        && payload.matching.is_none()
        && payload.correct_answer.is_none()
        && payload.points.is_none()
        && payload.package_id.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE questions SET ");
    let mut separated = builder.separated(", ");

    if let Some(subject) = payload.subject {
        separated.push("subject = ");
        separated.push_bind_unseparated(subject);
    }

    if let Some(content) = payload.content {
        separated.push("content = ");
        separated.push_bind_unseparated(clean_html(&content));
    }

    if let Some(options) = payload.options {
        separated.push("options = ");
        separated.push_bind_unseparated(serde_json::to_string(&options).unwrap_or_default());
    }

    if let Some(image_options) = payload.image_options {
        separated.push("image_options = ");
        separated.push_bind_unseparated(serde_json::to_string(&image_options).unwrap_or_default());
    }

    if let Some(matching) = payload.matching {
        separated.push("matching = ");
        separated.push_bind_unseparated(serde_json::to_string(&matching).unwrap_or_default());
    }

    if let Some(correct_answer) = payload.correct_answer {
        separated.push("correct_answer = ");
        separated.push_bind_unseparated(correct_answer);
    }

    if let Some(points) = payload.points {
        separated.push("points = ");
        separated.push_bind_unseparated(points);
    }

    if let Some(package_id) = payload.package_id {
        separated.push("package_id = ");
        separated.push_bind_unseparated(package_id);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a question by ID (sub-questions cascade).
/// Admin only.
pub async fn delete_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
