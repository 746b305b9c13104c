// src/handlers/olympiad.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::olympiad::{ListParams, Olympiad},
};

/// Lists olympiad events, optionally filtered by subject and title keyword.
pub async fn list_olympiads(
    State(pool): State<SqlitePool>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let search_pattern = params.q.map(|k| format!("%{}%", k));

    let olympiads = sqlx::query_as::<_, Olympiad>(
        r#"
        SELECT id, title, description, subject, package_id,
               start_date, end_date, duration_secs, created_at
        FROM olympiads
        WHERE (?1 IS NULL OR subject = ?1)
          AND (?2 IS NULL OR title LIKE ?2)
        ORDER BY start_date DESC
        "#,
    )
    .bind(params.subject)
    .bind(search_pattern)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list olympiads: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(olympiads))
}

/// Retrieves a single olympiad event by ID.
pub async fn get_olympiad(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let olympiad = sqlx::query_as::<_, Olympiad>(
        r#"
        SELECT id, title, description, subject, package_id,
               start_date, end_date, duration_secs, created_at
        FROM olympiads
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Olympiad not found".to_string()))?;

    Ok(Json(olympiad))
}
