// src/handlers/admin.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        olympiad::{CreateOlympiadRequest, UpdateOlympiadRequest},
        package::{CreatePackageRequest, Package, PackageDetail, ReorderRequest, UpdatePackageRequest},
        question::{Question, QuestionDetail},
        user::User,
    },
    utils::{hash::hash_password, jwt::Claims},
};

const ROLES: [&str; 3] = ["student", "teacher", "admin"];

/// Lists all users in the system.
/// Admin only.
pub async fn list_users(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password, role, created_at
        FROM users
        ORDER BY id DESC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(users))
}

/// DTO for Admin creating a user (can specify role, e.g. 'teacher').
#[derive(Debug, Deserialize, Validate)]
pub struct AdminCreateUserRequest {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Username length must be between 3 and 50 characters."
    ))]
    pub username: String,
    #[validate(length(
        min = 4,
        max = 128,
        message = "Password length must be between 4 and 128 characters."
    ))]
    pub password: String,
    pub role: String,
}

/// Creates a new user with a specific role.
/// Admin only.
pub async fn create_user(
    State(pool): State<SqlitePool>,
    Json(payload): Json<AdminCreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if !ROLES.contains(&payload.role.as_str()) {
        return Err(AppError::BadRequest(format!(
            "Unknown role '{}'",
            payload.role
        )));
    }

    let hashed_password = hash_password(&payload.password)?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, password, role, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&payload.username)
    .bind(&hashed_password)
    .bind(&payload.role)
    .bind(chrono::Utc::now())
    .execute(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            AppError::Conflict(format!("Username '{}' already exists", payload.username))
        } else {
            tracing::error!("Failed to create user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": result.last_insert_rowid()})),
    ))
}

/// DTO for updating a user. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct AdminUpdateUserRequest {
    pub username: Option<String>,
    pub role: Option<String>,
    pub password: Option<String>,
}

/// Updates user information.
/// Admin only.
pub async fn update_user(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    // Check existence
    sqlx::query("SELECT id FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    // Perform updates sequentially if fields are present
    if let Some(new_username) = payload.username {
        sqlx::query("UPDATE users SET username = ? WHERE id = ?")
            .bind(new_username)
            .bind(id)
            .execute(&pool)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    }

    if let Some(new_role) = payload.role {
        if !ROLES.contains(&new_role.as_str()) {
            return Err(AppError::BadRequest(format!("Unknown role '{}'", new_role)));
        }
        sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(new_role)
            .bind(id)
            .execute(&pool)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    }

    if let Some(new_password) = payload.password {
        let hashed = hash_password(&new_password)?;
        sqlx::query("UPDATE users SET password = ? WHERE id = ?")
            .bind(hashed)
            .bind(id)
            .execute(&pool)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    }

    Ok(StatusCode::OK)
}

/// Deletes a user by ID.
/// Admin only. Prevents deleting self.
pub async fn delete_user(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if id == claims.user_id() {
        return Err(AppError::BadRequest("Cannot delete yourself".to_string()));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// A package row joined with its question count, for the admin listing.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PackageListEntry {
    pub id: i64,
    pub title: String,
    pub subject: String,
    pub created_by: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub question_count: i64,
}

/// Lists all packages with their question counts.
/// Admin only.
pub async fn list_packages(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let packages = sqlx::query_as::<_, PackageListEntry>(
        r#"
        SELECT p.id, p.title, p.subject, p.created_by, p.created_at,
               (SELECT COUNT(*) FROM questions q
                WHERE q.package_id = p.id AND q.parent_id IS NULL) AS question_count
        FROM packages p
        ORDER BY p.id DESC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list packages: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(packages))
}

/// Creates a new question package.
/// Admin only.
pub async fn create_package(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreatePackageRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO packages (title, subject, created_by, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&payload.title)
    .bind(&payload.subject)
    .bind(claims.user_id())
    .bind(chrono::Utc::now())
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create package: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": result.last_insert_rowid()})),
    ))
}

/// Retrieves a single package with its ordered questions.
/// Admin only.
pub async fn get_package(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let package = sqlx::query_as::<_, Package>(
        r#"
        SELECT id, title, subject, created_by, created_at
        FROM packages
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Package not found".to_string()))?;

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
    .bind(id)
    .fetch_all(&pool)
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
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let mut by_parent: HashMap<i64, Vec<Question>> = HashMap::new();
    for sub in subs {
        if let Some(parent_id) = sub.parent_id {
            by_parent.entry(parent_id).or_default().push(sub);
        }
    }

    let questions: Vec<QuestionDetail> = parents
        .into_iter()
        .map(|question| {
            let sub_questions = by_parent.remove(&question.id).unwrap_or_default();
            QuestionDetail {
                question,
                sub_questions,
            }
        })
        .collect();

    Ok(Json(PackageDetail { package, questions }))
}

/// Updates a package by ID.
/// Admin only.
pub async fn update_package(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePackageRequest>,
) -> Result<impl IntoResponse, AppError> {
    sqlx::query("SELECT id FROM packages WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Package not found".to_string()))?;

    if let Some(title) = payload.title {
        sqlx::query("UPDATE packages SET title = ? WHERE id = ?")
            .bind(title)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(subject) = payload.subject {
        sqlx::query("UPDATE packages SET subject = ? WHERE id = ?")
            .bind(subject)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    Ok(StatusCode::OK)
}

/// Deletes a package by ID. Packages referenced by an olympiad cannot be
/// deleted; their questions are detached, not deleted.
/// Admin only.
pub async fn delete_package(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let referenced = sqlx::query("SELECT id FROM olympiads WHERE package_id = ? LIMIT 1")
        .bind(id)
        .fetch_optional(&pool)
        .await?;

    if referenced.is_some() {
        return Err(AppError::Conflict(
            "Package is used by an olympiad".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM packages WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete package: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Package not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Rewrites the question order of a package. The request must name exactly
/// the top-level questions currently in the package.
/// Admin only.
pub async fn reorder_package(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<ReorderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let current: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM questions
        WHERE package_id = ? AND parent_id IS NULL
        ORDER BY position, id
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    if current.is_empty() {
        return Err(AppError::NotFound(
            "Package not found or has no questions".to_string(),
        ));
    }

    let mut requested = payload.question_ids.clone();
    let mut existing = current.clone();
    requested.sort_unstable();
    existing.sort_unstable();
    if requested != existing {
        return Err(AppError::BadRequest(
            "Reorder list must name exactly the package's questions".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;
    for (index, question_id) in payload.question_ids.iter().enumerate() {
        sqlx::query("UPDATE questions SET position = ? WHERE id = ?")
            .bind(index as i64)
            .bind(question_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    Ok(StatusCode::OK)
}

/// Creates a new olympiad event.
/// Admin only.
pub async fn create_olympiad(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateOlympiadRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if let Some(message) = payload.shape_error() {
        return Err(AppError::BadRequest(message));
    }

    sqlx::query("SELECT id FROM packages WHERE id = ?")
        .bind(payload.package_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Package not found".to_string()))?;

    let result = sqlx::query(
        r#"
        INSERT INTO olympiads
        (title, description, subject, package_id, start_date, end_date,
         duration_secs, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.subject)
    .bind(payload.package_id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.duration_secs)
    .bind(chrono::Utc::now())
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create olympiad: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": result.last_insert_rowid()})),
    ))
}

/// Updates an olympiad by ID.
/// Admin only.
pub async fn update_olympiad(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateOlympiadRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.title.is_none()
        && payload.description.is_none()
        && payload.subject.is_none()
        && payload.package_id.is_none()
        && payload.start_date.is_none()
        && payload.end_date.is_none()
        && payload.duration_secs.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE olympiads SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }

    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(description);
    }

    if let Some(subject) = payload.subject {
        separated.push("subject = ");
        separated.push_bind_unseparated(subject);
    }

    if let Some(package_id) = payload.package_id {
        separated.push("package_id = ");
        separated.push_bind_unseparated(package_id);
    }

    if let Some(start_date) = payload.start_date {
        separated.push("start_date = ");
        separated.push_bind_unseparated(start_date);
    }

    if let Some(end_date) = payload.end_date {
        separated.push("end_date = ");
        separated.push_bind_unseparated(end_date);
    }

    if let Some(duration_secs) = payload.duration_secs {
        separated.push("duration_secs = ");
        separated.push_bind_unseparated(duration_secs);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update olympiad: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Olympiad not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes an olympiad by ID. Olympiads with submitted attempts are kept
/// for the review history.
/// Admin only.
pub async fn delete_olympiad(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempted = sqlx::query("SELECT id FROM attempts WHERE olympiad_id = ? LIMIT 1")
        .bind(id)
        .fetch_optional(&pool)
        .await?;

    if attempted.is_some() {
        return Err(AppError::Conflict(
            "Olympiad has submitted attempts".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM olympiads WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete olympiad: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Olympiad not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
