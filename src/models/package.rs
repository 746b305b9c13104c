// src/models/package.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::question::QuestionDetail;

/// Represents the 'packages' table: an ordered bundle of questions that an
/// olympiad event is built from.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Package {
    pub id: i64,
    pub title: String,
    pub subject: String,
    pub created_by: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A package together with its ordered questions, for the admin detail
/// view.
#[derive(Debug, Serialize)]
pub struct PackageDetail {
    #[serde(flatten)]
    pub package: Package,
    pub questions: Vec<QuestionDetail>,
}

/// DTO for creating a new package.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePackageRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 50, message = "Subject is required."))]
    pub subject: String,
}

/// DTO for updating a package. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdatePackageRequest {
    pub title: Option<String>,
    pub subject: Option<String>,
}

/// DTO for rewriting the question order of a package. The list must name
/// exactly the top-level questions currently in the package.
#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub question_ids: Vec<i64>,
}
