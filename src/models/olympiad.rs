// src/models/olympiad.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'olympiads' table: a question package attached to a time
/// window during which students may attempt it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Olympiad {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub subject: String,
    pub package_id: i64,
    /// Students may start an attempt between these two instants.
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Per-attempt time budget in seconds.
    pub duration_secs: i64,
    pub created_at: DateTime<Utc>,
}

/// DTO for creating a new olympiad event.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOlympiadRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    #[serde(default)]
    pub description: String,
    #[validate(length(min = 1, max = 50, message = "Subject is required."))]
    pub subject: String,
    pub package_id: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default = "default_duration")]
    #[validate(range(min = 60, max = 86400))]
    pub duration_secs: i64,
}

fn default_duration() -> i64 {
    crate::config::DEFAULT_ATTEMPT_DURATION_SECS
}

impl CreateOlympiadRequest {
    pub fn shape_error(&self) -> Option<String> {
        if self.end_date <= self.start_date {
            return Some("End date must be after start date".to_string());
        }
        None
    }
}

/// DTO for updating an olympiad. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateOlympiadRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub package_id: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
}

/// Query parameters for listing olympiads.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub subject: Option<String>,
    pub q: Option<String>,
}
