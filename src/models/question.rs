// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use url::Url;
use validator::Validate;

/// The question types supported by the olympiad engine.
///
/// ClosedEnded and Matching are auto-scored; the analysis and open-ended
/// kinds always go to manual review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "snake_case")]
pub enum QuestionKind {
    ClosedEnded,
    Matching,
    TextAnalysis,
    MapAnalysis,
    OpenEnded,
}

/// Payload of a matching question: two item lists plus the canonical
/// pairing as (left index, right index) tuples, ordered by left index.
///
/// Stored structurally instead of a delimited "left:right,left:right"
/// string, which would break as soon as an item contains ':' or ','.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingSpec {
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub pairs: Vec<(usize, usize)>,
}

/// Represents the 'questions' table in the database.
/// Sub-questions are rows with `parent_id` set, ordered by `position`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    pub package_id: Option<i64>,

    pub parent_id: Option<i64>,

    /// Order within the package (or within the parent for sub-questions).
    pub position: i64,

    pub kind: QuestionKind,

    pub subject: String,

    /// The text content of the question. Sanitized on the way in.
    pub content: String,

    /// Ordered option strings. Stored as a JSON array in the database.
    pub options: Json<Vec<String>>,

    /// Ordered image-option URLs. Parallel to `options` when both are set.
    pub image_options: Json<Vec<String>>,

    /// Matching payload; only set for MATCHING questions.
    pub matching: Option<Json<MatchingSpec>>,

    /// Canonical answer for CLOSED_ENDED questions.
    pub correct_answer: Option<String>,

    pub points: i64,

    pub created_by: Option<i64>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A question together with its ordered sub-questions, for authoring and
/// review surfaces.
#[derive(Debug, Serialize)]
pub struct QuestionDetail {
    #[serde(flatten)]
    pub question: Question,
    pub sub_questions: Vec<Question>,
}

/// DTO for a sub-question inside a question creation request.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubQuestionRequest {
    pub kind: QuestionKind,
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
    #[serde(default)]
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[serde(default)]
    #[validate(custom(function = validate_image_urls))]
    pub image_options: Vec<String>,
    #[validate(length(min = 1, max = 500))]
    pub correct_answer: Option<String>,
    #[serde(default = "default_points")]
    #[validate(range(min = 0, max = 1000))]
    pub points: i64,
}

/// DTO for creating a new question, optionally with sub-questions.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    pub kind: QuestionKind,
    #[validate(length(min = 1, max = 50, message = "Subject is required."))]
    pub subject: String,
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
    #[serde(default)]
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[serde(default)]
    #[validate(custom(function = validate_image_urls))]
    pub image_options: Vec<String>,
    pub matching: Option<MatchingSpec>,
    #[validate(length(min = 1, max = 500))]
    pub correct_answer: Option<String>,
    #[serde(default = "default_points")]
    #[validate(range(min = 0, max = 1000))]
    pub points: i64,
    pub package_id: Option<i64>,
    #[serde(default)]
    #[validate(nested)]
    pub sub_questions: Vec<CreateSubQuestionRequest>,
}

fn default_points() -> i64 {
    1
}

impl CreateQuestionRequest {
    /// Cross-field checks that the derive-level validators cannot express.
    /// Returns a message suitable for a 400 response.
    pub fn shape_error(&self) -> Option<String> {
        if let Some(err) = kind_shape_error(
            self.kind,
            &self.options,
            &self.image_options,
            self.correct_answer.as_deref(),
            self.matching.as_ref(),
        ) {
            return Some(err);
        }

        if !self.sub_questions.is_empty() {
            if !matches!(
                self.kind,
                QuestionKind::TextAnalysis | QuestionKind::MapAnalysis | QuestionKind::OpenEnded
            ) {
                return Some("Only analysis questions can carry sub-questions".to_string());
            }
            for sub in &self.sub_questions {
                if sub.kind == QuestionKind::Matching {
                    return Some("Matching sub-questions are not supported".to_string());
                }
                if let Some(err) = kind_shape_error(
                    sub.kind,
                    &sub.options,
                    &sub.image_options,
                    sub.correct_answer.as_deref(),
                    None,
                ) {
                    return Some(err);
                }
            }
        }

        None
    }
}

fn kind_shape_error(
    kind: QuestionKind,
    options: &[String],
    image_options: &[String],
    correct_answer: Option<&str>,
    matching: Option<&MatchingSpec>,
) -> Option<String> {
    match kind {
        QuestionKind::ClosedEnded => {
            if options.is_empty() && image_options.is_empty() {
                return Some("Closed-ended questions need options".to_string());
            }
            if !options.is_empty() && !image_options.is_empty() && options.len() != image_options.len()
            {
                return Some("Text and image options must be parallel lists".to_string());
            }
            if correct_answer.is_none() {
                return Some("Closed-ended questions need a correct answer".to_string());
            }
            None
        }
        QuestionKind::Matching => {
            let Some(spec) = matching else {
                return Some("Matching questions need a matching payload".to_string());
            };
            if spec.left.is_empty() || spec.right.is_empty() {
                return Some("Matching questions need left and right items".to_string());
            }
            if spec.pairs.is_empty() {
                return Some("Matching questions need a canonical pairing".to_string());
            }
            let mut seen_left = std::collections::HashSet::new();
            for &(left, right) in &spec.pairs {
                if left >= spec.left.len() || right >= spec.right.len() {
                    return Some("Matching pair index out of range".to_string());
                }
                if !seen_left.insert(left) {
                    return Some("Duplicate left item in matching pairs".to_string());
                }
            }
            if !spec.pairs.is_sorted_by_key(|&(left, _)| left) {
                return Some("Matching pairs must be ordered by left item".to_string());
            }
            None
        }
        QuestionKind::TextAnalysis | QuestionKind::MapAnalysis | QuestionKind::OpenEnded => None,
    }
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateQuestionRequest {
    pub subject: Option<String>,
    pub content: Option<String>,
    pub options: Option<Vec<String>>,
    pub image_options: Option<Vec<String>>,
    pub matching: Option<MatchingSpec>,
    pub correct_answer: Option<String>,
    pub points: Option<i64>,
    pub package_id: Option<i64>,
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    for opt in options {
        if opt.is_empty() {
            return Err(validator::ValidationError::new("option_cannot_be_empty"));
        }
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

/// Validates a collection of image URLs, ensuring each meets length and
/// format requirements.
fn validate_image_urls(urls: &[String]) -> Result<(), validator::ValidationError> {
    for url in urls {
        if url.len() > 500 {
            return Err(validator::ValidationError::new("url_too_long"));
        }
        if Url::parse(url).is_err() {
            return Err(validator::ValidationError::new("invalid_url"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_request() -> CreateQuestionRequest {
        CreateQuestionRequest {
            kind: QuestionKind::ClosedEnded,
            subject: "Geography".to_string(),
            content: "Capital of France?".to_string(),
            options: vec!["Paris".to_string(), "Rome".to_string()],
            image_options: Vec::new(),
            matching: None,
            correct_answer: Some("Paris".to_string()),
            points: 1,
            package_id: None,
            sub_questions: Vec::new(),
        }
    }

    #[test]
    fn closed_request_without_answer_is_rejected() {
        let mut req = closed_request();
        req.correct_answer = None;
        assert!(req.shape_error().is_some());
    }

    #[test]
    fn matching_request_requires_valid_pairs() {
        let mut req = closed_request();
        req.kind = QuestionKind::Matching;
        req.options = Vec::new();
        req.correct_answer = None;
        req.matching = Some(MatchingSpec {
            left: vec!["L0".to_string()],
            right: vec!["R0".to_string()],
            pairs: vec![(0, 5)],
        });
        assert!(req.shape_error().is_some());

        req.matching.as_mut().unwrap().pairs = vec![(0, 0)];
        assert!(req.shape_error().is_none());
    }

    #[test]
    fn matching_sub_questions_are_rejected() {
        let mut req = closed_request();
        req.kind = QuestionKind::TextAnalysis;
        req.options = Vec::new();
        req.correct_answer = None;
        req.sub_questions = vec![CreateSubQuestionRequest {
            kind: QuestionKind::Matching,
            content: "sub".to_string(),
            options: Vec::new(),
            image_options: Vec::new(),
            correct_answer: None,
            points: 1,
        }];
        assert!(req.shape_error().is_some());
    }
}
