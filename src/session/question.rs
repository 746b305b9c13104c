// src/session/question.rs

use serde::Serialize;

use crate::models::question::{MatchingSpec, Question, QuestionKind};
use crate::session::shuffle::ShuffleMap;

/// A question as held by a live attempt session.
///
/// Copied out of the database rows when the attempt starts, so later edits
/// to the question bank never change a running attempt.
#[derive(Debug, Clone)]
pub struct ExamQuestion {
    pub id: i64,
    pub kind: QuestionKind,
    pub content: String,
    pub options: Vec<String>,
    pub image_options: Vec<String>,
    pub matching: Option<MatchingSpec>,
    pub correct_answer: Option<String>,
    pub points: i64,
    pub sub_questions: Vec<ExamQuestion>,
}

impl ExamQuestion {
    /// Assembles an exam question from a parent row and its ordered
    /// sub-question rows.
    pub fn from_rows(row: Question, subs: Vec<Question>) -> Self {
        ExamQuestion {
            id: row.id,
            kind: row.kind,
            content: row.content,
            options: row.options.0,
            image_options: row.image_options.0,
            matching: row.matching.map(|m| m.0),
            correct_answer: row.correct_answer,
            points: row.points,
            sub_questions: subs
                .into_iter()
                .map(|s| ExamQuestion::from_rows(s, Vec::new()))
                .collect(),
        }
    }
}

/// Student-facing view of an exam question: options in the attempt's
/// shuffled order, canonical answers stripped.
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub kind: QuestionKind,
    pub content: String,
    pub options: Vec<String>,
    pub image_options: Vec<String>,
    /// Matching left items, original order.
    pub matching_left: Vec<String>,
    /// Matching right items, in authored order; the numeric labels shown
    /// to students reference this order.
    pub matching_right: Vec<String>,
    pub points: i64,
    pub sub_questions: Vec<PublicQuestion>,
}

impl PublicQuestion {
    pub fn from_exam(q: &ExamQuestion, shuffle: &ShuffleMap) -> Self {
        let perm = shuffle.get(&q.id);
        let (left, right) = match &q.matching {
            Some(m) => (m.left.clone(), m.right.clone()),
            None => (Vec::new(), Vec::new()),
        };

        PublicQuestion {
            id: q.id,
            kind: q.kind,
            content: q.content.clone(),
            options: reorder(&q.options, perm),
            image_options: reorder(&q.image_options, perm),
            matching_left: left,
            matching_right: right,
            points: q.points,
            sub_questions: q
                .sub_questions
                .iter()
                .map(|s| PublicQuestion::from_exam(s, shuffle))
                .collect(),
        }
    }
}

/// Applies a permutation to an option list. Lists whose length does not
/// match the permutation (including empty lists) are returned as-is.
fn reorder(list: &[String], perm: Option<&Vec<usize>>) -> Vec<String> {
    match perm {
        Some(p) if p.len() == list.len() => p.iter().map(|&i| list[i].clone()).collect(),
        _ => list.to_vec(),
    }
}
