// src/session/shuffle.rs

use std::collections::HashMap;

use rand::seq::SliceRandom;

use crate::session::question::ExamQuestion;

/// Question id -> permutation of that question's option indices.
///
/// Computed exactly once at attempt start and held fixed for the attempt's
/// lifetime; a reload sees the same order.
pub type ShuffleMap = HashMap<i64, Vec<usize>>;

/// Uniform random permutation of `0..len` (Fisher-Yates via `rand`).
fn permutation(len: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(&mut rand::rng());
    indices
}

/// Builds the shuffle map for a question set, including sub-questions.
///
/// Only choice-based option lists get an entry. Matching right-side lists
/// never do: they are presented in authored order.
pub fn build_shuffle_map(questions: &[ExamQuestion]) -> ShuffleMap {
    let mut map = ShuffleMap::new();
    for q in questions {
        insert_question(&mut map, q);
    }
    map
}

fn insert_question(map: &mut ShuffleMap, q: &ExamQuestion) {
    // Text options and image options are parallel arrays when both are
    // present (enforced at authoring time), so one permutation covers both.
    let len = if !q.options.is_empty() {
        q.options.len()
    } else {
        q.image_options.len()
    };

    if len > 0 {
        map.insert(q.id, permutation(len));
    }

    for sub in &q.sub_questions {
        insert_question(map, sub);
    }
}
