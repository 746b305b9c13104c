// src/session/store.rs

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::session::attempt::{AttemptSession, AttemptStatus};

/// Owner of all live attempt sessions, keyed by (user, olympiad).
///
/// Every read and write goes through one mutex, so there is exactly one
/// writer at a time and a half-written session can never be observed. The
/// lock is never held across an await point.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<(i64, i64), AttemptSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` against the live session for (user, olympiad), if any.
    pub fn with<R>(
        &self,
        user_id: i64,
        olympiad_id: i64,
        f: impl FnOnce(&mut AttemptSession) -> R,
    ) -> Option<R> {
        let mut map = self.inner.lock().expect("session store poisoned");
        map.get_mut(&(user_id, olympiad_id)).map(f)
    }

    /// Inserts a fresh session unless one already exists. Returns false if
    /// a concurrent start won the race; the existing session is kept.
    pub fn insert_new(&self, session: AttemptSession) -> bool {
        let key = (session.user_id(), session.olympiad_id());
        let mut map = self.inner.lock().expect("session store poisoned");
        if map.contains_key(&key) {
            return false;
        }
        map.insert(key, session);
        true
    }

    /// Removes and returns the live session, e.g. for an explicit submit.
    pub fn remove(&self, user_id: i64, olympiad_id: i64) -> Option<AttemptSession> {
        let mut map = self.inner.lock().expect("session store poisoned");
        map.remove(&(user_id, olympiad_id))
    }

    /// Removes and returns every in-progress session whose time budget is
    /// spent, so the sweeper can finalize and persist them.
    pub fn take_expired(&self, now: DateTime<Utc>) -> Vec<AttemptSession> {
        let mut map = self.inner.lock().expect("session store poisoned");
        let expired_keys: Vec<(i64, i64)> = map
            .iter()
            .filter(|(_, s)| s.is_expired(now))
            .map(|(k, _)| *k)
            .collect();
        expired_keys
            .into_iter()
            .filter_map(|k| map.remove(&k))
            .collect()
    }

    /// Status as seen from outside the store: `NotStarted` when no session
    /// exists for the pair.
    pub fn status(&self, user_id: i64, olympiad_id: i64) -> AttemptStatus {
        let map = self.inner.lock().expect("session store poisoned");
        match map.get(&(user_id, olympiad_id)) {
            Some(s) => s.status(),
            None => AttemptStatus::NotStarted,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("session store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionKind;
    use crate::session::question::ExamQuestion;
    use chrono::Duration;

    fn question(id: i64) -> ExamQuestion {
        ExamQuestion {
            id,
            kind: QuestionKind::ClosedEnded,
            content: "Q".to_string(),
            options: vec!["A".to_string(), "B".to_string()],
            image_options: Vec::new(),
            matching: None,
            correct_answer: Some("A".to_string()),
            points: 1,
            sub_questions: Vec::new(),
        }
    }

    #[test]
    fn insert_is_first_writer_wins() {
        let store = SessionStore::new();
        let now = Utc::now();
        assert!(store.insert_new(AttemptSession::new(1, 7, vec![question(1)], 3600, now)));
        assert!(!store.insert_new(AttemptSession::new(1, 7, vec![question(2)], 3600, now)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn status_for_missing_pair_is_not_started() {
        let store = SessionStore::new();
        assert_eq!(store.status(1, 1), AttemptStatus::NotStarted);
    }

    #[test]
    fn take_expired_drains_only_overdue_sessions() {
        let store = SessionStore::new();
        let now = Utc::now();
        store.insert_new(AttemptSession::new(1, 7, vec![question(1)], 3600, now));
        store.insert_new(AttemptSession::new(
            2,
            7,
            vec![question(1)],
            3600,
            now - Duration::seconds(3601),
        ));

        let expired = store.take_expired(now);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].user_id(), 2);
        assert_eq!(store.len(), 1);

        // Nothing left to drain on the next tick.
        assert!(store.take_expired(now).is_empty());
    }
}
