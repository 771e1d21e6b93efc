// src/store/memory.rs

//! In-process store. One mutex guards all state, so every trait method is
//! atomic with respect to every other.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        question::{NewQuestion, Question},
        session::{BroadcastEntry, JoinedStudent, NewSession, QuizSession, SessionKind, SessionStatus},
        submission::{NewSubmission, Submission},
    },
    store::{Activation, QuizStore},
};

#[derive(Default)]
struct Inner {
    next_question_id: i64,
    next_session_id: i64,
    next_submission_id: i64,
    questions: HashMap<i64, Question>,
    sessions: HashMap<i64, QuizSession>,
    submissions: Vec<Submission>,
    submission_keys: HashSet<(i64, i64, String)>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::InternalServerError("memory store lock poisoned".to_string()))
    }
}

fn session_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Session {} not found", id))
}

fn question_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Question {} not found", id))
}

fn reserve_locked(inner: &mut Inner, question_id: i64, session_id: i64) -> Result<(), AppError> {
    let question = inner
        .questions
        .get_mut(&question_id)
        .ok_or_else(|| question_not_found(question_id))?;
    match question.reserved_by_session_id {
        Some(holder) if holder != session_id => Err(AppError::AlreadyReserved(question_id)),
        _ => {
            question.reserved_by_session_id = Some(session_id);
            Ok(())
        }
    }
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn insert_question(&self, question: NewQuestion) -> Result<Question, AppError> {
        let mut inner = self.lock()?;
        inner.next_question_id += 1;
        let stored = Question {
            id: inner.next_question_id,
            course_id: question.course_id,
            content: question.content,
            options: question.options,
            correct_option: question.correct_option,
            difficulty: question.difficulty,
            explanation: question.explanation,
            author: question.author,
            source: question.source,
            times_used: 0,
            last_used_at: None,
            reserved_by_session_id: None,
            created_at: Utc::now(),
        };
        inner.questions.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_question(&self, id: i64) -> Result<Option<Question>, AppError> {
        Ok(self.lock()?.questions.get(&id).cloned())
    }

    async fn list_available(&self, course_id: i64) -> Result<Vec<Question>, AppError> {
        let inner = self.lock()?;
        let mut available: Vec<Question> = inner
            .questions
            .values()
            .filter(|q| q.course_id == course_id && q.reserved_by_session_id.is_none())
            .cloned()
            .collect();
        // `None < Some(_)`, so never-used questions come first.
        available.sort_by(|a, b| {
            a.last_used_at
                .cmp(&b.last_used_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(available)
    }

    async fn reserve_question(&self, question_id: i64, session_id: i64) -> Result<(), AppError> {
        reserve_locked(&mut *self.lock()?, question_id, session_id)
    }

    async fn release_question(&self, question_id: i64) -> Result<(), AppError> {
        if let Some(question) = self.lock()?.questions.get_mut(&question_id) {
            question.reserved_by_session_id = None;
        }
        Ok(())
    }

    async fn release_session_questions(&self, session_id: i64) -> Result<u64, AppError> {
        let mut inner = self.lock()?;
        let mut released = 0;
        for question in inner.questions.values_mut() {
            if question.reserved_by_session_id == Some(session_id) {
                question.reserved_by_session_id = None;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn mark_question_used(
        &self,
        question_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        let question = inner
            .questions
            .get_mut(&question_id)
            .ok_or_else(|| question_not_found(question_id))?;
        question.times_used += 1;
        question.last_used_at = Some(now);
        Ok(())
    }

    async fn insert_session(&self, session: NewSession) -> Result<Option<QuizSession>, AppError> {
        let mut inner = self.lock()?;
        let code_taken = inner
            .sessions
            .values()
            .any(|s| s.code == session.code && s.status != SessionStatus::Expired);
        if code_taken {
            return Ok(None);
        }

        let id = inner.next_session_id + 1;
        if let SessionKind::Single { question_id } = session.kind {
            reserve_locked(&mut inner, question_id, id)?;
        }

        inner.next_session_id = id;
        let stored = QuizSession {
            id,
            code: session.code,
            duration: session.duration,
            started_at: session.started_at,
            expires_at: session.expires_at,
            status: session.status,
            created_by: session.created_by,
            course_id: session.course_id,
            kind: session.kind,
        };
        inner.sessions.insert(stored.id, stored.clone());
        Ok(Some(stored))
    }

    async fn get_session(&self, id: i64) -> Result<Option<QuizSession>, AppError> {
        Ok(self.lock()?.sessions.get(&id).cloned())
    }

    async fn find_session_by_code(&self, code: &str) -> Result<Option<QuizSession>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .sessions
            .values()
            .filter(|s| s.code == code)
            .max_by_key(|s| (s.status != SessionStatus::Expired, s.started_at, s.id))
            .cloned())
    }

    async fn expire_session(&self, id: i64) -> Result<bool, AppError> {
        let mut inner = self.lock()?;
        let session = inner.sessions.get_mut(&id).ok_or_else(|| session_not_found(id))?;
        if session.status == SessionStatus::Expired {
            return Ok(false);
        }
        session.status = SessionStatus::Expired;
        Ok(true)
    }

    async fn activate_question(
        &self,
        session_id: i64,
        question_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Activation, AppError> {
        let mut inner = self.lock()?;
        let session = inner
            .sessions
            .get(&session_id)
            .ok_or_else(|| session_not_found(session_id))?;
        if session.status == SessionStatus::Expired {
            return Err(AppError::Expired);
        }
        let previous = match &session.kind {
            SessionKind::Class {
                active_question_id, ..
            } => *active_question_id,
            SessionKind::Single { .. } => {
                return Err(AppError::WrongType(
                    "Questions can only be broadcast in class sessions".to_string(),
                ));
            }
        };

        reserve_locked(&mut inner, question_id, session_id)?;

        let mut released = None;
        if let Some(prev) = previous.filter(|prev| *prev != question_id) {
            if let Some(q) = inner.questions.get_mut(&prev) {
                if q.reserved_by_session_id == Some(session_id) {
                    q.reserved_by_session_id = None;
                    released = Some(prev);
                }
            }
        }

        let session = inner
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| session_not_found(session_id))?;
        if let SessionKind::Class {
            active_question_id,
            questions_history,
            ..
        } = &mut session.kind
        {
            questions_history.push(BroadcastEntry {
                question_id,
                broadcasted_at: now,
            });
            *active_question_id = Some(question_id);
        }
        session.status = SessionStatus::Active;

        Ok(Activation {
            session: session.clone(),
            released,
        })
    }

    async fn add_student(
        &self,
        session_id: i64,
        student: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        let session = inner
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| session_not_found(session_id))?;
        if let SessionKind::Class {
            students_joined, ..
        } = &mut session.kind
        {
            if !students_joined.iter().any(|s| s.student == student) {
                students_joined.push(JoinedStudent {
                    student: student.to_string(),
                    joined_at: now,
                });
            }
        }
        Ok(())
    }

    async fn list_overdue_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<QuizSession>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .sessions
            .values()
            .filter(|s| s.status != SessionStatus::Expired && s.expires_at <= now)
            .cloned()
            .collect())
    }

    async fn insert_submission(&self, submission: NewSubmission) -> Result<Submission, AppError> {
        let mut inner = self.lock()?;
        let key = (
            submission.session_id,
            submission.question_id,
            submission.student.clone(),
        );
        if !inner.submission_keys.insert(key) {
            return Err(AppError::DuplicateSubmission);
        }

        inner.next_submission_id += 1;
        let stored = Submission {
            id: inner.next_submission_id,
            session_id: submission.session_id,
            question_id: submission.question_id,
            student: submission.student,
            selected_option: submission.selected_option,
            is_correct: submission.is_correct,
            time_taken: submission.time_taken,
            submitted_at: submission.submitted_at,
        };
        inner.submissions.push(stored.clone());
        Ok(stored)
    }

    async fn find_submission(
        &self,
        session_id: i64,
        question_id: i64,
        student: &str,
    ) -> Result<Option<Submission>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .submissions
            .iter()
            .find(|s| s.session_id == session_id && s.question_id == question_id && s.student == student)
            .cloned())
    }

    async fn list_submissions(&self, session_id: i64) -> Result<Vec<Submission>, AppError> {
        let inner = self.lock()?;
        let mut submissions: Vec<Submission> = inner
            .submissions
            .iter()
            .filter(|s| s.session_id == session_id)
            .cloned()
            .collect();
        submissions.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then(a.id.cmp(&b.id)));
        Ok(submissions)
    }
}
