// src/store/mod.rs

//! Persistence seam of the engine.
//!
//! Every method is a single atomic step from the caller's point of view. The
//! conditional ones (`reserve_question`, `insert_session`, `activate_question`,
//! `insert_submission`, `expire_session`) must be enforced by the store
//! itself, never by a read-then-write in the caller.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        question::{NewQuestion, Question},
        session::{NewSession, QuizSession},
        submission::{NewSubmission, Submission},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type SharedStore = Arc<dyn QuizStore>;

/// Result of making a question active in a class session.
#[derive(Debug, Clone, PartialEq)]
pub struct Activation {
    pub session: QuizSession,
    /// The previously active question whose reservation was dropped, if any.
    pub released: Option<i64>,
}

#[async_trait]
pub trait QuizStore: Send + Sync {
    // Question bank

    async fn insert_question(&self, question: NewQuestion) -> Result<Question, AppError>;

    async fn get_question(&self, id: i64) -> Result<Option<Question>, AppError>;

    /// Unreserved questions of a course, least recently used first
    /// (never used first, then oldest `last_used_at`, ties by newest `created_at`).
    async fn list_available(&self, course_id: i64) -> Result<Vec<Question>, AppError>;

    /// Marks the question as held by `session_id`.
    ///
    /// Succeeds when the question is free or already held by the same session.
    /// Fails with `AlreadyReserved` without touching the question otherwise.
    async fn reserve_question(&self, question_id: i64, session_id: i64) -> Result<(), AppError>;

    /// Clears any reservation. Idempotent.
    async fn release_question(&self, question_id: i64) -> Result<(), AppError>;

    /// Clears every reservation held by `session_id`. Returns how many were held.
    async fn release_session_questions(&self, session_id: i64) -> Result<u64, AppError>;

    async fn mark_question_used(&self, question_id: i64, now: DateTime<Utc>)
    -> Result<(), AppError>;

    // Sessions

    /// Inserts the session unless another non-expired session holds the same
    /// code, in which case `Ok(None)` is returned.
    ///
    /// A single session's question is reserved in the same step. If that
    /// reservation fails the error is returned and nothing is inserted, so
    /// the code never resolves to a session without its question.
    async fn insert_session(&self, session: NewSession) -> Result<Option<QuizSession>, AppError>;

    async fn get_session(&self, id: i64) -> Result<Option<QuizSession>, AppError>;

    /// Resolves a code to the non-expired session holding it, falling back to
    /// the most recently started session that ever used it.
    async fn find_session_by_code(&self, code: &str) -> Result<Option<QuizSession>, AppError>;

    /// Sets status to `expired`. Returns `false` when it already was.
    async fn expire_session(&self, id: i64) -> Result<bool, AppError>;

    /// Reserves `question_id` for the session, makes it the active question,
    /// appends `{question_id, now}` to the history, sets status `active` and
    /// releases the question it replaces, all in one step. Concurrent calls
    /// for the same session are serialized, so the replaced question is
    /// always the one that was actually active.
    ///
    /// Fails without any change with `AlreadyReserved` when another session
    /// holds the question, `WrongType` for single sessions and `Expired` if
    /// the session expired in the meantime.
    async fn activate_question(
        &self,
        session_id: i64,
        question_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Activation, AppError>;

    /// Records the student as joined. A student already present keeps the
    /// original `joined_at`.
    async fn add_student(
        &self,
        session_id: i64,
        student: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Non-expired sessions whose `expires_at` is at or before `now`.
    async fn list_overdue_sessions(&self, now: DateTime<Utc>)
    -> Result<Vec<QuizSession>, AppError>;

    // Submission ledger

    /// Inserts a submission. Fails with `DuplicateSubmission` when one exists
    /// for the same `(session_id, question_id, student)`.
    async fn insert_submission(&self, submission: NewSubmission) -> Result<Submission, AppError>;

    async fn find_submission(
        &self,
        session_id: i64,
        question_id: i64,
        student: &str,
    ) -> Result<Option<Submission>, AppError>;

    /// All submissions of a session ordered by `submitted_at`.
    async fn list_submissions(&self, session_id: i64) -> Result<Vec<Submission>, AppError>;
}
