// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, types::Json};

use crate::{
    error::AppError,
    models::{
        question::{NewQuestion, Question, QuestionRow},
        session::{BroadcastEntry, JoinedStudent, NewSession, QuizSession, SessionKind, SessionRow},
        submission::{NewSubmission, Submission},
    },
    store::{Activation, QuizStore},
};

const QUESTION_COLUMNS: &str = r#"
    id, course_id, content, options, correct_option, difficulty, explanation,
    author, source, times_used, last_used_at, reserved_by_session_id, created_at
"#;

const SESSION_COLUMNS: &str = r#"
    id, code, type, duration_secs, started_at, expires_at, status,
    created_by, course_id, question_id, active_question_id
"#;

const SUBMISSION_COLUMNS: &str = r#"
    id, session_id, question_id, student, selected_option, is_correct,
    time_taken, submitted_at
"#;

/// Postgres-backed store. Uniqueness and conditional updates are enforced
/// by the schema in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn hydrate(&self, row: SessionRow) -> Result<QuizSession, AppError> {
        let history = sqlx::query_as::<_, BroadcastEntry>(
            r#"
            SELECT question_id, broadcasted_at
            FROM session_broadcasts
            WHERE session_id = $1
            ORDER BY id
            "#,
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        let students = sqlx::query_as::<_, JoinedStudent>(
            r#"
            SELECT student, joined_at
            FROM session_students
            WHERE session_id = $1
            ORDER BY joined_at, student
            "#,
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        row.into_session(history, students)
            .map_err(AppError::InternalServerError)
    }

    async fn hydrate_opt(&self, row: Option<SessionRow>) -> Result<Option<QuizSession>, AppError> {
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }
}

fn into_question(row: QuestionRow) -> Result<Question, AppError> {
    Question::try_from(row).map_err(AppError::InternalServerError)
}

/// Conditional reservation on an open connection or transaction.
async fn reserve_in(
    conn: &mut PgConnection,
    question_id: i64,
    session_id: i64,
) -> Result<(), AppError> {
    // Single conditional UPDATE: two sessions racing for the same question
    // cannot both see it free.
    let result = sqlx::query(
        r#"
        UPDATE questions
        SET reserved_by_session_id = $2
        WHERE id = $1
          AND (reserved_by_session_id IS NULL OR reserved_by_session_id = $2)
        "#,
    )
    .bind(question_id)
    .bind(session_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(());
    }

    let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM questions WHERE id = $1")
        .bind(question_id)
        .fetch_optional(&mut *conn)
        .await?;

    match exists {
        Some(_) => Err(AppError::AlreadyReserved(question_id)),
        None => Err(AppError::NotFound(format!("Question {} not found", question_id))),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[async_trait]
impl QuizStore for PgStore {
    async fn insert_question(&self, question: NewQuestion) -> Result<Question, AppError> {
        let row = sqlx::query_as::<_, QuestionRow>(&format!(
            r#"
            INSERT INTO questions
            (course_id, content, options, correct_option, difficulty, explanation, author, source)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {QUESTION_COLUMNS}
            "#
        ))
        .bind(question.course_id)
        .bind(&question.content)
        .bind(Json(&question.options))
        .bind(question.correct_option)
        .bind(question.difficulty.as_str())
        .bind(&question.explanation)
        .bind(&question.author)
        .bind(question.source.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert question: {:?}", e);
            AppError::from(e)
        })?;

        into_question(row)
    }

    async fn get_question(&self, id: i64) -> Result<Option<Question>, AppError> {
        sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(into_question)
        .transpose()
    }

    async fn list_available(&self, course_id: i64) -> Result<Vec<Question>, AppError> {
        let rows = sqlx::query_as::<_, QuestionRow>(&format!(
            r#"
            SELECT {QUESTION_COLUMNS}
            FROM questions
            WHERE course_id = $1 AND reserved_by_session_id IS NULL
            ORDER BY last_used_at ASC NULLS FIRST, created_at DESC, id DESC
            "#
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(into_question).collect()
    }

    async fn reserve_question(&self, question_id: i64, session_id: i64) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        reserve_in(&mut conn, question_id, session_id).await
    }

    async fn release_question(&self, question_id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE questions SET reserved_by_session_id = NULL WHERE id = $1")
            .bind(question_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn release_session_questions(&self, session_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE questions SET reserved_by_session_id = NULL WHERE reserved_by_session_id = $1",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn mark_question_used(
        &self,
        question_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE questions SET times_used = times_used + 1, last_used_at = $2 WHERE id = $1",
        )
        .bind(question_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Question {} not found", question_id)));
        }
        Ok(())
    }

    async fn insert_session(&self, session: NewSession) -> Result<Option<QuizSession>, AppError> {
        let (question_id, active_question_id) = match &session.kind {
            SessionKind::Single { question_id } => (Some(*question_id), None),
            SessionKind::Class {
                active_question_id, ..
            } => (None, *active_question_id),
        };
        let duration_secs = i32::try_from(session.duration)
            .map_err(|_| AppError::InvalidInput("Duration out of range".to_string()))?;

        let mut tx = self.pool.begin().await?;

        // `idx_quiz_sessions_live_code` rejects a second live session with the same code.
        let inserted = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            INSERT INTO quiz_sessions
            (code, type, duration_secs, started_at, expires_at, status, created_by, course_id,
             question_id, active_question_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(&session.code)
        .bind(session.kind.session_type().as_str())
        .bind(duration_secs)
        .bind(session.started_at)
        .bind(session.expires_at)
        .bind(session.status.as_str())
        .bind(&session.created_by)
        .bind(session.course_id)
        .bind(question_id)
        .bind(active_question_id)
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(e) if is_unique_violation(&e) => return Ok(None),
            Err(e) => {
                tracing::error!("Failed to insert session: {:?}", e);
                return Err(AppError::from(e));
            }
        };

        // Dropping the transaction on a failed reservation rolls the insert back.
        if let Some(question_id) = question_id {
            reserve_in(&mut tx, question_id, row.id).await?;
        }

        tx.commit().await?;

        Ok(Some(self.hydrate(row).await?))
    }

    async fn get_session(&self, id: i64) -> Result<Option<QuizSession>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM quiz_sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate_opt(row).await
    }

    async fn find_session_by_code(&self, code: &str) -> Result<Option<QuizSession>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM quiz_sessions
            WHERE code = $1
            ORDER BY (status <> 'expired') DESC, started_at DESC, id DESC
            LIMIT 1
            "#
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate_opt(row).await
    }

    async fn expire_session(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE quiz_sessions SET status = 'expired' WHERE id = $1 AND status <> 'expired'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn activate_question(
        &self,
        session_id: i64,
        question_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Activation, AppError> {
        let mut tx = self.pool.begin().await?;

        // The row lock serializes broadcasts into the same session.
        let current = sqlx::query_as::<_, (String, String, Option<i64>)>(
            r#"
            SELECT type, status, active_question_id
            FROM quiz_sessions
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;

        let previous = match current {
            None => return Err(AppError::NotFound(format!("Session {} not found", session_id))),
            Some((session_type, _, _)) if session_type != "class" => {
                return Err(AppError::WrongType(
                    "Questions can only be broadcast in class sessions".to_string(),
                ));
            }
            Some((_, status, _)) if status == "expired" => return Err(AppError::Expired),
            Some((_, _, previous)) => previous,
        };

        reserve_in(&mut tx, question_id, session_id).await?;

        sqlx::query(
            "UPDATE quiz_sessions SET active_question_id = $2, status = 'active' WHERE id = $1",
        )
        .bind(session_id)
        .bind(question_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO session_broadcasts (session_id, question_id, broadcasted_at) VALUES ($1, $2, $3)",
        )
        .bind(session_id)
        .bind(question_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let mut released = None;
        if let Some(prev) = previous.filter(|prev| *prev != question_id) {
            let result = sqlx::query(
                r#"
                UPDATE questions SET reserved_by_session_id = NULL
                WHERE id = $1 AND reserved_by_session_id = $2
                "#,
            )
            .bind(prev)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 1 {
                released = Some(prev);
            }
        }

        tx.commit().await?;

        let session = self
            .get_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))?;
        Ok(Activation { session, released })
    }

    async fn add_student(
        &self,
        session_id: i64,
        student: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO session_students (session_id, student, joined_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (session_id, student) DO NOTHING
            "#,
        )
        .bind(session_id)
        .bind(student)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_overdue_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<QuizSession>, AppError> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM quiz_sessions
            WHERE status <> 'expired' AND expires_at <= $1
            ORDER BY expires_at
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            sessions.push(self.hydrate(row).await?);
        }
        Ok(sessions)
    }

    async fn insert_submission(&self, submission: NewSubmission) -> Result<Submission, AppError> {
        sqlx::query_as::<_, Submission>(&format!(
            r#"
            INSERT INTO submissions
            (session_id, question_id, student, selected_option, is_correct, time_taken, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {SUBMISSION_COLUMNS}
            "#
        ))
        .bind(submission.session_id)
        .bind(submission.question_id)
        .bind(&submission.student)
        .bind(submission.selected_option)
        .bind(submission.is_correct)
        .bind(submission.time_taken)
        .bind(submission.submitted_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // uq_submissions_session_question_student
            if is_unique_violation(&e) {
                AppError::DuplicateSubmission
            } else {
                tracing::error!("Failed to insert submission: {:?}", e);
                AppError::from(e)
            }
        })
    }

    async fn find_submission(
        &self,
        session_id: i64,
        question_id: i64,
        student: &str,
    ) -> Result<Option<Submission>, AppError> {
        let submission = sqlx::query_as::<_, Submission>(&format!(
            r#"
            SELECT {SUBMISSION_COLUMNS}
            FROM submissions
            WHERE session_id = $1 AND question_id = $2 AND student = $3
            "#
        ))
        .bind(session_id)
        .bind(question_id)
        .bind(student)
        .fetch_optional(&self.pool)
        .await?;

        Ok(submission)
    }

    async fn list_submissions(&self, session_id: i64) -> Result<Vec<Submission>, AppError> {
        let submissions = sqlx::query_as::<_, Submission>(&format!(
            r#"
            SELECT {SUBMISSION_COLUMNS}
            FROM submissions
            WHERE session_id = $1
            ORDER BY submitted_at, id
            "#
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(submissions)
    }
}
