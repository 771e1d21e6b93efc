// src/services/lifecycle.rs

//! Session lifecycle: `waiting` (class only) -> `active` -> `expired`.
//!
//! Expiry is lazy. Every read and write path passes the session through
//! [`observe`], which persists the `expired` status the first time a session
//! is seen at or past `expires_at`. The background sweep is the same call
//! applied to all overdue sessions.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::{
        CLASS_MAX_DURATION_SECS, CLASS_MIN_DURATION_SECS, SINGLE_MAX_DURATION_SECS,
        SINGLE_MIN_DURATION_SECS,
    },
    error::AppError,
    models::{
        question::{PublicQuestion, Question},
        session::{
            CreateSessionRequest, NewSession, QuizSession, SessionKind, SessionStatus,
            SessionSummary, SessionType, SessionView,
        },
    },
    services::code_allocator,
    store::{QuizStore, SharedStore},
    utils::jwt::Caller,
};

/// Status of `session` at instant `now`. The single source of truth for expiry.
pub fn status_at(session: &QuizSession, now: DateTime<Utc>) -> SessionStatus {
    if now >= session.expires_at {
        SessionStatus::Expired
    } else {
        session.status
    }
}

pub fn duration_bounds(session_type: SessionType) -> (i64, i64) {
    match session_type {
        SessionType::Single => (SINGLE_MIN_DURATION_SECS, SINGLE_MAX_DURATION_SECS),
        SessionType::Class => (CLASS_MIN_DURATION_SECS, CLASS_MAX_DURATION_SECS),
    }
}

fn validate_duration(session_type: SessionType, duration: i64) -> Result<(), AppError> {
    let (min, max) = duration_bounds(session_type);
    if !(min..=max).contains(&duration) {
        return Err(AppError::InvalidInput(format!(
            "Duration for {} sessions must be between {} and {} seconds",
            session_type.as_str(),
            min,
            max
        )));
    }
    Ok(())
}

pub fn seconds_remaining(session: &QuizSession, now: DateTime<Utc>) -> i64 {
    (session.expires_at - now).num_seconds().max(0)
}

pub(crate) async fn load_session(store: &dyn QuizStore, id: i64) -> Result<QuizSession, AppError> {
    store
        .get_session(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))
}

pub(crate) async fn load_question(store: &dyn QuizStore, id: i64) -> Result<Question, AppError> {
    store
        .get_question(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))
}

/// Applies lazy expiry. Returns the session with its current status.
pub async fn observe(
    store: &dyn QuizStore,
    mut session: QuizSession,
    now: DateTime<Utc>,
) -> Result<QuizSession, AppError> {
    if session.status != SessionStatus::Expired
        && status_at(&session, now) == SessionStatus::Expired
    {
        // Only the observer that flips the status releases the reservation.
        if store.expire_session(session.id).await? {
            let released = store.release_session_questions(session.id).await?;
            tracing::info!(
                "Session {} ({}) expired, released {} question(s)",
                session.id,
                session.code,
                released
            );
        }
        session.status = SessionStatus::Expired;
    }
    Ok(session)
}

/// Loads and observes; fails with `Expired` if the session is past its window.
async fn load_live(
    store: &dyn QuizStore,
    id: i64,
    now: DateTime<Utc>,
) -> Result<QuizSession, AppError> {
    let session = observe(store, load_session(store, id).await?, now).await?;
    if session.status == SessionStatus::Expired {
        return Err(AppError::Expired);
    }
    Ok(session)
}

/// Creates a session for `caller`.
///
/// Single sessions go live at once with their question reserved and marked
/// used. Class sessions start `waiting` with nothing broadcast.
pub async fn create_session(
    store: &dyn QuizStore,
    caller: &Caller,
    req: CreateSessionRequest,
    now: DateTime<Utc>,
) -> Result<QuizSession, AppError> {
    validate_duration(req.session_type, req.duration)?;

    let (kind, status) = match (req.session_type, req.question_id) {
        (SessionType::Single, Some(question_id)) => {
            let question = load_question(store, question_id).await?;
            if question.course_id != req.course_id {
                return Err(AppError::InvalidInput(
                    "Question does not belong to this course".to_string(),
                ));
            }
            if question.reserved_by_session_id.is_some() {
                return Err(AppError::AlreadyReserved(question_id));
            }
            (SessionKind::Single { question_id }, SessionStatus::Active)
        }
        (SessionType::Single, None) => {
            return Err(AppError::InvalidInput(
                "Single sessions require a question_id".to_string(),
            ));
        }
        (SessionType::Class, Some(_)) => {
            return Err(AppError::InvalidInput(
                "Class sessions start without a question; broadcast one instead".to_string(),
            ));
        }
        (SessionType::Class, None) => (
            SessionKind::Class {
                active_question_id: None,
                questions_history: Vec::new(),
                students_joined: Vec::new(),
            },
            SessionStatus::Waiting,
        ),
    };

    let template = NewSession {
        code: String::new(),
        duration: req.duration,
        started_at: now,
        expires_at: now + Duration::seconds(req.duration),
        status,
        created_by: caller.identity.clone(),
        course_id: req.course_id,
        kind,
    };

    // Single sessions have their question reserved by the insert itself.
    let session = code_allocator::allocate_and_insert(store, template, now).await?;

    if let SessionKind::Single { question_id } = session.kind {
        store.mark_question_used(question_id, now).await?;
    }

    tracing::info!(
        "Created {} session {} with code {} for course {} (expires {})",
        session.session_type().as_str(),
        session.id,
        session.code,
        session.course_id,
        session.expires_at
    );

    Ok(session)
}

/// Makes `question_id` the active question of a class session.
pub async fn broadcast(
    store: &dyn QuizStore,
    session_id: i64,
    question_id: i64,
    caller: &Caller,
    now: DateTime<Utc>,
) -> Result<QuizSession, AppError> {
    let session = load_live(store, session_id, now).await?;

    if let SessionKind::Single { .. } = session.kind {
        return Err(AppError::WrongType(
            "Questions can only be broadcast in class sessions".to_string(),
        ));
    }

    if !session.is_owned_by(&caller.identity) {
        return Err(AppError::NotOwner);
    }

    let question = load_question(store, question_id).await?;
    if question.course_id != session.course_id {
        return Err(AppError::InvalidInput(
            "Question does not belong to this course".to_string(),
        ));
    }

    // Reserve, swap and release happen in one store step; a conflict leaves
    // the current broadcast untouched.
    let activation = store.activate_question(session.id, question_id, now).await?;

    store.mark_question_used(question_id, now).await?;

    tracing::info!(
        "Session {} broadcast question {} (released: {:?})",
        session.id,
        question_id,
        activation.released
    );

    Ok(activation.session)
}

/// Ends a session early. Ending an already expired session is a no-op.
pub async fn end_session(
    store: &dyn QuizStore,
    session_id: i64,
    caller: &Caller,
) -> Result<QuizSession, AppError> {
    let mut session = load_session(store, session_id).await?;

    if !session.is_owned_by(&caller.identity) {
        return Err(AppError::NotOwner);
    }

    let was_live = store.expire_session(session.id).await?;
    let released = store.release_session_questions(session.id).await?;
    session.status = SessionStatus::Expired;

    if was_live {
        tracing::info!(
            "Session {} ended by creator, released {} question(s)",
            session.id,
            released
        );
    }

    Ok(session)
}

/// Session detail for its creator or an admin.
pub async fn get_session(
    store: &dyn QuizStore,
    session_id: i64,
    caller: &Caller,
    now: DateTime<Utc>,
) -> Result<QuizSession, AppError> {
    let session = load_session(store, session_id).await?;
    if !session.is_owned_by(&caller.identity) && !caller.role.is_admin() {
        return Err(AppError::Forbidden(
            "Only the session creator can view this session".to_string(),
        ));
    }
    observe(store, session, now).await
}

async fn resolve_code(
    store: &dyn QuizStore,
    code: &str,
    now: DateTime<Utc>,
) -> Result<QuizSession, AppError> {
    if code_allocator::code_type(code).is_none() {
        return Err(AppError::InvalidInput("Malformed session code".to_string()));
    }

    let session = store
        .find_session_by_code(code)
        .await?
        .ok_or_else(|| AppError::NotFound("No session with this code".to_string()))?;

    let session = observe(store, session, now).await?;
    if session.status == SessionStatus::Expired {
        return Err(AppError::Expired);
    }
    Ok(session)
}

async fn view_for(
    store: &dyn QuizStore,
    session: &QuizSession,
    student: &str,
    now: DateTime<Utc>,
) -> Result<SessionView, AppError> {
    let summary = SessionSummary {
        id: session.id,
        code: session.code.clone(),
        session_type: session.session_type(),
        expires_at: session.expires_at,
        seconds_remaining: seconds_remaining(session, now),
    };

    let question_id = match (session.status, session.question_in_scope()) {
        (SessionStatus::Active, Some(question_id)) => question_id,
        _ => return Ok(SessionView::Waiting { session: summary }),
    };

    if store
        .find_submission(session.id, question_id, student)
        .await?
        .is_some()
    {
        return Ok(SessionView::Submitted {
            session: summary,
            question_id,
        });
    }

    let question = load_question(store, question_id).await?;
    Ok(SessionView::Active {
        session: summary,
        question: PublicQuestion::from(&question),
    })
}

/// Resolves a code for a student and records them as joined (class sessions).
pub async fn join(
    store: &dyn QuizStore,
    code: &str,
    student: &str,
    now: DateTime<Utc>,
) -> Result<SessionView, AppError> {
    let session = resolve_code(store, code, now).await?;

    if session.session_type() == SessionType::Class {
        store.add_student(session.id, student, now).await?;
        tracing::debug!("Student {} joined session {}", student, session.id);
    }

    view_for(store, &session, student, now).await
}

/// Same view as [`join`] without recording the student.
pub async fn poll(
    store: &dyn QuizStore,
    code: &str,
    student: &str,
    now: DateTime<Utc>,
) -> Result<SessionView, AppError> {
    let session = resolve_code(store, code, now).await?;
    view_for(store, &session, student, now).await
}

/// Observes every overdue session once. Returns how many it found.
pub async fn sweep(store: &dyn QuizStore, now: DateTime<Utc>) -> Result<usize, AppError> {
    let overdue = store.list_overdue_sessions(now).await?;
    let count = overdue.len();
    for session in overdue {
        observe(store, session, now).await?;
    }
    Ok(count)
}

/// Background loop calling [`sweep`] every `interval`.
pub async fn run_expiry_sweep(store: SharedStore, interval: StdDuration) {
    tracing::info!(
        "Starting session expiry sweep (interval {}s)",
        interval.as_secs()
    );
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match sweep(store.as_ref(), Utc::now()).await {
            Ok(0) => {}
            Ok(count) => tracing::info!("Expiry sweep closed {} session(s)", count),
            Err(err) => tracing::warn!(error = %err, "Expiry sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_session(started_at: DateTime<Utc>, duration: i64) -> QuizSession {
        QuizSession {
            id: 1,
            code: "123456".into(),
            duration,
            started_at,
            expires_at: started_at + Duration::seconds(duration),
            status: SessionStatus::Active,
            created_by: "teacher-1".into(),
            course_id: 1,
            kind: SessionKind::Single { question_id: 1 },
        }
    }

    #[test]
    fn test_status_at_before_and_after_expiry() {
        let start = Utc::now();
        let session = single_session(start, 60);
        assert_eq!(
            status_at(&session, start + Duration::seconds(59)),
            SessionStatus::Active
        );
        assert_eq!(
            status_at(&session, start + Duration::seconds(60)),
            SessionStatus::Expired
        );
        assert_eq!(
            status_at(&session, start + Duration::days(3)),
            SessionStatus::Expired
        );
    }

    #[test]
    fn test_duration_bounds() {
        assert!(validate_duration(SessionType::Single, 30).is_ok());
        assert!(validate_duration(SessionType::Single, 600).is_ok());
        assert!(validate_duration(SessionType::Single, 29).is_err());
        assert!(validate_duration(SessionType::Single, 601).is_err());
        assert!(validate_duration(SessionType::Class, 1800).is_ok());
        assert!(validate_duration(SessionType::Class, 10800).is_ok());
        assert!(validate_duration(SessionType::Class, 600).is_err());
        assert!(validate_duration(SessionType::Class, 10801).is_err());
    }

    #[test]
    fn test_seconds_remaining_never_negative() {
        let start = Utc::now();
        let session = single_session(start, 60);
        assert_eq!(seconds_remaining(&session, start + Duration::seconds(20)), 40);
        assert_eq!(seconds_remaining(&session, start + Duration::seconds(90)), 0);
    }
}
