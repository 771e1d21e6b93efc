// src/services/ledger.rs

use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        session::{QuizSession, SessionStatus},
        submission::{NewSubmission, SubmissionOutcome, SubmitAnswerRequest},
    },
    services::lifecycle::{self, load_question, load_session},
    store::QuizStore,
};

/// Seconds between `from` and `to`, millisecond precision, never negative.
pub fn elapsed_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    ((to - from).num_milliseconds().max(0) as f64) / 1000.0
}

fn validate_option(selected_option: i64) -> Result<i16, AppError> {
    if !(0..=3).contains(&selected_option) {
        return Err(AppError::InvalidInput(
            "selected_option must be between 0 and 3".to_string(),
        ));
    }
    i16::try_from(selected_option)
        .map_err(|_| AppError::InvalidInput("selected_option out of range".to_string()))
}

/// Answers the question currently in scope of `session_id`.
///
/// If the request names a question, it must still be the one in scope.
pub async fn submit(
    store: &dyn QuizStore,
    session_id: i64,
    student: &str,
    req: SubmitAnswerRequest,
    now: DateTime<Utc>,
) -> Result<SubmissionOutcome, AppError> {
    let session = lifecycle::observe(store, load_session(store, session_id).await?, now).await?;
    if session.status == SessionStatus::Expired {
        return Err(AppError::Expired);
    }

    let question_id = session
        .question_in_scope()
        .ok_or(AppError::NoActiveQuestion)?;
    if req.question_id.is_some_and(|claimed| claimed != question_id) {
        return Err(AppError::NoActiveQuestion);
    }

    let selected_option = validate_option(req.selected_option)?;

    record_submission(store, &session, question_id, student, selected_option, now).await
}

/// Writes the answer for a question already resolved against `session`.
///
/// `session` may be a snapshot taken before a newer broadcast; the answer is
/// still recorded against `question_id` as long as it was broadcast in this
/// session. The store's uniqueness key is the only duplicate check.
pub async fn record_submission(
    store: &dyn QuizStore,
    session: &QuizSession,
    question_id: i64,
    student: &str,
    selected_option: i16,
    now: DateTime<Utc>,
) -> Result<SubmissionOutcome, AppError> {
    validate_option(i64::from(selected_option))?;

    let activated_at = session
        .activated_at(question_id)
        .ok_or(AppError::NoActiveQuestion)?;
    let question = load_question(store, question_id).await?;
    let is_correct = question.is_correct(selected_option);

    let submission = store
        .insert_submission(NewSubmission {
            session_id: session.id,
            question_id,
            student: student.to_string(),
            selected_option,
            is_correct,
            time_taken: elapsed_seconds(activated_at, now),
            submitted_at: now,
        })
        .await
        .inspect_err(|e| {
            if *e == AppError::DuplicateSubmission {
                tracing::debug!(
                    "Rejected duplicate answer from {} for question {} in session {}",
                    student,
                    question_id,
                    session.id
                );
            }
        })?;

    Ok(SubmissionOutcome {
        question_id,
        is_correct: submission.is_correct,
        correct_option: question.correct_option,
        explanation: question.explanation,
        time_taken: submission.time_taken,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_elapsed_seconds_millisecond_precision() {
        let start = Utc::now();
        assert_eq!(elapsed_seconds(start, start + Duration::milliseconds(12_345)), 12.345);
    }

    #[test]
    fn test_elapsed_seconds_clamps_clock_skew() {
        let start = Utc::now();
        assert_eq!(elapsed_seconds(start, start - Duration::seconds(2)), 0.0);
    }

    #[test]
    fn test_option_bounds() {
        assert!(validate_option(0).is_ok());
        assert!(validate_option(3).is_ok());
        assert!(validate_option(-1).is_err());
        assert!(validate_option(4).is_err());
        assert!(validate_option(70_000).is_err());
        assert_eq!(validate_option(2).unwrap(), 2i16);
    }
}
