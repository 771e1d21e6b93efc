// src/services/results.rs

use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        session::{QuizSession, SessionKind},
        submission::{SessionResults, Submission},
    },
    services::lifecycle::{load_session, observe},
    store::QuizStore,
    utils::jwt::Caller,
};

/// Aggregates the ledger rows of one session. `submissions` must already be
/// ordered by `submitted_at`.
pub fn summarize(session: &QuizSession, submissions: Vec<Submission>) -> SessionResults {
    let total = submissions.len();
    let correct = submissions.iter().filter(|s| s.is_correct).count();

    let (accuracy, average_time_taken) = if total == 0 {
        (0.0, None)
    } else {
        let total_time: f64 = submissions.iter().map(|s| s.time_taken).sum();
        (
            correct as f64 / total as f64 * 100.0,
            Some(total_time / total as f64),
        )
    };

    let (students_joined, questions_broadcast) = match &session.kind {
        SessionKind::Single { .. } => (None, 1),
        SessionKind::Class {
            students_joined,
            questions_history,
            ..
        } => (Some(students_joined.len()), questions_history.len()),
    };

    SessionResults {
        session_id: session.id,
        total_submissions: total,
        correct_count: correct,
        incorrect_count: total - correct,
        accuracy,
        average_time_taken,
        students_joined,
        questions_broadcast,
        submissions,
    }
}

/// Results for the session creator or an admin.
pub async fn session_results(
    store: &dyn QuizStore,
    session_id: i64,
    caller: &Caller,
    now: DateTime<Utc>,
) -> Result<SessionResults, AppError> {
    let session = load_session(store, session_id).await?;
    if !session.is_owned_by(&caller.identity) && !caller.role.is_admin() {
        return Err(AppError::Forbidden(
            "Only the session creator can view results".to_string(),
        ));
    }

    let session = observe(store, session, now).await?;
    let submissions = store.list_submissions(session.id).await?;
    Ok(summarize(&session, submissions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::SessionStatus;
    use chrono::Duration;

    fn session() -> QuizSession {
        let now = Utc::now();
        QuizSession {
            id: 3,
            code: "654321".into(),
            duration: 60,
            started_at: now,
            expires_at: now + Duration::seconds(60),
            status: SessionStatus::Active,
            created_by: "teacher-1".into(),
            course_id: 1,
            kind: SessionKind::Single { question_id: 9 },
        }
    }

    fn submission(id: i64, student: &str, is_correct: bool, time_taken: f64) -> Submission {
        Submission {
            id,
            session_id: 3,
            question_id: 9,
            student: student.into(),
            selected_option: if is_correct { 1 } else { 0 },
            is_correct,
            time_taken,
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn test_summarize_empty() {
        let results = summarize(&session(), vec![]);
        assert_eq!(results.total_submissions, 0);
        assert_eq!(results.accuracy, 0.0);
        assert_eq!(results.average_time_taken, None);
        assert_eq!(results.questions_broadcast, 1);
    }

    #[test]
    fn test_summarize_counts_and_mean() {
        let results = summarize(
            &session(),
            vec![
                submission(1, "a", true, 4.0),
                submission(2, "b", false, 8.0),
                submission(3, "c", true, 6.0),
                submission(4, "d", true, 2.0),
            ],
        );
        assert_eq!(results.total_submissions, 4);
        assert_eq!(results.correct_count, 3);
        assert_eq!(results.incorrect_count, 1);
        assert_eq!(results.accuracy, 75.0);
        assert_eq!(results.average_time_taken, Some(5.0));
        assert_eq!(results.students_joined, None);
        assert_eq!(results.submissions[0].student, "a");
    }
}
