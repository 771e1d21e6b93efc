// tests/pg_store_tests.rs
//
// Runs against a real Postgres when DATABASE_URL is set; otherwise every
// test returns early.

use chrono::{Duration, Utc};
use quiz_live::{
    error::AppError,
    models::{
        question::{Difficulty, NewQuestion, QuestionSource},
        session::{NewSession, SessionKind, SessionStatus},
        submission::NewSubmission,
    },
    store::{PgStore, QuizStore},
};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn pg_store() -> Option<PgStore> {
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    Some(PgStore::new(pool))
}

/// Course id unlikely to collide with other test runs.
fn unique_course() -> i64 {
    (Uuid::new_v4().as_u128() % 1_000_000_000) as i64 + 1_000_000
}

fn unique_code() -> String {
    format!("{}", 100_000 + Uuid::new_v4().as_u128() % 900_000)
}

fn question(course_id: i64) -> NewQuestion {
    NewQuestion {
        course_id,
        content: "Which trait makes a type printable with {}?".to_string(),
        options: vec![
            "Debug".to_string(),
            "Display".to_string(),
            "ToOwned".to_string(),
            "Clone".to_string(),
        ],
        correct_option: 1,
        difficulty: Difficulty::Easy,
        explanation: None,
        author: "teacher-1".to_string(),
        source: QuestionSource::Ai,
    }
}

fn class_session(code: String, course_id: i64) -> NewSession {
    let now = Utc::now();
    NewSession {
        code,
        duration: 1800,
        started_at: now,
        expires_at: now + Duration::seconds(1800),
        status: SessionStatus::Waiting,
        created_by: "teacher-1".to_string(),
        course_id,
        kind: SessionKind::Class {
            active_question_id: None,
            questions_history: Vec::new(),
            students_joined: Vec::new(),
        },
    }
}

#[tokio::test]
async fn question_round_trip_and_reservation() {
    let Some(store) = pg_store().await else {
        return;
    };
    let course = unique_course();

    let q = store.insert_question(question(course)).await.unwrap();
    let loaded = store.get_question(q.id).await.unwrap().unwrap();
    assert_eq!(loaded.options.len(), 4);
    assert_eq!(loaded.source, QuestionSource::Ai);
    assert_eq!(loaded.reserved_by_session_id, None);

    let first = store
        .insert_session(class_session(format!("CS_{}", unique_code()), course))
        .await
        .unwrap()
        .unwrap();
    let second = store
        .insert_session(class_session(format!("CS_{}", unique_code()), course))
        .await
        .unwrap()
        .unwrap();

    store.reserve_question(q.id, first.id).await.unwrap();
    // Idempotent for the holder.
    store.reserve_question(q.id, first.id).await.unwrap();
    assert_eq!(
        store.reserve_question(q.id, second.id).await.unwrap_err(),
        AppError::AlreadyReserved(q.id)
    );
    assert!(matches!(
        store.reserve_question(-1, first.id).await.unwrap_err(),
        AppError::NotFound(_)
    ));
    assert!(store.list_available(course).await.unwrap().is_empty());

    assert_eq!(store.release_session_questions(first.id).await.unwrap(), 1);
    store.reserve_question(q.id, second.id).await.unwrap();
}

#[tokio::test]
async fn live_codes_are_unique_until_expired() {
    let Some(store) = pg_store().await else {
        return;
    };
    let course = unique_course();
    let code = format!("CS_{}", unique_code());

    let first = store
        .insert_session(class_session(code.clone(), course))
        .await
        .unwrap()
        .unwrap();
    assert!(store
        .insert_session(class_session(code.clone(), course))
        .await
        .unwrap()
        .is_none());

    assert!(store.expire_session(first.id).await.unwrap());
    assert!(!store.expire_session(first.id).await.unwrap());

    let second = store
        .insert_session(class_session(code.clone(), course))
        .await
        .unwrap()
        .unwrap();
    let resolved = store.find_session_by_code(&code).await.unwrap().unwrap();
    assert_eq!(resolved.id, second.id);
}

#[tokio::test]
async fn broadcast_history_and_duplicate_submissions() {
    let Some(store) = pg_store().await else {
        return;
    };
    let course = unique_course();
    let q1 = store.insert_question(question(course)).await.unwrap();
    let q2 = store.insert_question(question(course)).await.unwrap();
    let session = store
        .insert_session(class_session(format!("CS_{}", unique_code()), course))
        .await
        .unwrap()
        .unwrap();

    let now = Utc::now();
    store.add_student(session.id, "s1", now).await.unwrap();
    store.add_student(session.id, "s1", now).await.unwrap();

    let first = store.activate_question(session.id, q1.id, now).await.unwrap();
    assert_eq!(first.released, None);
    let activation = store
        .activate_question(session.id, q2.id, now + Duration::seconds(10))
        .await
        .unwrap();
    assert_eq!(activation.released, Some(q1.id));
    assert_eq!(
        store.get_question(q1.id).await.unwrap().unwrap().reserved_by_session_id,
        None
    );
    assert_eq!(
        store.get_question(q2.id).await.unwrap().unwrap().reserved_by_session_id,
        Some(session.id)
    );
    let updated = activation.session;
    assert_eq!(updated.status, SessionStatus::Active);
    assert_eq!(updated.question_in_scope(), Some(q2.id));
    match &updated.kind {
        SessionKind::Class {
            questions_history,
            students_joined,
            ..
        } => {
            assert_eq!(questions_history.len(), 2);
            assert_eq!(questions_history[0].question_id, q1.id);
            assert_eq!(students_joined.len(), 1);
        }
        SessionKind::Single { .. } => panic!("expected class session"),
    }

    let submission = NewSubmission {
        session_id: session.id,
        question_id: q2.id,
        student: "s1".to_string(),
        selected_option: 1,
        is_correct: true,
        time_taken: 3.5,
        submitted_at: now + Duration::seconds(14),
    };
    store.insert_submission(submission.clone()).await.unwrap();
    assert_eq!(
        store.insert_submission(submission).await.unwrap_err(),
        AppError::DuplicateSubmission
    );

    let found = store
        .find_submission(session.id, q2.id, "s1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.time_taken, 3.5);
    assert_eq!(store.list_submissions(session.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_reservation_rolls_back_session_insert_and_activation() {
    let Some(store) = pg_store().await else {
        return;
    };
    let course = unique_course();
    let q = store.insert_question(question(course)).await.unwrap();

    let holder = store
        .insert_session(class_session(format!("CS_{}", unique_code()), course))
        .await
        .unwrap()
        .unwrap();
    store.activate_question(holder.id, q.id, Utc::now()).await.unwrap();

    // A single session on a held question is never stored.
    let code = unique_code();
    let now = Utc::now();
    let err = store
        .insert_session(NewSession {
            code: code.clone(),
            duration: 60,
            started_at: now,
            expires_at: now + Duration::seconds(60),
            status: SessionStatus::Active,
            created_by: "teacher-2".to_string(),
            course_id: course,
            kind: SessionKind::Single { question_id: q.id },
        })
        .await
        .unwrap_err();
    assert_eq!(err, AppError::AlreadyReserved(q.id));
    assert!(store.find_session_by_code(&code).await.unwrap().is_none());

    // A rival class session cannot activate it and stays untouched.
    let rival = store
        .insert_session(class_session(format!("CS_{}", unique_code()), course))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        store.activate_question(rival.id, q.id, Utc::now()).await.unwrap_err(),
        AppError::AlreadyReserved(q.id)
    );
    let rival = store.get_session(rival.id).await.unwrap().unwrap();
    assert_eq!(rival.status, SessionStatus::Waiting);
    assert_eq!(rival.question_in_scope(), None);
    match rival.kind {
        SessionKind::Class {
            questions_history, ..
        } => assert!(questions_history.is_empty()),
        SessionKind::Single { .. } => panic!("expected class session"),
    }
}
