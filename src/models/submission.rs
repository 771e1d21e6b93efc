// src/models/submission.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'submissions' table in the database.
/// `(session_id, question_id, student)` is unique.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub session_id: i64,
    pub question_id: i64,
    pub student: String,
    pub selected_option: i16,
    pub is_correct: bool,
    /// Seconds from question activation to submission.
    pub time_taken: f64,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub session_id: i64,
    pub question_id: i64,
    pub student: String,
    pub selected_option: i16,
    pub is_correct: bool,
    pub time_taken: f64,
    pub submitted_at: DateTime<Utc>,
}

/// DTO for answering the question in scope.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitAnswerRequest {
    /// Wider than the stored column so out-of-range values reach validation.
    pub selected_option: i64,
    /// The question the client believes it is answering.
    pub question_id: Option<i64>,
}

/// Returned after a successful submission. The answer key is only ever
/// revealed here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionOutcome {
    pub question_id: i64,
    pub is_correct: bool,
    pub correct_option: i16,
    pub explanation: Option<String>,
    pub time_taken: f64,
}

/// Aggregated results of one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionResults {
    pub session_id: i64,
    pub total_submissions: usize,
    pub correct_count: usize,
    pub incorrect_count: usize,
    /// Percentage of correct submissions, 0.0 when there are none.
    pub accuracy: f64,
    pub average_time_taken: Option<f64>,
    /// Students recorded by `join`. Single sessions record no joins, so `None`.
    pub students_joined: Option<usize>,
    pub questions_broadcast: usize,
    pub submissions: Vec<Submission>,
}
