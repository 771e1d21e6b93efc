// src/models/question.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

use crate::config::OPTIONS_PER_QUESTION;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty '{}'", other)),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a question entered the bank. AI-generated questions are produced
/// elsewhere and imported like manual ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuestionSource {
    #[default]
    Manual,
    Ai,
}

impl QuestionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionSource::Manual => "manual",
            QuestionSource::Ai => "ai",
        }
    }
}

impl FromStr for QuestionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(QuestionSource::Manual),
            "ai" => Ok(QuestionSource::Ai),
            other => Err(format!("unknown question source '{}'", other)),
        }
    }
}

/// A question of the course question bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub course_id: i64,

    /// The text content of the question.
    pub content: String,

    /// Always exactly four options.
    pub options: Vec<String>,

    /// Index of the correct option, 0..=3.
    pub correct_option: i16,

    pub difficulty: Difficulty,

    /// Explanation of the correct answer, revealed after submission.
    pub explanation: Option<String>,

    pub author: String,
    pub source: QuestionSource,

    pub times_used: i32,
    pub last_used_at: Option<DateTime<Utc>>,

    /// Session currently holding this question live. `None` when free.
    pub reserved_by_session_id: Option<i64>,

    pub created_at: DateTime<Utc>,
}

impl Question {
    pub fn is_correct(&self, selected_option: i16) -> bool {
        self.correct_option == selected_option
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, FromRow)]
pub struct QuestionRow {
    pub id: i64,
    pub course_id: i64,
    pub content: String,
    pub options: Json<Vec<String>>,
    pub correct_option: i16,
    pub difficulty: String,
    pub explanation: Option<String>,
    pub author: String,
    pub source: String,
    pub times_used: i32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub reserved_by_session_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = String;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        Ok(Question {
            id: row.id,
            course_id: row.course_id,
            content: row.content,
            options: row.options.0,
            correct_option: row.correct_option,
            difficulty: row.difficulty.parse()?,
            explanation: row.explanation,
            author: row.author,
            source: row.source.parse()?,
            times_used: row.times_used,
            last_used_at: row.last_used_at,
            reserved_by_session_id: row.reserved_by_session_id,
            created_at: row.created_at,
        })
    }
}

/// DTO for sending question to students (excludes correct option and explanation).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicQuestion {
    pub id: i64,
    pub content: String,
    pub options: Vec<String>,
    pub difficulty: Difficulty,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        PublicQuestion {
            id: q.id,
            content: q.content.clone(),
            options: q.options.clone(),
            difficulty: q.difficulty,
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub content: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(range(min = 0, max = 3))]
    pub correct_option: i16,
    pub difficulty: Difficulty,
    #[validate(length(max = 2000))]
    pub explanation: Option<String>,
    #[serde(default)]
    pub source: QuestionSource,
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() != OPTIONS_PER_QUESTION {
        return Err(validator::ValidationError::new("exactly_four_options"));
    }
    for opt in options {
        if opt.trim().is_empty() {
            return Err(validator::ValidationError::new("option_cannot_be_empty"));
        }
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

/// Sanitized, validated question ready to be stored.
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub course_id: i64,
    pub content: String,
    pub options: Vec<String>,
    pub correct_option: i16,
    pub difficulty: Difficulty,
    pub explanation: Option<String>,
    pub author: String,
    pub source: QuestionSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(options: Vec<&str>, correct_option: i16) -> CreateQuestionRequest {
        CreateQuestionRequest {
            content: "Which keyword declares an immutable binding?".into(),
            options: options.into_iter().map(String::from).collect(),
            correct_option,
            difficulty: Difficulty::Easy,
            explanation: None,
            source: QuestionSource::Manual,
        }
    }

    #[test]
    fn test_valid_question_passes() {
        assert!(request(vec!["let", "mut", "var", "const"], 0).validate().is_ok());
    }

    #[test]
    fn test_three_options_rejected() {
        assert!(request(vec!["let", "mut", "var"], 0).validate().is_err());
    }

    #[test]
    fn test_blank_option_rejected() {
        assert!(request(vec!["let", " ", "var", "const"], 0).validate().is_err());
    }

    #[test]
    fn test_correct_option_out_of_range_rejected() {
        assert!(request(vec!["let", "mut", "var", "const"], 4).validate().is_err());
    }

    #[test]
    fn test_difficulty_round_trips_through_text() {
        assert_eq!("hard".parse::<Difficulty>(), Ok(Difficulty::Hard));
        assert!("extreme".parse::<Difficulty>().is_err());
    }
}
