// src/models/session.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::question::PublicQuestion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Single,
    Class,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Single => "single",
            SessionType::Class => "class",
        }
    }
}

impl FromStr for SessionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(SessionType::Single),
            "class" => Ok(SessionType::Class),
            other => Err(format!("unknown session type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Active,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::Active => "active",
            SessionStatus::Expired => "expired",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(SessionStatus::Waiting),
            "active" => Ok(SessionStatus::Active),
            "expired" => Ok(SessionStatus::Expired),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BroadcastEntry {
    pub question_id: i64,
    pub broadcasted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct JoinedStudent {
    pub student: String,
    pub joined_at: DateTime<Utc>,
}

/// Type-specific part of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionKind {
    /// One fixed question, live from creation.
    Single { question_id: i64 },
    /// Teacher-driven session; questions are broadcast one at a time.
    Class {
        active_question_id: Option<i64>,
        questions_history: Vec<BroadcastEntry>,
        students_joined: Vec<JoinedStudent>,
    },
}

impl SessionKind {
    pub fn session_type(&self) -> SessionType {
        match self {
            SessionKind::Single { .. } => SessionType::Single,
            SessionKind::Class { .. } => SessionType::Class,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSession {
    pub id: i64,
    pub code: String,
    /// Seconds.
    pub duration: i64,
    pub started_at: DateTime<Utc>,
    /// Fixed at creation.
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub created_by: String,
    pub course_id: i64,
    #[serde(flatten)]
    pub kind: SessionKind,
}

impl QuizSession {
    pub fn session_type(&self) -> SessionType {
        self.kind.session_type()
    }

    /// The question currently answerable in this session, if any.
    pub fn question_in_scope(&self) -> Option<i64> {
        match &self.kind {
            SessionKind::Single { question_id } => Some(*question_id),
            SessionKind::Class {
                active_question_id, ..
            } => *active_question_id,
        }
    }

    /// When `question_id` became answerable: the latest broadcast of it for
    /// class sessions, the session start for single sessions.
    pub fn activated_at(&self, question_id: i64) -> Option<DateTime<Utc>> {
        match &self.kind {
            SessionKind::Single { question_id: fixed } => {
                (*fixed == question_id).then_some(self.started_at)
            }
            SessionKind::Class {
                questions_history, ..
            } => questions_history
                .iter()
                .rev()
                .find(|entry| entry.question_id == question_id)
                .map(|entry| entry.broadcasted_at),
        }
    }

    pub fn is_owned_by(&self, identity: &str) -> bool {
        self.created_by == identity
    }
}

/// Represents a row of the 'quiz_sessions' table. History and joined
/// students live in their own tables.
#[derive(Debug, FromRow)]
pub struct SessionRow {
    pub id: i64,
    pub code: String,
    #[sqlx(rename = "type")]
    pub session_type: String,
    pub duration_secs: i32,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: String,
    pub created_by: String,
    pub course_id: i64,
    pub question_id: Option<i64>,
    pub active_question_id: Option<i64>,
}

impl SessionRow {
    pub fn into_session(
        self,
        questions_history: Vec<BroadcastEntry>,
        students_joined: Vec<JoinedStudent>,
    ) -> Result<QuizSession, String> {
        let kind = match self.session_type.parse::<SessionType>()? {
            SessionType::Single => SessionKind::Single {
                question_id: self
                    .question_id
                    .ok_or_else(|| format!("single session {} has no question", self.id))?,
            },
            SessionType::Class => SessionKind::Class {
                active_question_id: self.active_question_id,
                questions_history,
                students_joined,
            },
        };

        Ok(QuizSession {
            id: self.id,
            code: self.code,
            duration: i64::from(self.duration_secs),
            started_at: self.started_at,
            expires_at: self.expires_at,
            status: self.status.parse()?,
            created_by: self.created_by,
            course_id: self.course_id,
            kind,
        })
    }
}

/// Session about to be inserted. The id is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub code: String,
    pub duration: i64,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub created_by: String,
    pub course_id: i64,
    pub kind: SessionKind,
}

/// DTO for creating a session.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(rename = "type")]
    pub session_type: SessionType,
    /// Seconds. Bounds depend on the session type.
    pub duration: i64,
    pub course_id: i64,
    /// Required for single sessions, rejected for class sessions.
    pub question_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastRequest {
    pub question_id: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct JoinRequest {
    #[validate(length(min = 6, max = 9))]
    pub code: String,
}

/// Session fields students are allowed to see.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub id: i64,
    pub code: String,
    #[serde(rename = "type")]
    pub session_type: SessionType,
    pub expires_at: DateTime<Utc>,
    pub seconds_remaining: i64,
}

/// What a student sees when joining or polling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SessionView {
    Waiting {
        session: SessionSummary,
    },
    Active {
        session: SessionSummary,
        question: PublicQuestion,
    },
    /// The caller already answered the active question.
    Submitted {
        session: SessionSummary,
        question_id: i64,
    },
}
