// src/services/code_allocator.rs

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;

use crate::{
    config::{CLASS_CODE_PREFIX, CODE_DIGITS, MAX_CODE_ATTEMPTS},
    error::AppError,
    models::session::{NewSession, QuizSession, SessionStatus, SessionType},
    services::lifecycle,
    store::QuizStore,
};

static SINGLE_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{6}$").expect("single session code pattern")
});

static CLASS_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^CS_\d{6}$").expect("class session code pattern")
});

/// Which kind of session a code belongs to, or `None` if it is malformed.
pub fn code_type(code: &str) -> Option<SessionType> {
    if SINGLE_CODE.is_match(code) {
        Some(SessionType::Single)
    } else if CLASS_CODE.is_match(code) {
        Some(SessionType::Class)
    } else {
        None
    }
}

/// Draws a candidate code. Digits never start with 0, giving 900,000
/// candidates per session type.
pub fn generate_code<R: Rng + ?Sized>(session_type: SessionType, rng: &mut R) -> String {
    let low = 10u32.pow(CODE_DIGITS as u32 - 1);
    let high = 10u32.pow(CODE_DIGITS as u32);
    let digits = rng.random_range(low..high);
    match session_type {
        SessionType::Single => digits.to_string(),
        SessionType::Class => format!("{}{}", CLASS_CODE_PREFIX, digits),
    }
}

fn draw_code(session_type: SessionType) -> String {
    generate_code(session_type, &mut rand::rng())
}

/// Inserts `template` under a freshly allocated code.
///
/// A candidate is skipped when a live session already holds it. Sessions that
/// hold it but are past their window are observed first, which expires them
/// and frees the code. The insert itself rejects a live duplicate, so two
/// concurrent allocations drawing the same code end with one retrying.
pub async fn allocate_and_insert(
    store: &dyn QuizStore,
    template: NewSession,
    now: DateTime<Utc>,
) -> Result<QuizSession, AppError> {
    let session_type = template.kind.session_type();

    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = draw_code(session_type);

        if let Some(holder) = store.find_session_by_code(&code).await? {
            let holder = lifecycle::observe(store, holder, now).await?;
            if holder.status != SessionStatus::Expired {
                tracing::debug!("Session code {} is live, redrawing (attempt {})", code, attempt);
                continue;
            }
        }

        let candidate = NewSession {
            code: code.clone(),
            ..template.clone()
        };
        match store.insert_session(candidate).await? {
            Some(session) => return Ok(session),
            None => {
                tracing::debug!("Session code {} was taken concurrently (attempt {})", code, attempt);
            }
        }
    }

    tracing::error!(
        "Could not allocate a {} session code after {} attempts",
        session_type.as_str(),
        MAX_CODE_ATTEMPTS
    );
    Err(AppError::InternalServerError(
        "could not allocate a session code".to_string(),
    ))
}
