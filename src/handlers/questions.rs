// src/handlers/questions.rs

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    error::AppError, models::question::CreateQuestionRequest, services::question_bank,
    store::SharedStore, utils::jwt::Caller,
};

/// Adds a question to a course's bank.
/// Teachers and admins only.
pub async fn create_question(
    State(store): State<SharedStore>,
    caller: Caller,
    Path(course_id): Path<i64>,
    payload: Result<Json<CreateQuestionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    let question =
        question_bank::create_question(store.as_ref(), course_id, &caller, payload).await?;

    Ok((StatusCode::CREATED, Json(question)))
}

/// Lists questions of a course that are not live in any session,
/// least recently used first.
/// Teachers and admins only.
pub async fn list_available(
    State(store): State<SharedStore>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let questions = question_bank::list_available(store.as_ref(), course_id).await?;
    Ok(Json(questions))
}
