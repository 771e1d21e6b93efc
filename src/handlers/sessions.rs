// src/handlers/sessions.rs

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use crate::{
    error::AppError,
    models::{
        session::{BroadcastRequest, CreateSessionRequest},
        submission::SubmitAnswerRequest,
    },
    services::{ledger, lifecycle, results},
    store::SharedStore,
    utils::jwt::Caller,
};

/// Creates a single or class session.
/// Teachers and admins only.
pub async fn create_session(
    State(store): State<SharedStore>,
    caller: Caller,
    payload: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    let session = lifecycle::create_session(store.as_ref(), &caller, payload, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Full session state, including history and joined students.
/// Creator or admin.
pub async fn get_session(
    State(store): State<SharedStore>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = lifecycle::get_session(store.as_ref(), id, &caller, Utc::now()).await?;
    Ok(Json(session))
}

/// Makes a question the active one in a class session.
/// Creator only.
pub async fn broadcast_question(
    State(store): State<SharedStore>,
    caller: Caller,
    Path(id): Path<i64>,
    payload: Result<Json<BroadcastRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    let session =
        lifecycle::broadcast(store.as_ref(), id, payload.question_id, &caller, Utc::now()).await?;
    Ok(Json(session))
}

/// Ends a session and frees its question.
/// Creator only.
pub async fn end_session(
    State(store): State<SharedStore>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = lifecycle::end_session(store.as_ref(), id, &caller).await?;
    Ok(Json(session))
}

/// Aggregated answers of a session.
/// Creator or admin.
pub async fn get_results(
    State(store): State<SharedStore>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let results = results::session_results(store.as_ref(), id, &caller, Utc::now()).await?;
    Ok(Json(results))
}

/// Answers the question in scope.
///
/// Returns correctness, the correct option and the explanation. A repeated
/// answer yields 409 with code `duplicate_submission`.
pub async fn submit_answer(
    State(store): State<SharedStore>,
    caller: Caller,
    Path(id): Path<i64>,
    payload: Result<Json<SubmitAnswerRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    let outcome =
        ledger::submit(store.as_ref(), id, &caller.identity, payload, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}
