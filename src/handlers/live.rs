// src/handlers/live.rs

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    response::IntoResponse,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    error::AppError, models::session::JoinRequest, services::lifecycle, store::SharedStore,
    utils::jwt::Caller,
};

/// Joins a session by code.
pub async fn join_session(
    State(store): State<SharedStore>,
    caller: Caller,
    payload: Result<Json<JoinRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    payload.validate()?;

    let code = payload.code.trim();
    let view = lifecycle::join(store.as_ref(), code, &caller.identity, Utc::now()).await?;
    Ok(Json(view))
}

/// Refreshes the session view without joining.
pub async fn poll_session(
    State(store): State<SharedStore>,
    caller: Caller,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let view = lifecycle::poll(store.as_ref(), &code, &caller.identity, Utc::now()).await?;
    Ok(Json(view))
}
