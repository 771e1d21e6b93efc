// src/routes.rs

use axum::{
    Router,
    http::Method,
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{live, questions, sessions},
    state::AppState,
    utils::jwt::{auth_middleware, manager_middleware},
};

/// Assembles the main application router.
///
/// * Every route requires a valid bearer token.
/// * Question-bank and session-management routes additionally require the
///   teacher or admin role; ownership is checked per session.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            "http://localhost:3000".parse().expect("static origin"),
            "http://127.0.0.1:3000".parse().expect("static origin"),
        ])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let question_routes = Router::new()
        .route("/", post(questions::create_question))
        .route("/available", get(questions::list_available))
        .layer(middleware::from_fn(manager_middleware));

    let session_routes = Router::new()
        // Session management
        .merge(
            Router::new()
                .route("/", post(sessions::create_session))
                .route("/{id}/broadcast", post(sessions::broadcast_question))
                .route("/{id}/end", post(sessions::end_session))
                .layer(middleware::from_fn(manager_middleware)),
        )
        // Creator/admin reads are authorized per session
        .route("/{id}", get(sessions::get_session))
        .route("/{id}/results", get(sessions::get_results))
        .route("/{id}/submit", post(sessions::submit_answer));

    let live_routes = Router::new()
        .route("/join", post(live::join_session))
        .route("/{code}", get(live::poll_session));

    let api = Router::new()
        .nest("/api/courses/{course_id}/questions", question_routes)
        .nest("/api/sessions", session_routes)
        .nest("/api/live", live_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    api
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
