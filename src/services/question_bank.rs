// src/services/question_bank.rs

use validator::Validate;

use crate::{
    error::AppError,
    models::question::{CreateQuestionRequest, NewQuestion, Question},
    store::QuizStore,
    utils::{html::clean_html, jwt::Caller},
};

/// Adds an authored question (manual or AI import) to a course's bank.
pub async fn create_question(
    store: &dyn QuizStore,
    course_id: i64,
    caller: &Caller,
    req: CreateQuestionRequest,
) -> Result<Question, AppError> {
    req.validate()?;

    let content = clean_html(&req.content);
    let options: Vec<String> = req.options.iter().map(|opt| clean_html(opt)).collect();
    if content.trim().is_empty() || options.iter().any(|opt| opt.trim().is_empty()) {
        return Err(AppError::InvalidInput(
            "Question text and options must not be empty after sanitizing".to_string(),
        ));
    }

    let question = store
        .insert_question(NewQuestion {
            course_id,
            content,
            options,
            correct_option: req.correct_option,
            difficulty: req.difficulty,
            explanation: req.explanation.as_deref().map(clean_html),
            author: caller.identity.clone(),
            source: req.source,
        })
        .await?;

    tracing::info!(
        "Question {} added to course {} by {}",
        question.id,
        course_id,
        caller.identity
    );

    Ok(question)
}

/// Unreserved questions of a course, least recently used first.
pub async fn list_available(
    store: &dyn QuizStore,
    course_id: i64,
) -> Result<Vec<Question>, AppError> {
    store.list_available(course_id).await
}
