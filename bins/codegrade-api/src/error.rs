// Error taxonomy for the evaluation pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failures talking to the execution service
#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("execution service rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed response from execution service: {0}")]
    MalformedResponse(String),
}

/// Failures talking to the text-generation collaborator
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("text generation rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("text generation reply had no response text")]
    MissingResponse,
}

/// Whole-operation failures surfaced to the caller of `evaluate`
#[derive(Error, Debug)]
pub enum EvaluateError {
    #[error("execution failed: {0}")]
    DispatchFailed(#[source] JudgeError),

    #[error("text generation failed: {0}")]
    TextGeneration(#[from] GenerationError),

    #[error("could not parse feedback: {0}")]
    FeedbackParseFailure(String),

    #[error("could not build feedback prompt: {0}")]
    PromptRender(#[from] handlebars::RenderError),
}

impl EvaluateError {
    pub fn kind(&self) -> &'static str {
        match self {
            EvaluateError::DispatchFailed(_) => "dispatch_failed",
            EvaluateError::TextGeneration(_) => "text_generation_failed",
            EvaluateError::FeedbackParseFailure(_) => "feedback_parse_failure",
            EvaluateError::PromptRender(_) => "prompt_render_failed",
        }
    }
}

impl IntoResponse for EvaluateError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            EvaluateError::DispatchFailed(_) => (StatusCode::BAD_GATEWAY, "execution failed"),
            EvaluateError::TextGeneration(_) | EvaluateError::FeedbackParseFailure(_) => {
                (StatusCode::BAD_GATEWAY, "could not evaluate")
            }
            EvaluateError::PromptRender(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "could not evaluate")
            }
        };

        (
            status,
            Json(json!({
                "error": error,
                "kind": self.kind(),
                "detail": self.to_string(),
            })),
        )
            .into_response()
    }
}
