use super::types::{
    AnswerRequest, AnswerResponse, ErrorResponse, HealthResponse, SummarizeRequest,
    SummarizeResponse, preview,
};
use crate::{
    Error,
    model::{QuestionAnswerer, Summarizer, SummaryParams},
};
use axum::{
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const LOG_PREVIEW_CHARS: usize = 50;

type HandlerError = (StatusCode, Json<ErrorResponse>);

/// Generation lengths applied to summarization requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryLimits {
    pub default_max_length: usize,
    pub default_min_length: usize,
    /// Largest `max_length` a request may ask for.
    pub max_output_len: usize,
}

impl Default for SummaryLimits {
    fn default() -> Self {
        Self {
            default_max_length: 150,
            default_min_length: 50,
            max_output_len: 512,
        }
    }
}

/// Everything the server needs; model endpoints exist only for models present here.
#[derive(Clone)]
pub struct AppState {
    pub qa: Option<Arc<dyn QuestionAnswerer>>,
    pub summarizer: Option<Arc<dyn Summarizer>>,
    pub limits: SummaryLimits,
    pub started_at: DateTime<Utc>,
}

/// State of the `/summarize` route.
#[derive(Clone)]
pub struct SummarizeState {
    pub summarizer: Arc<dyn Summarizer>,
    pub limits: SummaryLimits,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            qa: None,
            summarizer: None,
            limits: SummaryLimits::default(),
            started_at: Utc::now(),
        }
    }

    pub fn with_qa(mut self, qa: Arc<dyn QuestionAnswerer>) -> Self {
        self.qa = Some(qa);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_limits(mut self, limits: SummaryLimits) -> Self {
        self.limits = limits;
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn answer(
    State(qa): State<Arc<dyn QuestionAnswerer>>,
    payload: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, HandlerError> {
    let Json(request) = payload.map_err(rejected)?;
    let request_id = Uuid::new_v4().to_string();

    info!(
        "[{}] Received question: {}... with context: {}...",
        request_id,
        preview(&request.question, LOG_PREVIEW_CHARS),
        preview(&request.context, LOG_PREVIEW_CHARS)
    );
    if let Some(metadata) = &request.metadata {
        debug!("[{}] Request carries {} metadata fields", request_id, metadata.len());
    }

    request.validate().map_err(|e| failed(&request_id, "QA", e))?;

    let answer = qa
        .answer(&request.question, &request.context)
        .await
        .and_then(|answer| {
            if answer.text.trim().is_empty() {
                Err(Error::inference("model returned an empty answer"))
            } else {
                Ok(answer)
            }
        })
        .map_err(|e| failed(&request_id, "QA", e))?;

    info!(
        "[{}] Answered with confidence {:.4}",
        request_id, answer.score
    );
    Ok(Json(AnswerResponse {
        status: "success".to_string(),
        request_id,
        question: request.question,
        answer: answer.text,
        confidence: answer.score,
    }))
}

pub async fn summarize(
    State(state): State<SummarizeState>,
    payload: Result<Json<SummarizeRequest>, JsonRejection>,
) -> Result<Json<SummarizeResponse>, HandlerError> {
    let Json(request) = payload.map_err(rejected)?;
    let request_id = Uuid::new_v4().to_string();

    info!(
        "[{}] Processing text for summarization: {}...",
        request_id,
        preview(&request.text, LOG_PREVIEW_CHARS)
    );
    if let Some(metadata) = &request.metadata {
        debug!("[{}] Request carries {} metadata fields", request_id, metadata.len());
    }

    let params = SummaryParams {
        max_length: request.max_length.unwrap_or(state.limits.default_max_length),
        min_length: request.min_length.unwrap_or(state.limits.default_min_length),
    };
    request
        .validate(
            params.max_length,
            params.min_length,
            state.limits.max_output_len,
        )
        .map_err(|e| failed(&request_id, "summarization", e))?;

    let summary = state
        .summarizer
        .summarize(&request.text, params)
        .await
        .and_then(|summary| {
            if summary.trim().is_empty() {
                Err(Error::inference("model returned an empty summary"))
            } else {
                Ok(summary)
            }
        })
        .map_err(|e| failed(&request_id, "summarization", e))?;

    info!(
        "[{}] Summarized {} chars into {} chars",
        request_id,
        request.text.len(),
        summary.len()
    );
    Ok(Json(SummarizeResponse {
        status: "success".to_string(),
        request_id,
        original_text: request.text,
        summary,
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let models = state
        .qa
        .iter()
        .map(|qa| qa.model_id().to_string())
        .chain(state.summarizer.iter().map(|s| s.model_id().to_string()))
        .collect();

    Json(HealthResponse {
        status: "healthy".to_string(),
        models,
        started_at: state.started_at,
    })
}

fn rejected(rejection: JsonRejection) -> HandlerError {
    warn!("Rejected request body: {}", rejection.body_text());
    (
        rejection.status(),
        Json(ErrorResponse::new(rejection.body_text())),
    )
}

fn failed(request_id: &str, task: &str, e: Error) -> HandlerError {
    if e.is_client_error() {
        warn!("[{}] Invalid {} request: {}", request_id, task, e);
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string())))
    } else {
        error!("[{}] Error processing {} request: {}", request_id, task, e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )
    }
}
