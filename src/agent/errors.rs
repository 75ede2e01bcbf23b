//! Failure taxonomy for model and vision backends.
//!
//! Providers raise [`UpstreamError`] inside `anyhow::Error`. Anything that
//! reaches the turn pipeline is classified once, first by downcasting and
//! then by inspecting the error text, and only [`ChatError::user_message`]
//! is ever shown to a user.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("401 Unauthorized: {0}")]
    Auth(String),

    #[error("400 Bad Request: {0}")]
    BadRequest(String),

    #[error("500 Internal Server Error: {0}")]
    Server(String),

    #[error("502 Bad Gateway: {0}")]
    Gateway(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl UpstreamError {
    /// Map a non-success HTTP status and its body.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = truncate(body.trim(), 500);
        match status.as_u16() {
            401 => UpstreamError::Auth(detail),
            400 => UpstreamError::BadRequest(detail),
            500 => UpstreamError::Server(detail),
            502 => UpstreamError::Gateway(detail),
            408 | 504 => UpstreamError::Timeout(format!("HTTP {}: {}", status.as_u16(), detail)),
            _ => UpstreamError::Other(format!("HTTP {}: {}", status.as_u16(), detail)),
        }
    }

    /// The request URL is dropped from the error text.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_timeout() {
            return UpstreamError::Timeout(err.to_string());
        }
        if let Some(status) = err.status() {
            return UpstreamError::from_status(status, &err.to_string());
        }
        UpstreamError::from_message(&err.to_string())
    }

    /// Classify free-form error text. Checked in priority order:
    /// auth, 400, 500, 502, timeout.
    pub fn from_message(text: &str) -> Self {
        let lower = text.to_lowercase();
        if text.contains("401") || text.contains("Unauthorized") {
            UpstreamError::Auth(text.to_string())
        } else if text.contains("400") {
            UpstreamError::BadRequest(text.to_string())
        } else if text.contains("500") {
            UpstreamError::Server(text.to_string())
        } else if text.contains("502") {
            UpstreamError::Gateway(text.to_string())
        } else if lower.contains("timeout") || lower.contains("time out") || lower.contains("timed out") {
            UpstreamError::Timeout(text.to_string())
        } else {
            UpstreamError::Other(text.to_string())
        }
    }

    /// Best classification of an arbitrary error chain.
    pub fn classify(err: &anyhow::Error) -> Self {
        if let Some(upstream) = err.downcast_ref::<UpstreamError>() {
            return upstream.clone();
        }
        if let Some(req) = err.downcast_ref::<reqwest::Error>()
            && req.is_timeout()
        {
            return UpstreamError::Timeout(req.to_string());
        }
        UpstreamError::from_message(&format!("{:#}", err))
    }

    pub fn user_message(&self) -> String {
        match self {
            UpstreamError::Auth(_) => {
                "Model API authentication failed. Please check the credentials in the config file."
                    .to_string()
            }
            UpstreamError::BadRequest(_) => "The model rejected the request (400). Check that the model name and parameters are supported by the backend.".to_string(),
            UpstreamError::Server(_) => "Model service error 500 (internal server error). Check that the cloud model supports tool calling.".to_string(),
            UpstreamError::Gateway(_) => {
                "LLM request failed (502). Please check that the model backend is running.".to_string()
            }
            UpstreamError::Timeout(_) => "The request timed out. Please try again later.".to_string(),
            UpstreamError::Other(detail) => format!("Request failed: {}", detail),
        }
    }
}

/// Errors that end a chat turn.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("Failed to fetch image: {0}")]
    ImageFetch(String),

    #[error("Tool loop did not finish within {0} model calls")]
    ToolLoopExhausted(usize),

    #[error("{0}")]
    Internal(String),
}

impl ChatError {
    /// Wrap a provider error, classifying it.
    pub fn upstream(err: anyhow::Error) -> Self {
        ChatError::Upstream(UpstreamError::classify(&err))
    }

    pub fn user_message(&self) -> String {
        match self {
            ChatError::Upstream(e) => e.user_message(),
            ChatError::ImageFetch(_) => {
                "Image recognition failed: could not fetch the image.".to_string()
            }
            ChatError::ToolLoopExhausted(hops) => format!(
                "Request failed: the model was still calling tools after {} rounds",
                hops
            ),
            ChatError::Internal(detail) => format!(
                "Sorry, an error occurred while processing your request: {}",
                detail
            ),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    }
}
