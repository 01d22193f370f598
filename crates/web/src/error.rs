use crate::views;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use riskscan_core::pipeline::PipelineError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("{0}")]
    BadRequest(String),
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Pipeline(PipelineError::Internal(err))
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self::BadRequest(err.body_text())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Pipeline(PipelineError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Pipeline(PipelineError::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Pipeline(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Pipeline(PipelineError::Internal(_)) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }

    fn log(&self) {
        if let Self::Pipeline(PipelineError::Internal(err)) = self {
            error!(error = ?err, "request failed");
        }
    }

    /// `{ok: false, error}` body for the JSON endpoints.
    pub fn into_json(self) -> Response {
        self.log();
        let status = self.status();
        let message = match &self {
            Self::Pipeline(PipelineError::Internal(err)) => format!("{err:#}"),
            other => other.to_string(),
        };
        (status, Json(json!({ "ok": false, "error": message }))).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status();
        (status, Html(views::error_page(status, &self.public_message()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_statuses() {
        assert_eq!(
            AppError::from(PipelineError::NotFound("analysis")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(anyhow::anyhow!("db down")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::from(PipelineError::LlmDisabled).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(anyhow::anyhow!("secret")).public_message(),
            "Internal error"
        );
    }
}
