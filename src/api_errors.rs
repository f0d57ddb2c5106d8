use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::errors::MarketError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),
    #[error(transparent)]
    Market(#[from] MarketError),
}

impl AppError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
}

#[derive(Serialize)]
struct ErrBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'static str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, body) = match self {
            AppError::Unauthorized(error) => (
                StatusCode::UNAUTHORIZED,
                ErrBody {
                    error,
                    category: None,
                },
            ),
            AppError::Market(err) => {
                if err.status_code().is_server_error() {
                    tracing::error!(error = %err, "request failed");
                }
                (
                    err.status_code(),
                    ErrBody {
                        error: err.to_string(),
                        category: Some(err.category()),
                    },
                )
            }
        };
        (code, Json(body)).into_response()
    }
}
