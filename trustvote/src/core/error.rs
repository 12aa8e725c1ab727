use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use trustvote_chain::ChainError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid wallet address")]
    InvalidAddress,

    #[error("Malformed payload")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("Wallet store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::InvalidAddress => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::MalformedPayload(e) => {
                warn!("Rejected login payload: {e}");
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::Store(_) | AppError::Chain(_) => {
                error!("Login failed: {self}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
