use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use thiserror::Error;
use tracing::{event, Level};

use crate::dtos::ApiError;

#[derive(Debug, Error)]
pub enum ToyStoreError {
    #[error("Invalid toy id: {0}")]
    InvalidId(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Toy not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Query error: {0}")]
    Query(String),
}

impl ToyStoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ToyStoreError::InvalidId(_) | ToyStoreError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ToyStoreError::NotFound(_) => StatusCode::NOT_FOUND,
            ToyStoreError::Database(_) | ToyStoreError::Query(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<mongodb::error::Error> for ToyStoreError {
    fn from(e: mongodb::error::Error) -> Self {
        ToyStoreError::Database(e.to_string())
    }
}

impl From<mongodb::bson::extjson::de::Error> for ToyStoreError {
    fn from(e: mongodb::bson::extjson::de::Error) -> Self {
        ToyStoreError::InvalidBody(e.to_string())
    }
}

impl IntoResponse for ToyStoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            event!(Level::ERROR, "Request failed: {}", self);
        } else {
            event!(Level::WARN, "Request rejected: {}", self);
        }

        (status, Json(ApiError { error: self.to_string() })).into_response()
    }
}
