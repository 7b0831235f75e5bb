use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::tts::TtsError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Songs folder not found at {}", .0.display())]
    SongsDirNotFound(PathBuf),

    #[error("No MP3 files found in library")]
    EmptyLibrary,

    #[error("{0}")]
    BadRequest(String),

    #[error("Not Found")]
    RouteNotFound,

    #[error(transparent)]
    Tts(#[from] TtsError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::SongsDirNotFound(_) | AppError::EmptyLibrary | AppError::RouteNotFound => {
                StatusCode::NOT_FOUND
            }
            AppError::BadRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Tts(_) | AppError::IoError(_) | AppError::TaskError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.to_string();

        tracing::error!("Request failed: {} - {}", status, detail);

        (status, Json(ErrorResponse { detail })).into_response()
    }
}
