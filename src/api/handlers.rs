use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, PathRejection},
        Path, Request, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use super::{HealthResponse, SongsResponse, SpeechRequest};
use crate::api::routes::AppState;
use crate::error::AppError;
use crate::tts::collect_audio;

pub async fn tts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, AppError> {
    let body = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let request = parse_speech_request(&headers, &body)?;

    tracing::info!("TTS: {}...", request.preview());

    // Buffer the whole utterance so a provider failure never yields truncated audio.
    let audio = collect_audio(state.tts.stream(&request))
        .await
        .map_err(|e| {
            tracing::error!("TTS error from {}: {}", state.tts.name(), e);
            AppError::from(e)
        })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "audio/mpeg")],
        audio,
    )
        .into_response())
}

/// Decode a speech request body. A missing `Content-Type` is read as JSON;
/// any other declared type must be `application/json` or a `+json` subtype.
fn parse_speech_request(headers: &HeaderMap, body: &[u8]) -> Result<SpeechRequest, AppError> {
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        let is_json = content_type
            .to_str()
            .ok()
            .and_then(|value| value.parse::<mime::Mime>().ok())
            .map(|parsed| {
                parsed.type_() == mime::APPLICATION
                    && (parsed.subtype() == mime::JSON || parsed.suffix() == Some(mime::JSON))
            })
            .unwrap_or(false);

        if !is_json {
            return Err(AppError::BadRequest(
                "Expected request with `Content-Type: application/json`".to_string(),
            ));
        }
    }

    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(e.to_string()))
}

pub async fn sing(
    State(state): State<Arc<AppState>>,
    query: Result<Path<String>, PathRejection>,
    request: Request,
) -> Result<Response, AppError> {
    let Path(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;

    tracing::info!("Received request for: {}", query);

    let library = state.songs.clone();
    let (_selection, path) =
        tokio::task::spawn_blocking(move || library.find(&query, &mut rand::rng())).await??;

    // ServeFile streams the file and answers Range and conditional headers.
    let response = ServeFile::new_with_mime(&path, &"audio/mpeg".parse::<mime::Mime>().expect("valid mime"))
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {});

    Ok(response.into_response())
}

pub async fn list_songs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SongsResponse>, AppError> {
    let library = state.songs.clone();
    let songs = tokio::task::spawn_blocking(move || library.list()).await??;
    Ok(Json(SongsResponse { songs }))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn not_found() -> AppError {
    AppError::RouteNotFound
}
