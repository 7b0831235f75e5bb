pub mod handlers;
pub mod routes;

use serde::Serialize;

pub use crate::tts::SpeechRequest;

#[derive(Debug, Serialize)]
pub struct SongsResponse {
    pub songs: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
