use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::songs::SongLibrary;
use crate::tts::SpeechSynthesizer;

pub struct AppState {
    pub tts: Arc<dyn SpeechSynthesizer>,
    pub songs: SongLibrary,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    // Credentials rule out `*`, so every origin, method and header is echoed back.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    let api_routes = Router::new()
        .route("/tts", post(handlers::tts))
        .route("/sing/:query", get(handlers::sing))
        .route("/songs", get(handlers::list_songs))
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api", api_routes)
        .fallback(handlers::not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
