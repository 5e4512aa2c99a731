mod error;
mod handlers;
mod types;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use ffctl_ffmpeg::FFmpeg;
use ffctl_task::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub ffmpeg: Arc<FFmpeg>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v3/skills", get(handlers::skills))
        .route("/api/v3/skills/reload", post(handlers::reload_skills))
        .route(
            "/api/v3/process",
            get(handlers::list_processes).post(handlers::add_process),
        )
        .route(
            "/api/v3/process/{id}",
            get(handlers::get_process)
                .put(handlers::update_process)
                .delete(handlers::delete_process),
        )
        .route("/api/v3/process/{id}/config", get(handlers::get_config))
        .route("/api/v3/process/{id}/state", get(handlers::get_state))
        .route("/api/v3/process/{id}/report", get(handlers::get_report))
        .route("/api/v3/process/{id}/command", put(handlers::command))
        .layer(cors)
        .with_state(state)
}
