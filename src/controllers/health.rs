use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::controllers::generation::GenerationController;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Ready when a file can be staged in the hosting root.
pub async fn health_ready(State(controller): State<Arc<GenerationController>>) -> impl IntoResponse {
    let root = controller.pipeline().hosting().root().to_path_buf();
    let backend = controller.pipeline().backend_name();

    match controller.pipeline().hosting().check_writable().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "hosting_root": root.display().to_string(),
                "backend": backend
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, path = %root.display(), "Hosting root unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "not_ready",
                    "hosting_root": root.display().to_string(),
                    "backend": backend
                })),
            )
        }
    }
}
