/*
 * Responsibility
 * - GET /health (疎通用)
 * - session / guard を通さない (app 側で /api/v1 の外に置く)
 */
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}
