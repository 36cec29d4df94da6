use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::metrics;
use crate::services::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mongo = check_mongo(&state).await;
    let redis = check_redis(&state).await;

    let healthy = mongo["status"] == "healthy" && redis["status"] == "healthy";
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(json!({
            "status": if healthy { "healthy" } else { "degraded" },
            "service": "aramaic-quiz-api",
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": { "mongodb": mongo, "redis": redis },
        })),
    )
}

async fn check_mongo(state: &AppState) -> serde_json::Value {
    match tokio::time::timeout(
        Duration::from_secs(1),
        state.mongo.run_command(mongodb::bson::doc! { "ping": 1 }),
    )
    .await
    {
        Ok(Ok(_)) => json!({ "status": "healthy" }),
        Ok(Err(e)) => json!({ "status": "unhealthy", "error": format!("MongoDB error: {}", e) }),
        Err(_) => json!({ "status": "unhealthy", "error": "MongoDB timeout after 1s" }),
    }
}

async fn check_redis(state: &AppState) -> serde_json::Value {
    let mut conn = state.redis.clone();
    match tokio::time::timeout(
        Duration::from_millis(500),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    {
        Ok(Ok(_)) => json!({ "status": "healthy" }),
        Ok(Err(e)) => json!({ "status": "unhealthy", "error": format!("Redis error: {}", e) }),
        Err(_) => json!({ "status": "unhealthy", "error": "Redis timeout after 500ms" }),
    }
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// Protects /metrics with HTTP Basic Auth; credentials come from the
/// METRICS_AUTH env var as `username:password`.
pub async fn metrics_auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let encoded = auth_header
        .strip_prefix("Basic ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let expected = std::env::var("METRICS_AUTH").unwrap_or_else(|_| "admin:changeme".to_string());

    if credentials != expected {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

pub mod game;
