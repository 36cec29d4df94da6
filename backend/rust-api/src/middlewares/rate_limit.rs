use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::services::AppState;

const RATE_LIMIT_PER_USER: u32 = 120; // answers per minute
const RATE_LIMIT_PER_IP: u32 = 240;
const RATE_WINDOW_SECONDS: u64 = 60;

/// Fixed-window Redis rate limit on the game routes, keyed per player and
/// per client IP. Limits are overridable via RATE_LIMIT_PER_USER /
/// RATE_LIMIT_PER_IP; RATE_LIMIT_DISABLED=1 turns the check off for local
/// runs.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if std::env::var("RATE_LIMIT_DISABLED").unwrap_or_default() == "1" {
        tracing::debug!("Rate limiting disabled via RATE_LIMIT_DISABLED=1");
        return Ok(next.run(request).await);
    }

    let client_ip = extract_client_ip(request.headers(), request.extensions());
    let owner_id = request
        .extensions()
        .get::<super::auth::JwtClaims>()
        .map(|claims| claims.sub.clone());

    if let Some(owner_id) = owner_id {
        let user_limit = env_limit("RATE_LIMIT_PER_USER", RATE_LIMIT_PER_USER);
        let allowed = check_rate_limit(
            &state.redis,
            &format!("ratelimit:user:{owner_id}"),
            user_limit,
        )
        .await
        .map_err(|e| {
            tracing::error!("Rate limit check failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

        if !allowed {
            tracing::warn!(owner_id = %owner_id, "rate limit exceeded for player");
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
    }

    let ip_limit = env_limit("RATE_LIMIT_PER_IP", RATE_LIMIT_PER_IP);
    let allowed = check_rate_limit(&state.redis, &format!("ratelimit:ip:{client_ip}"), ip_limit)
        .await
        .map_err(|e| {
            tracing::error!("Rate limit check failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    if !allowed {
        tracing::warn!(client_ip = %client_ip, "rate limit exceeded for IP");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(request).await)
}

fn env_limit(var: &str, default: u32) -> u32 {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(default)
}

/// INCR the window counter; the first hit arms the window expiry.
async fn check_rate_limit(
    redis: &ConnectionManager,
    key: &str,
    limit: u32,
) -> anyhow::Result<bool> {
    let mut conn = redis.clone();

    let count: u32 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
    if count == 1 {
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(RATE_WINDOW_SECONDS)
            .query_async::<()>(&mut conn)
            .await?;
    }

    Ok(count <= limit)
}

fn extract_client_ip(headers: &HeaderMap, extensions: &axum::http::Extensions) -> String {
    if let Some(v) = headers.get("x-forwarded-for") {
        if let Ok(s) = v.to_str() {
            // x-forwarded-for can be a comma separated list; take first
            return s.split(',').next().unwrap_or(s).trim().to_string();
        }
    }

    if let Some(v) = headers.get("x-real-ip") {
        if let Ok(s) = v.to_str() {
            return s.trim().to_string();
        }
    }

    if let Some(ci) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return ci.0.ip().to_string();
    }

    "unknown".to_string()
}
