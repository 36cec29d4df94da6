#![allow(dead_code)]

use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        // Game endpoints (require a guest JWT); auth runs before the rate
        // limiter so per-player limits can key on the token subject.
        .nest(
            "/api/v1/game",
            game_routes()
                .layer(cors)
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::rate_limit::rate_limit_middleware,
                ))
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::auth::auth_middleware,
                )),
        )
        .with_state(app_state)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn game_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/start", post(handlers::game::start_game))
        .route("/current", get(handlers::game::current_game))
        .route("/answer", post(handlers::game::submit_answer))
        .route("/end", post(handlers::game::end_game))
}
