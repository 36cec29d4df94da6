use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::middlewares::auth::JwtClaims;
use crate::models::{EndGameRequest, SubmitAnswerRequest};
use crate::services::game_service::GameError;
use crate::services::AppState;

type ErrorBody = (StatusCode, Json<serde_json::Value>);

pub async fn start_game(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ErrorBody> {
    tracing::info!(owner_id = %claims.sub, "starting new game");

    match state.game.start_session(&claims.sub).await {
        Ok(response) => Ok((StatusCode::CREATED, Json(response))),
        Err(e) => {
            tracing::warn!(owner_id = %claims.sub, error = %e, "failed to start game");
            Err(error_response(e))
        }
    }
}

pub async fn current_game(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ErrorBody> {
    match state.game.current_session(&claims.sub).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => Err(error_response(e)),
    }
}

pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, ErrorBody> {
    req.validate().map_err(validation_error)?;

    match state
        .game
        .submit_answer(
            &req.session_id,
            &claims.sub,
            &req.question_id,
            req.selected_option,
        )
        .await
    {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => {
            tracing::warn!(
                session_id = %req.session_id,
                owner_id = %claims.sub,
                error = %e,
                "failed to submit answer"
            );
            Err(error_response(e))
        }
    }
}

pub async fn end_game(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Json(req): Json<EndGameRequest>,
) -> Result<impl IntoResponse, ErrorBody> {
    req.validate().map_err(validation_error)?;

    match state.game.end_session(&req.session_id, &claims.sub).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => {
            tracing::warn!(
                session_id = %req.session_id,
                owner_id = %claims.sub,
                error = %e,
                "failed to end game"
            );
            Err(error_response(e))
        }
    }
}

fn error_response(err: GameError) -> ErrorBody {
    let status = match err {
        GameError::UnknownOwner | GameError::SessionNotFound | GameError::QuestionNotFound => {
            StatusCode::NOT_FOUND
        }
        GameError::ConcurrentModification => StatusCode::CONFLICT,
        GameError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        status,
        Json(json!({ "message": err.to_string(), "status": status.as_u16() })),
    )
}

fn validation_error(err: validator::ValidationErrors) -> ErrorBody {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "message": err.to_string(), "status": 400 })),
    )
}
