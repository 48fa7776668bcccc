use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::{RequireAuth, TokenGenerator, verify_password};
use crate::server::AppState;
use crate::server::dto::{LoginRequest, LoginResponse};
use crate::server::response::{ApiError, ApiResponse};
use crate::types::Token;

const TOKEN_TTL_DAYS: i64 = 30;

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let user = state
        .store
        .get_user_by_username(&req.username)?
        .ok_or_else(|| ApiError::unauthorized("Invalid username or password"))?;

    if !verify_password(&req.password, &user.password_hash)? {
        return Err(ApiError::unauthorized("Invalid username or password"));
    }

    let generator = TokenGenerator::new();
    let (raw_token, lookup, hash) = generator.generate()?;

    let token = Token {
        id: Uuid::new_v4().to_string(),
        token_hash: hash,
        token_lookup: lookup,
        is_admin: false,
        user_id: Some(user.id),
        created_at: Utc::now(),
        expires_at: Some(Utc::now() + Duration::days(TOKEN_TTL_DAYS)),
        last_used_at: None,
    };
    state.store.create_token(&token)?;

    tracing::info!("User {} logged in", user.username);

    Ok::<_, ApiError>(Json(ApiResponse::success(LoginResponse {
        token: raw_token,
        username: user.username,
        role: user.role,
    })))
}

pub async fn logout(auth: RequireAuth, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.store.delete_token(&auth.token.id)?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
