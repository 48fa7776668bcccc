use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use crate::auth::{RequireAdmin, hash_password};
use crate::server::AppState;
use crate::server::dto::{CreateUserRequest, UserResponse};
use crate::server::response::{ApiError, ApiResponse};

pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new().route("/users", post(create_user))
}

pub async fn create_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> impl IntoResponse {
    if req.username.is_empty() {
        return Err(ApiError::bad_request("Username cannot be empty"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::bad_request(
            "Password must be at least 8 characters",
        ));
    }

    let role = req.role.as_deref().unwrap_or("coordinator");
    let hash = hash_password(&req.password)?;
    let id = state.store.create_user(&req.username, &hash, role)?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(UserResponse {
            id,
            username: req.username,
            role: role.to_string(),
        })),
    ))
}
