use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireAuth;
use crate::server::AppState;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt};
use crate::types::NewKitType;

pub async fn create_kit_type(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewKitType>,
) -> impl IntoResponse {
    if req.name.is_empty() {
        return Err(ApiError::bad_request("Kit type name cannot be empty"));
    }

    let id = state.store.create_kit_type(&req)?;
    let kit_type = state
        .store
        .get_kit_type(id)?
        .or_not_found("Kit type not found")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(kit_type))))
}

pub async fn list_kit_types(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let kit_types = state.store.list_kit_types()?;
    Ok::<_, ApiError>(Json(ApiResponse::success(kit_types)))
}

pub async fn get_kit_type(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let kit_type = state
        .store
        .get_kit_type(id)?
        .or_not_found("Kit type not found")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(kit_type)))
}

pub async fn update_kit_type(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<NewKitType>,
) -> impl IntoResponse {
    state.store.update_kit_type(id, &req)?;
    let kit_type = state
        .store
        .get_kit_type(id)?
        .or_not_found("Kit type not found")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(kit_type)))
}

pub async fn delete_kit_type(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    state.store.delete_kit_type(id, &auth.actor)?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
