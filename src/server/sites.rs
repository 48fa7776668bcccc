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
use crate::types::{NewSite, NewSiteContact};

pub async fn create_site(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewSite>,
) -> impl IntoResponse {
    if req.site_code.is_empty() {
        return Err(ApiError::bad_request("Site code cannot be empty"));
    }

    let id = state.store.create_site(&req)?;
    let site = state.store.get_site(id)?.or_not_found("Site not found")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(site))))
}

pub async fn list_sites(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let sites = state.store.list_sites()?;
    Ok::<_, ApiError>(Json(ApiResponse::success(sites)))
}

pub async fn get_site(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let site = state.store.get_site(id)?.or_not_found("Site not found")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(site)))
}

pub async fn update_site(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<NewSite>,
) -> impl IntoResponse {
    state.store.update_site(id, &req)?;
    let site = state.store.get_site(id)?.or_not_found("Site not found")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(site)))
}

pub async fn delete_site(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    state.store.delete_site(id, &auth.actor)?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn create_contact(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<i64>,
    Json(req): Json<NewSiteContact>,
) -> impl IntoResponse {
    if req.name.is_empty() {
        return Err(ApiError::bad_request("Contact name cannot be empty"));
    }

    let id = state.store.create_site_contact(site_id, &req)?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(serde_json::json!({ "id": id }))),
    ))
}

pub async fn list_contacts(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<i64>,
) -> impl IntoResponse {
    state
        .store
        .get_site(site_id)?
        .or_not_found("Site not found")?;
    let contacts = state.store.list_site_contacts(site_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(contacts)))
}

pub async fn update_contact(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<NewSiteContact>,
) -> impl IntoResponse {
    state.store.update_site_contact(id, &req)?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn delete_contact(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    if !state.store.delete_site_contact(id)? {
        return Err(ApiError::not_found("Contact not found"));
    }
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
