use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};

use crate::auth::RequireAuth;
use crate::server::AppState;
use crate::server::dto::AuditParams;
use crate::server::response::{ApiError, ApiResponse};
use crate::types::AuditFilter;

pub async fn list(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditParams>,
) -> impl IntoResponse {
    let filter = AuditFilter {
        entity_type: params.entity_type,
        from: params.from,
        to: params.to,
    };

    let entries = state.store.list_audit(&filter)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(entries)))
}
