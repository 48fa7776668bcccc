use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};

use crate::auth::RequireAuth;
use crate::server::AppState;
use crate::server::dto::InventoryParams;
use crate::server::response::{ApiError, ApiResponse};
use crate::types::SiteFilter;

pub async fn overview(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(params): Query<InventoryParams>,
) -> impl IntoResponse {
    let site = match params.site_id.as_deref() {
        None | Some("") => None,
        Some("none") => Some(SiteFilter::CentralDepot),
        Some(raw) => {
            let id: i64 = raw
                .parse()
                .map_err(|_| ApiError::bad_request("site_id must be a number or \"none\""))?;
            Some(SiteFilter::Site(id))
        }
    };

    let rows = state.store.inventory_overview(site, params.kit_type_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(rows)))
}
