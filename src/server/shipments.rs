use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use crate::auth::RequireAuth;
use crate::server::AppState;
use crate::server::dto::AssignLabkitsRequest;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt};
use crate::types::NewShipment;

pub async fn create_shipment(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(mut req): Json<NewShipment>,
) -> impl IntoResponse {
    if req.status.is_none() {
        req.status = Some("planned".to_string());
    }

    let id = state.store.create_shipment(&req)?;
    let shipment = state
        .store
        .get_shipment(id)?
        .or_not_found("Shipment not found")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(shipment))))
}

pub async fn list_shipments(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let shipments = state.store.list_shipments_with_counts()?;
    Ok::<_, ApiError>(Json(ApiResponse::success(shipments)))
}

pub async fn get_shipment(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let shipment = state
        .store
        .get_shipment(id)?
        .or_not_found("Shipment not found")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(shipment)))
}

pub async fn update_shipment(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(mut req): Json<NewShipment>,
) -> impl IntoResponse {
    let marked_shipped = req.status.as_deref() == Some("shipped");
    if marked_shipped && req.shipped_at.is_none() {
        req.shipped_at = Some(Utc::now());
    }

    state.store.update_shipment(id, &req)?;

    // Marking a shipment shipped moves every assigned kit along with it.
    // Individual kit failures are logged and skipped, not propagated: the
    // shipment update itself has already committed.
    if marked_shipped {
        for kit in state.store.list_shipment_labkits(id)? {
            if let Err(e) = state
                .store
                .transition_status(&kit.barcode, "shipped", &auth.actor)
            {
                tracing::warn!(
                    "Failed to transition labkit {} for shipment {id}: {e}",
                    kit.barcode
                );
            }
        }
    } else {
        // Other edits still leave a trace on each assigned kit's timeline.
        for kit in state.store.list_shipment_labkits(id)? {
            if let Err(e) = state.store.add_labkit_event(
                kit.id,
                "shipment_updated",
                Some("Shipment updated"),
                &auth.actor,
            ) {
                tracing::warn!(
                    "Failed to record shipment update event for labkit {}: {e}",
                    kit.barcode
                );
            }
        }
    }

    let shipment = state
        .store
        .get_shipment(id)?
        .or_not_found("Shipment not found")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(shipment)))
}

pub async fn list_labkits(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    state
        .store
        .get_shipment(id)?
        .or_not_found("Shipment not found")?;
    let labkits = state.store.list_shipment_labkits(id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(labkits)))
}

pub async fn assign_labkits(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AssignLabkitsRequest>,
) -> impl IntoResponse {
    let outcome = state
        .store
        .set_shipment_labkits(id, &req.labkit_ids, &auth.actor)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(outcome)))
}
