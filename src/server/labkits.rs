use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Days, Utc};

use crate::auth::RequireAuth;
use crate::server::AppState;
use crate::server::dto::{AddEventRequest, ExpiryReport, LabelResponse, StatusChangeRequest};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt};
use crate::server::validation::{validate_barcode, validate_status};
use crate::types::{INITIAL_STATUS, LABKIT_STATUSES, NewLabkit, SHIPMENT_STATUSES};

const EXPIRY_WARNING_DAYS: u64 = 60;

/// Documented status domains for presentation layers. Advisory only: the
/// store persists whatever status string a transition carries.
pub async fn list_statuses(_auth: RequireAuth) -> impl IntoResponse {
    Json(ApiResponse::success(serde_json::json!({
        "labkit": LABKIT_STATUSES,
        "shipment": SHIPMENT_STATUSES,
    })))
}

pub async fn create_labkit(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewLabkit>,
) -> impl IntoResponse {
    validate_barcode(&req.barcode)?;
    if let Some(status) = &req.status {
        validate_status(status)?;
    }

    let id = state.store.create_labkit(&req, &auth.actor)?;

    // Kits always start planned; a different requested status becomes the
    // first recorded transition.
    if let Some(status) = &req.status {
        if status != INITIAL_STATUS {
            state
                .store
                .transition_status(&req.barcode, status, &auth.actor)?;
        }
    }

    let labkit = state
        .store
        .get_labkit_detail(id)?
        .or_not_found("Labkit not found")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(labkit))))
}

pub async fn list_labkits(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let labkits = state.store.list_labkits()?;
    Ok::<_, ApiError>(Json(ApiResponse::success(labkits)))
}

pub async fn list_unassigned(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let labkits = state.store.list_unassigned_labkits()?;
    Ok::<_, ApiError>(Json(ApiResponse::success(labkits)))
}

/// Buckets kits by expiry date: already expired, and expiring within the
/// next 60 days.
pub async fn expiry_report(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let today = Utc::now().date_naive();
    let horizon = today + Days::new(EXPIRY_WARNING_DAYS);

    let mut report = ExpiryReport {
        expired: Vec::new(),
        expiring_soon: Vec::new(),
    };
    for labkit in state.store.list_labkits()? {
        let Some(expiry) = labkit.labkit.expiry_date else {
            continue;
        };
        if expiry < today {
            report.expired.push(labkit);
        } else if expiry <= horizon {
            report.expiring_soon.push(labkit);
        }
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(report)))
}

pub async fn change_status(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<StatusChangeRequest>,
) -> impl IntoResponse {
    validate_barcode(&req.barcode)?;
    validate_status(&req.new_status)?;

    let transition = state
        .store
        .transition_status(&req.barcode, &req.new_status, &auth.actor)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(transition)))
}

pub async fn get_by_barcode(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(barcode): Path<String>,
) -> impl IntoResponse {
    let labkit = state
        .store
        .get_labkit_by_barcode(&barcode)?
        .or_not_found("Labkit not found")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(labkit)))
}

pub async fn status_history(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(barcode): Path<String>,
) -> impl IntoResponse {
    state
        .store
        .get_labkit_by_barcode(&barcode)?
        .or_not_found("Labkit not found")?;
    let history = state.store.status_history(&barcode)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(history)))
}

pub async fn get_labkit(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let labkit = state
        .store
        .get_labkit_detail(id)?
        .or_not_found("Labkit not found")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(labkit)))
}

pub async fn update_labkit(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<NewLabkit>,
) -> impl IntoResponse {
    validate_barcode(&req.barcode)?;
    if let Some(status) = &req.status {
        validate_status(status)?;
    }

    let before = state
        .store
        .get_labkit(id)?
        .or_not_found("Labkit not found")?;
    state.store.update_labkit(id, &req, &auth.actor)?;

    // A changed status goes through the transition machinery; otherwise an
    // "updated" trail event is appended best-effort.
    match &req.status {
        Some(status) if *status != before.status => {
            state
                .store
                .transition_status(&req.barcode, status, &auth.actor)?;
        }
        _ => {
            if let Err(e) = state
                .store
                .add_labkit_event(id, "updated", Some("Labkit updated"), &auth.actor)
            {
                tracing::warn!("Failed to record updated event for labkit {id}: {e}");
            }
        }
    }

    let labkit = state
        .store
        .get_labkit_detail(id)?
        .or_not_found("Labkit not found")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(labkit)))
}

pub async fn delete_labkit(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    state.store.delete_labkit(id, &auth.actor)?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn add_event(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AddEventRequest>,
) -> impl IntoResponse {
    if req.event_type.is_empty() {
        return Err(ApiError::bad_request("Event type cannot be empty"));
    }

    let event_id = state.store.add_labkit_event(
        id,
        &req.event_type,
        req.description.as_deref(),
        &auth.actor,
    )?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(serde_json::json!({ "id": event_id }))),
    ))
}

pub async fn list_events(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    state
        .store
        .get_labkit(id)?
        .or_not_found("Labkit not found")?;
    let events = state.store.list_labkit_events(id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(events)))
}

/// Pipe-delimited label payload for barcode printers: the barcode followed
/// by a deep link to the kit.
pub async fn label(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let detail = state
        .store
        .get_labkit_detail(id)?
        .or_not_found("Labkit not found")?;

    let payload = format!(
        "{}|{}/api/v1/labkits/{}",
        detail.labkit.barcode, state.base_url, detail.labkit.id
    );

    Ok::<_, ApiError>(Json(ApiResponse::success(LabelResponse {
        barcode: detail.labkit.barcode,
        payload,
        kit_type_name: detail.kit_type_name,
        site_name: detail.site_name,
        status: detail.labkit.status,
    })))
}
