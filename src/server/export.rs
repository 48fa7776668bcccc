use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};

use crate::auth::RequireAuth;
use crate::server::AppState;
use crate::server::dto::AuditParams;
use crate::server::response::ApiError;
use crate::types::AuditFilter;

fn csv_headers(filename: &str) -> [(header::HeaderName, String); 2] {
    [
        (header::CONTENT_TYPE, "text/csv".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
    ]
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, ApiError> {
    writer
        .into_inner()
        .map_err(|e| ApiError::internal(format!("Failed to write CSV: {e}")))
}

fn write_record<I, S>(writer: &mut csv::Writer<Vec<u8>>, record: I) -> Result<(), ApiError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    writer
        .write_record(record)
        .map_err(|e| ApiError::internal(format!("Failed to write CSV: {e}")))
}

pub async fn labkits_csv(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let mut writer = csv::Writer::from_writer(vec![]);
    write_record(
        &mut writer,
        [
            "id",
            "barcode",
            "kit_type",
            "site",
            "status",
            "lot_number",
            "expiry_date",
            "created_at",
        ],
    )?;

    for row in state.store.list_labkits()? {
        let kit = &row.labkit;
        write_record(
            &mut writer,
            [
                kit.id.to_string(),
                kit.barcode.clone(),
                row.kit_type_name.clone().unwrap_or_default(),
                row.site_name.clone().unwrap_or_default(),
                kit.status.clone(),
                kit.lot_number.clone().unwrap_or_default(),
                kit.expiry_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                kit.created_at.to_rfc3339(),
            ],
        )?;
    }

    Ok::<_, ApiError>((csv_headers("labkits.csv"), finish(writer)?))
}

pub async fn shipments_csv(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let mut writer = csv::Writer::from_writer(vec![]);
    write_record(
        &mut writer,
        [
            "id",
            "site",
            "shipped_at",
            "carrier",
            "tracking_number",
            "status",
            "number_of_kits",
        ],
    )?;

    for row in state.store.list_shipments_with_counts()? {
        write_record(
            &mut writer,
            [
                row.id.to_string(),
                row.site_name.clone().unwrap_or_default(),
                row.shipped_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                row.carrier.clone().unwrap_or_default(),
                row.tracking_number.clone().unwrap_or_default(),
                row.status.clone().unwrap_or_default(),
                row.number_of_kits.to_string(),
            ],
        )?;
    }

    Ok::<_, ApiError>((csv_headers("shipments.csv"), finish(writer)?))
}

pub async fn audit_csv(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditParams>,
) -> impl IntoResponse {
    let filter = AuditFilter {
        entity_type: params.entity_type,
        from: params.from,
        to: params.to,
    };

    let mut writer = csv::Writer::from_writer(vec![]);
    write_record(
        &mut writer,
        [
            "timestamp",
            "user",
            "entity_type",
            "entity_id",
            "action",
            "field_name",
            "old_value",
            "new_value",
            "description",
        ],
    )?;

    for entry in state.store.list_audit(&filter)? {
        write_record(
            &mut writer,
            [
                entry.timestamp.to_rfc3339(),
                entry.user.clone().unwrap_or_default(),
                entry.entity_type.clone(),
                entry.entity_id.to_string(),
                entry.action.clone(),
                entry.field_name.clone().unwrap_or_default(),
                entry.old_value.clone().unwrap_or_default(),
                entry.new_value.clone().unwrap_or_default(),
                entry.description.clone().unwrap_or_default(),
            ],
        )?;
    }

    Ok::<_, ApiError>((csv_headers("audit.csv"), finish(writer)?))
}
