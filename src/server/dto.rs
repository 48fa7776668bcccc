use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::LabkitDetail;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub barcode: String,
    pub new_status: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignLabkitsRequest {
    pub labkit_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AddEventRequest {
    pub event_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// `site_id` accepts a numeric id or the literal "none" for kits held at
/// the central depot.
#[derive(Debug, Default, Deserialize)]
pub struct InventoryParams {
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub kit_type_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditParams {
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

/// Label payload data; rendering the barcode image is the printer's job.
#[derive(Debug, Serialize)]
pub struct LabelResponse {
    pub barcode: String,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kit_type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ExpiryReport {
    pub expired: Vec<LabkitDetail>,
    pub expiring_soon: Vec<LabkitDetail>,
}
