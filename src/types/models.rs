use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub site_code: String,
    pub site_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Site fields as supplied on create/update (id and created_at are owned by
/// the store).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSite {
    pub site_code: String,
    pub site_name: String,
    #[serde(default)]
    pub address_line1: Option<String>,
    #[serde(default)]
    pub address_line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteContact {
    pub id: i64,
    pub site_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_number: Option<String>,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSiteContact {
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub room_number: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KitType {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_expiry_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_variance: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewKitType {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_expiry_days: Option<i64>,
    #[serde(default)]
    pub standard_weight: Option<f64>,
    #[serde(default)]
    pub weight_variance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Labkit {
    pub id: i64,
    pub barcode: String,
    pub kit_type_id: i64,
    /// None means the kit sits at the central depot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measured_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewLabkit {
    pub barcode: String,
    pub kit_type_id: i64,
    #[serde(default)]
    pub site_id: Option<i64>,
    #[serde(default)]
    pub lot_number: Option<String>,
    #[serde(default)]
    pub measured_weight: Option<f64>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    /// Ignored by the store, which always starts kits at `planned`; the
    /// HTTP layer applies a different requested status as a recorded
    /// transition after the create or update.
    #[serde(default)]
    pub status: Option<String>,
}

/// A labkit with its type and site names resolved, for lists, detail views
/// and exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabkitDetail {
    #[serde(flatten)]
    pub labkit: Labkit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kit_type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
}

/// Slim labkit row for shipment assignment views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabkitSummary {
    pub id: i64,
    pub barcode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kit_type_name: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_arrival: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewShipment {
    #[serde(default)]
    pub site_id: Option<i64>,
    #[serde(default)]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expected_arrival: Option<NaiveDate>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Shipment with the destination site name resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentRow {
    #[serde(flatten)]
    pub shipment: Shipment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
}

/// Shipment list/export row with the assigned kit count.
#[derive(Debug, Clone, Serialize)]
pub struct ShipmentSummary {
    pub id: i64,
    pub site_name: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub status: Option<String>,
    pub number_of_kits: i64,
}

/// Append-only record of a single status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub id: i64,
    pub labkit_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_status: Option<String>,
    pub new_status: String,
    pub event_time: DateTime<Utc>,
}

/// Append-only free-form log entry about a labkit, independent of the
/// status event trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KitEvent {
    pub id: i64,
    pub labkit_id: i64,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub entity_type: String,
    /// Weak reference: the entity may have been deleted since.
    pub entity_id: i64,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Filter for audit queries. `from`/`to` are calendar days; `from` is an
/// inclusive midnight bound, `to` is exclusive midnight of the following
/// day.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub entity_type: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Outcome of a status transition. The free-form event write downstream of
/// the transition is best-effort; `event_logged` reports whether it landed.
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub labkit_id: i64,
    pub barcode: String,
    pub old_status: String,
    pub new_status: String,
    pub event_logged: bool,
}

/// Outcome of reconciling a shipment's labkit assignments.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssignmentOutcome {
    pub added: Vec<i64>,
    pub removed: Vec<i64>,
}

/// One inventory aggregation row: available kits per (site, kit type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryRow {
    pub site_name: String,
    pub kit_type_name: Option<String>,
    pub available_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}
