mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface.
///
/// Every mutating method takes the acting user explicitly; there is no
/// ambient session state. Compound mutations (transitions, cascaded
/// deletes, shipment assignment) are atomic per call.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Site operations
    fn create_site(&self, new: &NewSite) -> Result<i64>;
    fn get_site(&self, id: i64) -> Result<Option<Site>>;
    fn list_sites(&self) -> Result<Vec<Site>>;
    fn update_site(&self, id: i64, new: &NewSite) -> Result<()>;
    fn delete_site(&self, id: i64, actor: &str) -> Result<()>;

    // Site contact operations
    fn create_site_contact(&self, site_id: i64, new: &NewSiteContact) -> Result<i64>;
    fn list_site_contacts(&self, site_id: i64) -> Result<Vec<SiteContact>>;
    fn update_site_contact(&self, id: i64, new: &NewSiteContact) -> Result<()>;
    fn delete_site_contact(&self, id: i64) -> Result<bool>;

    // Kit type operations
    fn create_kit_type(&self, new: &NewKitType) -> Result<i64>;
    fn get_kit_type(&self, id: i64) -> Result<Option<KitType>>;
    fn list_kit_types(&self) -> Result<Vec<KitType>>;
    fn update_kit_type(&self, id: i64, new: &NewKitType) -> Result<()>;
    fn delete_kit_type(&self, id: i64, actor: &str) -> Result<()>;

    // Labkit operations
    fn create_labkit(&self, new: &NewLabkit, actor: &str) -> Result<i64>;
    fn get_labkit(&self, id: i64) -> Result<Option<Labkit>>;
    fn get_labkit_by_barcode(&self, barcode: &str) -> Result<Option<Labkit>>;
    fn get_labkit_detail(&self, id: i64) -> Result<Option<LabkitDetail>>;
    fn list_labkits(&self) -> Result<Vec<LabkitDetail>>;
    fn list_unassigned_labkits(&self) -> Result<Vec<LabkitSummary>>;
    fn update_labkit(&self, id: i64, new: &NewLabkit, actor: &str) -> Result<()>;
    fn delete_labkit(&self, id: i64, actor: &str) -> Result<()>;

    // Status lifecycle
    fn transition_status(&self, barcode: &str, new_status: &str, actor: &str)
    -> Result<Transition>;
    fn status_history(&self, barcode: &str) -> Result<Vec<StatusEvent>>;

    // Free-form event trail
    fn add_labkit_event(
        &self,
        labkit_id: i64,
        event_type: &str,
        description: Option<&str>,
        actor: &str,
    ) -> Result<i64>;
    fn list_labkit_events(&self, labkit_id: i64) -> Result<Vec<KitEvent>>;

    // Inventory aggregation
    fn inventory_overview(
        &self,
        site: Option<SiteFilter>,
        kit_type: Option<i64>,
    ) -> Result<Vec<InventoryRow>>;

    // Shipment operations
    fn create_shipment(&self, new: &NewShipment) -> Result<i64>;
    fn get_shipment(&self, id: i64) -> Result<Option<ShipmentRow>>;
    fn list_shipment_labkits(&self, shipment_id: i64) -> Result<Vec<LabkitSummary>>;
    fn list_shipments_with_counts(&self) -> Result<Vec<ShipmentSummary>>;
    fn update_shipment(&self, id: i64, new: &NewShipment) -> Result<()>;
    fn set_shipment_labkits(
        &self,
        shipment_id: i64,
        labkit_ids: &[i64],
        actor: &str,
    ) -> Result<AssignmentOutcome>;

    // Audit log
    fn record_audit(
        &self,
        actor: &str,
        entity_type: &str,
        entity_id: i64,
        action: AuditAction,
        field_name: Option<&str>,
        old_value: Option<&str>,
        new_value: Option<&str>,
        description: Option<&str>,
    ) -> Result<i64>;
    fn list_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>>;

    // User operations
    fn create_user(&self, username: &str, password_hash: &str, role: &str) -> Result<i64>;
    fn get_user(&self, id: i64) -> Result<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;
    fn delete_token(&self, id: &str) -> Result<bool>;
    fn has_admin_token(&self) -> Result<bool>;
}
