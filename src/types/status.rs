use serde::{Deserialize, Serialize};

/// The documented labkit status domain, in lifecycle order.
///
/// Membership is advisory: the store accepts and persists arbitrary status
/// strings, matching the data already in the field. The list exists for
/// presentation layers that render status pickers.
pub const LABKIT_STATUSES: &[&str] = &[
    "planned",
    "packed",
    "ready_to_ship",
    "shipped",
    "at_site",
    "used",
    "returned",
    "destroyed",
];

/// The documented shipment status domain.
pub const SHIPMENT_STATUSES: &[&str] = &[
    "planned",
    "packed",
    "shipped",
    "delivered",
    "lost",
    "returned",
    "canceled",
];

/// Statuses counted as "available" by the inventory aggregator. A closed
/// allow-list, not the full status domain.
pub const AVAILABLE_STATUSES: &[&str] = &["ready_to_ship", "shipped", "at_site"];

/// Every labkit starts life in this status; any other status is reached
/// through a recorded transition.
pub const INITIAL_STATUS: &str = "planned";

/// Actor recorded when no authenticated user is available.
pub const SYSTEM_ACTOR: &str = "system";

/// Site filter for inventory aggregation. `CentralDepot` (site_id IS NULL)
/// is distinct from "no filter", which is expressed as `Option::None` at the
/// call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteFilter {
    CentralDepot,
    Site(i64),
}

/// Audit log action kinds. Stored as their uppercase string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    StatusChange,
}

impl AuditAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::StatusChange => "STATUS_CHANGE",
        }
    }
}
