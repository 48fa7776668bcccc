use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{
    Router,
    routing::{delete, get, post, put},
};

use super::{admin, audit, auth, export, inventory, kit_types, labkits, shipments, sites};
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    /// Public base URL used when rendering label payloads.
    pub base_url: String,
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        // Sites and contacts
        .route("/sites", post(sites::create_site))
        .route("/sites", get(sites::list_sites))
        .route("/sites/{id}", get(sites::get_site))
        .route("/sites/{id}", put(sites::update_site))
        .route("/sites/{id}", delete(sites::delete_site))
        .route("/sites/{id}/contacts", post(sites::create_contact))
        .route("/sites/{id}/contacts", get(sites::list_contacts))
        .route("/contacts/{id}", put(sites::update_contact))
        .route("/contacts/{id}", delete(sites::delete_contact))
        // Kit types
        .route("/kit-types", post(kit_types::create_kit_type))
        .route("/kit-types", get(kit_types::list_kit_types))
        .route("/kit-types/{id}", get(kit_types::get_kit_type))
        .route("/kit-types/{id}", put(kit_types::update_kit_type))
        .route("/kit-types/{id}", delete(kit_types::delete_kit_type))
        .route("/statuses", get(labkits::list_statuses))
        // Labkits and their trails
        .route("/labkits", post(labkits::create_labkit))
        .route("/labkits", get(labkits::list_labkits))
        .route("/labkits/unassigned", get(labkits::list_unassigned))
        .route("/labkits/expiring", get(labkits::expiry_report))
        .route("/labkits/status", post(labkits::change_status))
        .route("/labkits/barcode/{barcode}", get(labkits::get_by_barcode))
        .route(
            "/labkits/barcode/{barcode}/history",
            get(labkits::status_history),
        )
        .route("/labkits/{id}", get(labkits::get_labkit))
        .route("/labkits/{id}", put(labkits::update_labkit))
        .route("/labkits/{id}", delete(labkits::delete_labkit))
        .route("/labkits/{id}/events", post(labkits::add_event))
        .route("/labkits/{id}/events", get(labkits::list_events))
        .route("/labkits/{id}/label", get(labkits::label))
        // Shipments
        .route("/shipments", post(shipments::create_shipment))
        .route("/shipments", get(shipments::list_shipments))
        .route("/shipments/{id}", get(shipments::get_shipment))
        .route("/shipments/{id}", put(shipments::update_shipment))
        .route("/shipments/{id}/labkits", get(shipments::list_labkits))
        .route("/shipments/{id}/labkits", put(shipments::assign_labkits))
        // Reporting
        .route("/inventory", get(inventory::overview))
        .route("/audit", get(audit::list))
        .route("/export/labkits.csv", get(export::labkits_csv))
        .route("/export/shipments.csv", get(export::shipments_csv))
        .route("/export/audit.csv", get(export::audit_csv))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/admin", admin::admin_router())
        .nest("/api/v1", api_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
