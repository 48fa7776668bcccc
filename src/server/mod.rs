mod admin;
mod audit;
mod auth;
pub mod dto;
mod export;
mod inventory;
mod kit_types;
mod labkits;
pub mod response;
mod router;
mod shipments;
mod sites;
pub mod validation;

pub use router::{AppState, create_router};
