//! # Labtrack
//!
//! An inventory and shipment tracker for barcoded laboratory kits, usable
//! both as a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! labtrack = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::path::PathBuf;
//! use labtrack::server::{AppState, create_router};
//! use labtrack::store::SqliteStore;
//!
//! let store = SqliteStore::new(&PathBuf::from("./data/labtrack.db")).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState {
//!     store: Arc::new(store),
//!     base_url: "http://127.0.0.1:8080".to_string(),
//! });
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes the `labtrack` binary. Disable with
//!   `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod types;
