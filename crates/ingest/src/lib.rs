//! Remote ingest endpoint for RAN snapshots
//!
//! Vendor parsers POST snapshots here; monitors poll them back with
//! `GET ?all=1`. Storage is a bounded in-memory buffer.

pub mod api;
pub mod buffer;
pub mod config;
pub mod normalize;

pub use api::{create_router, AppState, IngestResponse};
pub use buffer::IngestBuffer;
pub use config::IngestConfig;
pub use normalize::{normalize_body, IngestError};
