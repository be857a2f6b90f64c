//! Monitor library for RAN telemetry
//!
//! This crate provides the core functionality for:
//! - The unified srsRAN/OAI snapshot schema
//! - A deduplicating, bounded, persisted snapshot store
//! - Rule-based per-UE health inference with trend detection
//! - Mock and remote acquisition driven by a cancellable poller
//! - Vendor log parsers and an HTTP forwarder
//! - Health checks and observability

pub mod forwarder;
pub mod health;
pub mod inference;
pub mod models;
pub mod observability;
pub mod parser;
pub mod poller;
pub mod source;
pub mod store;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use inference::{Finding, InferenceEngine, InferenceThresholds, Severity, UeAssessment};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
pub use poller::{CycleOutcome, CycleReport, Poller, PollerBuilder, PollerHandle};
pub use store::{SnapshotStore, SourceMode, StoreConfig, StoreStats};
