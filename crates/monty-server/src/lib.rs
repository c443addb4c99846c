//! Endpoint health-check engine.
//!
//! A single coordinator schedules probes over monitored endpoints
//! (HTTP, TCP, DNS, domain registration, TLS certificates), results
//! land in SQLite, and an axum REST API exposes endpoint CRUD plus the
//! latest statuses.

pub mod api;
pub mod app;
pub mod config;
pub mod logging;
pub mod probe;
pub mod scheduler;
pub mod seed;
pub mod state;
