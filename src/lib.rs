//! Catalog Sync Agent
//!
//! Edge-side half of a two-party catalog sync: serves local product and
//! category changes to a cloud orchestrator and applies the cloud's changes
//! with last-write-wins conflict handling.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;
pub mod sync;
