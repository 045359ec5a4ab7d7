//! AI Photobooth transformation tracker
//!
//! This library tracks image-transformation jobs submitted to the external
//! image API: it keeps a write-through registry of in-flight jobs in a
//! persisted key-value slot, polls the remote status endpoint, estimates
//! progress, and reconciles completion against the hosted result table.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
