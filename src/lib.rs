//! Rack Inverter Library
//!
//! This library flips a rack's unit numbering between ascending and
//! descending while keeping every mounted device and unit reservation at
//! the same physical height. It provides the coordinate transform, the
//! transactional toggle, a row-locking inventory store, grant-based
//! permission checks, and an HTTP API.

// Module declarations
pub mod auth;
pub mod cli;
pub mod config;
pub mod constants;
pub mod models;
pub mod services;
pub mod store;
#[cfg(feature = "web")]
pub mod web;
