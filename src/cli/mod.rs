//! CLI command handlers for Rack Inverter.
//!
//! This module provides headless, scriptable access to the toggle and the
//! span check for automation and maintenance scripts.

pub mod check;
pub mod common;
#[cfg(feature = "web")]
pub mod serve;
pub mod toggle;

// Re-export types used by main.rs and tests
pub use check::CheckArgs;
pub use common::{StoreArgs, EXIT_FAILURE, EXIT_REJECTED, EXIT_SUCCESS};
#[cfg(feature = "web")]
pub use serve::ServeArgs;
pub use toggle::ToggleArgs;
