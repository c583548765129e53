//! Application-wide constants.
//!
//! This module defines constants used throughout the application,
//! including the application name and directory names.

/// The display name of the application (human-readable, with proper capitalization).
pub const APP_NAME: &str = "Rack Inverter";

/// The binary name of the application (used in command examples, lowercase with hyphens).
pub const APP_BINARY_NAME: &str = "rack-inverter";

/// Directory under the platform config directory holding config and inventory.
pub const APP_DIR_NAME: &str = "RackInverter";

/// Header carrying the authenticated user name from the fronting proxy.
pub const REMOTE_USER_HEADER: &str = "x-remote-user";
