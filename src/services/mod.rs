//! Service layer for business logic.
//!
//! - [`remap`]: pure unit coordinate transform
//! - [`toggle`]: transactional unit-order toggle for a whole rack

pub mod remap;
pub mod toggle;

// Re-export commonly used types and functions
pub use remap::{is_valid_span, remap_position};
pub use toggle::{
    SpanViolation, ToggleCoordinator, ToggleError, ToggleOutcome, ToggleState,
    VALIDATION_FAILURE_MESSAGE,
};
