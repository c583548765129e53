//! Unit reservations.

use serde::{Deserialize, Serialize};

use super::RackId;

/// Primary key of a reservation.
pub type ReservationId = u64;

/// A set of individual rack units held for some purpose.
///
/// Order of `units` carries no meaning; it is stored ascending after any
/// mutation made by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Primary key.
    pub id: ReservationId,
    /// Rack this reservation belongs to.
    pub rack_id: RackId,
    /// Reserved unit labels.
    pub units: Vec<i64>,
    /// Free text description.
    #[serde(default)]
    pub description: String,
    /// User who made the reservation.
    #[serde(default)]
    pub user: String,
}

impl Reservation {
    /// Creates a reservation.
    pub fn new(
        id: ReservationId,
        rack_id: RackId,
        units: Vec<i64>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id,
            rack_id,
            units,
            description: description.into(),
            user: String::new(),
        }
    }
}

impl std::fmt::Display for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.description.is_empty() {
            write!(f, "reservation #{}", self.id)
        } else {
            write!(f, "{}", self.description)
        }
    }
}
