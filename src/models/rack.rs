//! Rack records and unit numbering direction.

use serde::{Deserialize, Serialize};

/// Primary key of a rack.
pub type RackId = u64;

/// Default first unit label when a rack has none stored.
pub const DEFAULT_STARTING_UNIT: i64 = 1;

/// Unit numbering direction of a rack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOrder {
    /// Unit 1 at the bottom.
    Ascending,
    /// Unit 1 at the top.
    Descending,
}

impl UnitOrder {
    /// Maps the stored `desc_units` flag to a direction.
    #[must_use]
    pub const fn from_desc_units(desc_units: bool) -> Self {
        if desc_units {
            Self::Descending
        } else {
            Self::Ascending
        }
    }
}

impl std::fmt::Display for UnitOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ascending => write!(f, "ascending"),
            Self::Descending => write!(f, "descending"),
        }
    }
}

/// A rack with a contiguous run of numbered units.
///
/// The unit interval is `[starting_unit, starting_unit + u_height - 1]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rack {
    /// Primary key.
    pub id: RackId,
    /// Display name.
    pub name: String,
    /// Label of the first unit. `None` means the default of 1.
    #[serde(default)]
    pub starting_unit: Option<i64>,
    /// Total number of units.
    pub u_height: i64,
    /// Whether units are numbered top-to-bottom.
    #[serde(default)]
    pub desc_units: bool,
}

impl Rack {
    /// Creates an ascending rack with the default starting unit.
    pub fn new(id: RackId, name: impl Into<String>, u_height: i64) -> Self {
        Self {
            id,
            name: name.into(),
            starting_unit: None,
            u_height,
            desc_units: false,
        }
    }

    /// Sets an explicit starting unit.
    #[must_use]
    pub const fn with_starting_unit(mut self, starting_unit: i64) -> Self {
        self.starting_unit = Some(starting_unit);
        self
    }

    /// Returns the starting unit, falling back to 1 when unset.
    #[must_use]
    pub fn effective_starting_unit(&self) -> i64 {
        self.starting_unit.unwrap_or(DEFAULT_STARTING_UNIT)
    }

    /// Returns the highest unit label in the rack, saturating at the `i64` bounds.
    #[must_use]
    pub fn top_unit(&self) -> i64 {
        crate::services::remap::top_unit(self.effective_starting_unit(), self.u_height)
    }

    /// Current numbering direction.
    #[must_use]
    pub const fn unit_order(&self) -> UnitOrder {
        UnitOrder::from_desc_units(self.desc_units)
    }
}

impl std::fmt::Display for Rack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
