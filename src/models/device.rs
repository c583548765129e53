//! Rack-mounted devices.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::RackId;

/// Primary key of a device.
pub type DeviceId = u64;

/// Which face of the rack a device is mounted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFace {
    /// Front of the rack
    #[default]
    Front,
    /// Rear of the rack
    Rear,
}

/// A device that may occupy a span of rack units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Primary key.
    pub id: DeviceId,
    /// Rack this device belongs to.
    pub rack_id: RackId,
    /// Display name.
    pub name: String,
    /// Lowest occupied unit. `None` means the device is not mounted.
    #[serde(default)]
    pub position: Option<i64>,
    /// Number of consecutive units occupied upward from `position`.
    pub height: i64,
    /// Mounting face.
    #[serde(default)]
    pub face: DeviceFace,
    /// Free-form custom field data carried along untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, serde_json::Value>,
}

impl Device {
    /// Creates a front-mounted device.
    pub fn new(
        id: DeviceId,
        rack_id: RackId,
        name: impl Into<String>,
        height: i64,
        position: Option<i64>,
    ) -> Self {
        Self {
            id,
            rack_id,
            name: name.into(),
            position,
            height,
            face: DeviceFace::Front,
            custom_fields: BTreeMap::new(),
        }
    }

    /// Sets the mounting face.
    #[must_use]
    pub const fn with_face(mut self, face: DeviceFace) -> Self {
        self.face = face;
        self
    }

    /// Whether the device has a recorded position.
    #[must_use]
    pub const fn is_mounted(&self) -> bool {
        self.position.is_some()
    }

    /// Inclusive unit range occupied by the device, if mounted.
    #[must_use]
    pub fn occupied_units(&self) -> Option<(i64, i64)> {
        self.position
            .map(|p| (p, p.saturating_add(self.height.max(1) - 1)))
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
