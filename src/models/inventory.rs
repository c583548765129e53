//! Inventory snapshot: every rack, device, and reservation known to the store.
//!
//! The inventory is the on-disk format of [`crate::store::MemoryStore`]. It is
//! a single JSON document so a whole toggle can be persisted with one atomic
//! rename.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{Device, Rack, RackId, Reservation};

/// All racks with their devices and reservations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    /// Racks
    #[serde(default)]
    pub racks: Vec<Rack>,
    /// Devices, mounted or not
    #[serde(default)]
    pub devices: Vec<Device>,
    /// Unit reservations
    #[serde(default)]
    pub reservations: Vec<Reservation>,
}

impl Inventory {
    /// Loads an inventory from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read inventory file: {}", path.display()))?;

        let inventory: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse inventory file: {}", path.display()))?;

        inventory.validate()?;
        Ok(inventory)
    }

    /// Writes the inventory as pretty JSON using a temp file + rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create inventory directory: {}", parent.display())
            })?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize inventory")?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content).with_context(|| {
            format!("Failed to write temp inventory file: {}", temp_path.display())
        })?;

        fs::rename(&temp_path, path).with_context(|| {
            format!("Failed to rename temp inventory file to: {}", path.display())
        })?;

        Ok(())
    }

    /// Checks referential integrity and primary key uniqueness.
    ///
    /// Spans are deliberately not checked here: out-of-range placements are
    /// legal to store and are reported by the toggle validation pass instead.
    pub fn validate(&self) -> Result<()> {
        let mut rack_ids = std::collections::BTreeSet::new();
        for rack in &self.racks {
            if !rack_ids.insert(rack.id) {
                anyhow::bail!("Duplicate rack id {}", rack.id);
            }
        }

        let mut device_ids = std::collections::BTreeSet::new();
        for device in &self.devices {
            if !device_ids.insert(device.id) {
                anyhow::bail!("Duplicate device id {}", device.id);
            }
            if !rack_ids.contains(&device.rack_id) {
                anyhow::bail!(
                    "Device {} references unknown rack {}",
                    device.id,
                    device.rack_id
                );
            }
        }

        let mut reservation_ids = std::collections::BTreeSet::new();
        for reservation in &self.reservations {
            if !reservation_ids.insert(reservation.id) {
                anyhow::bail!("Duplicate reservation id {}", reservation.id);
            }
            if !rack_ids.contains(&reservation.rack_id) {
                anyhow::bail!(
                    "Reservation {} references unknown rack {}",
                    reservation.id,
                    reservation.rack_id
                );
            }
        }

        Ok(())
    }

    /// Finds a rack by id.
    #[must_use]
    pub fn rack(&self, id: RackId) -> Option<&Rack> {
        self.racks.iter().find(|r| r.id == id)
    }

    /// Devices belonging to a rack, ascending by id.
    #[must_use]
    pub fn devices_in(&self, rack_id: RackId) -> Vec<&Device> {
        let mut devices: Vec<&Device> =
            self.devices.iter().filter(|d| d.rack_id == rack_id).collect();
        devices.sort_by_key(|d| d.id);
        devices
    }

    /// Reservations belonging to a rack, ascending by id.
    #[must_use]
    pub fn reservations_in(&self, rack_id: RackId) -> Vec<&Reservation> {
        let mut reservations: Vec<&Reservation> = self
            .reservations
            .iter()
            .filter(|r| r.rack_id == rack_id)
            .collect();
        reservations.sort_by_key(|r| r.id);
        reservations
    }
}
