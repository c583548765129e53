//! Shared test fixtures for integration tests.
#![allow(dead_code)] // Not every test binary uses every fixture

use std::fs;
use std::path::{Path, PathBuf};

use rack_inverter::auth::{Action, Constraint, Grant, GrantTable, ObjectKind, UserGrants};
use rack_inverter::config::Config;
use rack_inverter::models::{Device, Inventory, Rack, Reservation};
use tempfile::TempDir;

/// User with every right.
pub const ADMIN: &str = "admin";
/// User with unconstrained view/change on racks, devices, and reservations.
pub const OPERATOR: &str = "ops";
/// User with view rights only.
pub const VIEWER: &str = "viewer";

/// Full view/change grants on all three kinds.
pub fn full_grants() -> Vec<Grant> {
    [ObjectKind::Rack, ObjectKind::Device, ObjectKind::Reservation]
        .into_iter()
        .map(|kind| Grant::new(kind, &[Action::View, Action::Change]))
        .collect()
}

/// Grant list for a user.
pub fn user(name: &str, grants: Vec<Grant>) -> UserGrants {
    UserGrants {
        name: name.to_string(),
        superuser: false,
        grants,
    }
}

/// Superuser, operator, and viewer.
pub fn test_users() -> Vec<UserGrants> {
    vec![
        UserGrants {
            name: ADMIN.to_string(),
            superuser: true,
            grants: vec![],
        },
        user(OPERATOR, full_grants()),
        user(
            VIEWER,
            vec![
                Grant::new(ObjectKind::Rack, &[Action::View]),
                Grant::new(ObjectKind::Device, &[Action::View]),
                Grant::new(ObjectKind::Reservation, &[Action::View]),
            ],
        ),
    ]
}

/// Permission table for [`test_users`].
pub fn test_grants() -> GrantTable {
    GrantTable::new(test_users())
}

/// Operator grants with one kind's change right limited to `names`.
pub fn constrained_grants(kind: ObjectKind, names: &[&str]) -> Vec<Grant> {
    full_grants()
        .into_iter()
        .map(|grant| {
            if grant.kind == kind {
                Grant::new(kind, &[Action::View, Action::Change]).constrained(Constraint {
                    ids: None,
                    names: Some(names.iter().map(ToString::to_string).collect()),
                })
            } else {
                grant
            }
        })
        .collect()
}

/// Operator grants without one action on one kind.
pub fn grants_without(kind: ObjectKind, action: Action) -> Vec<Grant> {
    full_grants()
        .into_iter()
        .map(|mut grant| {
            if grant.kind == kind {
                grant.actions.retain(|a| *a != action);
            }
            grant
        })
        .filter(|grant| !grant.actions.is_empty())
        .collect()
}

/// One 42U rack with a mix of 1U, 2U, and 4U devices, an unmounted device
/// and a reservation, plus a second 10U rack.
///
/// Rack 1 `rack-a` (ascending, 42U):
/// - device 1 `server-1` 2U at U1
/// - device 2 `switch-1` 1U at U42
/// - device 3 `storage-1` 4U at U10
/// - device 4 `spare-psu` unmounted, with an asset tag custom field
/// - reservation 1 `future expansion` units [20, 21]
///
/// Rack 2 `rack-b` (ascending, 10U):
/// - device 5 `other` 1U at U3
/// - reservation 2 `rack-b hold` units [5]
pub fn test_inventory() -> Inventory {
    let mut spare = Device::new(4, 1, "spare-psu", 1, None);
    spare
        .custom_fields
        .insert("asset_tag".to_string(), serde_json::json!("PSU-0042"));

    let mut reservation = Reservation::new(1, 1, vec![20, 21], "future expansion");
    reservation.user = "planner".to_string();

    Inventory {
        racks: vec![Rack::new(1, "rack-a", 42), Rack::new(2, "rack-b", 10)],
        devices: vec![
            Device::new(1, 1, "server-1", 2, Some(1)),
            Device::new(2, 1, "switch-1", 1, Some(42)),
            Device::new(3, 1, "storage-1", 4, Some(10)),
            spare,
            Device::new(5, 2, "other", 1, Some(3)),
        ],
        reservations: vec![
            reservation,
            Reservation::new(2, 2, vec![5], "rack-b hold"),
        ],
    }
}

/// Writes `inventory` as JSON into a fresh temp dir.
pub fn write_inventory_file(inventory: &Inventory) -> (PathBuf, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("inventory.json");
    inventory.save(&path).expect("Failed to write inventory");
    (path, temp_dir)
}

/// Writes a config holding [`test_users`] into `dir`.
pub fn write_config_file(dir: &Path, inventory_path: &Path) -> PathBuf {
    let mut config = Config::new();
    config.storage.inventory_path = Some(inventory_path.to_path_buf());
    config.storage.lock_timeout_ms = 1_000;
    config.users = test_users();

    let path = dir.join("config.toml");
    config.save_to(&path).expect("Failed to write config");
    path
}

/// Reads an inventory file back.
pub fn read_inventory_file(path: &Path) -> Inventory {
    let content = fs::read_to_string(path).expect("Failed to read inventory");
    serde_json::from_str(&content).expect("Failed to parse inventory")
}
