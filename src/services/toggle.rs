//! Rack unit-order toggle.
//!
//! Flips a rack between ascending and descending unit numbering while
//! keeping every mounted device and every reservation at the same physical
//! height. The whole rack is handled in one transaction:
//!
//! ```text
//! Idle -> Validating -> Computing -> Committing -> Committed
//!            |                           |
//!            +--------> Aborted <--------+
//! ```
//!
//! - Permissions are checked before any lock is taken, then re-checked on
//!   the locked rows
//! - Locks: rack row, then mounted devices by id, then reservations by id
//! - Every span is validated before anything is written; one bad span
//!   aborts the whole toggle
//! - Device positions are cleared before the remapped ones are written, so
//!   the per-unit placement constraint never sees two devices on one unit

use serde::Serialize;
use tracing::{debug, info, warn};

use super::remap::{checked_remap_position, is_valid_span, remap_position};
use crate::auth::{Authorizer, ObjectKind, Resource, Subject};
use crate::models::{Device, DeviceId, Rack, RackId, Reservation, ReservationId, UnitOrder};
use crate::store::{RackStore, RowKey, StoreError, Transaction};

/// Message shown when the rack holds an out-of-range span.
pub const VALIDATION_FAILURE_MESSAGE: &str =
    "Cannot switch rack unit order: one or more mounted objects fall outside the rack's unit range.";

/// Coordinator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    /// Nothing locked yet
    Idle,
    /// Rows locked, spans being checked
    Validating,
    /// Computing remapped positions
    Computing,
    /// Writing inside the transaction
    Committing,
    /// Transaction committed
    Committed,
    /// Transaction rolled back
    Aborted,
}

impl std::fmt::Display for ToggleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Validating => write!(f, "validating"),
            Self::Computing => write!(f, "computing"),
            Self::Committing => write!(f, "committing"),
            Self::Committed => write!(f, "committed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// A device span or reservation unit that does not fit its rack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpanViolation {
    /// Offending row
    pub row: RowKey,
    /// Device name or reservation description
    pub name: String,
    /// Lowest occupied unit
    pub position: i64,
    /// Units occupied (1 for reservation units)
    pub height: i64,
    /// Rack's first unit
    pub rack_bottom: i64,
    /// Rack's last unit
    pub rack_top: i64,
}

impl std::fmt::Display for SpanViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}) at U{} with height {} is outside U{}-U{}",
            self.row, self.name, self.position, self.height, self.rack_bottom, self.rack_top
        )
    }
}

/// Why a toggle did not happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleError {
    /// No rack with this id.
    RackNotFound(RackId),
    /// The caller lacks one or more rights. Nothing was locked or written.
    Forbidden {
        /// Human readable list of missing rights
        missing: Vec<String>,
    },
    /// Some span lies outside the rack. Nothing was written.
    Validation {
        /// Rack display name
        rack: String,
        /// Every violation found
        violations: Vec<SpanViolation>,
    },
    /// The storage layer failed; the transaction was rolled back.
    Storage(StoreError),
}

impl ToggleError {
    /// Message suitable for the rack detail view.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { .. } => VALIDATION_FAILURE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl std::fmt::Display for ToggleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RackNotFound(id) => write!(f, "rack #{id} not found"),
            Self::Forbidden { missing } => {
                write!(f, "permission denied, missing: {}", missing.join("; "))
            }
            Self::Validation { rack, violations } => write!(
                f,
                "cannot switch unit order of {rack}: {} span(s) outside the rack's unit range",
                violations.len()
            ),
            Self::Storage(e) => write!(f, "unit order switch failed: {e}"),
        }
    }
}

impl std::error::Error for ToggleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for ToggleError {
    fn from(e: StoreError) -> Self {
        Self::Storage(e)
    }
}

/// Result of a committed toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleOutcome {
    /// Rack id
    pub rack_id: RackId,
    /// Rack display name
    pub rack_name: String,
    /// Direction after the toggle
    pub unit_order: UnitOrder,
    /// Mounted devices whose position was rewritten
    pub devices_changed: usize,
    /// Reservations whose units were rewritten
    pub reservations_changed: usize,
}

impl ToggleOutcome {
    /// Success message for the rack detail view.
    #[must_use]
    pub fn message(&self) -> String {
        format!(
            "Switched {} to {} units while preserving layout for {} devices and {} reservations.",
            self.rack_name, self.unit_order, self.devices_changed, self.reservations_changed
        )
    }
}

/// New positions and unit lists for one rack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapPlan {
    /// `(device, new position)` ascending by device id
    pub devices: Vec<(DeviceId, i64)>,
    /// `(reservation, new sorted units)` ascending by reservation id
    pub reservations: Vec<(ReservationId, Vec<i64>)>,
}

/// Whether a span fits the rack and its mirrored position can be stored.
fn fits(position: i64, height: i64, start: i64, u_height: i64) -> bool {
    is_valid_span(position, height, start, u_height)
        && checked_remap_position(position, height, start, u_height).is_some()
}

/// Checks every mounted device span and every reservation unit against the
/// rack. Collects all violations instead of stopping at the first.
pub fn validate_spans(
    rack: &Rack,
    devices: &[Device],
    reservations: &[Reservation],
) -> Vec<SpanViolation> {
    let start = rack.effective_starting_unit();
    let violation = |row, name: &str, position, height| SpanViolation {
        row,
        name: name.to_string(),
        position,
        height,
        rack_bottom: start,
        rack_top: rack.top_unit(),
    };

    let mut violations = Vec::new();

    for device in devices {
        let Some(position) = device.position else {
            continue;
        };
        if !fits(position, device.height, start, rack.u_height) {
            violations.push(violation(
                RowKey::Device(device.id),
                &device.name,
                position,
                device.height,
            ));
        }
    }

    for reservation in reservations {
        for &unit in &reservation.units {
            if !fits(unit, 1, start, rack.u_height) {
                violations.push(violation(
                    RowKey::Reservation(reservation.id),
                    &reservation.description,
                    unit,
                    1,
                ));
            }
        }
    }

    violations
}

/// Computes remapped device positions and sorted reservation units.
///
/// Unmounted devices are skipped.
pub fn plan_remap(rack: &Rack, devices: &[Device], reservations: &[Reservation]) -> RemapPlan {
    let start = rack.effective_starting_unit();

    let devices = devices
        .iter()
        .filter_map(|d| {
            d.position
                .map(|p| (d.id, remap_position(p, d.height, start, rack.u_height)))
        })
        .collect();

    let reservations = reservations
        .iter()
        .map(|r| {
            let mut units: Vec<i64> = r
                .units
                .iter()
                .map(|&u| remap_position(u, 1, start, rack.u_height))
                .collect();
            units.sort_unstable();
            (r.id, units)
        })
        .collect();

    RemapPlan {
        devices,
        reservations,
    }
}

/// Lists every right the subject is missing to toggle this rack.
///
/// `devices` should contain only mounted devices.
pub fn missing_permissions(
    authorizer: &dyn Authorizer,
    subject: &Subject,
    rack: &Rack,
    devices: &[Device],
    reservations: &[Reservation],
) -> Vec<String> {
    let mut missing = Vec::new();

    if !authorizer.can_view(subject, Resource::Rack(rack)) {
        missing.push("view rack on this rack".to_string());
    }
    if !authorizer.can_modify(subject, Resource::Rack(rack)) {
        missing.push("change rack on this rack".to_string());
    }

    if !authorizer.can_modify(subject, Resource::Kind(ObjectKind::Device)) {
        missing.push("change device".to_string());
    } else {
        let blocked = devices
            .iter()
            .filter(|d| !authorizer.can_modify(subject, Resource::Device(d)))
            .count();
        if blocked > 0 {
            missing.push(format!("change device on {blocked} mounted device(s)"));
        }
    }

    if !authorizer.can_modify(subject, Resource::Kind(ObjectKind::Reservation)) {
        missing.push("change reservation".to_string());
    } else {
        let blocked = reservations
            .iter()
            .filter(|r| !authorizer.can_modify(subject, Resource::Reservation(r)))
            .count();
        if blocked > 0 {
            missing.push(format!("change reservation on {blocked} reservation(s)"));
        }
    }

    missing
}

/// Runs unit-order toggles against a store.
pub struct ToggleCoordinator<'a> {
    store: &'a dyn RackStore,
    authorizer: &'a dyn Authorizer,
}

impl<'a> ToggleCoordinator<'a> {
    /// Creates a coordinator.
    pub fn new(store: &'a dyn RackStore, authorizer: &'a dyn Authorizer) -> Self {
        Self { store, authorizer }
    }

    /// Reports every out-of-range span of a rack without locking or writing.
    pub fn check(&self, rack_id: RackId) -> Result<Vec<SpanViolation>, ToggleError> {
        let rack = self
            .store
            .rack(rack_id)?
            .ok_or(ToggleError::RackNotFound(rack_id))?;
        let devices = self.store.devices(rack_id)?;
        let reservations = self.store.reservations(rack_id)?;
        Ok(validate_spans(&rack, &devices, &reservations))
    }

    /// Flips the rack's unit order, remapping everything mounted in it.
    pub fn toggle(&self, rack_id: RackId, subject: &Subject) -> Result<ToggleOutcome, ToggleError> {
        // Authorization on committed rows, before any lock.
        let rack = self
            .store
            .rack(rack_id)?
            .ok_or(ToggleError::RackNotFound(rack_id))?;
        let devices: Vec<Device> = self
            .store
            .devices(rack_id)?
            .into_iter()
            .filter(Device::is_mounted)
            .collect();
        let reservations = self.store.reservations(rack_id)?;
        self.authorize(subject, &rack, &devices, &reservations)?;

        let mut tx = self.store.begin()?;
        enter(rack_id, ToggleState::Validating);

        let Some(rack) = tx.lock_rack(rack_id)? else {
            tx.rollback();
            enter(rack_id, ToggleState::Aborted);
            return Err(ToggleError::RackNotFound(rack_id));
        };
        let devices = tx.lock_mounted_devices(rack_id)?;
        let reservations = tx.lock_reservations(rack_id)?;

        // Rows may have appeared between the pre-check and the locks.
        if let Err(e) = self.authorize(subject, &rack, &devices, &reservations) {
            tx.rollback();
            enter(rack_id, ToggleState::Aborted);
            return Err(e);
        }

        let violations = validate_spans(&rack, &devices, &reservations);
        if !violations.is_empty() {
            tx.rollback();
            enter(rack_id, ToggleState::Aborted);
            for violation in &violations {
                debug!("Rack {} span violation: {}", rack_id, violation);
            }
            warn!(
                "Rejected unit order switch for rack {}: {} span(s) out of range",
                rack_id,
                violations.len()
            );
            return Err(ToggleError::Validation {
                rack: rack.name,
                violations,
            });
        }

        enter(rack_id, ToggleState::Computing);
        let plan = plan_remap(&rack, &devices, &reservations);

        enter(rack_id, ToggleState::Committing);
        let target_desc_units = !rack.desc_units;
        let written = write_plan(tx.as_mut(), &rack, &plan, target_desc_units)
            .and_then(|()| tx.commit());
        if let Err(e) = written {
            enter(rack_id, ToggleState::Aborted);
            warn!("Unit order switch for rack {} rolled back: {}", rack_id, e);
            return Err(ToggleError::Storage(e));
        }
        enter(rack_id, ToggleState::Committed);

        let outcome = ToggleOutcome {
            rack_id,
            rack_name: rack.name,
            unit_order: UnitOrder::from_desc_units(target_desc_units),
            devices_changed: plan.devices.len(),
            reservations_changed: plan.reservations.len(),
        };
        info!("{}", outcome.message());
        Ok(outcome)
    }

    fn authorize(
        &self,
        subject: &Subject,
        rack: &Rack,
        devices: &[Device],
        reservations: &[Reservation],
    ) -> Result<(), ToggleError> {
        let missing = missing_permissions(self.authorizer, subject, rack, devices, reservations);
        if missing.is_empty() {
            Ok(())
        } else {
            warn!(
                "User {} may not switch unit order of rack {}: {}",
                subject.username,
                rack.id,
                missing.join("; ")
            );
            Err(ToggleError::Forbidden { missing })
        }
    }
}

fn enter(rack_id: RackId, state: ToggleState) {
    debug!("Rack {} toggle: {}", rack_id, state);
}

/// Clear, set, reservations, flag. Each row is snapshotted before its first write.
fn write_plan(
    tx: &mut dyn Transaction,
    rack: &Rack,
    plan: &RemapPlan,
    target_desc_units: bool,
) -> Result<(), StoreError> {
    for (id, _) in &plan.devices {
        tx.snapshot(RowKey::Device(*id))?;
        tx.set_device_position(*id, None)?;
    }
    for (id, position) in &plan.devices {
        tx.set_device_position(*id, Some(*position))?;
    }

    for (id, units) in &plan.reservations {
        tx.snapshot(RowKey::Reservation(*id))?;
        tx.set_reservation_units(*id, units.clone())?;
    }

    tx.snapshot(RowKey::Rack(rack.id))?;
    tx.set_desc_units(rack.id, target_desc_units)?;
    Ok(())
}
