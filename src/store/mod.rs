//! Storage interface for racks, devices, and reservations.
//!
//! The toggle coordinator only talks to storage through [`RackStore`] and
//! [`Transaction`]. A transaction offers select-for-update row locks, writes
//! that become visible to other readers only on commit, and a hook to
//! snapshot a row's prior state before it is changed.
//!
//! [`MemoryStore`] is the bundled implementation.

pub mod memory;

pub use memory::{ChangeRecord, MemoryStore};

use serde::Serialize;

use crate::models::{Device, DeviceId, Rack, RackId, Reservation, ReservationId};

/// Identifies a single lockable row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "table", content = "id", rename_all = "snake_case")]
pub enum RowKey {
    /// A rack row
    Rack(RackId),
    /// A device row
    Device(DeviceId),
    /// A reservation row
    Reservation(ReservationId),
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rack(id) => write!(f, "rack #{id}"),
            Self::Device(id) => write!(f, "device #{id}"),
            Self::Reservation(id) => write!(f, "reservation #{id}"),
        }
    }
}

/// Errors raised by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Gave up waiting for another transaction to release a row lock.
    LockTimeout {
        /// Row that could not be locked
        row: RowKey,
        /// How long the transaction waited
        waited_ms: u64,
    },
    /// A write would break a storage constraint.
    Constraint(String),
    /// A write referenced a row that does not exist.
    NotFound(RowKey),
    /// A write referenced a row the transaction has not locked.
    NotLocked(RowKey),
    /// A locked row was changed by another process sharing the inventory file.
    Conflict(RowKey),
    /// Reading or persisting the inventory file failed.
    Io(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LockTimeout { row, waited_ms } => {
                write!(f, "timed out after {waited_ms} ms waiting for lock on {row}")
            }
            Self::Constraint(msg) => write!(f, "constraint violation: {msg}"),
            Self::NotFound(row) => write!(f, "{row} does not exist"),
            Self::NotLocked(row) => write!(f, "{row} is not locked by this transaction"),
            Self::Conflict(row) => write!(f, "{row} was changed by another process"),
            Self::Io(msg) => write!(f, "inventory file error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Read access plus transaction entry point.
pub trait RackStore: Send + Sync {
    /// Reads a committed rack without locking it.
    fn rack(&self, id: RackId) -> Result<Option<Rack>, StoreError>;

    /// Reads every committed device of a rack, mounted or not, ascending by id.
    fn devices(&self, rack_id: RackId) -> Result<Vec<Device>, StoreError>;

    /// Reads every committed reservation of a rack, ascending by id.
    fn reservations(&self, rack_id: RackId) -> Result<Vec<Reservation>, StoreError>;

    /// Starts a transaction.
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, StoreError>;
}

/// A single atomic unit of work.
///
/// Dropping a transaction without calling [`Transaction::commit`] rolls it
/// back and releases its locks.
pub trait Transaction {
    /// Locks a rack row and returns its current state.
    fn lock_rack(&mut self, id: RackId) -> Result<Option<Rack>, StoreError>;

    /// Locks every device of the rack that has a position, in ascending id order.
    ///
    /// Unmounted devices are neither locked nor returned.
    fn lock_mounted_devices(&mut self, rack_id: RackId) -> Result<Vec<Device>, StoreError>;

    /// Locks every reservation of the rack, in ascending id order.
    fn lock_reservations(&mut self, rack_id: RackId) -> Result<Vec<Reservation>, StoreError>;

    /// Records the prior state of a locked row before it is changed.
    fn snapshot(&mut self, row: RowKey) -> Result<(), StoreError>;

    /// Sets or clears a locked device's position.
    fn set_device_position(
        &mut self,
        id: DeviceId,
        position: Option<i64>,
    ) -> Result<(), StoreError>;

    /// Replaces a locked reservation's units.
    fn set_reservation_units(
        &mut self,
        id: ReservationId,
        units: Vec<i64>,
    ) -> Result<(), StoreError>;

    /// Sets a locked rack's direction flag.
    fn set_desc_units(&mut self, id: RackId, desc_units: bool) -> Result<(), StoreError>;

    /// Makes every write visible at once and releases all locks.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discards every write and releases all locks.
    fn rollback(self: Box<Self>);
}
