//! In-memory store with row-level locks and optional JSON persistence.
//!
//! ## Design
//!
//! - Committed data lives behind one `RwLock<Inventory>`
//! - Row locks live in a separate lock table guarded by a `Mutex` + `Condvar`,
//!   so waiting for a row never blocks plain readers
//! - Writes are staged in the transaction and checked against the committed
//!   data overlaid with the transaction's own earlier writes
//! - Commit builds the next inventory, persists it (if a path is set), then
//!   swaps it in; a persistence failure leaves the committed data untouched
//!
//! ## Sharing the inventory file
//!
//! Several processes may open the same file. Each transaction reloads the
//! file when it begins, and reads pick up a changed file. Commit takes an
//! exclusive OS lock on `<file>.lock`, re-reads the file, and applies its
//! writes on top of what is on disk. If a row this transaction locked was
//! changed on disk since it was read, the commit fails with
//! [`StoreError::Conflict`] instead of overwriting it.
//!
//! ## Placement constraint
//!
//! Two mounted devices on the same face of the same rack may not share a
//! unit. The check runs on every position write, which is why moving a whole
//! rack's devices has to clear all positions before setting new ones.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{
    Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{RackStore, RowKey, StoreError, Transaction};
use crate::models::{Device, DeviceId, Inventory, Rack, RackId, Reservation, ReservationId};

/// Default time a transaction waits for a row lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// One row change, recorded at commit.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeRecord {
    /// Unique record identifier.
    pub id: Uuid,
    /// Transaction that made the change.
    pub transaction_id: Uuid,
    /// Commit time.
    pub time: DateTime<Utc>,
    /// Changed row.
    pub row: RowKey,
    /// Row state captured by [`Transaction::snapshot`].
    pub prechange: serde_json::Value,
    /// Row state after commit.
    pub postchange: serde_json::Value,
}

/// Exclusive row locks owned by transaction ids.
#[derive(Default)]
struct LockTable {
    held: Mutex<HashMap<RowKey, Uuid>>,
    released: Condvar,
}

impl LockTable {
    /// Blocks until `row` is free or owned by `owner`, or the timeout expires.
    fn acquire(&self, row: RowKey, owner: Uuid, timeout: Duration) -> Result<(), StoreError> {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            match held.get(&row).copied() {
                None => {
                    held.insert(row, owner);
                    return Ok(());
                }
                Some(current) if current == owner => return Ok(()),
                Some(_) => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(StoreError::LockTimeout {
                    row,
                    waited_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                });
            }

            let (guard, _) = self
                .released
                .wait_timeout(held, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            held = guard;
        }
    }

    fn release_all(&self, owner: Uuid) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.retain(|_, current| *current != owner);
        drop(held);
        self.released.notify_all();
    }
}

/// Modification time and length of the inventory file when last read.
type DiskStamp = (Option<SystemTime>, u64);

fn disk_stamp(path: &Path) -> Option<DiskStamp> {
    fs::metadata(path)
        .ok()
        .map(|meta| (meta.modified().ok(), meta.len()))
}

/// Loads the inventory file, or `None` if there is none yet.
fn load_disk(path: &Path) -> Result<Option<Inventory>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    Inventory::load(path)
        .map(Some)
        .map_err(|e| StoreError::Io(format!("{e:#}")))
}

fn lock_file_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("inventory"));
    name.push(".lock");
    path.with_file_name(name)
}

/// Takes the cross-process commit lock. Released when the file is dropped.
fn lock_inventory_file(path: &Path) -> Result<File, StoreError> {
    let lock_path = lock_file_path(path);
    let io_err = |e: std::io::Error| {
        StoreError::Io(format!("Failed to lock {}: {e}", lock_path.display()))
    };

    if let Some(dir) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(io_err)?;
    file.lock_exclusive().map_err(io_err)?;
    Ok(file)
}

/// Thread-safe in-memory implementation of [`RackStore`].
pub struct MemoryStore {
    data: RwLock<Inventory>,
    locks: LockTable,
    history: Mutex<Vec<ChangeRecord>>,
    inventory_path: Option<PathBuf>,
    disk_stamp: Mutex<Option<DiskStamp>>,
    lock_timeout: Duration,
}

impl MemoryStore {
    /// Creates a store holding `inventory`, without persistence.
    pub fn new(inventory: Inventory) -> Self {
        Self {
            data: RwLock::new(inventory),
            locks: LockTable::default(),
            history: Mutex::new(Vec::new()),
            inventory_path: None,
            disk_stamp: Mutex::new(None),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Opens a store backed by an inventory file.
    ///
    /// A missing file starts an empty inventory; it is created on the first
    /// commit.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let inventory = if path.exists() {
            Inventory::load(path)?
        } else {
            warn!(
                "Inventory file {} not found, starting with an empty inventory",
                path.display()
            );
            Inventory::default()
        };

        Ok(Self::new(inventory).with_persistence(path.to_path_buf()))
    }

    /// Persists every commit to `path`.
    #[must_use]
    pub fn with_persistence(mut self, path: PathBuf) -> Self {
        *self.stamp() = disk_stamp(&path);
        self.inventory_path = Some(path);
        self
    }

    /// Sets how long a transaction waits for a row lock.
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Returns a copy of the committed inventory.
    pub fn inventory(&self) -> Inventory {
        self.read().clone()
    }

    /// Returns every change record committed so far, oldest first.
    pub fn change_log(&self) -> Vec<ChangeRecord> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Overwrites a device position directly, bypassing locks and constraints.
    ///
    /// Mirrors a raw bulk update in the host database; used to seed
    /// inconsistent data. The change is not written to the inventory file,
    /// and a persisted store drops it on the next reload.
    pub fn update_device_position_unchecked(
        &self,
        id: DeviceId,
        position: Option<i64>,
    ) -> Result<(), StoreError> {
        let mut data = self.write();
        let device = data
            .devices
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(StoreError::NotFound(RowKey::Device(id)))?;
        device.position = position;
        Ok(())
    }

    /// Overwrites reservation units directly, bypassing locks and constraints.
    pub fn update_reservation_units_unchecked(
        &self,
        id: ReservationId,
        units: Vec<i64>,
    ) -> Result<(), StoreError> {
        let mut data = self.write();
        let reservation = data
            .reservations
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound(RowKey::Reservation(id)))?;
        reservation.units = units;
        Ok(())
    }

    /// Reloads the inventory file if another process changed it.
    ///
    /// With `force`, reloads even when the file looks unchanged.
    fn refresh(&self, force: bool) -> Result<(), StoreError> {
        let Some(path) = &self.inventory_path else {
            return Ok(());
        };
        if !force && disk_stamp(path) == *self.stamp() {
            return Ok(());
        }

        let mut data = self.write();
        let stamp = disk_stamp(path);
        if let Some(inventory) = load_disk(path)? {
            if *data != inventory {
                debug!("Reloaded changed inventory from {}", path.display());
            }
            *data = inventory;
        }
        *self.stamp() = stamp;
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Inventory> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inventory> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn stamp(&self) -> MutexGuard<'_, Option<DiskStamp>> {
        self.disk_stamp.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RackStore for MemoryStore {
    fn rack(&self, id: RackId) -> Result<Option<Rack>, StoreError> {
        self.refresh(false)?;
        Ok(self.read().rack(id).cloned())
    }

    fn devices(&self, rack_id: RackId) -> Result<Vec<Device>, StoreError> {
        self.refresh(false)?;
        Ok(self.read().devices_in(rack_id).into_iter().cloned().collect())
    }

    fn reservations(&self, rack_id: RackId) -> Result<Vec<Reservation>, StoreError> {
        self.refresh(false)?;
        Ok(self
            .read()
            .reservations_in(rack_id)
            .into_iter()
            .cloned()
            .collect())
    }

    fn begin(&self) -> Result<Box<dyn Transaction + '_>, StoreError> {
        self.refresh(true)?;
        let tx = MemoryTransaction::new(self);
        debug!("Transaction {} started", tx.id);
        Ok(Box::new(tx))
    }
}

/// Transaction over a [`MemoryStore`].
struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    id: Uuid,
    locked: BTreeSet<RowKey>,
    /// Committed state of each locked row when it was locked.
    seen: BTreeMap<RowKey, serde_json::Value>,
    positions: BTreeMap<DeviceId, Option<i64>>,
    units: BTreeMap<ReservationId, Vec<i64>>,
    flags: BTreeMap<RackId, bool>,
    snapshots: Vec<(RowKey, serde_json::Value)>,
}

impl<'a> MemoryTransaction<'a> {
    fn new(store: &'a MemoryStore) -> Self {
        Self {
            store,
            id: Uuid::new_v4(),
            locked: BTreeSet::new(),
            seen: BTreeMap::new(),
            positions: BTreeMap::new(),
            units: BTreeMap::new(),
            flags: BTreeMap::new(),
            snapshots: Vec::new(),
        }
    }

    fn lock(&mut self, row: RowKey) -> Result<(), StoreError> {
        self.store
            .locks
            .acquire(row, self.id, self.store.lock_timeout)?;
        if self.locked.insert(row) {
            let value = row_value(&self.store.read(), row);
            self.seen.insert(row, value);
        }
        Ok(())
    }

    /// First locked row whose state in `inventory` differs from what this
    /// transaction read.
    fn first_stale_row(&self, inventory: &Inventory) -> Option<RowKey> {
        self.seen
            .iter()
            .find(|&(row, value)| row_value(inventory, *row) != *value)
            .map(|(row, _)| *row)
    }

    fn ensure_locked(&self, row: RowKey) -> Result<(), StoreError> {
        if self.locked.contains(&row) {
            Ok(())
        } else {
            Err(StoreError::NotLocked(row))
        }
    }

    /// Device as seen by this transaction.
    fn device_view(&self, device: &Device) -> Device {
        let mut device = device.clone();
        if let Some(position) = self.positions.get(&device.id) {
            device.position = *position;
        }
        device
    }

    fn reservation_view(&self, reservation: &Reservation) -> Reservation {
        let mut reservation = reservation.clone();
        if let Some(units) = self.units.get(&reservation.id) {
            reservation.units.clone_from(units);
        }
        reservation
    }

    fn rack_view(&self, rack: &Rack) -> Rack {
        let mut rack = rack.clone();
        if let Some(desc_units) = self.flags.get(&rack.id) {
            rack.desc_units = *desc_units;
        }
        rack
    }

    /// Writes the staged changes into `inventory`.
    fn apply(&self, inventory: &mut Inventory) {
        for device in &mut inventory.devices {
            if let Some(position) = self.positions.get(&device.id) {
                device.position = *position;
            }
        }
        for reservation in &mut inventory.reservations {
            if let Some(units) = self.units.get(&reservation.id) {
                reservation.units.clone_from(units);
            }
        }
        for rack in &mut inventory.racks {
            if let Some(desc_units) = self.flags.get(&rack.id) {
                rack.desc_units = *desc_units;
            }
        }
    }
}

/// Serialized state of a row, or `null` if it does not exist.
fn row_value(inventory: &Inventory, row: RowKey) -> serde_json::Value {
    let value = match row {
        RowKey::Rack(id) => inventory.rack(id).map(serde_json::to_value),
        RowKey::Device(id) => inventory
            .devices
            .iter()
            .find(|d| d.id == id)
            .map(serde_json::to_value),
        RowKey::Reservation(id) => inventory
            .reservations
            .iter()
            .find(|r| r.id == id)
            .map(serde_json::to_value),
    };
    value
        .and_then(Result::ok)
        .unwrap_or(serde_json::Value::Null)
}

impl Transaction for MemoryTransaction<'_> {
    fn lock_rack(&mut self, id: RackId) -> Result<Option<Rack>, StoreError> {
        self.lock(RowKey::Rack(id))?;
        let data = self.store.read();
        Ok(data.rack(id).map(|rack| self.rack_view(rack)))
    }

    fn lock_mounted_devices(&mut self, rack_id: RackId) -> Result<Vec<Device>, StoreError> {
        let candidates: Vec<DeviceId> = {
            let data = self.store.read();
            data.devices_in(rack_id)
                .into_iter()
                .map(|d| self.device_view(d))
                .filter(Device::is_mounted)
                .map(|d| d.id)
                .collect()
        };

        for id in &candidates {
            self.lock(RowKey::Device(*id))?;
        }

        // Re-read under lock; rows may have changed while we waited.
        let data = self.store.read();
        Ok(data
            .devices_in(rack_id)
            .into_iter()
            .filter(|d| candidates.contains(&d.id))
            .map(|d| self.device_view(d))
            .filter(Device::is_mounted)
            .collect())
    }

    fn lock_reservations(&mut self, rack_id: RackId) -> Result<Vec<Reservation>, StoreError> {
        let candidates: Vec<ReservationId> = self
            .store
            .read()
            .reservations_in(rack_id)
            .into_iter()
            .map(|r| r.id)
            .collect();

        for id in &candidates {
            self.lock(RowKey::Reservation(*id))?;
        }

        let data = self.store.read();
        Ok(data
            .reservations_in(rack_id)
            .into_iter()
            .filter(|r| candidates.contains(&r.id))
            .map(|r| self.reservation_view(r))
            .collect())
    }

    fn snapshot(&mut self, row: RowKey) -> Result<(), StoreError> {
        self.ensure_locked(row)?;
        if self.snapshots.iter().any(|(r, _)| *r == row) {
            return Ok(());
        }

        let mut view = self.store.read().clone();
        self.apply(&mut view);
        let value = row_value(&view, row);
        if value.is_null() {
            return Err(StoreError::NotFound(row));
        }
        self.snapshots.push((row, value));
        Ok(())
    }

    fn set_device_position(
        &mut self,
        id: DeviceId,
        position: Option<i64>,
    ) -> Result<(), StoreError> {
        let row = RowKey::Device(id);
        self.ensure_locked(row)?;

        {
            let data = self.store.read();
            let device = data
                .devices
                .iter()
                .find(|d| d.id == id)
                .ok_or(StoreError::NotFound(row))?;

            if let Some(new_bottom) = position {
                let new_top = new_bottom.saturating_add(device.height.max(1) - 1);
                let conflict = data
                    .devices
                    .iter()
                    .filter(|other| {
                        other.id != id && other.rack_id == device.rack_id && other.face == device.face
                    })
                    .map(|other| self.device_view(other))
                    .find(|other| {
                        other
                            .occupied_units()
                            .is_some_and(|(bottom, top)| bottom <= new_top && new_bottom <= top)
                    });

                if let Some(other) = conflict {
                    return Err(StoreError::Constraint(format!(
                        "U{new_bottom} on rack #{} is already occupied by device {} (#{})",
                        device.rack_id, other.name, other.id
                    )));
                }
            }
        }

        self.positions.insert(id, position);
        Ok(())
    }

    fn set_reservation_units(
        &mut self,
        id: ReservationId,
        units: Vec<i64>,
    ) -> Result<(), StoreError> {
        let row = RowKey::Reservation(id);
        self.ensure_locked(row)?;
        if !self.store.read().reservations.iter().any(|r| r.id == id) {
            return Err(StoreError::NotFound(row));
        }
        self.units.insert(id, units);
        Ok(())
    }

    fn set_desc_units(&mut self, id: RackId, desc_units: bool) -> Result<(), StoreError> {
        let row = RowKey::Rack(id);
        self.ensure_locked(row)?;
        if self.store.read().rack(id).is_none() {
            return Err(StoreError::NotFound(row));
        }
        self.flags.insert(id, desc_units);
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let mut data = self.store.write();

        // Held until the new file is in place.
        let mut file_lock = None;
        let mut next = match &self.store.inventory_path {
            Some(path) => {
                file_lock = Some(lock_inventory_file(path)?);
                match load_disk(path)? {
                    Some(disk) => {
                        if let Some(row) = self.first_stale_row(&disk) {
                            warn!(
                                "Transaction {} aborted: {} changed on disk since it was locked",
                                self.id, row
                            );
                            *data = disk;
                            *self.store.stamp() = disk_stamp(path);
                            return Err(StoreError::Conflict(row));
                        }
                        disk
                    }
                    None => data.clone(),
                }
            }
            None => data.clone(),
        };
        self.apply(&mut next);

        if let Some(path) = &self.store.inventory_path {
            next.save(path)
                .map_err(|e| StoreError::Io(format!("{e:#}")))?;
            *self.store.stamp() = disk_stamp(path);
        }

        let time = Utc::now();
        let records: Vec<ChangeRecord> = std::mem::take(&mut self.snapshots)
            .into_iter()
            .map(|(row, prechange)| ChangeRecord {
                id: Uuid::new_v4(),
                transaction_id: self.id,
                time,
                row,
                prechange,
                postchange: row_value(&next, row),
            })
            .collect();

        *data = next;
        drop(data);
        drop(file_lock);

        self.store
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(records);

        debug!("Transaction {} committed", self.id);
        Ok(())
    }

    fn rollback(self: Box<Self>) {
        debug!("Transaction {} rolled back", self.id);
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        self.store.locks.release_all(self.id);
    }
}
