//! Data models for racks, mounted devices, and unit reservations.
//!
//! These are plain records. Storage, locking, and permission checks live
//! in [`crate::store`] and [`crate::auth`].

pub mod device;
pub mod inventory;
pub mod rack;
pub mod reservation;

// Re-export all model types
pub use device::{Device, DeviceFace, DeviceId};
pub use inventory::Inventory;
pub use rack::{Rack, RackId, UnitOrder};
pub use reservation::{Reservation, ReservationId};
