//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod device;
pub mod device_request;
pub mod user;

pub use device::{DeviceConditionDb, DeviceEntity, DeviceTypeDb, ModerationStatusDb};
pub use device_request::{DeviceRequestEntity, RequestStatusDb};
pub use user::{UserEntity, UserRoleDb};
