//! Domain services for the donation marketplace.
//!
//! Services contain business logic that operates on domain models.

pub mod device_catalog;
pub mod device_requests;
pub mod notification;

pub use device_catalog::DeviceCatalog;
pub use device_requests::DeviceRequestEngine;
pub use notification::{
    Audience, MockNotifier, NotificationDispatcher, NotificationEvent, NotificationResult,
    Notifier,
};
