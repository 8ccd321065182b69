//! Domain layer for the donation marketplace backend.
//!
//! This crate contains:
//! - Domain models (Role, Device, DeviceRequest)
//! - The device catalog and device request engine
//! - Storage and directory traits implemented by the persistence layer
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;
pub mod stores;

pub use error::{DomainError, DomainResult};
