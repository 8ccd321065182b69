//! Request extractors.

pub mod rejection;
pub mod user_auth;

pub use rejection::{AppJson, AppPath, AppQuery};
pub use user_auth::{CurrentActor, OptionalActor};
