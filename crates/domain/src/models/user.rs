//! User contact details, as far as the marketplace needs them.

use serde::Serialize;
use uuid::Uuid;

/// Someone who can be notified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
}
