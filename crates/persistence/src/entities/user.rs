//! User entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{Contact, Role};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for user role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum UserRoleDb {
    Requester,
    Donor,
    Admin,
}

impl From<UserRoleDb> for Role {
    fn from(value: UserRoleDb) -> Self {
        match value {
            UserRoleDb::Requester => Role::Requester,
            UserRoleDb::Donor => Role::Donor,
            UserRoleDb::Admin => Role::Admin,
        }
    }
}

/// Database row mapping for the users table.
#[derive(Debug, Clone, FromRow)]
pub struct UserEntity {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: UserRoleDb,
    pub created_at: DateTime<Utc>,
}

impl From<UserEntity> for Contact {
    fn from(entity: UserEntity) -> Self {
        Self {
            user_id: entity.id,
            name: entity.display_name,
            email: entity.email,
        }
    }
}
