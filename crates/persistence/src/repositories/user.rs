//! User directory backed by the users table.

use async_trait::async_trait;
use domain::models::Contact;
use domain::stores::UserDirectory;
use domain::DomainResult;
use sqlx::PgPool;
use uuid::Uuid;

use super::storage_error;
use crate::entities::UserEntity;
use crate::metrics::QueryTimer;

/// Repository for user lookups.
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Creates a new UserRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn find_contact(&self, user_id: Uuid) -> DomainResult<Option<Contact>> {
        let timer = QueryTimer::new("find_user_contact");
        let result = sqlx::query_as::<_, UserEntity>(
            r#"
            SELECT id, email, display_name, role, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result.map(|e| e.map(Into::into)).map_err(storage_error)
    }

    async fn list_admin_contacts(&self) -> DomainResult<Vec<Contact>> {
        let timer = QueryTimer::new("list_admin_contacts");
        let result = sqlx::query_as::<_, UserEntity>(
            r#"
            SELECT id, email, display_name, role, created_at
            FROM users
            WHERE role = 'admin'
            ORDER BY email
            "#,
        )
        .fetch_all(&self.pool)
        .await;
        timer.record();

        result
            .map(|rows| rows.into_iter().map(Into::into).collect())
            .map_err(storage_error)
    }
}
