//! HTTP route handlers.

use serde::Deserialize;
use shared::pagination::PageRequest;

pub mod admin;
pub mod device_requests;
pub mod devices;
pub mod health;

/// `?page=&limit=` for the plain listings.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<PageQuery> for PageRequest {
    fn from(query: PageQuery) -> Self {
        PageRequest::new(query.page, query.limit)
    }
}
