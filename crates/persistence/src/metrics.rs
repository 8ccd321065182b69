//! Database metrics: query latency and pool occupancy.

use metrics::{gauge, histogram};
use sqlx::PgPool;
use std::time::Instant;

pub const QUERY_DURATION_METRIC: &str = "database_query_duration_seconds";

/// Times one repository query.
///
/// ```ignore
/// let timer = QueryTimer::new("find_device_by_id");
/// let result = sqlx::query_as::<_, DeviceEntity>(...).fetch_optional(&pool).await;
/// timer.record();
/// ```
pub struct QueryTimer {
    query_name: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn new(query_name: &'static str) -> Self {
        Self {
            query_name,
            start: Instant::now(),
        }
    }

    pub fn query_name(&self) -> &'static str {
        self.query_name
    }

    pub fn record(self) {
        histogram!(QUERY_DURATION_METRIC, "query" => self.query_name)
            .record(self.start.elapsed().as_secs_f64());
    }
}

/// Publishes pool size gauges. Called from the readiness probe.
pub fn record_pool_metrics(pool: &PgPool) {
    let size = pool.size() as usize;
    let idle = pool.num_idle();

    gauge!("database_connections_active").set(size.saturating_sub(idle) as f64);
    gauge!("database_connections_idle").set(idle as f64);
    gauge!("database_connections_total").set(size as f64);
}
