//! Per-user rate limiting.
//!
//! Each authenticated user gets their own `governor` bucket.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter as GovRateLimiter,
};
use std::{
    num::NonZeroU32,
    sync::atomic::{AtomicU64, Ordering},
};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::user_auth::UserAuth;

/// Idle buckets are dropped once every this many checks.
const PRUNE_EVERY: u64 = 1024;

type UserRateLimiter<C> =
    GovRateLimiter<Uuid, DefaultKeyedStateStore<Uuid>, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Rate limiter state shared across all requests.
pub struct RateLimiterState<C: Clock = DefaultClock> {
    limiter: UserRateLimiter<C>,
    clock: C,
    checks: AtomicU64,
}

impl RateLimiterState {
    /// Returns `None` when `rate_limit_per_minute` is 0 (limiting disabled).
    pub fn new(rate_limit_per_minute: u32) -> Option<Self> {
        Self::with_clock(rate_limit_per_minute, DefaultClock::default())
    }
}

impl<C: Clock + Clone> RateLimiterState<C> {
    pub fn with_clock(rate_limit_per_minute: u32, clock: C) -> Option<Self> {
        let per_minute = NonZeroU32::new(rate_limit_per_minute)?;
        let limiter = GovRateLimiter::new(
            Quota::per_minute(per_minute),
            DefaultKeyedStateStore::default(),
            clock.clone(),
        );
        Some(Self {
            limiter,
            clock,
            checks: AtomicU64::new(0),
        })
    }

    /// `Err` carries the number of seconds to wait, at least 1.
    pub fn check(&self, user_id: Uuid) -> Result<(), u64> {
        if self.checks.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune();
        }

        self.limiter
            .check_key(&user_id)
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()).as_secs().max(1))
    }

    /// Forgets users whose bucket has fully refilled.
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    pub fn tracked_users(&self) -> usize {
        self.limiter.len()
    }
}

impl<C: Clock + Clone> std::fmt::Debug for RateLimiterState<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterState")
            .field("tracked_users", &self.tracked_users())
            .finish()
    }
}

/// Applies the per-user limit. Must run after authentication.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (Some(limiter), Some(auth)) = (&state.rate_limiter, req.extensions().get::<UserAuth>())
    else {
        return next.run(req).await;
    };

    if let Err(retry_after) = limiter.check(auth.user_id()) {
        tracing::debug!(user_id = %auth.user_id(), retry_after, "Rate limit exceeded");
        let mut response = ApiError::RateLimited.into_response();
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return response;
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;
    use std::time::Duration;

    #[test]
    fn test_zero_disables_limiting() {
        assert!(RateLimiterState::new(0).is_none());
    }

    #[test]
    fn test_limit_is_per_user() {
        let state = RateLimiterState::new(2).unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        assert!(state.check(alice).is_ok());
        assert!(state.check(alice).is_ok());
        let retry_after = state.check(alice).unwrap_err();
        assert!(retry_after >= 1);

        assert!(state.check(bob).is_ok());
        assert_eq!(state.tracked_users(), 2);
    }

    #[test]
    fn test_prune_drops_refilled_buckets() {
        let clock = FakeRelativeClock::default();
        let state = RateLimiterState::with_clock(2, clock.clone()).unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        assert!(state.check(alice).is_ok());
        assert!(state.check(alice).is_ok());
        assert!(state.check(bob).is_ok());
        assert_eq!(state.tracked_users(), 2);

        // Alice is still throttled, so her bucket survives a prune.
        clock.advance(Duration::from_secs(20));
        state.prune();
        assert_eq!(state.tracked_users(), 2);

        clock.advance(Duration::from_secs(60));
        state.prune();
        assert_eq!(state.tracked_users(), 0);
        assert!(state.check(alice).is_ok());
    }

    #[test]
    fn test_check_prunes_periodically() {
        let clock = FakeRelativeClock::default();
        let state = RateLimiterState::with_clock(1, clock.clone()).unwrap();
        assert!(state.check(Uuid::new_v4()).is_ok());

        clock.advance(Duration::from_secs(120));
        for _ in 0..PRUNE_EVERY - 1 {
            let _ = state.check(Uuid::nil());
        }
        // The refilled bucket is gone; the throttled nil user remains.
        assert_eq!(state.tracked_users(), 1);
    }
}
