use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use domain::services::{DeviceCatalog, DeviceRequestEngine, NotificationDispatcher, Notifier};
use domain::stores::memory::InMemoryStore;
use domain::stores::{DeviceRequestStore, DeviceStore, UserDirectory};
use persistence::repositories::{DeviceRepository, DeviceRequestRepository, UserRepository};
use shared::jwt::{JwtConfig, JwtError};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{
    metrics_handler, metrics_middleware, optional_user_auth, rate_limit_middleware,
    require_admin, require_user_auth, security_headers_middleware, trace_id, RateLimiterState,
};
use crate::routes::{admin, device_requests, devices, health};
use crate::services::EmailNotifier;

/// The storage backends the services run on.
#[derive(Clone)]
pub struct Stores {
    pub devices: Arc<dyn DeviceStore>,
    pub requests: Arc<dyn DeviceRequestStore>,
    pub users: Arc<dyn UserDirectory>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            devices: Arc::new(DeviceRepository::new(pool.clone())),
            requests: Arc::new(DeviceRequestRepository::new(pool.clone())),
            users: Arc::new(UserRepository::new(pool)),
        }
    }

    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            devices: store.clone(),
            requests: store.clone(),
            users: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jwt: Arc<JwtConfig>,
    pub catalog: DeviceCatalog,
    pub engine: DeviceRequestEngine,
    pub rate_limiter: Option<Arc<RateLimiterState>>,
    /// Only set when running on PostgreSQL; used by the health probes.
    pub pool: Option<PgPool>,
}

impl AppState {
    /// Fails if the JWT keys cannot be parsed.
    pub fn new(
        config: Config,
        stores: Stores,
        notifier: Arc<dyn Notifier>,
        pool: Option<PgPool>,
    ) -> Result<Self, JwtError> {
        let jwt = JwtConfig::with_leeway(
            &config.jwt.private_key,
            &config.jwt.public_key,
            config.jwt.access_token_expiry_secs,
            config.jwt.leeway_secs,
        )?;

        let notifications = NotificationDispatcher::new(notifier, stores.users.clone());
        let catalog = DeviceCatalog::new(stores.devices.clone(), notifications.clone());
        let engine = DeviceRequestEngine::new(
            stores.devices,
            stores.requests,
            notifications,
            config.requests,
        );
        let rate_limiter =
            RateLimiterState::new(config.security.rate_limit_per_minute).map(Arc::new);

        Ok(Self {
            config: Arc::new(config),
            jwt: Arc::new(jwt),
            catalog,
            engine,
            rate_limiter,
            pool,
        })
    }
}

/// Builds the production app over PostgreSQL with email notifications.
pub fn create_app(config: Config, pool: PgPool) -> Result<Router, JwtError> {
    let notifier = Arc::new(EmailNotifier::new(config.email.clone()));
    let state = AppState::new(config, Stores::postgres(pool.clone()), notifier, Some(pool))?;
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    let config = state.config.clone();

    let cors = if config.security.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Outermost layer runs first: auth, then rate limiting.
    let authenticated = Router::new()
        .route("/devices", post(devices::create_device))
        .route("/devices/my", get(devices::list_my_devices))
        .route(
            "/devices/:id",
            put(devices::update_device).delete(devices::delete_device),
        )
        .route("/devices/:id/status", put(devices::set_device_status))
        .route("/devices/:id/requests", get(devices::list_device_requests))
        .route("/device-requests", post(device_requests::create_request))
        .route(
            "/device-requests/can-request/:device_id",
            get(device_requests::can_request),
        )
        .route("/device-requests/my", get(device_requests::list_my_requests))
        .route(
            "/device-requests/my/:id",
            delete(device_requests::cancel_my_request),
        )
        .route("/device-requests/:id", get(device_requests::get_request))
        .route(
            "/device-requests/:id/status",
            put(device_requests::set_request_status),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_user_auth,
        ));

    let admin_routes = Router::new()
        .route("/admin/devices", get(admin::list_devices))
        .route("/admin/devices/:id", delete(admin::delete_device))
        .route("/admin/device-requests", get(admin::list_device_requests))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_user_auth,
        ));

    let public = Router::new()
        .route("/devices/approved", get(devices::list_approved_devices))
        .route("/devices/:id", get(devices::get_device))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            optional_user_auth,
        ));

    let api_v1 = Router::new()
        .merge(public)
        .merge(authenticated)
        .merge(admin_routes);

    let probes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/live", get(health::live))
        .route("/api/health/ready", get(health::ready))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(probes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            security_headers_middleware,
        ))
        .layer(middleware::from_fn(trace_id))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(cors)
        .with_state(state)
}
