//! User JWT authentication middleware.
//!
//! Resolves the Bearer token into an [`Actor`] (user id plus role) and
//! stores it in request extensions as [`UserAuth`].

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use domain::models::{Actor, Role};
use shared::jwt::JwtConfig;
use std::str::FromStr;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;

/// Authenticated user information extracted from JWT.
#[derive(Debug, Clone)]
pub struct UserAuth {
    pub actor: Actor,
    /// JWT ID (jti) for session tracking.
    pub jti: String,
}

impl UserAuth {
    /// Validates an access token and resolves its subject and role.
    pub fn validate(jwt_config: &JwtConfig, token: &str) -> Result<Self, String> {
        let claims = jwt_config
            .validate_access_token(token)
            .map_err(|e| format!("Invalid token: {}", e))?;

        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|_| "Invalid user ID in token".to_string())?;
        let role = Role::from_str(&claims.role)
            .map_err(|_| format!("Unknown role in token: {}", claims.role))?;

        Ok(UserAuth {
            actor: Actor::new(user_id, role),
            jti: claims.jti,
        })
    }

    pub fn user_id(&self) -> Uuid {
        self.actor.user_id
    }
}

/// Returns the token of a `Bearer` Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware that requires JWT user authentication.
pub async fn require_user_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(req.headers()) else {
        return unauthorized_response("Missing or invalid Authorization header");
    };

    match UserAuth::validate(&state.jwt, token) {
        Ok(auth) => {
            req.extensions_mut().insert(auth);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!("JWT validation failed: {}", e);
            unauthorized_response("Invalid or expired token")
        }
    }
}

/// Middleware that validates a Bearer token when one is present.
///
/// Invalid tokens are ignored and the request proceeds anonymously.
pub async fn optional_user_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(req.headers()) {
        if let Ok(auth) = UserAuth::validate(&state.jwt, token) {
            req.extensions_mut().insert(auth);
        }
    }

    next.run(req).await
}

/// Middleware that admits admins only. Must run after [`require_user_auth`].
pub async fn require_admin(req: Request<Body>, next: Next) -> Response {
    match req.extensions().get::<UserAuth>() {
        Some(auth) if auth.actor.is_admin() => next.run(req).await,
        Some(auth) => {
            tracing::debug!(user_id = %auth.user_id(), role = %auth.actor.role, "Admin route denied");
            ApiError::Forbidden("Admin access required".to_string()).into_response()
        }
        None => unauthorized_response("Authentication required"),
    }
}

fn unauthorized_response(message: &str) -> Response {
    ApiError::Unauthorized(message.to_string()).into_response()
}
