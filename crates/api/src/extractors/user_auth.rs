//! User JWT authentication extractors.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use domain::models::Actor;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::user_auth::{bearer_token, UserAuth};

/// The authenticated caller.
///
/// Uses the [`UserAuth`] inserted by the auth middleware when present,
/// otherwise validates the Authorization header itself.
#[derive(Debug, Clone, Copy)]
pub struct CurrentActor(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for CurrentActor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(auth) = parts.extensions.get::<UserAuth>() {
            return Ok(CurrentActor(auth.actor));
        }

        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

        let auth = UserAuth::validate(&state.jwt, token)
            .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

        Ok(CurrentActor(auth.actor))
    }
}

/// The caller if they presented a valid token, `None` otherwise.
#[derive(Debug, Clone, Copy)]
pub struct OptionalActor(pub Option<Actor>);

#[async_trait]
impl FromRequestParts<AppState> for OptionalActor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(auth) = parts.extensions.get::<UserAuth>() {
            return Ok(OptionalActor(Some(auth.actor)));
        }

        let actor = bearer_token(&parts.headers)
            .and_then(|token| UserAuth::validate(&state.jwt, token).ok())
            .map(|auth| auth.actor);
        Ok(OptionalActor(actor))
    }
}
