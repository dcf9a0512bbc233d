//! Caller identity.
//!
//! Authentication happens upstream; the REST layer only checks the shared `x-api-key` and
//! trusts the gateway-supplied `x-actor-id` and `x-actor-role` headers.

use crate::error::ApiError;
use crate::AppState;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use ward_core::{Actor, Role, UserId};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Validates the provided API key against the key configured at startup.
pub fn validate_api_key(expected: Option<&str>, provided: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    match provided {
        None => Err(ApiError::Unauthenticated("Missing x-api-key header")),
        Some(key) if key == expected => Ok(()),
        Some(_) => Err(ApiError::Unauthenticated("Invalid API key")),
    }
}

/// The authenticated actor for one request.
pub struct Caller(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        validate_api_key(state.api_key.as_deref(), header(API_KEY_HEADER))?;

        let id: UserId = header(ACTOR_ID_HEADER)
            .ok_or(ApiError::Unauthenticated("Missing x-actor-id header"))?
            .parse()
            .map_err(|_| ApiError::Unauthenticated("Invalid x-actor-id header"))?;
        let role: Role = header(ACTOR_ROLE_HEADER)
            .ok_or(ApiError::Unauthenticated("Missing x-actor-role header"))?
            .parse()
            .map_err(ApiError::BadRequest)?;

        if role == Role::System {
            return Err(ApiError::Unauthenticated("system role is internal only"));
        }

        Ok(Caller(Actor::new(id, role)))
    }
}
