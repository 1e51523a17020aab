//! Bearer token check for the local API.
//!
//! Without `API_TOKEN` configured every request is accepted.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AgentError;
use crate::AppState;

/// Caller that passed the token check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCaller {
    Anonymous,
    Authenticated,
}

impl FromRequestParts<AppState> for ApiCaller {
    type Rejection = AgentError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.api_token.as_deref() else {
            return Ok(ApiCaller::Anonymous);
        };

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "));

        match token {
            Some(token) if token == expected => Ok(ApiCaller::Authenticated),
            Some(_) => {
                tracing::debug!("Rejected API request with wrong token");
                Err(AgentError::Unauthorized)
            }
            None => Err(AgentError::Unauthorized),
        }
    }
}
