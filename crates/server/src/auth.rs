// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request authentication.
//!
//! Agents authenticate every request (except registration) with the
//! long-lived `X-Agent-API-Key` header; the key binds the caller to
//! its agent row for the duration of the request. Key rotation is a
//! user action and authenticates with a JWT bearer instead.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;

use fl_core::{AgentRecord, Clock, UserId};

use crate::error::ApiError;
use crate::AppState;

pub const API_KEY_HEADER: &str = "x-agent-api-key";

/// The authenticated agent.
pub struct AgentAuth(pub AgentRecord);

impl<C: Clock> FromRequestParts<AppState<C>> for AgentAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<C>,
    ) -> Result<Self, Self::Rejection> {
        let api_key = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        let agent = state
            .intake
            .repos()
            .agents
            .find_by_api_key(api_key)
            .await
            .map_err(ApiError::from)?
            .ok_or(ApiError::Unauthorized)?;
        Ok(AgentAuth(agent))
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: i64,
}

/// The authenticated dashboard user (JWT bearer).
pub struct UserAuth(pub UserId);

impl<C: Clock> FromRequestParts<AppState<C>> for UserAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<C>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        let key = DecodingKey::from_secret(state.config.jwt_secret.as_bytes());
        let claims = jsonwebtoken::decode::<Claims>(token, &key, &Validation::default())
            .map_err(|_| ApiError::Unauthorized)?
            .claims;
        Ok(UserAuth(UserId(claims.sub)))
    }
}
