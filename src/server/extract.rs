//! Request extractors

use crate::auth::AccessClaims;
use crate::error::AuthError;
use crate::server::error::ApiError;
use crate::server::AppState;
use crate::service::ClientInfo;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::http::request::Parts;
use std::convert::Infallible;
use std::net::SocketAddr;

/// Claims of a verified bearer access token
///
/// Missing header → `Unauthenticated`; anything but `Bearer <token>` → `TokenMalformed`.
#[derive(Debug, Clone)]
pub struct Authenticated(pub AccessClaims);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        bearer_claims(parts, state).map(Authenticated).map_err(|e| state.reject(e))
    }
}

fn bearer_claims(parts: &Parts, state: &AppState) -> Result<AccessClaims, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::Unauthenticated)?
        .to_str()
        .map_err(|_| AuthError::TokenMalformed("authorization header is not ASCII".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::TokenMalformed("expected a Bearer token".to_string()))?;

    state.service.authenticate(token)
}

/// User agent and client address for session bookkeeping
///
/// The first `X-Forwarded-For` hop wins over the socket peer address.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta(pub ClientInfo);

impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let ip_address = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        Ok(ClientMeta(ClientInfo {
            user_agent,
            ip_address,
        }))
    }
}
