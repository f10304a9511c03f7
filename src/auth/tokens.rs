//! Access and refresh token issuance
//!
//! Access tokens are JWT-shaped: `base64url(header).base64url(claims).base64url(hmac)`
//! signed with HMAC-SHA256 over the first two segments. Refresh tokens are
//! 32 random bytes, base64url encoded, with no embedded structure.

use crate::auth::context::{AuthorizationContext, PrincipalKind};
use crate::auth::roles::{Role, StoreList};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";
const REFRESH_TOKEN_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("token signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Claims carried by an access token
///
/// Role and stores are a snapshot taken at issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Principal id
    pub sub: i64,
    pub kind: PrincipalKind,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default)]
    pub stores: StoreList,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expires at (unix seconds)
    pub exp: i64,
    /// Unique token id, for log correlation
    pub jti: String,
}

impl AccessClaims {
    /// The authorization context as it was when the token was issued
    pub fn context(&self) -> AuthorizationContext {
        AuthorizationContext {
            principal_id: self.sub,
            kind: self.kind,
            username: self.username.clone(),
            role: self.role,
            store_list: self.stores.clone(),
        }
    }
}

/// A freshly signed access token
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub token: String,
    /// Lifetime in seconds
    pub expires_in: u64,
    pub claims: AccessClaims,
}

/// Signs and verifies access tokens, generates refresh tokens
#[derive(Clone)]
pub struct TokenIssuer {
    secret: Vec<u8>,
    access_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: impl Into<Vec<u8>>, access_ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            access_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Issue an access token for `context`, valid from now
    pub fn issue_access_token(
        &self,
        context: &AuthorizationContext,
    ) -> Result<IssuedAccessToken, TokenError> {
        self.issue_access_token_at(context, chrono::Utc::now().timestamp())
    }

    /// Issue an access token as if the current time were `now` (unix seconds)
    pub fn issue_access_token_at(
        &self,
        context: &AuthorizationContext,
        now: i64,
    ) -> Result<IssuedAccessToken, TokenError> {
        let ttl_secs = self.access_ttl.as_secs();
        let claims = AccessClaims {
            sub: context.principal_id,
            kind: context.kind,
            username: context.username.clone(),
            role: context.role,
            stores: context.store_list.clone(),
            iat: now,
            exp: now.saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX)),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };
        let header_json =
            serde_json::to_vec(&header).map_err(|e| TokenError::Signing(e.to_string()))?;
        let claims_json =
            serde_json::to_vec(&claims).map_err(|e| TokenError::Signing(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(claims_json)
        );

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        let token = format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature));

        Ok(IssuedAccessToken {
            token,
            expires_in: ttl_secs,
            claims,
        })
    }

    /// Generate an opaque refresh token
    pub fn issue_refresh_token() -> String {
        let mut rng = rand::rng();
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        rng.fill(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Verify signature and expiry of an access token
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify_access_token_at(token, chrono::Utc::now().timestamp())
    }

    /// Verify as if the current time were `now` (unix seconds)
    pub fn verify_access_token_at(&self, token: &str, now: i64) -> Result<AccessClaims, TokenError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(TokenError::Malformed(format!(
                "expected 3 segments, got {}",
                parts.len()
            )));
        }

        let (header_b64, claims_b64, signature_b64) = (parts[0], parts[1], parts[2]);

        let header_json = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        let header: Header = serde_json::from_slice(&header_json)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        if header.alg != ALGORITHM {
            return Err(TokenError::Malformed(format!(
                "unsupported algorithm: {}",
                header.alg
            )));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;

        // Constant-time comparison inside verify_slice
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims_json = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        let claims: AccessClaims = serde_json::from_slice(&claims_json)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;

        if now >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| TokenError::Signing(e.to_string()))
    }
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("secret", &"[REDACTED]")
            .field("access_ttl", &self.access_ttl)
            .finish()
    }
}
