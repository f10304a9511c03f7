//! Error taxonomy and the error-code catalog
//!
//! `AuthError` is what every component returns. `ErrorCatalog` maps each error
//! kind to a stable code, HTTP status and client-facing message. The catalog is
//! built once at start-up (defaults, optionally overridden from a JSON file)
//! and handed to the HTTP layer; it is immutable afterwards.

use crate::auth::TokenError;
use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid access token")]
    TokenInvalid,

    #[error("access token expired")]
    TokenExpired,

    #[error("malformed access token: {0}")]
    TokenMalformed(String),

    #[error("refresh token invalid")]
    RefreshTokenInvalid,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("principal not found")]
    PrincipalNotFound,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed(msg) => AuthError::TokenMalformed(msg),
            TokenError::InvalidSignature => AuthError::TokenInvalid,
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Signing(msg) => AuthError::Internal(msg),
        }
    }
}

/// Discriminant of `AuthError`, used as the catalog key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidCredentials,
    Unauthenticated,
    TokenInvalid,
    TokenExpired,
    TokenMalformed,
    RefreshTokenInvalid,
    PermissionDenied,
    PrincipalNotFound,
    InvalidRequest,
    StorageError,
    InternalError,
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidCredentials => ErrorKind::InvalidCredentials,
            AuthError::Unauthenticated => ErrorKind::Unauthenticated,
            AuthError::TokenInvalid => ErrorKind::TokenInvalid,
            AuthError::TokenExpired => ErrorKind::TokenExpired,
            AuthError::TokenMalformed(_) => ErrorKind::TokenMalformed,
            AuthError::RefreshTokenInvalid => ErrorKind::RefreshTokenInvalid,
            AuthError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            AuthError::PrincipalNotFound => ErrorKind::PrincipalNotFound,
            AuthError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            AuthError::Storage(_) => ErrorKind::StorageError,
            AuthError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Storage and internal failures are logged in full and shown opaquely
    pub fn is_system(&self) -> bool {
        matches!(self, AuthError::Storage(_) | AuthError::Internal(_))
    }
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub code: String,
    pub status: u16,
    pub message: String,
}

impl ErrorDescriptor {
    fn new(code: &str, status: u16, message: &str) -> Self {
        Self {
            code: code.to_string(),
            status,
            message: message.to_string(),
        }
    }
}

/// What the client gets to see for an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedError {
    pub status: u16,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read error catalog {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid error catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Error kind → (code, status, message)
#[derive(Debug, Clone)]
pub struct ErrorCatalog {
    entries: HashMap<ErrorKind, ErrorDescriptor>,
}

impl ErrorCatalog {
    /// The built-in catalog
    pub fn standard() -> Self {
        let entries = [
            (ErrorKind::InvalidCredentials, ErrorDescriptor::new("AUTH_INVALID_CREDENTIALS", 401, "invalid username or password")),
            (ErrorKind::Unauthenticated, ErrorDescriptor::new("AUTH_UNAUTHENTICATED", 401, "authentication required")),
            (ErrorKind::TokenInvalid, ErrorDescriptor::new("AUTH_TOKEN_INVALID", 401, "access token is invalid")),
            (ErrorKind::TokenExpired, ErrorDescriptor::new("AUTH_TOKEN_EXPIRED", 401, "access token has expired")),
            (ErrorKind::TokenMalformed, ErrorDescriptor::new("AUTH_TOKEN_MALFORMED", 401, "access token is malformed")),
            (ErrorKind::RefreshTokenInvalid, ErrorDescriptor::new("AUTH_REFRESH_TOKEN_INVALID", 401, "refresh token is invalid or expired")),
            (ErrorKind::PermissionDenied, ErrorDescriptor::new("AUTH_PERMISSION_DENIED", 403, "permission denied")),
            (ErrorKind::PrincipalNotFound, ErrorDescriptor::new("AUTH_PRINCIPAL_NOT_FOUND", 404, "account not found")),
            (ErrorKind::InvalidRequest, ErrorDescriptor::new("REQUEST_INVALID", 400, "invalid request")),
            (ErrorKind::StorageError, ErrorDescriptor::new("SYS_STORAGE_ERROR", 500, "storage unavailable")),
            (ErrorKind::InternalError, ErrorDescriptor::new("SYS_INTERNAL_ERROR", 500, "internal server error")),
        ];

        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Standard catalog with entries overridden by a JSON object keyed by kind
    ///
    /// ```json
    /// { "PermissionDenied": { "code": "E403", "status": 403, "message": "nope" } }
    /// ```
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let overrides: HashMap<ErrorKind, ErrorDescriptor> = serde_json::from_str(json)?;
        let mut catalog = Self::standard();
        catalog.entries.extend(overrides);
        Ok(catalog)
    }

    /// Load overrides from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn describe(&self, kind: ErrorKind) -> &ErrorDescriptor {
        // Every kind is seeded by standard() and overrides only replace entries
        &self.entries[&kind]
    }

    /// Client-facing rendering; only request-validation detail is passed through
    pub fn render(&self, err: &AuthError) -> RenderedError {
        let descriptor = self.describe(err.kind());
        let message = match err {
            AuthError::InvalidRequest(detail) => format!("{}: {}", descriptor.message, detail),
            _ => descriptor.message.clone(),
        };

        RenderedError {
            status: descriptor.status,
            code: descriptor.code.clone(),
            message,
        }
    }
}

impl Default for ErrorCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
