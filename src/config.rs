//! Runtime configuration
//!
//! Built once at start-up from CLI arguments / environment and handed to each
//! component by value. Nothing reads the environment after that.

use crate::auth::TokenIssuer;
use crate::error::{CatalogError, ErrorCatalog};
use crate::sweeper::SweeperConfig;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Shortest signing secret accepted, in bytes
pub const MIN_SECRET_LEN: usize = 32;

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("signing secret must be at least 32 bytes, got {0}")]
    WeakSecret(usize),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: Vec<u8>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Lifetime of cached authorization contexts
    pub context_ttl: Duration,
    pub sweep_interval: Duration,
    pub sweeper: SweeperConfig,
    /// LINE Login channel; customer login is disabled without it
    pub line_channel_id: Option<String>,
    /// JSON overrides for the error catalog
    pub error_catalog: Option<PathBuf>,
}

impl AuthConfig {
    /// Defaults: 24h access tokens, 30d refresh tokens, 10min context cache,
    /// hourly sweeps
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            access_ttl: Duration::from_secs(24 * HOUR),
            refresh_ttl: Duration::from_secs(30 * DAY),
            context_ttl: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(HOUR),
            sweeper: SweeperConfig::default(),
            line_channel_id: None,
            error_catalog: None,
        }
    }

    pub fn with_access_ttl_hours(mut self, hours: u64) -> Self {
        self.access_ttl = Duration::from_secs(hours.saturating_mul(HOUR));
        self
    }

    pub fn with_refresh_ttl_days(mut self, days: u64) -> Self {
        self.refresh_ttl = Duration::from_secs(days.saturating_mul(DAY));
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret(self.secret.len()));
        }

        let durations = [
            ("access token TTL", self.access_ttl),
            ("refresh token TTL", self.refresh_ttl),
            ("context cache TTL", self.context_ttl),
            ("sweep interval", self.sweep_interval),
            ("sweep lock TTL", self.sweeper.lock_ttl),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::Zero(*name));
        }

        if self.sweeper.batch_size == 0 {
            return Err(ConfigError::Zero("sweep batch size"));
        }

        Ok(())
    }

    pub fn token_issuer(&self) -> TokenIssuer {
        TokenIssuer::new(self.secret.clone(), self.access_ttl)
    }

    /// The standard catalog, with overrides applied if a file is configured
    pub fn load_error_catalog(&self) -> Result<ErrorCatalog, CatalogError> {
        match &self.error_catalog {
            Some(path) => ErrorCatalog::load(path),
            None => Ok(ErrorCatalog::standard()),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("context_ttl", &self.context_ttl)
            .field("sweep_interval", &self.sweep_interval)
            .field("sweeper", &self.sweeper)
            .field("line_channel_id", &self.line_channel_id)
            .field("error_catalog", &self.error_catalog)
            .finish()
    }
}
