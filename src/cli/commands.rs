//! CLI command definitions

use clap::{Args, Parser, Subcommand};
use salon_auth::auth::Role;
use salon_auth::sweeper::SweeperConfig;
use salon_auth::AuthConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "salon-auth")]
#[command(about = "Authentication and session service for the salon booking backend", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database URL (falls back to PGHOST/PGUSER/... when unset)
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Seconds to wait for a pooled database connection
    #[arg(long, env = "SALON_AUTH_DB_CONNECT_TIMEOUT_SECS", default_value_t = 5, global = true)]
    pub db_connect_timeout_secs: u64,

    /// Server-side statement timeout in seconds
    #[arg(long, env = "SALON_AUTH_DB_STATEMENT_TIMEOUT_SECS", default_value_t = 10, global = true)]
    pub db_statement_timeout_secs: u64,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API and the background sweeper
    Serve(ServeArgs),

    /// Initialize the database schema
    Init,

    /// Run one sweep of revoked/expired sessions and exit
    ///
    /// For deployments that schedule sweeps externally (cron, k8s CronJob).
    Sweep {
        #[command(flatten)]
        sweep: SweepArgs,
    },

    /// Hash a password for manual insertion into staff_users
    HashPassword {
        /// Password to hash; read from stdin when omitted
        password: Option<String>,
    },

    /// Create a staff account
    ///
    /// Examples:
    ///   salon-auth create-staff owner owner@example.com --role super_admin
    CreateStaff {
        username: String,
        email: String,

        /// STYLIST, MANAGER, ADMIN or SUPER_ADMIN
        #[arg(long, value_parser = parse_role, default_value = "STYLIST")]
        role: Role,

        /// Password; read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Show database connectivity and session statistics
    Status,
}

#[derive(Args, Debug, Clone)]
pub struct SweepArgs {
    /// Rows deleted per batch
    #[arg(long, env = "SALON_AUTH_SWEEP_BATCH_SIZE", default_value_t = 200)]
    pub batch_size: u32,

    /// Sweep lock lifetime in seconds
    #[arg(long, env = "SALON_AUTH_SWEEP_LOCK_TTL_SECS", default_value_t = 1800)]
    pub lock_ttl_secs: u64,

    /// Pause between batches in milliseconds
    #[arg(long, env = "SALON_AUTH_SWEEP_PAUSE_MS", default_value_t = 100)]
    pub pause_ms: u64,
}

impl SweepArgs {
    pub fn sweeper_config(&self) -> SweeperConfig {
        SweeperConfig {
            batch_size: self.batch_size,
            batch_pause: Duration::from_millis(self.pause_ms),
            lock_ttl: Duration::from_secs(self.lock_ttl_secs),
            ..SweeperConfig::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8080", env = "SALON_AUTH_BIND")]
    pub bind: String,

    /// Token signing secret (at least 32 bytes)
    #[arg(long, env = "SALON_AUTH_SECRET", hide_env_values = true)]
    pub secret: String,

    #[arg(long, env = "SALON_AUTH_ACCESS_TTL_HOURS", default_value_t = 24)]
    pub access_ttl_hours: u64,

    #[arg(long, env = "SALON_AUTH_REFRESH_TTL_DAYS", default_value_t = 30)]
    pub refresh_ttl_days: u64,

    /// How long resolved authorization contexts stay cached
    #[arg(long, env = "SALON_AUTH_CONTEXT_TTL_SECS", default_value_t = 600)]
    pub context_ttl_secs: u64,

    #[arg(long, env = "SALON_AUTH_SWEEP_INTERVAL_SECS", default_value_t = 3600)]
    pub sweep_interval_secs: u64,

    /// Do not run the in-process sweeper
    #[arg(long)]
    pub no_sweeper: bool,

    #[command(flatten)]
    pub sweep: SweepArgs,

    /// LINE Login channel id; customer login is disabled without it
    #[arg(long, env = "LINE_CHANNEL_ID")]
    pub line_channel_id: Option<String>,

    /// JSON file overriding error codes/messages
    #[arg(long, env = "SALON_AUTH_ERROR_CATALOG")]
    pub error_catalog: Option<PathBuf>,
}

impl ServeArgs {
    pub fn auth_config(&self) -> AuthConfig {
        let mut config = AuthConfig::new(self.secret.as_bytes())
            .with_access_ttl_hours(self.access_ttl_hours)
            .with_refresh_ttl_days(self.refresh_ttl_days);
        config.context_ttl = Duration::from_secs(self.context_ttl_secs);
        config.sweep_interval = Duration::from_secs(self.sweep_interval_secs);
        config.sweeper = self.sweep.sweeper_config();
        config.line_channel_id = self.line_channel_id.clone();
        config.error_catalog = self.error_catalog.clone();
        config
    }
}

fn parse_role(s: &str) -> Result<Role, String> {
    s.parse()
}
