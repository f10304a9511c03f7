//! salon-auth CLI entry point

mod cli;

use crate::cli::{Cli, Commands, ServeArgs, SweepArgs};
use anyhow::{Context, Result};
use clap::Parser;
use salon_auth::auth::{Argon2Hasher, LineIdentityVerifier, PasswordHasher, PrincipalKind, Role};
use salon_auth::server::{run_server, AppState};
use salon_auth::service::MIN_PASSWORD_LEN;
use salon_auth::storage::{PostgresConfig, PostgresStore, SessionStore};
use salon_auth::sweeper::{DistributedLock, RevocationSweeper, SweepOutcome};
use salon_auth::{AuthService, ContextCache};
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LINE_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Database config is only resolved by commands that need it
    let get_db_config = || -> Result<PostgresConfig> {
        let config = if let Some(url) = &cli.database_url {
            PostgresConfig::from_url(url).context("Invalid DATABASE_URL")?
        } else {
            PostgresConfig::from_env().context("DATABASE_URL not set")?
        };
        Ok(config.with_timeouts(
            Duration::from_secs(cli.db_connect_timeout_secs),
            Duration::from_secs(cli.db_statement_timeout_secs),
        ))
    };

    match cli.command {
        Commands::Serve(ref args) => serve(get_db_config()?, args.clone()).await,
        Commands::Init => init(get_db_config()?).await,
        Commands::Sweep { ref sweep } => sweep_once(get_db_config()?, sweep.clone()).await,
        Commands::HashPassword { ref password } => hash_password(password.clone()),
        Commands::CreateStaff {
            ref username,
            ref email,
            role,
            ref password,
        } => create_staff(get_db_config()?, username, email, role, password.clone()).await,
        Commands::Status => status(get_db_config()?).await,
    }
}

async fn serve(db_config: PostgresConfig, args: ServeArgs) -> Result<()> {
    let config = args.auth_config();
    config.validate().context("Invalid configuration")?;

    let errors = Arc::new(config.load_error_catalog()?);
    let store = Arc::new(PostgresStore::new(db_config).await?);

    let cache = Arc::new(ContextCache::new(
        store.clone(),
        store.clone(),
        config.context_ttl,
    ));

    let mut service = AuthService::new(
        config.token_issuer(),
        store.clone(),
        store.clone(),
        cache,
        Arc::new(Argon2Hasher::new()),
        config.refresh_ttl,
    );
    match &config.line_channel_id {
        Some(channel_id) => {
            let verifier = LineIdentityVerifier::new(channel_id.clone(), LINE_VERIFY_TIMEOUT)?;
            service = service.with_identity_verifier(Arc::new(verifier));
        }
        None => warn!("LINE_CHANNEL_ID not set, customer login disabled"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = if args.no_sweeper {
        info!("In-process sweeper disabled");
        None
    } else {
        let sweeper = Arc::new(
            RevocationSweeper::new(
                store.clone(),
                DistributedLock::new(store.clone()),
                config.sweeper.clone(),
            )
            .with_kv_purge(store.clone()),
        );
        Some(sweeper.spawn(config.sweep_interval, shutdown_rx))
    };

    let listener = TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;

    info!(
        addr = %args.bind,
        access_ttl_secs = config.access_ttl.as_secs(),
        refresh_ttl_secs = config.refresh_ttl.as_secs(),
        "salon-auth starting"
    );

    let state = AppState::new(Arc::new(service), errors);
    run_server(listener, state, async move {
        shutdown_signal().await;
        info!("Shutdown signal received, stopping server");
        let _ = shutdown_tx.send(true);
    })
    .await?;

    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            warn!(error = %e, "Sweeper task ended abnormally");
        }
    }

    info!("salon-auth stopped");
    Ok(())
}

async fn init(db_config: PostgresConfig) -> Result<()> {
    let _store = PostgresStore::new(db_config).await?;
    println!("Database schema initialized successfully");
    Ok(())
}

async fn sweep_once(db_config: PostgresConfig, args: SweepArgs) -> Result<()> {
    let store = Arc::new(PostgresStore::new(db_config).await?);
    let sweeper = RevocationSweeper::new(
        store.clone(),
        DistributedLock::new(store.clone()),
        args.sweeper_config(),
    )
    .with_kv_purge(store.clone());

    match sweeper.run_once().await {
        SweepOutcome::Skipped => {
            println!("Sweep skipped: another instance holds the lock");
        }
        SweepOutcome::Completed(report) => {
            for kind in &report.kinds {
                match &kind.error {
                    Some(e) => println!("{:<9} failed after {} deleted: {}", kind.kind, kind.deleted, e),
                    None => println!(
                        "{:<9} {} deleted in {} batch(es)",
                        kind.kind, kind.deleted, kind.batches
                    ),
                }
            }
            println!("Expired cache/lock entries purged: {}", report.kv_purged);
            if report.has_errors() {
                anyhow::bail!("sweep finished with errors");
            }
        }
    }

    Ok(())
}

fn read_password(password: Option<String>) -> Result<String> {
    let password = match password {
        Some(p) => p,
        None => {
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("Failed to read password from stdin")?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    if password.chars().count() < MIN_PASSWORD_LEN {
        anyhow::bail!("password must be at least {} characters", MIN_PASSWORD_LEN);
    }
    Ok(password)
}

fn hash_password(password: Option<String>) -> Result<()> {
    let password = read_password(password)?;
    let hash = Argon2Hasher::new()
        .hash(&password)
        .map_err(|e| anyhow::anyhow!("Hashing failed: {}", e))?;
    println!("{}", hash);
    Ok(())
}

async fn create_staff(
    db_config: PostgresConfig,
    username: &str,
    email: &str,
    role: Role,
    password: Option<String>,
) -> Result<()> {
    let password = read_password(password)?;
    let hash = Argon2Hasher::new()
        .hash(&password)
        .map_err(|e| anyhow::anyhow!("Hashing failed: {}", e))?;

    let store = PostgresStore::new(db_config).await?;
    let id = store.create_staff(username, email, &hash, role).await?;

    println!("Created {} {} (id {})", role, username, id);
    Ok(())
}

async fn status(db_config: PostgresConfig) -> Result<()> {
    let store = PostgresStore::new(db_config).await?;
    store.ping().await?;

    println!("salon-auth Status");
    println!("=================");
    println!("Database: Connected");

    for kind in PrincipalKind::ALL {
        let sweepable = store.count_sweepable(kind).await?;
        println!("Sweepable {} sessions: {}", kind, sweepable);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
