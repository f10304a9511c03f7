//! Shared fixtures: the full auth stack wired to in-memory backends

#![allow(dead_code)]

use salon_auth::auth::{
    Argon2Hasher, ExternalIdentity, IdentityVerifier, PasswordHasher, Role, StoreId,
};
use salon_auth::error::{AuthError, ErrorCatalog};
use salon_auth::server::{run_server, AppState};
use async_trait::async_trait;
use salon_auth::storage::{
    KvStore, MemoryDirectory, MemoryKvStore, MemorySessionStore, PrincipalDirectory,
    SessionStore,
};
use salon_auth::{AuthService, ContextCache, TokenIssuer};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const TEST_SECRET: &[u8] = b"test-secret-for-integration-tests-0123";
pub const ACCESS_TTL: Duration = Duration::from_secs(3600);
pub const REFRESH_TTL: Duration = Duration::from_secs(30 * 86_400);
pub const CONTEXT_TTL: Duration = Duration::from_secs(600);

/// Accepts id tokens of the form `line:<uid>:<name>`
pub struct StaticLineVerifier;

#[async_trait]
impl IdentityVerifier for StaticLineVerifier {
    async fn verify(&self, id_token: &str) -> Result<ExternalIdentity, AuthError> {
        let mut parts = id_token.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("line"), Some(uid), Some(name)) if !uid.is_empty() => Ok(ExternalIdentity {
                provider_uid: uid.to_string(),
                name: name.to_string(),
                email: None,
            }),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

pub struct Harness {
    pub service: Arc<AuthService>,
    pub dir: Arc<MemoryDirectory>,
    pub sessions: Arc<MemorySessionStore>,
    pub kv: Arc<MemoryKvStore>,
    pub hasher: Arc<Argon2Hasher>,
}

impl Harness {
    pub fn new() -> Self {
        let sessions = Arc::new(MemorySessionStore::new());
        Self::with_sessions(sessions.clone(), sessions)
    }

    /// Wire the service to `service_sessions` while keeping `sessions` for assertions
    pub fn with_sessions(
        sessions: Arc<MemorySessionStore>,
        service_sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let dir = Arc::new(MemoryDirectory::new());
        let kv = Arc::new(MemoryKvStore::new());
        Self::build(dir, sessions, service_sessions, kv.clone(), kv)
    }

    /// Same stack with a custom cache backend
    pub fn with_kv(cache_kv: Arc<dyn KvStore>) -> Self {
        let dir = Arc::new(MemoryDirectory::new());
        let sessions = Arc::new(MemorySessionStore::new());
        Self::build(
            dir,
            sessions.clone(),
            sessions,
            Arc::new(MemoryKvStore::new()),
            cache_kv,
        )
    }

    fn build(
        dir: Arc<MemoryDirectory>,
        sessions: Arc<MemorySessionStore>,
        service_sessions: Arc<dyn SessionStore>,
        kv: Arc<MemoryKvStore>,
        cache_kv: Arc<dyn KvStore>,
    ) -> Self {
        let hasher = Arc::new(Argon2Hasher::with_cost(1024, 1).unwrap());
        let cache = Arc::new(ContextCache::new(cache_kv, dir.clone(), CONTEXT_TTL));
        let service = AuthService::new(
            TokenIssuer::new(TEST_SECRET, ACCESS_TTL),
            service_sessions,
            dir.clone(),
            cache,
            hasher.clone(),
            REFRESH_TTL,
        )
        .with_identity_verifier(Arc::new(StaticLineVerifier));

        Self {
            service: Arc::new(service),
            dir,
            sessions,
            kv,
            hasher,
        }
    }

    /// Add a staff member with grants; stores are created on demand
    pub async fn add_staff(
        &self,
        username: &str,
        password: &str,
        role: Role,
        stores: &[StoreId],
    ) -> i64 {
        for store in stores {
            self.dir.add_store(*store, true);
        }
        let hash = self.hasher.hash(password).unwrap();
        let id = self
            .dir
            .add_staff(username, &format!("{}@salon.test", username), &hash, role);
        if !stores.is_empty() {
            self.dir.grant_stores(id, stores).await.unwrap();
        }
        id
    }

    pub fn issuer(&self) -> TokenIssuer {
        TokenIssuer::new(TEST_SECRET, ACCESS_TTL)
    }

    /// Serve the HTTP API on an ephemeral port
    pub async fn serve(&self) -> TestServer {
        self.serve_with_catalog(ErrorCatalog::standard()).await
    }

    pub async fn serve_with_catalog(&self, catalog: ErrorCatalog) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = AppState::new(self.service.clone(), Arc::new(catalog));
        let (tx, rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            run_server(listener, state, async move {
                let _ = rx.await;
            })
            .await
            .unwrap();
        });

        TestServer {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            _shutdown: tx,
        }
    }
}

pub struct TestServer {
    pub base: String,
    pub client: reqwest::Client,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}
