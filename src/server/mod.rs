//! HTTP server
//!
//! JSON over axum. Errors are rendered through the injected `ErrorCatalog`
//! as `{"error":{"code","message"}}` with the catalog's status.

mod error;
mod extract;
mod routes;

pub use error::{ApiError, ErrorBody, ErrorResponse};
pub use extract::{Authenticated, ClientMeta};
pub use routes::{
    create_router, LoginRequest, LoginResponse, RefreshResponse, SuccessResponse,
};

use crate::error::{AuthError, ErrorCatalog};
use crate::service::AuthService;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AuthService>,
    pub errors: Arc<ErrorCatalog>,
}

impl AppState {
    pub fn new(service: Arc<AuthService>, errors: Arc<ErrorCatalog>) -> Self {
        Self { service, errors }
    }

    /// Render `err` for the client, logging system failures
    pub fn reject(&self, err: AuthError) -> ApiError {
        ApiError::render(&self.errors, &err)
    }
}

pub(crate) trait Rejectable<T> {
    fn or_reject(self, state: &AppState) -> Result<T, ApiError>;
}

impl<T> Rejectable<T> for Result<T, AuthError> {
    fn or_reject(self, state: &AppState) -> Result<T, ApiError> {
        self.map_err(|e| state.reject(e))
    }
}

/// Serve the API on `listener` until `shutdown` resolves
pub async fn run_server<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "HTTP server listening");
    }

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await
}
