//! HTTP routes

use crate::auth::{AccessClaims, AuthorizationContext, PrincipalKind, Role, StoreId};
use crate::server::error::ApiError;
use crate::server::extract::{Authenticated, ClientMeta};
use crate::server::{AppState, Rejectable};
use crate::error::AuthError;
use crate::service::LoginTokens;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

type ApiResult<T> = Result<Json<T>, ApiError>;
type Body<T> = Result<Json<T>, JsonRejection>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/auth/login", post(staff_login))
        .route("/auth/refresh", post(staff_refresh))
        .route("/auth/logout", post(staff_logout))
        .route("/auth/password", patch(change_password))
        .route("/auth/me", get(me))
        .route("/auth/permission", get(permission))
        .route("/staff/{id}/role", patch(change_role))
        .route("/staff/{id}/active", patch(set_active))
        .route("/staff/{id}/stores", post(grant_stores).delete(revoke_stores))
        .route("/customer/auth/line-login", post(customer_login))
        .route("/customer/auth/refresh", post(customer_refresh))
        .route("/customer/auth/logout", post(customer_logout))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Unwrap a JSON body, turning extractor rejections into `InvalidRequest`
fn body<T>(state: &AppState, body: Body<T>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| state.reject(AuthError::InvalidRequest(rejection.body_text())))
}

// ----- request / response bodies -----

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineLoginRequest {
    pub id_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub staff_id: i64,
    #[serde(default)]
    pub old_password: Option<String>,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreBatchRequest {
    pub store_ids: Vec<StoreId>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

impl From<LoginTokens> for LoginResponse {
    fn from(tokens: LoginTokens) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in: tokens.expires_in,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

const OK: SuccessResponse = SuccessResponse { success: true };

// ----- staff session endpoints -----

async fn staff_login(
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
    req: Body<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let req = body(&state, req)?;
    let tokens = state
        .service
        .login_staff(&req.username, &req.password, client)
        .await
        .or_reject(&state)?;
    Ok(Json(tokens.into()))
}

async fn staff_refresh(
    State(state): State<AppState>,
    req: Body<RefreshTokenRequest>,
) -> ApiResult<RefreshResponse> {
    refresh(state, PrincipalKind::Staff, req).await
}

async fn staff_logout(
    State(state): State<AppState>,
    req: Body<RefreshTokenRequest>,
) -> ApiResult<SuccessResponse> {
    logout(state, PrincipalKind::Staff, req).await
}

async fn refresh(
    state: AppState,
    kind: PrincipalKind,
    req: Body<RefreshTokenRequest>,
) -> ApiResult<RefreshResponse> {
    let req = body(&state, req)?;
    let refreshed = state
        .service
        .refresh(kind, &req.refresh_token)
        .await
        .or_reject(&state)?;
    Ok(Json(RefreshResponse {
        access_token: refreshed.access_token,
        expires_in: refreshed.expires_in,
    }))
}

async fn logout(
    state: AppState,
    kind: PrincipalKind,
    req: Body<RefreshTokenRequest>,
) -> ApiResult<SuccessResponse> {
    let req = body(&state, req)?;
    state
        .service
        .logout(kind, &req.refresh_token)
        .await
        .or_reject(&state)?;
    Ok(Json(OK))
}

async fn change_password(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    req: Body<ChangePasswordRequest>,
) -> ApiResult<SuccessResponse> {
    let req = body(&state, req)?;
    state
        .service
        .change_password(
            &claims,
            req.staff_id,
            req.old_password.as_deref(),
            &req.new_password,
        )
        .await
        .or_reject(&state)?;
    Ok(Json(OK))
}

/// Claims as issued; role and stores are the snapshot from login/refresh time
async fn me(Authenticated(claims): Authenticated) -> Json<AccessClaims> {
    Json(claims)
}

/// Context resolved now, reflecting changes made since the token was issued
async fn permission(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
) -> ApiResult<AuthorizationContext> {
    let context = state.service.permissions(&claims).await.or_reject(&state)?;
    Ok(Json(context))
}

// ----- staff administration -----

async fn change_role(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(staff_id): Path<i64>,
    req: Body<ChangeRoleRequest>,
) -> ApiResult<SuccessResponse> {
    let req = body(&state, req)?;
    state
        .service
        .change_role(&claims, staff_id, req.role)
        .await
        .or_reject(&state)?;
    Ok(Json(OK))
}

async fn set_active(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(staff_id): Path<i64>,
    req: Body<SetActiveRequest>,
) -> ApiResult<SuccessResponse> {
    let req = body(&state, req)?;
    state
        .service
        .set_active(&claims, staff_id, req.is_active)
        .await
        .or_reject(&state)?;
    Ok(Json(OK))
}

async fn grant_stores(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(staff_id): Path<i64>,
    req: Body<StoreBatchRequest>,
) -> ApiResult<SuccessResponse> {
    let req = body(&state, req)?;
    state
        .service
        .grant_store_access(&claims, staff_id, &req.store_ids)
        .await
        .or_reject(&state)?;
    Ok(Json(OK))
}

async fn revoke_stores(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(staff_id): Path<i64>,
    req: Body<StoreBatchRequest>,
) -> ApiResult<SuccessResponse> {
    let req = body(&state, req)?;
    state
        .service
        .revoke_store_access(&claims, staff_id, &req.store_ids)
        .await
        .or_reject(&state)?;
    Ok(Json(OK))
}

// ----- customer namespace -----

async fn customer_login(
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
    req: Body<LineLoginRequest>,
) -> ApiResult<LoginResponse> {
    let req = body(&state, req)?;
    let tokens = state
        .service
        .login_customer(&req.id_token, client)
        .await
        .or_reject(&state)?;
    Ok(Json(tokens.into()))
}

async fn customer_refresh(
    State(state): State<AppState>,
    req: Body<RefreshTokenRequest>,
) -> ApiResult<RefreshResponse> {
    refresh(state, PrincipalKind::Customer, req).await
}

async fn customer_logout(
    State(state): State<AppState>,
    req: Body<RefreshTokenRequest>,
) -> ApiResult<SuccessResponse> {
    logout(state, PrincipalKind::Customer, req).await
}
