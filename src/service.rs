//! Authentication flows
//!
//! Login, refresh, logout, password change and staff access administration.
//! Every flow that changes a principal writes to the directory first and
//! invalidates the cached context second; a failed invalidation is logged and
//! the stale entry ages out with the cache TTL.

use crate::auth::{
    authorize, can_access_all_stores, can_manage_role, AccessClaims, AccessRequirement,
    AuthorizationContext, IdentityVerifier, PasswordHasher, PrincipalKind, Role, StoreId,
    TokenIssuer,
};
use crate::cache::ContextCache;
use crate::error::AuthError;
use crate::storage::{NewSession, PrincipalDirectory, SessionStore, StaffRecord, StorageError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Where a login came from, recorded on the session row
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Tokens handed out by a successful login
#[derive(Debug, Clone)]
pub struct LoginTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    pub context: AuthorizationContext,
}

#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in: u64,
}

pub struct AuthService {
    issuer: TokenIssuer,
    sessions: Arc<dyn SessionStore>,
    directory: Arc<dyn PrincipalDirectory>,
    cache: Arc<ContextCache>,
    hasher: Arc<dyn PasswordHasher>,
    identity: Option<Arc<dyn IdentityVerifier>>,
    refresh_ttl: Duration,
}

impl AuthService {
    pub fn new(
        issuer: TokenIssuer,
        sessions: Arc<dyn SessionStore>,
        directory: Arc<dyn PrincipalDirectory>,
        cache: Arc<ContextCache>,
        hasher: Arc<dyn PasswordHasher>,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            issuer,
            sessions,
            directory,
            cache,
            hasher,
            identity: None,
            refresh_ttl,
        }
    }

    /// Enable customer login through an external identity provider
    pub fn with_identity_verifier(mut self, verifier: Arc<dyn IdentityVerifier>) -> Self {
        self.identity = Some(verifier);
        self
    }

    pub fn cache(&self) -> &Arc<ContextCache> {
        &self.cache
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    // ----- login / refresh / logout -----

    /// Username/password login for staff
    ///
    /// Unknown users, deactivated users and wrong passwords are indistinguishable.
    pub async fn login_staff(
        &self,
        username: &str,
        password: &str,
        client: ClientInfo,
    ) -> Result<LoginTokens, AuthError> {
        let staff = match self.directory.find_staff_by_username(username).await? {
            Some(staff) if staff.is_active => staff,
            _ => {
                debug!(username, "Staff login rejected: unknown or inactive");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self.hasher.verify(password, &staff.password_hash) {
            debug!(staff_id = staff.id, "Staff login rejected: bad password");
            return Err(AuthError::InvalidCredentials);
        }

        let context = self
            .cache
            .load(PrincipalKind::Staff, staff.id)
            .await
            .map_err(|e| match e {
                AuthError::PrincipalNotFound => AuthError::InvalidCredentials,
                other => other,
            })?;

        let tokens = self.open_session(context, client).await?;
        info!(staff_id = staff.id, role = ?tokens.context.role, "Staff logged in");
        Ok(tokens)
    }

    /// LINE login for customers; the customer row is created on first login
    pub async fn login_customer(
        &self,
        id_token: &str,
        client: ClientInfo,
    ) -> Result<LoginTokens, AuthError> {
        let verifier = self
            .identity
            .as_ref()
            .ok_or_else(|| AuthError::Internal("customer login is not configured".to_string()))?;

        let identity = verifier.verify(id_token).await?;
        let customer = self.directory.upsert_line_customer(&identity).await?;
        let context = self.cache.load(PrincipalKind::Customer, customer.id).await?;

        let tokens = self.open_session(context, client).await?;
        info!(customer_id = customer.id, "Customer logged in");
        Ok(tokens)
    }

    async fn open_session(
        &self,
        context: AuthorizationContext,
        client: ClientInfo,
    ) -> Result<LoginTokens, AuthError> {
        let access = self.issuer.issue_access_token(&context)?;
        let refresh_token = TokenIssuer::issue_refresh_token();

        self.sessions
            .create_session(NewSession {
                principal_id: context.principal_id,
                kind: context.kind,
                token: refresh_token.clone(),
                user_agent: client.user_agent,
                ip_address: client.ip_address,
                ttl: self.refresh_ttl,
            })
            .await?;

        self.cache.prime(&context).await;

        Ok(LoginTokens {
            access_token: access.token,
            refresh_token,
            expires_in: access.expires_in,
            context,
        })
    }

    /// New access token for a live refresh session; the refresh token is not rotated
    pub async fn refresh(
        &self,
        kind: PrincipalKind,
        refresh_token: &str,
    ) -> Result<RefreshedToken, AuthError> {
        let session = self
            .sessions
            .get_valid_session(kind, refresh_token)
            .await
            .map_err(|e| match e {
                StorageError::NotFound(_) => AuthError::RefreshTokenInvalid,
                other => AuthError::Storage(other),
            })?;

        let context = self
            .cache
            .resolve(kind, session.principal_id)
            .await
            .map_err(|e| match e {
                AuthError::PrincipalNotFound => AuthError::RefreshTokenInvalid,
                other => other,
            })?;

        let access = self.issuer.issue_access_token(&context)?;
        debug!(kind = %kind, principal_id = session.principal_id, session_id = session.id, "Access token refreshed");

        Ok(RefreshedToken {
            access_token: access.token,
            expires_in: access.expires_in,
        })
    }

    /// Revoke a refresh session; unknown, expired and already-revoked tokens succeed
    pub async fn logout(&self, kind: PrincipalKind, refresh_token: &str) -> Result<(), AuthError> {
        match self.sessions.revoke_session(kind, refresh_token).await? {
            Some(principal_id) => {
                info!(kind = %kind, principal_id, "Refresh session revoked");
                self.invalidate(kind, principal_id).await;
            }
            None => debug!(kind = %kind, "Logout for a session that was not live"),
        }
        Ok(())
    }

    // ----- request authentication -----

    /// Verify an access token and return its claims
    pub fn authenticate(&self, access_token: &str) -> Result<AccessClaims, AuthError> {
        Ok(self.issuer.verify_access_token(access_token)?)
    }

    /// Current context for the token's principal, via the cache
    pub async fn permissions(&self, claims: &AccessClaims) -> Result<AuthorizationContext, AuthError> {
        self.cache.resolve(claims.kind, claims.sub).await
    }

    /// Fresh context for `claims` checked against `requirement`
    pub async fn authorize(
        &self,
        claims: &AccessClaims,
        requirement: &AccessRequirement,
    ) -> Result<AuthorizationContext, AuthError> {
        let context = self.permissions(claims).await?;
        authorize(&context, requirement)?;
        Ok(context)
    }

    // ----- staff administration -----

    /// Change a staff password
    ///
    /// Staff changing their own password must present the current one. Only
    /// SUPER_ADMIN may change someone else's, and then no old password is needed.
    pub async fn change_password(
        &self,
        caller: &AccessClaims,
        target_id: i64,
        old_password: Option<&str>,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let caller = self.permissions(caller).await?;
        let caller_role = staff_role(&caller)?;
        let target = self.require_staff(target_id).await?;

        if caller.is(PrincipalKind::Staff, target_id) {
            let old = old_password
                .ok_or_else(|| AuthError::InvalidRequest("oldPassword is required".to_string()))?;
            if !self.hasher.verify(old, &target.password_hash) {
                return Err(AuthError::InvalidCredentials);
            }
        } else if caller_role != Role::SuperAdmin || !can_manage_role(Role::SuperAdmin, target.role) {
            return Err(AuthError::PermissionDenied(format!(
                "{} cannot change the password of staff {}",
                caller_role, target_id
            )));
        }

        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidRequest(format!(
                "newPassword must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let hash = self.hasher.hash(new_password).map_err(AuthError::Internal)?;
        self.directory.update_password_hash(target_id, &hash).await?;
        self.invalidate(PrincipalKind::Staff, target_id).await;

        info!(caller_id = caller.principal_id, target_id, "Password changed");
        Ok(())
    }

    pub async fn change_role(
        &self,
        caller: &AccessClaims,
        target_id: i64,
        new_role: Role,
    ) -> Result<(), AuthError> {
        let caller = self.permissions(caller).await?;
        let (caller_role, target) = self.managed_target(&caller, target_id).await?;

        if !can_manage_role(caller_role, new_role) {
            return Err(AuthError::PermissionDenied(format!(
                "{} cannot assign {}",
                caller_role, new_role
            )));
        }

        self.directory.update_role(target_id, new_role).await?;
        self.invalidate(PrincipalKind::Staff, target_id).await;

        info!(caller_id = caller.principal_id, target_id, from = %target.role, to = %new_role, "Role changed");
        Ok(())
    }

    /// Activate or deactivate a staff member
    ///
    /// Existing refresh sessions stay in place but stop working, since no
    /// context can be built for an inactive principal.
    pub async fn set_active(
        &self,
        caller: &AccessClaims,
        target_id: i64,
        active: bool,
    ) -> Result<(), AuthError> {
        let caller = self.permissions(caller).await?;
        self.managed_target(&caller, target_id).await?;

        self.directory.set_active(target_id, active).await?;
        self.invalidate(PrincipalKind::Staff, target_id).await;

        info!(caller_id = caller.principal_id, target_id, active, "Staff active state changed");
        Ok(())
    }

    pub async fn grant_store_access(
        &self,
        caller: &AccessClaims,
        target_id: i64,
        store_ids: &[StoreId],
    ) -> Result<(), AuthError> {
        let caller = self.permissions(caller).await?;
        self.check_store_batch(&caller, target_id, store_ids).await?;

        self.directory.grant_stores(target_id, store_ids).await.map_err(|e| match e {
            StorageError::NotFound(what) => AuthError::InvalidRequest(format!("unknown {}", what)),
            other => AuthError::Storage(other),
        })?;
        self.invalidate(PrincipalKind::Staff, target_id).await;

        info!(caller_id = caller.principal_id, target_id, stores = ?store_ids, "Store access granted");
        Ok(())
    }

    pub async fn revoke_store_access(
        &self,
        caller: &AccessClaims,
        target_id: i64,
        store_ids: &[StoreId],
    ) -> Result<(), AuthError> {
        let caller = self.permissions(caller).await?;
        self.check_store_batch(&caller, target_id, store_ids).await?;

        self.directory.revoke_stores(target_id, store_ids).await?;
        self.invalidate(PrincipalKind::Staff, target_id).await;

        info!(caller_id = caller.principal_id, target_id, stores = ?store_ids, "Store access revoked");
        Ok(())
    }

    async fn check_store_batch(
        &self,
        caller: &AuthorizationContext,
        target_id: i64,
        store_ids: &[StoreId],
    ) -> Result<(), AuthError> {
        if store_ids.is_empty() {
            return Err(AuthError::InvalidRequest("storeIds must not be empty".to_string()));
        }

        let (caller_role, _) = self.managed_target(caller, target_id).await?;
        if !can_access_all_stores(caller_role, &caller.store_list, store_ids) {
            return Err(AuthError::PermissionDenied(
                "batch includes stores outside the caller's grants".to_string(),
            ));
        }
        Ok(())
    }

    /// Target staff record, provided `caller` may manage it
    async fn managed_target(
        &self,
        caller: &AuthorizationContext,
        target_id: i64,
    ) -> Result<(Role, StaffRecord), AuthError> {
        let caller_role = staff_role(caller)?;

        if caller.is(PrincipalKind::Staff, target_id) {
            return Err(AuthError::PermissionDenied(
                "staff cannot modify their own access".to_string(),
            ));
        }

        let target = self.require_staff(target_id).await?;
        if !can_manage_role(caller_role, target.role) {
            return Err(AuthError::PermissionDenied(format!(
                "{} cannot manage {}",
                caller_role, target.role
            )));
        }

        // Store-scoped callers only reach staff working entirely inside their stores
        if caller_role != Role::SuperAdmin {
            let target_stores = self
                .directory
                .staff_store_list(target.id, target.role)
                .await?;
            let target_stores: Vec<StoreId> = target_stores.ids().collect();
            if !can_access_all_stores(caller_role, &caller.store_list, &target_stores) {
                return Err(AuthError::PermissionDenied(format!(
                    "staff {} works in stores outside the caller's grants",
                    target_id
                )));
            }
        }

        Ok((caller_role, target))
    }

    async fn require_staff(&self, staff_id: i64) -> Result<StaffRecord, AuthError> {
        self.directory
            .get_staff(staff_id)
            .await?
            .ok_or(AuthError::PrincipalNotFound)
    }

    async fn invalidate(&self, kind: PrincipalKind, principal_id: i64) {
        if let Err(e) = self.cache.invalidate(kind, principal_id).await {
            warn!(kind = %kind, principal_id, error = %e, "Context invalidation failed; entry will expire on its own");
        }
    }
}

fn staff_role(context: &AuthorizationContext) -> Result<Role, AuthError> {
    context
        .staff_role()
        .ok_or_else(|| AuthError::PermissionDenied("staff role required".to_string()))
}
