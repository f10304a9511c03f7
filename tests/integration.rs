//! End-to-end tests for the auth flows
//!
//! Service-level scenarios first, then the same flows over HTTP.

mod common;

use common::{Harness, ACCESS_TTL};
use salon_auth::auth::{AccessRequirement, PrincipalKind, Role};
use salon_auth::cache::ContextCache;
use salon_auth::error::{AuthError, ErrorCatalog};
use salon_auth::service::ClientInfo;
use salon_auth::storage::{KvStore, SessionStore};
use serde_json::{json, Value};

#[tokio::test]
async fn test_admin_store_scope_end_to_end() {
    let h = Harness::new();
    h.dir.add_store(20, true);
    let alice = h.add_staff("alice", "alice-pass", Role::Admin, &[10]).await;
    let bob = h.add_staff("bob", "bob-pass", Role::Stylist, &[]).await;

    let tokens = h
        .service
        .login_staff("alice", "alice-pass", ClientInfo::default())
        .await
        .unwrap();
    let claims = h.service.authenticate(&tokens.access_token).unwrap();
    assert_eq!(claims.sub, alice);
    assert_eq!(claims.role, Some(Role::Admin));
    assert_eq!(claims.stores.ids().collect::<Vec<_>>(), vec![10]);

    // Store 10 is in scope
    h.service
        .authorize(&claims, &AccessRequirement::at_least(Role::Admin).in_store(10))
        .await
        .unwrap();
    h.service.grant_store_access(&claims, bob, &[10]).await.unwrap();

    // Store 20 is not
    assert!(matches!(
        h.service
            .authorize(&claims, &AccessRequirement::at_least(Role::Admin).in_store(20))
            .await,
        Err(AuthError::PermissionDenied(_))
    ));
    assert!(matches!(
        h.service.grant_store_access(&claims, bob, &[20]).await,
        Err(AuthError::PermissionDenied(_))
    ));

    h.service
        .logout(PrincipalKind::Staff, &tokens.refresh_token)
        .await
        .unwrap();
    assert!(matches!(
        h.service
            .refresh(PrincipalKind::Staff, &tokens.refresh_token)
            .await,
        Err(AuthError::RefreshTokenInvalid)
    ));
}

#[tokio::test]
async fn test_password_change_permissions_end_to_end() {
    let h = Harness::new();
    h.add_staff("root", "root-pass", Role::SuperAdmin, &[]).await;
    h.add_staff("mgr", "mgr-pass", Role::Manager, &[10]).await;
    let stylist = h.add_staff("sam", "sam-pass", Role::Stylist, &[10]).await;

    let mgr = h
        .service
        .authenticate(
            &h.service
                .login_staff("mgr", "mgr-pass", ClientInfo::default())
                .await
                .unwrap()
                .access_token,
        )
        .unwrap();
    assert!(matches!(
        h.service
            .change_password(&mgr, stylist, None, "fresh-password")
            .await,
        Err(AuthError::PermissionDenied(_))
    ));

    // Prime the stylist's cached context
    h.service
        .login_staff("sam", "sam-pass", ClientInfo::default())
        .await
        .unwrap();
    let key = ContextCache::key_for(PrincipalKind::Staff, stylist);
    assert!(h.kv.get(&key).await.unwrap().is_some());

    let root = h
        .service
        .authenticate(
            &h.service
                .login_staff("root", "root-pass", ClientInfo::default())
                .await
                .unwrap()
                .access_token,
        )
        .unwrap();
    h.service
        .change_password(&root, stylist, None, "fresh-password")
        .await
        .unwrap();

    assert!(h.kv.get(&key).await.unwrap().is_none());
    assert!(matches!(
        h.service
            .login_staff("sam", "sam-pass", ClientInfo::default())
            .await,
        Err(AuthError::InvalidCredentials)
    ));
    h.service
        .login_staff("sam", "fresh-password", ClientInfo::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_refresh_picks_up_role_change() {
    let h = Harness::new();
    h.add_staff("root", "root-pass", Role::SuperAdmin, &[]).await;
    let bob = h.add_staff("bob", "bob-pass", Role::Stylist, &[10]).await;

    let bob_tokens = h
        .service
        .login_staff("bob", "bob-pass", ClientInfo::default())
        .await
        .unwrap();
    let root_tokens = h
        .service
        .login_staff("root", "root-pass", ClientInfo::default())
        .await
        .unwrap();
    let root = h.service.authenticate(&root_tokens.access_token).unwrap();

    h.service.change_role(&root, bob, Role::Manager).await.unwrap();

    // Old token keeps its snapshot, a refreshed one carries the new role
    let old = h.service.authenticate(&bob_tokens.access_token).unwrap();
    assert_eq!(old.role, Some(Role::Stylist));

    let refreshed = h
        .service
        .refresh(PrincipalKind::Staff, &bob_tokens.refresh_token)
        .await
        .unwrap();
    let new = h.service.authenticate(&refreshed.access_token).unwrap();
    assert_eq!(new.role, Some(Role::Manager));
    assert_eq!(refreshed.expires_in, ACCESS_TTL.as_secs());
}

#[tokio::test]
async fn test_super_admin_sees_new_stores_after_invalidation() {
    let h = Harness::new();
    h.dir.add_store(1, true);
    h.add_staff("root", "root-pass", Role::SuperAdmin, &[]).await;
    let tokens = h
        .service
        .login_staff("root", "root-pass", ClientInfo::default())
        .await
        .unwrap();
    let claims = h.service.authenticate(&tokens.access_token).unwrap();
    assert_eq!(claims.stores.ids().collect::<Vec<_>>(), vec![1]);

    // SUPER_ADMIN passes store checks for stores it has never seen
    h.service
        .authorize(&claims, &AccessRequirement::at_least(Role::SuperAdmin).in_store(99))
        .await
        .unwrap();
}

// ----- HTTP -----

async fn login(server: &common::TestServer, username: &str, password: &str) -> Value {
    let resp = server
        .client
        .post(server.url("/auth/login"))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    resp.json().await.unwrap()
}

fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn test_http_login_refresh_logout() {
    let h = Harness::new();
    let alice = h.add_staff("alice", "alice-pass", Role::Admin, &[10]).await;
    let server = h.serve().await;

    let body = login(&server, "alice", "alice-pass").await;
    let access = body["accessToken"].as_str().unwrap().to_string();
    let refresh = body["refreshToken"].as_str().unwrap().to_string();
    assert_eq!(body["expiresIn"], 3600);

    let me: Value = server
        .client
        .get(server.url("/auth/me"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["sub"], alice);
    assert_eq!(me["role"], "ADMIN");
    assert_eq!(me["stores"], json!([10]));

    let resp = server
        .client
        .post(server.url("/auth/refresh"))
        .json(&json!({ "refreshToken": refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let refreshed: Value = resp.json().await.unwrap();
    assert!(refreshed["accessToken"].is_string());
    assert!(refreshed.get("refreshToken").is_none());

    for _ in 0..2 {
        let resp = server
            .client
            .post(server.url("/auth/logout"))
            .json(&json!({ "refreshToken": refresh }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        assert_eq!(resp.json::<Value>().await.unwrap(), json!({ "success": true }));
    }

    let resp = server
        .client
        .post(server.url("/auth/refresh"))
        .json(&json!({ "refreshToken": refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
    assert_eq!(
        error_code(&resp.json().await.unwrap()),
        "AUTH_REFRESH_TOKEN_INVALID"
    );

    assert!(h
        .sessions
        .get_valid_session(PrincipalKind::Staff, &refresh)
        .await
        .is_err());
}

#[tokio::test]
async fn test_http_error_codes() {
    let h = Harness::new();
    h.add_staff("alice", "alice-pass", Role::Admin, &[10]).await;
    let server = h.serve().await;

    let cases: Vec<(reqwest::RequestBuilder, u16, &str)> = vec![
        (
            server
                .client
                .post(server.url("/auth/login"))
                .json(&json!({ "username": "alice", "password": "nope" })),
            401,
            "AUTH_INVALID_CREDENTIALS",
        ),
        (
            server
                .client
                .post(server.url("/auth/login"))
                .json(&json!({ "username": "alice" })),
            400,
            "REQUEST_INVALID",
        ),
        (server.client.get(server.url("/auth/me")), 401, "AUTH_UNAUTHENTICATED"),
        (
            server.client.get(server.url("/auth/me")).bearer_auth("not.a.jwt"),
            401,
            "AUTH_TOKEN_MALFORMED",
        ),
        (
            server
                .client
                .get(server.url("/auth/me"))
                .header("authorization", "Basic YWxpY2U6cGFzcw=="),
            401,
            "AUTH_TOKEN_MALFORMED",
        ),
    ];

    for (request, status, code) in cases {
        let resp = request.send().await.unwrap();
        assert_eq!(resp.status().as_u16(), status, "expected {}", code);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(error_code(&body), code);
        assert!(body["error"]["message"].is_string());
    }
}

#[tokio::test]
async fn test_http_expired_and_forged_tokens() {
    let h = Harness::new();
    let alice = h.add_staff("alice", "alice-pass", Role::Admin, &[10]).await;
    let server = h.serve().await;

    let context = h.service.cache().load(PrincipalKind::Staff, alice).await.unwrap();
    let long_ago = chrono::Utc::now().timestamp() - 2 * ACCESS_TTL.as_secs() as i64;
    let expired = h.issuer().issue_access_token_at(&context, long_ago).unwrap();

    let resp = server
        .client
        .get(server.url("/auth/me"))
        .bearer_auth(&expired.token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
    assert_eq!(error_code(&resp.json().await.unwrap()), "AUTH_TOKEN_EXPIRED");

    let forged = salon_auth::TokenIssuer::new(
        b"some-other-secret-some-other-secret".to_vec(),
        ACCESS_TTL,
    )
    .issue_access_token(&context)
    .unwrap();
    let resp = server
        .client
        .get(server.url("/auth/me"))
        .bearer_auth(&forged.token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
    assert_eq!(error_code(&resp.json().await.unwrap()), "AUTH_TOKEN_INVALID");
}

#[tokio::test]
async fn test_http_staff_administration() {
    let h = Harness::new();
    h.dir.add_store(20, true);
    let alice = h.add_staff("alice", "alice-pass", Role::Admin, &[10]).await;
    let bob = h.add_staff("bob", "bob-pass", Role::Stylist, &[]).await;
    let server = h.serve().await;

    let admin = login(&server, "alice", "alice-pass").await["accessToken"]
        .as_str()
        .unwrap()
        .to_string();
    let stylist = login(&server, "bob", "bob-pass").await["accessToken"]
        .as_str()
        .unwrap()
        .to_string();

    // Stylists cannot administer anyone
    let resp = server
        .client
        .patch(server.url(&format!("/staff/{}/active", alice)))
        .bearer_auth(&stylist)
        .json(&json!({ "isActive": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = server
        .client
        .post(server.url(&format!("/staff/{}/stores", bob)))
        .bearer_auth(&admin)
        .json(&json!({ "storeIds": [10] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // Fresh context reflects the grant, token claims do not
    let permission: Value = server
        .client
        .get(server.url("/auth/permission"))
        .bearer_auth(&stylist)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(permission["storeList"], json!([10]));
    assert_eq!(permission["principalId"], bob);
    let me: Value = server
        .client
        .get(server.url("/auth/me"))
        .bearer_auth(&stylist)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["stores"], json!([]));

    let resp = server
        .client
        .post(server.url(&format!("/staff/{}/stores", bob)))
        .bearer_auth(&admin)
        .json(&json!({ "storeIds": [10, 20] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);
    assert_eq!(error_code(&resp.json().await.unwrap()), "AUTH_PERMISSION_DENIED");

    let resp = server
        .client
        .post(server.url(&format!("/staff/{}/stores", bob)))
        .bearer_auth(&admin)
        .json(&json!({ "storeIds": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let resp = server
        .client
        .patch(server.url(&format!("/staff/{}/role", bob)))
        .bearer_auth(&admin)
        .json(&json!({ "role": "MANAGER" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // No self-service promotion
    let resp = server
        .client
        .patch(server.url(&format!("/staff/{}/role", alice)))
        .bearer_auth(&admin)
        .json(&json!({ "role": "SUPER_ADMIN" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = server
        .client
        .delete(server.url(&format!("/staff/{}/stores", bob)))
        .bearer_auth(&admin)
        .json(&json!({ "storeIds": [10] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let resp = server
        .client
        .patch(server.url(&format!("/staff/{}/active", bob)))
        .bearer_auth(&admin)
        .json(&json!({ "isActive": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // A deactivated principal's context can no longer be resolved
    let resp = server
        .client
        .get(server.url("/auth/permission"))
        .bearer_auth(&stylist)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    assert_eq!(error_code(&resp.json().await.unwrap()), "AUTH_PRINCIPAL_NOT_FOUND");

}

#[tokio::test]
async fn test_http_admin_scoped_to_own_stores() {
    let h = Harness::new();
    h.add_staff("alice", "alice-pass", Role::Admin, &[10]).await;
    let bob = h.add_staff("bob", "bob-pass", Role::Manager, &[20]).await;
    let server = h.serve().await;

    let admin = login(&server, "alice", "alice-pass").await["accessToken"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = server
        .client
        .patch(server.url(&format!("/staff/{}/active", bob)))
        .bearer_auth(&admin)
        .json(&json!({ "isActive": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);
    assert_eq!(error_code(&resp.json().await.unwrap()), "AUTH_PERMISSION_DENIED");

    let resp = server
        .client
        .patch(server.url(&format!("/staff/{}/role", bob)))
        .bearer_auth(&admin)
        .json(&json!({ "role": "STYLIST" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    // Bob is untouched and can still log in
    login(&server, "bob", "bob-pass").await;
}

#[tokio::test]
async fn test_http_password_change() {
    let h = Harness::new();
    let alice = h.add_staff("alice", "alice-pass", Role::Admin, &[10]).await;
    let server = h.serve().await;
    let token = login(&server, "alice", "alice-pass").await["accessToken"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = server
        .client
        .patch(server.url("/auth/password"))
        .json(&json!({ "staffId": alice, "oldPassword": "alice-pass", "newPassword": "brand-new-pass" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    let resp = server
        .client
        .patch(server.url("/auth/password"))
        .bearer_auth(&token)
        .json(&json!({ "staffId": alice, "oldPassword": "alice-pass", "newPassword": "brand-new-pass" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    login(&server, "alice", "brand-new-pass").await;
}

#[tokio::test]
async fn test_http_customer_namespace() {
    let h = Harness::new();
    h.add_staff("alice", "alice-pass", Role::Admin, &[10]).await;
    let bob = h.add_staff("bob", "bob-pass", Role::Stylist, &[10]).await;
    let server = h.serve().await;

    let resp = server
        .client
        .post(server.url("/customer/auth/line-login"))
        .json(&json!({ "idToken": "garbage" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    let resp = server
        .client
        .post(server.url("/customer/auth/line-login"))
        .header("user-agent", "LINE/13.0")
        .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
        .json(&json!({ "idToken": "line:U77:Yui" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    let access = body["accessToken"].as_str().unwrap().to_string();
    let refresh = body["refreshToken"].as_str().unwrap().to_string();

    let session = h.sessions.get_raw(PrincipalKind::Customer, &refresh).unwrap();
    assert_eq!(session.user_agent.as_deref(), Some("LINE/13.0"));
    assert_eq!(session.ip_address.as_deref(), Some("203.0.113.9"));

    // Customer tokens are not staff tokens
    let resp = server
        .client
        .post(server.url(&format!("/staff/{}/stores", bob)))
        .bearer_auth(&access)
        .json(&json!({ "storeIds": [10] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = server
        .client
        .post(server.url("/auth/refresh"))
        .json(&json!({ "refreshToken": refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    let resp = server
        .client
        .post(server.url("/customer/auth/refresh"))
        .json(&json!({ "refreshToken": refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let resp = server
        .client
        .post(server.url("/customer/auth/logout"))
        .json(&json!({ "refreshToken": refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let resp = server
        .client
        .post(server.url("/customer/auth/refresh"))
        .json(&json!({ "refreshToken": refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    // Second login with the same LINE account maps to the same customer
    let again: Value = server
        .client
        .post(server.url("/customer/auth/line-login"))
        .json(&json!({ "idToken": "line:U77:Yui Tanaka" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let claims = h
        .service
        .authenticate(again["accessToken"].as_str().unwrap())
        .unwrap();
    assert_eq!(claims.kind, PrincipalKind::Customer);
    assert_eq!(claims.username, "Yui Tanaka");
    assert_eq!(h.dir.customer_count(), 1);
}

#[tokio::test]
async fn test_http_catalog_overrides() {
    let h = Harness::new();
    h.add_staff("alice", "alice-pass", Role::Admin, &[10]).await;
    let catalog = ErrorCatalog::from_json(
        r#"{"InvalidCredentials":{"code":"LOGIN_FAILED","status":403,"message":"login failed"}}"#,
    )
    .unwrap();
    let server = h.serve_with_catalog(catalog).await;

    let resp = server
        .client
        .post(server.url("/auth/login"))
        .json(&json!({ "username": "alice", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "error": { "code": "LOGIN_FAILED", "message": "login failed" } }));
}

#[tokio::test]
async fn test_http_health() {
    let h = Harness::new();
    let server = h.serve().await;
    let resp = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}
