//! HTTP-level tests against the full router, backed by in-memory stores and a
//! scripted GitHub provider.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use authgate::auth::claims::Claims;
use authgate::auth::github::{OAuthProvider, ProviderProfile};
use authgate::auth::repo_types::AuthMethod;
use authgate::config::AppConfig;
use authgate::login_logs::{LoginLogStore, NewLoginLog};
use authgate::memory::{MemoryLoginLogStore, MemoryUserStore};
use authgate::{build_app, AppState};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::util::ServiceExt;

struct ScriptedGithub {
    profile: Option<ProviderProfile>,
}

#[async_trait]
impl OAuthProvider for ScriptedGithub {
    fn authorize_url(&self, state: &str) -> String {
        format!("https://github.test/login/oauth/authorize?state={state}")
    }

    async fn exchange_code_for_profile(&self, code: &str) -> anyhow::Result<ProviderProfile> {
        match (&self.profile, code) {
            (Some(p), "good-code") => Ok(p.clone()),
            _ => anyhow::bail!("bad verification code"),
        }
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    logs: Arc<MemoryLoginLogStore>,
}

fn test_app_with(profile: Option<ProviderProfile>) -> TestApp {
    let logs = Arc::new(MemoryLoginLogStore::new());
    let state = AppState::from_parts(
        Arc::new(AppConfig::for_tests()),
        Arc::new(MemoryUserStore::new()),
        logs.clone(),
        Arc::new(ScriptedGithub { profile }),
    );
    TestApp {
        router: build_app(state.clone()),
        state,
        logs,
    }
}

fn test_app() -> TestApp {
    test_app_with(None)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn send_raw(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "api-test")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn register(app: &Router, username: &str, email: &str, password: &str) -> (StatusCode, Value) {
    send(
        app,
        post_json(
            "/api/auth/register",
            json!({ "username": username, "email": email, "password": password }),
        ),
    )
    .await
}

async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
    send(
        app,
        post_json("/api/auth/login", json!({ "email": email, "password": password })),
    )
    .await
}

fn decode_claims(token: &str) -> Claims {
    let cfg = AppConfig::for_tests().jwt;
    let mut validation = jsonwebtoken::Validation::default();
    validation.set_audience(&[cfg.audience]);
    validation.set_issuer(&[cfg.issuer]);
    jsonwebtoken::decode::<Claims>(
        token,
        &jsonwebtoken::DecodingKey::from_secret(cfg.secret.as_bytes()),
        &validation,
    )
    .unwrap()
    .claims
}

#[tokio::test]
async fn register_login_profile_logout_scenario() {
    let t = test_app();

    let (status, body) = register(&t.router, "tester", "t@x.com", "Tes234!A").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "User registered successfully");
    assert!(body.get("token").is_none());

    let (status, body) = login(&t.router, "t@x.com", "Tes234!A").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["username"], "tester");
    assert_eq!(body["user"]["auth_method"], "manual");
    let token = body["token"].as_str().unwrap().to_string();

    let stored = t.state.users.find_by_email("t@x.com").await.unwrap().unwrap();
    let claims = decode_claims(&token);
    assert_eq!(claims.id, stored.id);
    assert_eq!(claims.username, stored.username);
    assert_eq!(claims.email, stored.email);
    assert!(stored.last_login_at.is_some());

    let (status, body) = send(&t.router, get("/api/users/profile", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "tester");
    assert!(body["user"].get("password_hash").is_none());
    assert!(body["user"].get("password").is_none());

    let logout = Request::builder()
        .method("POST")
        .uri("/api/auth/logout")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&t.router, logout).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged out successfully");

    let (status, body) = send(&t.router, get("/api/users/profile", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn verify_echoes_claims() {
    let t = test_app();
    register(&t.router, "tester", "t@x.com", "Tes234!A").await;
    let (_, body) = login(&t.router, "t@x.com", "Tes234!A").await;
    let token = body["token"].as_str().unwrap();

    let (status, body) = send(&t.router, get("/api/auth/verify", Some(token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Token is valid");
    assert_eq!(body["user"]["username"], "tester");
    assert_eq!(body["user"]["email"], "t@x.com");

    let (status, _) = send(&t.router, get("/api/auth/verify", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn weak_passwords_report_first_failed_rule() {
    let t = test_app();
    let cases = [
        ("Ab1!", "Password must be at least 8 characters long"),
        ("tes234!a", "Password must include at least one uppercase letter"),
        ("TES234!A", "Password must include at least one lowercase letter"),
        ("Tesabc!A", "Password must include at least one number"),
        ("Tes234aA", "Password must include at least one special character"),
    ];
    for (i, (password, message)) in cases.iter().enumerate() {
        let (status, body) =
            register(&t.router, &format!("weak{i}"), &format!("weak{i}@x.com"), password).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{password}");
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], *message);
    }
}

#[tokio::test]
async fn invalid_registration_input_is_rejected() {
    let t = test_app();
    let (status, body) = register(&t.router, "tester", "tksdk", "Tes234!A").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid email format");

    let (status, _) = send(&t.router, post_json("/api/auth/register", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let t = test_app();
    let (status, _) = register(&t.router, "first", "t@x.com", "Tes234!A").await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = register(&t.router, "second", "T@X.COM", "Tes234!A").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email already exists");
}

#[tokio::test]
async fn concurrent_duplicate_registrations_create_one_user() {
    let t = test_app();
    let mut handles = Vec::new();
    for i in 0..5 {
        let router = t.router.clone();
        handles.push(tokio::spawn(async move {
            register(&router, &format!("racer{i}"), "race@x.com", "Tes234!A").await.0
        }));
    }
    let mut created = 0;
    for h in handles {
        match h.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::BAD_REQUEST => {}
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(created, 1);
}

#[tokio::test]
async fn unknown_email_and_wrong_password_are_indistinguishable() {
    let t = test_app();
    register(&t.router, "tester", "t@x.com", "Tes234!A").await;

    let wrong = post_json("/api/auth/login", json!({ "email": "t@x.com", "password": "Wrong234!A" }));
    let unknown = post_json("/api/auth/login", json!({ "email": "nobody@x.com", "password": "Tes234!A" }));
    let (s1, b1) = send_raw(&t.router, wrong).await;
    let (s2, b2) = send_raw(&t.router, unknown).await;
    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!(s2, StatusCode::UNAUTHORIZED);
    assert_eq!(b1, b2);
    let body: Value = serde_json::from_slice(&b1).unwrap();
    assert_eq!(body["message"], "Incorrect email or password");
}

#[tokio::test]
async fn protected_routes_reject_missing_expired_and_tampered_tokens() {
    let t = test_app();
    register(&t.router, "tester", "t@x.com", "Tes234!A").await;
    let (_, body) = login(&t.router, "t@x.com", "Tes234!A").await;
    let token = body["token"].as_str().unwrap().to_string();
    let claims = decode_claims(&token);

    let cfg = AppConfig::for_tests().jwt;
    let now = time::OffsetDateTime::now_utc().unix_timestamp() as usize;
    let expired = encode(
        &Header::default(),
        &Claims {
            iat: now - 7200,
            exp: now - 3600,
            ..claims.clone()
        },
        &EncodingKey::from_secret(cfg.secret.as_bytes()),
    )
    .unwrap();
    let forged = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"someone-elses-secret"),
    )
    .unwrap();
    let mut tampered = token.clone();
    tampered.push('x');

    for bad in [None, Some(expired.as_str()), Some(forged.as_str()), Some(tampered.as_str())] {
        for uri in ["/api/users/profile", "/api/users/login-history"] {
            let (status, body) = send(&t.router, get(uri, bad)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri} {bad:?}");
            assert_eq!(body["success"], false);
        }
    }

    let basic = Request::builder()
        .uri("/api/users/profile")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&t.router, basic).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&t.router, get("/api/users/profile", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn profile_of_missing_user_is_not_found() {
    let t = test_app();
    let cfg = AppConfig::for_tests().jwt;
    let now = time::OffsetDateTime::now_utc().unix_timestamp() as usize;
    let orphan = encode(
        &Header::default(),
        &Claims {
            id: uuid::Uuid::new_v4(),
            username: "ghost".into(),
            email: "ghost@x.com".into(),
            iat: now,
            exp: now + 300,
            iss: cfg.issuer.clone(),
            aud: cfg.audience.clone(),
        },
        &EncodingKey::from_secret(cfg.secret.as_bytes()),
    )
    .unwrap();
    let (status, body) = send(&t.router, get("/api/users/profile", Some(&orphan))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "User not found");
}

#[tokio::test]
async fn login_history_is_limited_and_newest_first() {
    let t = test_app();
    register(&t.router, "tester", "t@x.com", "Tes234!A").await;
    let user = t.state.users.find_by_email("t@x.com").await.unwrap().unwrap();
    for i in 0..12 {
        t.logs
            .append(NewLoginLog::failure(
                Some(user.id),
                AuthMethod::Manual,
                &format!("seeded {i}"),
                "198.51.100.1",
                "seed",
            ))
            .await
            .unwrap();
    }
    let (_, body) = login(&t.router, "t@x.com", "Tes234!A").await;
    let token = body["token"].as_str().unwrap();

    let (status, body) = send(&t.router, get("/api/users/login-history", Some(token))).await;
    assert_eq!(status, StatusCode::OK);
    let logs = body["loginLogs"].as_array().unwrap();
    assert_eq!(logs.len(), 10);
    assert_eq!(logs[0]["status"], "success");
    assert_eq!(logs[0]["user_agent"], "api-test");
    assert_eq!(logs[0]["ip_address"], "unknown");
    assert_eq!(logs[1]["failure_reason"], "seeded 11");
    let stamps: Vec<time::OffsetDateTime> = logs
        .iter()
        .map(|l| {
            time::OffsetDateTime::parse(
                l["timestamp"].as_str().unwrap(),
                &time::format_description::well_known::Rfc3339,
            )
            .unwrap()
        })
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] >= w[1]));
}

fn octocat(email: Option<&str>) -> ProviderProfile {
    ProviderProfile {
        id: "583231".into(),
        username: "octocat".into(),
        email: email.map(str::to_string),
    }
}

fn location(res: &axum::response::Response) -> String {
    res.headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

fn callback(code: &str, state: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(format!(
        "/api/auth/github/callback?code={code}&state={state}"
    ));
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, format!("oauth_state={c}"));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn github_login_redirects_to_provider_with_state_cookie() {
    let t = test_app();
    let res = t.router.clone().oneshot(get("/api/auth/github", None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    let to = location(&res);
    assert!(to.starts_with("https://github.test/login/oauth/authorize?state="));
    let state = to.rsplit('=').next().unwrap();
    let cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cookie.contains(&format!("oauth_state={state}")));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn github_callback_creates_user_and_redirects_with_token() {
    let t = test_app_with(Some(octocat(Some("Octo@GitHub.com"))));
    let res = t
        .router
        .clone()
        .oneshot(callback("good-code", "s1", Some("s1")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    let to = location(&res);
    let token = to
        .strip_prefix("http://frontend.test/oauth-callback?token=")
        .expect("redirect to oauth-callback");
    let claims = decode_claims(token);
    assert_eq!(claims.username, "octocat");
    assert_eq!(claims.email, "octo@github.com");

    // same identity logs into the same account
    let res = t
        .router
        .clone()
        .oneshot(callback("good-code", "s2", Some("s2")))
        .await
        .unwrap();
    let again = decode_claims(
        location(&res)
            .strip_prefix("http://frontend.test/oauth-callback?token=")
            .unwrap(),
    );
    assert_eq!(again.id, claims.id);

    // a GitHub account cannot use the password endpoint
    let (status, body) = login(&t.router, "octo@github.com", "Tes234!A").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body["message"],
        "This account uses github authentication. Please log in with github."
    );

    let logs = t.logs.all().await;
    assert_eq!(
        logs.iter()
            .filter(|l| l.auth_method == AuthMethod::Github)
            .count(),
        2
    );
}

#[tokio::test]
async fn github_callback_refuses_email_owned_by_password_account() {
    let t = test_app_with(Some(octocat(Some("t@x.com"))));
    register(&t.router, "tester", "t@x.com", "Tes234!A").await;

    let res = t
        .router
        .clone()
        .oneshot(callback("good-code", "s", Some("s")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(
        location(&res),
        "http://frontend.test/login?error=Email+already+in+use+with+a+different+account"
    );

    // the password account is untouched and still works
    let (status, _) = login(&t.router, "t@x.com", "Tes234!A").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn github_callback_failures_redirect_with_error() {
    let t = test_app_with(Some(octocat(None)));

    let res = t.router.clone().oneshot(callback("good-code", "s", None)).await.unwrap();
    assert_eq!(location(&res), "http://frontend.test/login?error=Invalid+OAuth+state");

    let res = t
        .router
        .clone()
        .oneshot(callback("good-code", "s", Some("other")))
        .await
        .unwrap();
    assert_eq!(location(&res), "http://frontend.test/login?error=Invalid+OAuth+state");

    let res = t
        .router
        .clone()
        .oneshot(callback("bad-code", "s", Some("s")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(
        location(&res),
        "http://frontend.test/login?error=GitHub+authentication+failed"
    );

    let denied = Request::builder()
        .uri("/api/auth/github/callback?error=access_denied")
        .body(Body::empty())
        .unwrap();
    let res = t.router.clone().oneshot(denied).await.unwrap();
    assert_eq!(
        location(&res),
        "http://frontend.test/login?error=GitHub+authentication+failed"
    );
}

#[tokio::test]
async fn health_is_ok() {
    let t = test_app();
    let (status, body) = send_raw(&t.router, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

fn post_raw(uri: &str, content_type: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn malformed_register_body_is_a_validation_error() {
    let t = test_app();
    let requests = [
        post_json(
            "/api/auth/register",
            json!({ "username": 123, "email": "t@x.com", "password": "Tes234!A" }),
        ),
        post_raw("/api/auth/register", "application/json", "{not json"),
        post_raw("/api/auth/register", "text/plain", "username=tester"),
    ];
    for req in requests {
        let (status, body) = send(&t.router, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Invalid request body");
    }
}

#[tokio::test]
async fn malformed_login_body_counts_as_missing_credentials() {
    let t = test_app();
    let requests = [
        post_raw(
            "/api/auth/login",
            "application/x-www-form-urlencoded",
            "email=t%40x.com&password=Tes234!A",
        ),
        post_json("/api/auth/login", json!({ "email": null, "password": "x" })),
        post_raw("/api/auth/login", "application/json", "{not json"),
    ];
    for req in requests {
        let (status, body) = send(&t.router, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Missing credentials");
    }

    let logs = t.logs.all().await;
    assert_eq!(logs.len(), 3);
    assert!(logs
        .iter()
        .all(|l| l.user_id.is_none() && l.failure_reason.as_deref() == Some("Missing credentials")));
}

#[tokio::test]
async fn bearer_scheme_is_case_insensitive() {
    let t = test_app();
    register(&t.router, "tester", "t@x.com", "Tes234!A").await;
    let (_, body) = login(&t.router, "t@x.com", "Tes234!A").await;
    let token = body["token"].as_str().unwrap();

    for scheme in ["Bearer", "bearer", "BEARER", "bEaReR"] {
        let req = Request::builder()
            .uri("/api/users/profile")
            .header(header::AUTHORIZATION, format!("{scheme} {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&t.router, req).await;
        assert_eq!(status, StatusCode::OK, "{scheme}");
    }
}

#[tokio::test]
async fn login_records_peer_address_from_connect_info() {
    let t = test_app();
    register(&t.router, "tester", "t@x.com", "Tes234!A").await;

    let mut req = post_json(
        "/api/auth/login",
        json!({ "email": "t@x.com", "password": "Tes234!A" }),
    );
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([198, 51, 100, 23], 54321))));
    let (status, _) = send(&t.router, req).await;
    assert_eq!(status, StatusCode::OK);

    let logs = t.logs.all().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].ip_address, "198.51.100.23");
    assert_eq!(logs[0].user_agent, "api-test");
}
