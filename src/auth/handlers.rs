use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::{
    cookie::{Cookie, CookieJar, SameSite},
    WithRejection,
};
use rand::{distributions::Alphanumeric, Rng};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            GithubCallbackQuery, LoginRequest, LoginResponse, MessageResponse, PublicUser,
            RegisterRequest, VerifyResponse,
        },
        extractors::{AuthUser, ClientInfo},
        repo_types::AuthMethod,
        services,
    },
    error::{AppError, AppResult},
    login_logs::NewLoginLog,
    state::AppState,
};

const OAUTH_STATE_COOKIE: &str = "oauth_state";
const OAUTH_STATE_PATH: &str = "/api/auth/github";
const GITHUB_FAILED: &str = "GitHub authentication failed";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/github", get(github_login))
        .route("/auth/github/callback", get(github_callback))
        .route("/auth/verify", get(verify_token))
        .route("/auth/logout", post(logout))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<RegisterRequest>, AppError>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    services::register(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::ok("User registered successfully")),
    ))
}

#[instrument(skip(state, payload, client))]
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<LoginResponse>> {
    // An unreadable body is a login attempt without credentials.
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "unreadable login body");
            LoginRequest::default()
        }
    };
    let user =
        services::verify_credentials(&state, &payload.email, &payload.password, &client).await?;
    let (user, token) = services::complete_login(&state, user).await?;
    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful".into(),
        token,
        user: PublicUser::from(&user),
    }))
}

/// 302 Found with a `Location` header.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn frontend_redirect(frontend_url: &str, path: &str, key: &str, value: &str) -> String {
    format!(
        "{}/{}?{}={}",
        frontend_url.trim_end_matches('/'),
        path,
        key,
        url::form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>()
    )
}

#[instrument(skip(state, jar))]
pub async fn github_login(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Response) {
    let csrf: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    let cookie = Cookie::build((OAUTH_STATE_COOKIE, csrf.clone()))
        .path(OAUTH_STATE_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(10))
        .build();
    (jar.add(cookie), found(&state.github.authorize_url(&csrf)))
}

#[instrument(skip(state, jar, query, client))]
pub async fn github_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    client: ClientInfo,
    Query(query): Query<GithubCallbackQuery>,
) -> (CookieJar, Response) {
    let frontend = state.config.frontend_url.clone();
    let expected = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    let jar = jar.remove(Cookie::build(OAUTH_STATE_COOKIE).path(OAUTH_STATE_PATH));
    let fail = |message: &str| found(&frontend_redirect(&frontend, "login", "error", message));

    if let Some(err) = query.error.as_deref() {
        warn!(error = %err, description = ?query.error_description, "github denied authorization");
        let message = query.error_description.as_deref().unwrap_or(GITHUB_FAILED);
        return (jar, fail(message));
    }
    match (&expected, &query.state) {
        (Some(expected), Some(got)) if expected == got => {}
        _ => {
            warn!("github callback with missing or mismatched state");
            return (jar, fail("Invalid OAuth state"));
        }
    }
    let Some(code) = query.code.as_deref().filter(|c| !c.is_empty()) else {
        return (jar, fail(GITHUB_FAILED));
    };

    let profile = match state.github.exchange_code_for_profile(code).await {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "github code exchange failed");
            services::record_attempt(
                &state,
                NewLoginLog::failure(
                    None,
                    AuthMethod::Github,
                    GITHUB_FAILED,
                    &client.ip_address,
                    &client.user_agent,
                ),
            )
            .await;
            return (jar, fail(GITHUB_FAILED));
        }
    };

    let outcome = match services::resolve_github_profile(&state, &profile, &client).await {
        Ok(user) => services::complete_login(&state, user).await,
        Err(e) => Err(e),
    };
    match outcome {
        Ok((user, token)) => {
            info!(user_id = %user.id, "github login redirect");
            let to = frontend_redirect(&frontend, "oauth-callback", "token", &token);
            (jar, found(&to))
        }
        Err(AppError::Unauthorized(reason)) => (jar, fail(reason.as_str())),
        Err(e) => {
            error!(error = %e, "github login failed");
            (jar, fail(GITHUB_FAILED))
        }
    }
}

#[instrument(skip_all)]
pub async fn verify_token(AuthUser(claims): AuthUser) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        success: true,
        message: "Token is valid".into(),
        user: claims,
    })
}

/// Tokens are stateless; the client discards its copy. The token itself
/// stays valid until it expires.
#[instrument(skip_all)]
pub async fn logout(AuthUser(claims): AuthUser) -> Json<MessageResponse> {
    info!(user_id = %claims.id, "logout acknowledged");
    Json(MessageResponse::ok("Logged out successfully"))
}
