use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    auth::{
        dto::RegisterRequest,
        extractors::ClientInfo,
        github::ProviderProfile,
        jwt::JwtKeys,
        password::{dummy_hash, hash_password_blocking, validate_password, verify_password_blocking},
        repo::{StoreError, UniqueField},
        repo_types::{AuthMethod, Credentials, NewUser, User},
    },
    error::{AppError, AppResult},
    login_logs::NewLoginLog,
    state::AppState,
};

pub const INVALID_CREDENTIALS: &str = "Incorrect email or password";
pub const MISSING_CREDENTIALS: &str = "Missing credentials";
pub const EMAIL_TAKEN_BY_OTHER_ACCOUNT: &str = "Email already in use with a different account";
pub const USERNAME_TAKEN_BY_OTHER_ACCOUNT: &str = "Username already in use with a different account";
pub const GITHUB_USERNAME_UNSUPPORTED: &str = "GitHub username must be between 3 and 30 characters";

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 30;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn duplicate_message(field: UniqueField) -> String {
    format!("{field} already exists")
}

fn wrong_provider_message(method: AuthMethod) -> String {
    format!("This account uses {method} authentication. Please log in with {method}.")
}

/// Append to the audit log. Failures are logged and swallowed: an audit
/// outage never changes the outcome of an authentication.
pub async fn record_attempt(state: &AppState, entry: NewLoginLog) {
    let status = entry.status;
    if let Err(e) = state.login_logs.append(entry).await {
        warn!(error = %e, status = status.as_str(), "login log write failed");
    }
}

/// Validate and create a password account. No token is issued.
pub async fn register(state: &AppState, payload: RegisterRequest) -> AppResult<User> {
    let username = payload.username.trim().to_string();
    let email = payload.email.trim().to_lowercase();
    let password = payload.password;

    if username.is_empty() || email.is_empty() || password.is_empty() {
        return Err(AppError::Validation(
            "Username, email and password are required".into(),
        ));
    }
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(AppError::Validation(format!(
            "Username must be between {USERNAME_MIN} and {USERNAME_MAX} characters"
        )));
    }
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::Validation("Invalid email format".into()));
    }

    // Friendly early answer; the store constraint below is what guarantees uniqueness.
    if state.users.find_by_username(&username).await?.is_some() {
        return Err(AppError::Validation(duplicate_message(UniqueField::Username)));
    }
    if state.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::Validation(duplicate_message(UniqueField::Email)));
    }

    validate_password(&password).map_err(|v| AppError::Validation(v.to_string()))?;
    let password_hash = hash_password_blocking(password).await?;

    let user = state
        .users
        .create_user(NewUser {
            username,
            email,
            credentials: Credentials::Manual { password_hash },
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(field) => {
                warn!(field = %field, "registration lost uniqueness race");
                AppError::Validation(duplicate_message(field))
            }
            StoreError::Backend(e) => AppError::Internal(e),
        })?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user)
}

/// Match email and password against the store. Unknown email and wrong
/// password produce the same rejection.
pub async fn verify_credentials(
    state: &AppState,
    email: &str,
    password: &str,
    client: &ClientInfo,
) -> AppResult<User> {
    let email = email.trim().to_lowercase();
    let reject = |user: Option<&User>, reason: String| {
        let entry = NewLoginLog::failure(
            user.map(|u| u.id),
            AuthMethod::Manual,
            &reason,
            &client.ip_address,
            &client.user_agent,
        );
        (entry, AppError::Unauthorized(reason))
    };

    if email.is_empty() || password.is_empty() {
        let (entry, err) = reject(None, MISSING_CREDENTIALS.into());
        record_attempt(state, entry).await;
        return Err(err);
    }

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        // Same argon2 cost as a wrong password, so response time does not reveal the account.
        verify_password_blocking(password.to_string(), dummy_hash().await?.to_string()).await?;
        let (entry, err) = reject(None, INVALID_CREDENTIALS.into());
        record_attempt(state, entry).await;
        return Err(err);
    };

    let Some(hash) = user.password_hash() else {
        warn!(user_id = %user.id, method = %user.auth_method(), "login with wrong auth method");
        let (entry, err) = reject(Some(&user), wrong_provider_message(user.auth_method()));
        record_attempt(state, entry).await;
        return Err(err);
    };

    if !verify_password_blocking(password.to_string(), hash.to_string()).await? {
        warn!(user_id = %user.id, "login invalid password");
        let (entry, err) = reject(Some(&user), INVALID_CREDENTIALS.into());
        record_attempt(state, entry).await;
        return Err(err);
    }

    record_attempt(
        state,
        NewLoginLog::success(user.id, AuthMethod::Manual, &client.ip_address, &client.user_agent),
    )
    .await;
    Ok(user)
}

/// Resolve a provider identity to a local user, creating one on first login.
/// Never attaches a GitHub identity to an existing account with the same email.
pub async fn resolve_github_profile(
    state: &AppState,
    profile: &ProviderProfile,
    client: &ClientInfo,
) -> AppResult<User> {
    let outcome = link_github_profile(state, profile).await;
    match &outcome {
        Ok(user) => {
            record_attempt(
                state,
                NewLoginLog::success(user.id, AuthMethod::Github, &client.ip_address, &client.user_agent),
            )
            .await
        }
        Err(AppError::Unauthorized(reason)) => {
            warn!(github_id = %profile.id, reason = %reason, "github login rejected");
            record_attempt(
                state,
                NewLoginLog::failure(
                    None,
                    AuthMethod::Github,
                    reason,
                    &client.ip_address,
                    &client.user_agent,
                ),
            )
            .await
        }
        Err(_) => {}
    }
    outcome
}

async fn link_github_profile(state: &AppState, profile: &ProviderProfile) -> AppResult<User> {
    if let Some(user) = state.users.find_by_github_id(&profile.id).await? {
        return Ok(user);
    }
    // The login becomes the local username verbatim, so it must satisfy the same length rule.
    let len = profile.username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(AppError::Unauthorized(GITHUB_USERNAME_UNSUPPORTED.into()));
    }

    let email = profile
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());
    if let Some(email) = &email {
        if state.users.find_by_email(email).await?.is_some() {
            return Err(AppError::Unauthorized(EMAIL_TAKEN_BY_OTHER_ACCOUNT.into()));
        }
    }
    let email = email.unwrap_or_else(|| format!("{}@github.com", profile.username.to_lowercase()));

    let user = state
        .users
        .create_user(NewUser {
            username: profile.username.clone(),
            email,
            credentials: Credentials::Github {
                github_id: profile.id.clone(),
                github_username: profile.username.clone(),
            },
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(UniqueField::Username) => {
                AppError::Unauthorized(USERNAME_TAKEN_BY_OTHER_ACCOUNT.into())
            }
            StoreError::Conflict(_) => AppError::Unauthorized(EMAIL_TAKEN_BY_OTHER_ACCOUNT.into()),
            StoreError::Backend(e) => AppError::Internal(e),
        })?;

    info!(user_id = %user.id, github_id = %profile.id, "github user created");
    Ok(user)
}

/// Stamp `last_login_at` and sign a token for an authenticated user.
pub async fn complete_login(state: &AppState, mut user: User) -> AppResult<(User, String)> {
    user.last_login_at = Some(OffsetDateTime::now_utc());
    state.users.save(&user).await.map_err(|e| match e {
        StoreError::Conflict(field) => AppError::Internal(anyhow::anyhow!("{field} conflict on save")),
        StoreError::Backend(e) => AppError::Internal(e),
    })?;
    let token = JwtKeys::from(&state.config.jwt).sign(&user)?;
    info!(user_id = %user.id, method = %user.auth_method(), "user logged in");
    Ok((user, token))
}
