use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{AuthMethod, Credentials, User};
use crate::login_logs::LoginLogEntry;

#[derive(Debug, Serialize)]
pub struct GithubIdentity {
    pub id: String,
    pub username: String,
}

/// Caller's own user record. The password hash is never part of it.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub auth_method: AuthMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<GithubIdentity>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        let github = match &user.credentials {
            Credentials::Github {
                github_id,
                github_username,
            } => Some(GithubIdentity {
                id: github_id.clone(),
                username: github_username.clone(),
            }),
            Credentials::Manual { .. } => None,
        };
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            auth_method: user.auth_method(),
            github,
            created_at: user.created_at,
            last_login: user.last_login_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub success: bool,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct LoginHistoryResponse {
    pub success: bool,
    #[serde(rename = "loginLogs")]
    pub login_logs: Vec<LoginLogEntry>,
}
