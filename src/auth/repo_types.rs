use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// How a user's identity was established.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Manual,
    Github,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Manual => "manual",
            AuthMethod::Github => "github",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "manual" => Some(AuthMethod::Manual),
            "github" => Some(AuthMethod::Github),
            _ => None,
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential material, tied to the auth method. A GitHub account never
/// carries a password hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Manual {
        password_hash: String,
    },
    Github {
        github_id: String,
        github_username: String,
    },
}

impl Credentials {
    pub fn auth_method(&self) -> AuthMethod {
        match self {
            Credentials::Manual { .. } => AuthMethod::Manual,
            Credentials::Github { .. } => AuthMethod::Github,
        }
    }
}

/// User record.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String, // always lowercased
    pub credentials: Credentials,
    pub created_at: OffsetDateTime,
    pub last_login_at: Option<OffsetDateTime>,
}

impl User {
    pub fn auth_method(&self) -> AuthMethod {
        self.credentials.auth_method()
    }

    pub fn password_hash(&self) -> Option<&str> {
        match &self.credentials {
            Credentials::Manual { password_hash } => Some(password_hash),
            Credentials::Github { .. } => None,
        }
    }
}

/// Fields required to create a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub credentials: Credentials,
}

/// Flat `users` row as stored in Postgres.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub auth_method: String,
    pub github_id: Option<String>,
    pub github_username: Option<String>,
    pub created_at: OffsetDateTime,
    pub last_login_at: Option<OffsetDateTime>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let method = AuthMethod::parse(&row.auth_method)
            .ok_or_else(|| anyhow::anyhow!("unknown auth_method {:?}", row.auth_method))?;
        let credentials = match method {
            AuthMethod::Manual => Credentials::Manual {
                password_hash: row
                    .password_hash
                    .ok_or_else(|| anyhow::anyhow!("manual user {} has no password", row.id))?,
            },
            AuthMethod::Github => Credentials::Github {
                github_id: row
                    .github_id
                    .ok_or_else(|| anyhow::anyhow!("github user {} has no github_id", row.id))?,
                github_username: row.github_username.unwrap_or_default(),
            },
        };
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            credentials,
            created_at: row.created_at,
            last_login_at: row.last_login_at,
        })
    }
}
