use std::fmt;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::repo_types::{Credentials, NewUser, User, UserRow};

/// Column guarded by a unique constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
    GithubId,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UniqueField::Username => "Username",
            UniqueField::Email => "Email",
            UniqueField::GithubId => "GitHub account",
        })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} already exists")]
    Conflict(UniqueField),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence for user records. Implementations enforce uniqueness of
/// username, email (case-insensitive) and GitHub id atomically with the insert.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_github_id(&self, github_id: &str) -> anyhow::Result<Option<User>>;
    /// Persist mutable fields (username, email, last login).
    async fn save(&self, user: &User) -> Result<(), StoreError>;
}

const USER_COLUMNS: &str = "id, username, email, password_hash, auth_method, github_id, \
                            github_username, created_at, last_login_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {clause}");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;
        row.map(User::try_from).transpose()
    }
}

const UNIQUE_VIOLATION: &str = "23505";

/// Map a unique-violation to the field it guards.
fn conflict_from(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            let field = match db_err.constraint() {
                Some("users_username_key") => UniqueField::Username,
                Some("users_github_id_key") => UniqueField::GithubId,
                _ => UniqueField::Email,
            };
            return StoreError::Conflict(field);
        }
    }
    StoreError::Backend(err.into())
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let (password_hash, github_id, github_username) = match &new_user.credentials {
            Credentials::Manual { password_hash } => (Some(password_hash.as_str()), None, None),
            Credentials::Github {
                github_id,
                github_username,
            } => (None, Some(github_id.as_str()), Some(github_username.as_str())),
        };
        let sql = format!(
            r#"
            INSERT INTO users (id, username, email, password_hash, auth_method, github_id, github_username)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new_user.username)
            .bind(new_user.email.to_lowercase())
            .bind(password_hash)
            .bind(new_user.credentials.auth_method().as_str())
            .bind(github_id)
            .bind(github_username)
            .fetch_one(&self.db)
            .await
            .map_err(conflict_from)?;
        Ok(User::try_from(row)?)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        self.fetch_one_where("lower(email) = lower($1)", email).await
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        self.fetch_one_where("username = $1", username).await
    }

    async fn find_by_github_id(&self, github_id: &str) -> anyhow::Result<Option<User>> {
        self.fetch_one_where("github_id = $1", github_id).await
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
               SET username = $2, email = $3, last_login_at = $4
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(user.email.to_lowercase())
        .bind(user.last_login_at)
        .execute(&self.db)
        .await
        .map_err(conflict_from)?;
        Ok(())
    }
}
