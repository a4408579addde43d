//! In-process stores backing `AppState::fake()` and the test suites.

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::auth::repo::{StoreError, UniqueField, UserStore};
use crate::auth::repo_types::{Credentials, NewUser, User};
use crate::login_logs::{LoginLogEntry, LoginLogStore, NewLoginLog};

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn github_id_of(user: &User) -> Option<&str> {
    match &user.credentials {
        Credentials::Github { github_id, .. } => Some(github_id),
        Credentials::Manual { .. } => None,
    }
}

/// First unique field `candidate` would collide on, ignoring the row with `skip` id.
fn collision(users: &[User], candidate: &User, skip: Option<Uuid>) -> Option<UniqueField> {
    for u in users.iter().filter(|u| Some(u.id) != skip) {
        if u.username == candidate.username {
            return Some(UniqueField::Username);
        }
        if u.email.eq_ignore_ascii_case(&candidate.email) {
            return Some(UniqueField::Email);
        }
        if let (Some(a), Some(b)) = (github_id_of(u), github_id_of(candidate)) {
            if a == b {
                return Some(UniqueField::GithubId);
            }
        }
    }
    None
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email.to_lowercase(),
            credentials: new_user.credentials,
            created_at: OffsetDateTime::now_utc(),
            last_login_at: None,
        };
        // check and insert under the same lock
        let mut users = self.users.lock().await;
        if let Some(field) = collision(&users, &user, None) {
            return Err(StoreError::Conflict(field));
        }
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_by_github_id(&self, github_id: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users
            .iter()
            .find(|u| github_id_of(u) == Some(github_id))
            .cloned())
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.lock().await;
        if let Some(field) = collision(&users, user, Some(user.id)) {
            return Err(StoreError::Conflict(field));
        }
        let stored = users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| anyhow::anyhow!("user {} does not exist", user.id))?;
        stored.username = user.username.clone();
        stored.email = user.email.to_lowercase();
        stored.last_login_at = user.last_login_at;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLoginLogStore {
    entries: Mutex<Vec<LoginLogEntry>>,
}

impl MemoryLoginLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry in append order.
    pub async fn all(&self) -> Vec<LoginLogEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl LoginLogStore for MemoryLoginLogStore {
    async fn append(&self, entry: NewLoginLog) -> anyhow::Result<LoginLogEntry> {
        let entry = entry.into_entry(OffsetDateTime::now_utc());
        self.entries.lock().await.push(entry.clone());
        Ok(entry)
    }

    async fn recent_for_user(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<LoginLogEntry>> {
        let entries = self.entries.lock().await;
        let mut mine: Vec<LoginLogEntry> = entries
            .iter()
            .rev()
            .filter(|e| e.user_id == Some(user_id))
            .cloned()
            .collect();
        // stable sort keeps later appends first among equal timestamps
        mine.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        mine.truncate(limit.max(0) as usize);
        Ok(mine)
    }
}
