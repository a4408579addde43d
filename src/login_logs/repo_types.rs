use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::AuthMethod;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoginStatus {
    Success,
    Failure,
}

impl LoginStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginStatus::Success => "success",
            LoginStatus::Failure => "failure",
        }
    }
}

/// One login attempt. Immutable once appended.
#[derive(Debug, Clone, Serialize)]
pub struct LoginLogEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub ip_address: String,
    pub user_agent: String,
    pub status: LoginStatus,
    pub auth_method: AuthMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Attempt to record; id and timestamp are assigned on append.
#[derive(Debug, Clone)]
pub struct NewLoginLog {
    pub user_id: Option<Uuid>,
    pub ip_address: String,
    pub user_agent: String,
    pub status: LoginStatus,
    pub auth_method: AuthMethod,
    pub failure_reason: Option<String>,
}

impl NewLoginLog {
    pub fn success(user_id: Uuid, auth_method: AuthMethod, ip_address: &str, user_agent: &str) -> Self {
        Self {
            user_id: Some(user_id),
            ip_address: ip_address.to_string(),
            user_agent: user_agent.to_string(),
            status: LoginStatus::Success,
            auth_method,
            failure_reason: None,
        }
    }

    pub fn failure(
        user_id: Option<Uuid>,
        auth_method: AuthMethod,
        reason: &str,
        ip_address: &str,
        user_agent: &str,
    ) -> Self {
        Self {
            user_id,
            ip_address: ip_address.to_string(),
            user_agent: user_agent.to_string(),
            status: LoginStatus::Failure,
            auth_method,
            failure_reason: Some(reason.to_string()),
        }
    }

    pub fn into_entry(self, timestamp: OffsetDateTime) -> LoginLogEntry {
        LoginLogEntry {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            timestamp,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            status: self.status,
            auth_method: self.auth_method,
            failure_reason: self.failure_reason,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct LoginLogRow {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub timestamp: OffsetDateTime,
    pub ip_address: String,
    pub user_agent: String,
    pub status: String,
    pub auth_method: String,
    pub failure_reason: Option<String>,
}

impl TryFrom<LoginLogRow> for LoginLogEntry {
    type Error = anyhow::Error;

    fn try_from(r: LoginLogRow) -> Result<Self, Self::Error> {
        let status = match r.status.as_str() {
            "success" => LoginStatus::Success,
            "failure" => LoginStatus::Failure,
            other => anyhow::bail!("unknown login status {other:?}"),
        };
        let auth_method = AuthMethod::parse(&r.auth_method)
            .ok_or_else(|| anyhow::anyhow!("unknown auth_method {:?}", r.auth_method))?;
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            timestamp: r.timestamp,
            ip_address: r.ip_address,
            user_agent: r.user_agent,
            status,
            auth_method,
            failure_reason: r.failure_reason,
        })
    }
}
