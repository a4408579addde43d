//! GitHub OAuth 2.0 authorization-code flow.
//!
//! The session layer only sees [`ProviderProfile`]; token exchange and the
//! GitHub REST calls stay behind [`OAuthProvider`].

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::GithubConfig;

const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const API_BASE: &str = "https://api.github.com";
const SCOPE: &str = "user:email";

/// Identity disclosed by the provider after a successful code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// URL the browser is sent to; `state` is echoed back on the callback.
    fn authorize_url(&self, state: &str) -> String;
    async fn exchange_code_for_profile(&self, code: &str) -> anyhow::Result<ProviderProfile>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: u64,
    login: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

pub struct GithubClient {
    http: reqwest::Client,
    config: GithubConfig,
}

impl GithubClient {
    pub fn new(config: GithubConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("authgate/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .context("build github http client")?;
        Ok(Self { http, config })
    }

    async fn access_token(&self, code: &str) -> anyhow::Result<String> {
        let res: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.callback_url.as_str()),
            ])
            .send()
            .await
            .context("github token request")?
            .error_for_status()?
            .json()
            .await
            .context("decode github token response")?;

        match res.access_token {
            Some(token) => Ok(token),
            None => anyhow::bail!(
                "github token exchange failed: {} {}",
                res.error.unwrap_or_default(),
                res.error_description.unwrap_or_default()
            ),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
    ) -> anyhow::Result<T> {
        let value = self
            .http
            .get(format!("{API_BASE}{path}"))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .with_context(|| format!("github GET {path}"))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("decode github {path}"))?;
        Ok(value)
    }
}

/// Primary verified address if any, else the first verified one.
fn pick_email(emails: &[GithubEmail]) -> Option<String> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.verified))
        .map(|e| e.email.clone())
}

#[async_trait]
impl OAuthProvider for GithubClient {
    fn authorize_url(&self, state: &str) -> String {
        let mut url = Url::parse(AUTHORIZE_URL).expect("static authorize url is valid");
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.callback_url)
            .append_pair("scope", SCOPE)
            .append_pair("state", state);
        url.into()
    }

    async fn exchange_code_for_profile(&self, code: &str) -> anyhow::Result<ProviderProfile> {
        let token = self.access_token(code).await?;
        let user: GithubUser = self.get_json("/user", &token).await?;
        let email = match user.email {
            Some(email) => Some(email),
            None => {
                let emails: Vec<GithubEmail> = self.get_json("/user/emails", &token).await?;
                pick_email(&emails)
            }
        };
        debug!(github_id = user.id, login = %user.login, "github profile fetched");
        Ok(ProviderProfile {
            id: user.id.to_string(),
            username: user.login,
            email,
        })
    }
}
