use std::sync::Arc;

use crate::auth::github::{GithubClient, OAuthProvider};
use crate::auth::repo::{PgUserStore, UserStore};
use crate::config::AppConfig;
use crate::db;
use crate::login_logs::{LoginLogStore, PgLoginLogStore};
use crate::memory::{MemoryLoginLogStore, MemoryUserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub login_logs: Arc<dyn LoginLogStore>,
    pub github: Arc<dyn OAuthProvider>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let pool = db::connect(&config.database_url).await?;
        db::migrate(&pool).await?;

        let github = Arc::new(GithubClient::new(config.github.clone())?) as Arc<dyn OAuthProvider>;

        Ok(Self {
            users: Arc::new(PgUserStore::new(pool.clone())),
            login_logs: Arc::new(PgLoginLogStore::new(pool)),
            config,
            github,
        })
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        login_logs: Arc<dyn LoginLogStore>,
        github: Arc<dyn OAuthProvider>,
    ) -> Self {
        Self {
            config,
            users,
            login_logs,
            github,
        }
    }

    /// In-memory state with a provider that rejects every code.
    pub fn fake() -> Self {
        use async_trait::async_trait;

        use crate::auth::github::ProviderProfile;

        struct NoGithub;
        #[async_trait]
        impl OAuthProvider for NoGithub {
            fn authorize_url(&self, state: &str) -> String {
                format!("https://github.invalid/login/oauth/authorize?state={state}")
            }
            async fn exchange_code_for_profile(&self, _code: &str) -> anyhow::Result<ProviderProfile> {
                anyhow::bail!("github is not available in fake state")
            }
        }

        Self::from_parts(
            Arc::new(AppConfig::for_tests()),
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryLoginLogStore::new()),
            Arc::new(NoGithub),
        )
    }
}
