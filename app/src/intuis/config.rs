use std::sync::Arc;

use infrastructure::HttpClientConfig;
use serde::Deserialize;

use crate::core::time::Duration;

use super::IntuisClient;
use super::session::{Credentials, SessionManager};

#[derive(Debug, Clone, Deserialize)]
pub struct IntuisConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_user_prefix")]
    pub user_prefix: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_timeout")]
    pub auth_timeout: Duration,
    #[serde(default = "default_timeout")]
    pub request_timeout: Duration,
    #[serde(default = "default_session_ttl")]
    pub session_ttl: Duration,
}

fn default_base_url() -> String {
    "https://app.muller-intuitiv.net".to_owned()
}

fn default_user_prefix() -> String {
    "muller".to_owned()
}

fn default_scope() -> String {
    "read_muller write_muller".to_owned()
}

fn default_timeout() -> Duration {
    Duration::seconds(10)
}

fn default_session_ttl() -> Duration {
    Duration::hours(1)
}

impl IntuisConfig {
    pub fn new_client(&self) -> anyhow::Result<IntuisClient> {
        let upper_bound = self.auth_timeout.max(self.request_timeout);
        let http = HttpClientConfig::new(upper_bound.into())
            .with_user_agent(concat!("intuis-sync/", env!("CARGO_PKG_VERSION")))
            .new_tracing_client()?;

        let sessions = SessionManager::new(
            http.clone(),
            &self.base_url,
            Credentials {
                username: self.username.clone(),
                password: self.password.clone(),
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
                user_prefix: self.user_prefix.clone(),
                scope: self.scope.clone(),
            },
            self.session_ttl,
            self.auth_timeout,
        );

        Ok(IntuisClient::new(
            http,
            &self.base_url,
            Arc::new(sessions),
            self.request_timeout,
        ))
    }
}
