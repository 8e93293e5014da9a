use std::time::Duration;

use reqwest_middleware::ClientWithMiddleware;
use reqwest_tracing::TracingMiddleware;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct HttpClientConfig {
    timeout_secs: u64,
    user_agent: Option<String>,
}

impl HttpClientConfig {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout_secs: timeout.as_secs().max(1),
            user_agent: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = Some(user_agent.to_owned());
        self
    }

    //every request carries an upper bound, individual calls may shorten it
    pub fn new_tracing_client(&self) -> anyhow::Result<ClientWithMiddleware> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(self.timeout_secs));

        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }

        let client = builder.build()?;

        Ok(reqwest_middleware::ClientBuilder::new(client)
            .with(TracingMiddleware::default())
            .build())
    }
}
