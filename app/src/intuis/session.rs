use infrastructure::meter;
use reqwest_middleware::ClientWithMiddleware;
use tokio::sync::Mutex;

use crate::core::time::{DateTime, Duration};

use super::IntuisError;
use super::schema::TokenResponse;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
    pub user_prefix: String,
    pub scope: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub issued_at: DateTime,
    pub ttl: Duration,
}

impl Session {
    fn is_valid_at(&self, now: DateTime) -> bool {
        now.elapsed_since(self.issued_at) < self.ttl
    }
}

/// Owns the bearer token. The slot lock is held across a renewal, so callers arriving meanwhile
/// wait for that renewal and then reuse its token.
pub struct SessionManager {
    http: ClientWithMiddleware,
    token_url: String,
    credentials: Credentials,
    ttl: Duration,
    timeout: Duration,
    current: Mutex<Option<Session>>,
}

impl SessionManager {
    pub fn new(
        http: ClientWithMiddleware,
        base_url: &str,
        credentials: Credentials,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            token_url: format!("{}/oauth2/token", base_url.trim_end_matches('/')),
            credentials,
            ttl,
            timeout,
            current: Mutex::new(None),
        }
    }

    pub async fn ensure_valid(&self) -> Result<Session, IntuisError> {
        let mut current = self.current.lock().await;
        let now = DateTime::now();

        if let Some(session) = current.as_ref().filter(|s| s.is_valid_at(now)) {
            return Ok(session.clone());
        }

        //existing session is only replaced once a new token is in hand
        let session = self.renew().await?;
        *current = Some(session.clone());

        Ok(session)
    }

    #[tracing::instrument(skip(self))]
    async fn renew(&self) -> Result<Session, IntuisError> {
        tracing::info!("Renewing Intuis session for {}", self.credentials.username);

        let result = self.request_token().await;
        meter::increment(
            "intuis_session_renewals",
            &[("result", if result.is_ok() { "ok" } else { "failed" })],
        );

        let token = result.inspect_err(|e| tracing::error!("Session renewal failed: {}", e))?;

        Ok(Session {
            token,
            issued_at: DateTime::now(),
            ttl: self.ttl,
        })
    }

    async fn request_token(&self) -> Result<String, IntuisError> {
        let c = &self.credentials;
        let form = [
            ("client_id", c.client_id.as_str()),
            ("client_secret", c.client_secret.as_str()),
            ("grant_type", "password"),
            ("user_prefix", c.user_prefix.as_str()),
            ("scope", c.scope.as_str()),
            ("username", c.username.as_str()),
            ("password", c.password.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .timeout(self.timeout.into())
            .form(&form)
            .send()
            .await
            .map_err(IntuisError::authentication)?;

        if !response.status().is_success() {
            return Err(IntuisError::authentication(format!(
                "token endpoint answered with status {}",
                response.status()
            )));
        }

        let token: TokenResponse = response.json().await.map_err(IntuisError::authentication)?;

        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| IntuisError::authentication("response contains no access token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::FIXED_NOW;
    use infrastructure::HttpClientConfig;
    use mockito::{Matcher, Server};

    fn manager(url: &str) -> SessionManager {
        let http = HttpClientConfig::new(std::time::Duration::from_secs(5))
            .new_tracing_client()
            .unwrap();

        SessionManager::new(
            http,
            url,
            Credentials {
                username: "jane@example.com".to_owned(),
                password: "secret".to_owned(),
                client_id: "client".to_owned(),
                client_secret: "client-secret".to_owned(),
                user_prefix: "muller".to_owned(),
                scope: "read_muller write_muller".to_owned(),
            },
            Duration::hours(1),
            Duration::seconds(10),
        )
    }

    fn at(iso: &str) -> DateTime {
        DateTime::from_iso(iso).unwrap()
    }

    #[tokio::test]
    async fn renews_only_when_expired() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "password".into()),
                Matcher::UrlEncoded("username".into(), "jane@example.com".into()),
                Matcher::UrlEncoded("scope".into(), "read_muller write_muller".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"access_token": "token-1", "expires_in": 10800}"#)
            .expect(2)
            .create_async()
            .await;

        let sessions = manager(&server.url());

        let first = FIXED_NOW
            .scope(at("2024-11-03T10:00:00Z"), sessions.ensure_valid())
            .await
            .unwrap();
        let still_valid = FIXED_NOW
            .scope(at("2024-11-03T10:59:59Z"), sessions.ensure_valid())
            .await
            .unwrap();
        let renewed = FIXED_NOW
            .scope(at("2024-11-03T11:00:00Z"), sessions.ensure_valid())
            .await
            .unwrap();

        assert_eq!(first.token, "token-1");
        assert_eq!(still_valid.issued_at, first.issued_at);
        assert_eq!(renewed.issued_at, at("2024-11-03T11:00:00Z"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_renewal() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(r#"{"access_token": "token-1"}"#)
            .expect(1)
            .create_async()
            .await;

        let sessions = manager(&server.url());

        let (a, b) = tokio::join!(sessions.ensure_valid(), sessions.ensure_valid());

        assert_eq!(a.unwrap().token, b.unwrap().token);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failed_renewal_keeps_previous_session() {
        let mut server = Server::new_async().await;
        let ok = server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(r#"{"access_token": "token-1"}"#)
            .expect(1)
            .create_async()
            .await;

        let sessions = manager(&server.url());
        FIXED_NOW
            .scope(at("2024-11-03T10:00:00Z"), sessions.ensure_valid())
            .await
            .unwrap();
        ok.remove_async().await;

        let failing = server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .expect(1)
            .create_async()
            .await;

        let result = FIXED_NOW
            .scope(at("2024-11-03T12:00:00Z"), sessions.ensure_valid())
            .await;

        assert!(matches!(result, Err(IntuisError::AuthenticationFailed { .. })));
        let kept = sessions.current.lock().await.clone().unwrap();
        assert_eq!(kept.token, "token-1");
        failing.assert_async().await;
    }
}
