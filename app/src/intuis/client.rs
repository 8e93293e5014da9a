use std::sync::Arc;

use infrastructure::meter;
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::core::time::{DateTimeRange, Duration};

use super::IntuisError;
use super::schema::*;
use super::session::SessionManager;

const HOMES_DATA: &str = "/api/homesdata";
const HOME_STATUS: &str = "/syncapi/v1/homestatus";
const SET_STATE: &str = "/syncapi/v1/setstate";
const HOME_MEASURE: &str = "/api/gethomemeasure";

const MEASURE_SCALE: &str = "1hour";
const MEASURE_STEP_SECS: i64 = 3600;
const MEASURE_TYPE: &str = "sum_energy_elec";

/// Authenticated access to the Intuis cloud API.
#[derive(Clone)]
pub struct IntuisClient {
    http: ClientWithMiddleware,
    base_url: String,
    sessions: Arc<SessionManager>,
    timeout: Duration,
}

/// Room addressed by a measurement request.
#[derive(Debug, Clone)]
pub struct MeasureTarget {
    pub room_id: String,
    pub bridge_id: String,
}

impl IntuisClient {
    pub fn new(http: ClientWithMiddleware, base_url: &str, sessions: Arc<SessionManager>, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            sessions,
            timeout,
        }
    }

    pub async fn homes_data(&self) -> Result<HomesDataBody, IntuisError> {
        let request = self.http.get(self.url(HOMES_DATA));
        self.call(HOMES_DATA, request).await
    }

    pub async fn home_status(&self, home_id: &str) -> Result<HomeStatusBody, IntuisError> {
        let request = self.http.get(self.url(HOME_STATUS)).query(&[("home_id", home_id)]);
        self.call(HOME_STATUS, request).await
    }

    pub async fn set_room_state(
        &self,
        home_id: &str,
        room_id: &str,
        mode: &str,
        temperature: Option<f64>,
    ) -> Result<(), IntuisError> {
        let payload = SetStateRequest {
            home: SetStateHome {
                id: home_id.to_owned(),
                rooms: vec![SetStateRoom {
                    id: room_id.to_owned(),
                    therm_setpoint_mode: mode.to_owned(),
                    therm_setpoint_temperature: temperature,
                }],
                modules: vec![],
            },
        };

        self.set_state(payload).await
    }

    pub async fn set_module_mode(
        &self,
        home_id: &str,
        module_id: &str,
        bridge_id: &str,
        mode: &str,
    ) -> Result<(), IntuisError> {
        let payload = SetStateRequest {
            home: SetStateHome {
                id: home_id.to_owned(),
                rooms: vec![],
                modules: vec![SetStateModule {
                    id: module_id.to_owned(),
                    bridge: bridge_id.to_owned(),
                    mode: mode.to_owned(),
                }],
            },
        };

        self.set_state(payload).await
    }

    pub async fn home_measure(
        &self,
        home_id: &str,
        targets: &[MeasureTarget],
        range: &DateTimeRange,
    ) -> Result<MeasureBody, IntuisError> {
        let payload = MeasureRequest {
            date_begin: range.start().timestamp(),
            date_end: range.end().timestamp(),
            scale: MEASURE_SCALE,
            step_time: MEASURE_STEP_SECS,
            home: MeasureRequestHome {
                id: home_id.to_owned(),
                rooms: targets
                    .iter()
                    .map(|t| MeasureRequestRoom {
                        id: t.room_id.clone(),
                        bridge: t.bridge_id.clone(),
                        measure_types: vec![MEASURE_TYPE],
                    })
                    .collect(),
            },
        };

        let request = self.http.post(self.url(HOME_MEASURE)).json(&payload);
        self.call(HOME_MEASURE, request).await
    }

    async fn set_state(&self, payload: SetStateRequest) -> Result<(), IntuisError> {
        tracing::info!("Sending state change: {}", serde_json::to_string(&payload).unwrap_or_default());

        let request = self.http.post(self.url(SET_STATE)).json(&payload);
        //acknowledgements usually carry no body, only error payloads matter
        match self.call::<serde_json::Value>(SET_STATE, request).await {
            Ok(_) | Err(IntuisError::NoDataAvailable { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    #[tracing::instrument(skip(self, request))]
    async fn call<T: DeserializeOwned>(&self, endpoint: &'static str, request: RequestBuilder) -> Result<T, IntuisError> {
        let session = self.sessions.ensure_valid().await?;

        let result = self.send(endpoint, request.bearer_auth(session.token)).await;
        meter::increment(
            "intuis_upstream_calls",
            &[
                ("endpoint", endpoint),
                ("result", result.as_ref().map(|_| "ok").unwrap_or_else(|e| e.kind())),
            ],
        );

        result
    }

    async fn send<T: DeserializeOwned>(&self, endpoint: &str, request: RequestBuilder) -> Result<T, IntuisError> {
        let response = request
            .timeout(self.timeout.into())
            .send()
            .await
            .map_err(|e| IntuisError::unavailable(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IntuisError::unavailable(endpoint, format!("status {}", status)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| IntuisError::unavailable(endpoint, e))?;

        decode(endpoint, &text)
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, text: &str) -> Result<T, IntuisError> {
    if text.trim().is_empty() {
        return Err(IntuisError::no_data(endpoint));
    }

    let envelope: Envelope<T> = serde_json::from_str(text)
        .map_err(|e| IntuisError::upstream(endpoint, format!("malformed response: {}", e)))?;

    if let Some(error) = envelope.error {
        return Err(IntuisError::upstream(endpoint, error));
    }

    envelope.body.ok_or_else(|| IntuisError::no_data(endpoint))
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::core::time::DateTime;
    use crate::intuis::session::Credentials;
    use assert_json_diff::assert_json_eq;
    use infrastructure::HttpClientConfig;
    use mockito::{Matcher, Mock, Server, ServerGuard};
    use serde_json::json;

    /// Client against a mock server that always hands out a token.
    pub async fn mock_client() -> (ServerGuard, Mock, IntuisClient) {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(r#"{"access_token": "test-token"}"#)
            .create_async()
            .await;

        let http = HttpClientConfig::new(std::time::Duration::from_secs(5))
            .new_tracing_client()
            .unwrap();
        let sessions = SessionManager::new(
            http.clone(),
            &server.url(),
            Credentials {
                username: "user".to_owned(),
                password: "pass".to_owned(),
                client_id: "id".to_owned(),
                client_secret: "secret".to_owned(),
                user_prefix: "muller".to_owned(),
                scope: "read_muller write_muller".to_owned(),
            },
            Duration::hours(1),
            Duration::seconds(5),
        );
        let client = IntuisClient::new(http, &server.url(), Arc::new(sessions), Duration::seconds(5));

        (server, token, client)
    }

    #[tokio::test]
    async fn status_request_carries_token_and_home() {
        let (mut server, _token, client) = mock_client().await;
        let mock = server
            .mock("GET", "/syncapi/v1/homestatus")
            .match_query(Matcher::UrlEncoded("home_id".into(), "home-1".into()))
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_body(r#"{"body": {"home": {"id": "home-1", "rooms": [{"id": "r1", "therm_measured_temperature": 20.5}]}}}"#)
            .create_async()
            .await;

        let status = client.home_status("home-1").await.unwrap();

        assert_eq!(status.home.rooms[0].therm_measured_temperature, Some(20.5));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_payload_is_upstream_error() {
        let (mut server, _token, client) = mock_client().await;
        server
            .mock("GET", "/api/homesdata")
            .with_status(200)
            .with_body(r#"{"error": {"code": 2, "message": "Invalid access token"}}"#)
            .create_async()
            .await;

        let result = client.homes_data().await;

        assert!(matches!(result, Err(IntuisError::UpstreamError { .. })));
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let (mut server, _token, client) = mock_client().await;
        server
            .mock("GET", "/syncapi/v1/homestatus")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let result = client.home_status("home-1").await;

        assert!(matches!(result, Err(IntuisError::UpstreamUnavailable { .. })));
    }

    #[tokio::test]
    async fn missing_body_is_no_data() {
        let (mut server, _token, client) = mock_client().await;
        server
            .mock("GET", "/syncapi/v1/homestatus")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status": "ok"}"#)
            .create_async()
            .await;

        let result = client.home_status("home-1").await;

        assert!(matches!(result, Err(IntuisError::NoDataAvailable { .. })));
    }

    #[tokio::test]
    async fn room_state_payload() {
        let (mut server, _token, client) = mock_client().await;
        let mock = server
            .mock("POST", "/syncapi/v1/setstate")
            .match_body(Matcher::Json(json!({
                "home": {
                    "id": "home-1",
                    "rooms": [{"id": "r1", "therm_setpoint_mode": "manual", "therm_setpoint_temperature": 21.5}]
                }
            })))
            .with_status(200)
            .with_body(r#"{"status": "ok", "body": {}}"#)
            .create_async()
            .await;

        client.set_room_state("home-1", "r1", "manual", Some(21.5)).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn acknowledgement_without_body_is_success() {
        let (mut server, _token, client) = mock_client().await;
        server
            .mock("POST", "/syncapi/v1/setstate")
            .with_status(200)
            .with_body(r#"{"status": "ok", "time_server": 1730646000}"#)
            .create_async()
            .await;

        let result = client.set_module_mode("home-1", "boiler-1", "gw-1", "auto").await;

        assert!(result.is_ok());
    }

    #[test]
    fn measure_request_payload() {
        let range = DateTimeRange::new(
            DateTime::from_timestamp(1_700_000_000).unwrap(),
            DateTime::from_timestamp(1_700_043_200).unwrap(),
        );
        let payload = MeasureRequest {
            date_begin: range.start().timestamp(),
            date_end: range.end().timestamp(),
            scale: MEASURE_SCALE,
            step_time: MEASURE_STEP_SECS,
            home: MeasureRequestHome {
                id: "home-1".to_owned(),
                rooms: vec![MeasureRequestRoom {
                    id: "r1".to_owned(),
                    bridge: "g1".to_owned(),
                    measure_types: vec![MEASURE_TYPE],
                }],
            },
        };

        assert_json_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "date_begin": 1_700_000_000,
                "date_end": 1_700_043_200,
                "scale": "1hour",
                "step_time": 3600,
                "home": {"id": "home-1", "rooms": [{"id": "r1", "bridge": "g1", "type": ["sum_energy_elec"]}]}
            })
        );
    }
}
