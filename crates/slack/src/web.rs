//! Slack Web API calls used by the bot

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use pesto_core::config::SlackConfig;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const BASE_RETRY_DELAY_MS: u64 = 500;
const MAX_RETRY_DELAY_MS: u64 = 10_000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum SlackApiError {
    #[error("slack http error during {operation}: {source}")]
    Http { operation: &'static str, source: reqwest::Error },
    #[error("slack {operation} returned status {status}")]
    Status { operation: &'static str, status: u16 },
    #[error("slack {operation} failed: {error}")]
    Api { operation: &'static str, error: String },
    #[error("slack {operation} stayed rate limited after {attempts} attempt(s)")]
    RateLimited { operation: &'static str, attempts: u32 },
    #[error("slack {operation} response missing `{field}`")]
    MissingField { operation: &'static str, field: &'static str },
    #[error("slack client misconfigured: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

/// Outbound side of the bot, kept behind a trait so the pipeline can be
/// exercised without Slack.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn post_thread_reply(
        &self,
        channel_id: &str,
        thread_ts: &str,
        text: &str,
    ) -> Result<PostedMessage, SlackApiError>;

    /// Best human-readable name for a member, if Slack knows one.
    async fn display_name(&self, user_id: &str) -> Result<Option<String>, SlackApiError>;
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenSocketResponse {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    #[serde(default)]
    user: Option<SlackUser>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackUser {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    profile: SlackProfile,
}

#[derive(Debug, Default, Deserialize)]
struct SlackProfile {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
}

impl SlackUser {
    fn best_name(self) -> Option<String> {
        [self.profile.display_name, self.profile.real_name, self.real_name, self.name]
            .into_iter()
            .flatten()
            .map(|name| name.trim().to_owned())
            .find(|name| !name.is_empty())
    }
}

#[derive(Clone)]
pub struct SlackWebClient {
    http: reqwest::Client,
    api_base: String,
    app_token: SecretString,
    bot_token: SecretString,
    max_attempts: u32,
    base_delay_ms: u64,
}

impl std::fmt::Debug for SlackWebClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackWebClient")
            .field("api_base", &self.api_base)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl SlackWebClient {
    pub fn from_config(config: &SlackConfig) -> Result<Self, SlackApiError> {
        Self::new(&config.api_base, config.app_token.clone(), config.bot_token.clone())
    }

    pub fn new(
        api_base: &str,
        app_token: SecretString,
        bot_token: SecretString,
    ) -> Result<Self, SlackApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| SlackApiError::Configuration(error.to_string()))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_owned(),
            app_token,
            bot_token,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: BASE_RETRY_DELAY_MS,
        })
    }

    pub fn with_retry(mut self, max_attempts: u32, base_delay_ms: u64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Asks Slack for a fresh Socket Mode websocket URL.
    pub async fn open_socket_url(&self) -> Result<String, SlackApiError> {
        const OPERATION: &str = "apps.connections.open";
        let response: OpenSocketResponse = self
            .request_json(OPERATION, || {
                self.http
                    .post(format!("{}/{OPERATION}", self.api_base))
                    .bearer_auth(self.app_token.expose_secret())
            })
            .await?;

        response
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or(SlackApiError::MissingField { operation: OPERATION, field: "url" })
    }

    async fn request_json<T, F>(
        &self,
        operation: &'static str,
        mut builder: F,
    ) -> Result<T, SlackApiError>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_u32;
        loop {
            attempt += 1;
            let response = builder()
                .header("x-pesto-retry-attempt", (attempt - 1).to_string())
                .send()
                .await
                .map_err(|source| SlackApiError::Http { operation, source })?;

            let status = response.status();
            let retry_after = parse_retry_after(response.headers());
            let rate_limited = if status.as_u16() == 429 {
                true
            } else if !status.is_success() {
                return Err(SlackApiError::Status { operation, status: status.as_u16() });
            } else {
                let body: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|source| SlackApiError::Http { operation, source })?;
                let envelope: ApiEnvelope = serde_json::from_value(body.clone())
                    .map_err(|error| SlackApiError::Api { operation, error: error.to_string() })?;
                match (envelope.ok, envelope.error.as_deref()) {
                    (true, _) => {
                        return serde_json::from_value(body).map_err(|error| SlackApiError::Api {
                            operation,
                            error: error.to_string(),
                        })
                    }
                    (false, Some("ratelimited")) => true,
                    (false, error) => {
                        return Err(SlackApiError::Api {
                            operation,
                            error: error.unwrap_or("unknown_error").to_owned(),
                        })
                    }
                }
            };

            if rate_limited && attempt < self.max_attempts {
                let delay = retry_delay(self.base_delay_ms, attempt, retry_after);
                warn!(
                    event_name = "slack.api.rate_limited",
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "slack rate limited request, backing off"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            return Err(SlackApiError::RateLimited { operation, attempts: attempt });
        }
    }
}

#[async_trait]
impl MessageGateway for SlackWebClient {
    async fn post_thread_reply(
        &self,
        channel_id: &str,
        thread_ts: &str,
        text: &str,
    ) -> Result<PostedMessage, SlackApiError> {
        const OPERATION: &str = "chat.postMessage";
        let payload = json!({
            "channel": channel_id,
            "thread_ts": thread_ts,
            "text": text,
            "unfurl_links": false,
            "unfurl_media": false,
        });

        let response: PostMessageResponse = self
            .request_json(OPERATION, || {
                self.http
                    .post(format!("{}/{OPERATION}", self.api_base))
                    .bearer_auth(self.bot_token.expose_secret())
                    .json(&payload)
            })
            .await?;

        debug!(
            event_name = "slack.api.message_posted",
            channel_id,
            thread_ts,
            "thread reply posted"
        );
        Ok(PostedMessage {
            channel: response.channel.unwrap_or_else(|| channel_id.to_owned()),
            ts: response
                .ts
                .ok_or(SlackApiError::MissingField { operation: OPERATION, field: "ts" })?,
        })
    }

    async fn display_name(&self, user_id: &str) -> Result<Option<String>, SlackApiError> {
        const OPERATION: &str = "users.info";
        let response: UserInfoResponse = self
            .request_json(OPERATION, || {
                self.http
                    .get(format!("{}/{OPERATION}", self.api_base))
                    .bearer_auth(self.bot_token.expose_secret())
                    .query(&[("user", user_id)])
            })
            .await?;

        Ok(response.user.and_then(SlackUser::best_name))
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Exponential from `base_delay_ms`, unless Slack said how long to wait.
pub fn retry_delay(base_delay_ms: u64, attempt: u32, retry_after: Option<Duration>) -> Duration {
    if let Some(retry_after) = retry_after {
        return retry_after.min(Duration::from_millis(MAX_RETRY_DELAY_MS));
    }
    let exponent = attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_delay_ms.saturating_mul(1_u64 << exponent).min(MAX_RETRY_DELAY_MS))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;
    use serde_json::json;

    use super::{retry_delay, MessageGateway, SlackApiError, SlackWebClient};

    fn client(server: &MockServer) -> SlackWebClient {
        SlackWebClient::new(
            &server.base_url(),
            "xapp-test".to_owned().into(),
            "xoxb-test".to_owned().into(),
        )
        .expect("client")
        .with_retry(3, 1)
    }

    #[tokio::test]
    async fn posts_reply_in_thread() {
        let server = MockServer::start();
        let post = server.mock(|when, then| {
            when.method(POST)
                .path("/chat.postMessage")
                .header("authorization", "Bearer xoxb-test")
                .body_includes("\"thread_ts\":\"1.0\"")
                .body_includes("<@U1>, this one's for you!");
            then.status(200).json_body(json!({"ok": true, "channel": "C1", "ts": "1.5"}));
        });

        let posted = client(&server)
            .post_thread_reply("C1", "1.0", "<@U1>, this one's for you!")
            .await
            .expect("posted");

        assert_eq!(posted.ts, "1.5");
        assert_eq!(post.calls(), 1);
    }

    #[tokio::test]
    async fn retries_rate_limits_then_succeeds() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(POST).path("/chat.postMessage").header("x-pesto-retry-attempt", "0");
            then.status(429).header("retry-after", "0").body("rate limited");
        });
        let second = server.mock(|when, then| {
            when.method(POST).path("/chat.postMessage").header("x-pesto-retry-attempt", "1");
            then.status(200).json_body(json!({"ok": false, "error": "ratelimited"}));
        });
        let third = server.mock(|when, then| {
            when.method(POST).path("/chat.postMessage").header("x-pesto-retry-attempt", "2");
            then.status(200).json_body(json!({"ok": true, "channel": "C1", "ts": "2.0"}));
        });

        let posted = client(&server).post_thread_reply("C1", "1.0", "hi").await.expect("posted");

        assert_eq!(posted.ts, "2.0");
        assert_eq!((first.calls(), second.calls(), third.calls()), (1, 1, 1));
    }

    #[tokio::test]
    async fn gives_up_after_three_rate_limited_attempts() {
        let server = MockServer::start();
        let limited = server.mock(|when, then| {
            when.method(POST).path("/chat.postMessage");
            then.status(429).header("retry-after", "0");
        });

        let error =
            client(&server).post_thread_reply("C1", "1.0", "hi").await.expect_err("limited");

        assert!(matches!(error, SlackApiError::RateLimited { attempts: 3, .. }));
        assert_eq!(limited.calls(), 3);
    }

    #[tokio::test]
    async fn api_errors_are_not_retried() {
        let server = MockServer::start();
        let failing = server.mock(|when, then| {
            when.method(POST).path("/chat.postMessage");
            then.status(200).json_body(json!({"ok": false, "error": "channel_not_found"}));
        });

        let error = client(&server).post_thread_reply("C1", "1.0", "hi").await.expect_err("fails");

        assert!(matches!(
            error,
            SlackApiError::Api { ref error, .. } if error == "channel_not_found"
        ));
        assert_eq!(failing.calls(), 1);
    }

    #[tokio::test]
    async fn display_name_prefers_profile_display_name() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/users.info").query_param("user", "U1");
            then.status(200).json_body(json!({
                "ok": true,
                "user": {"name": "ada", "real_name": "Ada L", "profile": {"display_name": "  ", "real_name": "Ada Lovelace"}}
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/users.info").query_param("user", "U2");
            then.status(200).json_body(json!({"ok": true, "user": {"profile": {}}}));
        });

        let client = client(&server);

        let name = client.display_name("U1").await.expect("lookup");
        assert_eq!(name, Some("Ada Lovelace".to_owned()));
        assert_eq!(client.display_name("U2").await.expect("lookup"), None);
    }

    #[tokio::test]
    async fn opens_socket_with_app_token() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/apps.connections.open")
                .header("authorization", "Bearer xapp-test");
            then.status(200).json_body(json!({"ok": true, "url": "wss://example.test/socket"}));
        });

        let url = client(&server).open_socket_url().await.expect("url");

        assert_eq!(url, "wss://example.test/socket");
    }

    #[test]
    fn retry_delay_grows_and_honors_retry_after() {
        assert_eq!(retry_delay(500, 1, None), Duration::from_millis(500));
        assert_eq!(retry_delay(500, 2, None), Duration::from_millis(1_000));
        assert_eq!(retry_delay(500, 30, None), Duration::from_millis(10_000));
        assert_eq!(retry_delay(500, 1, Some(Duration::from_secs(2))), Duration::from_secs(2));
    }
}
