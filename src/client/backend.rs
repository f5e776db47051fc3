//! Authenticated HTTP client for the remote sync backend (Component C, §4.1, §6).

use crate::client::retry::{with_retry, RetryOutcome};
use crate::config::Config;
use crate::error::{BackendErrorKind, Error, Result};
use parking_lot::RwLock;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// One entry in an index page response.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    /// Remote revision, named `v` on the wire.
    #[serde(rename = "v")]
    pub version: i64,
    /// Inline data, present only on delta-sync pages.
    #[serde(rename = "d")]
    pub data: Option<Value>,
}

/// One page of the backend's change index.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexPage {
    pub index: Vec<IndexEntry>,
    /// Cursor to resume from; absent means the walk is complete.
    pub current: Option<String>,
}

/// Response to a `save` call.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub new_version: i64,
    pub echoed_data: Value,
}

#[derive(Serialize)]
struct AuthorizeBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthorizeResponse {
    access_token: String,
    #[allow(dead_code)]
    userid: String,
}

/// The current bearer token, swapped out by re-authorization (§4.1).
struct TokenState {
    token: Option<String>,
}

/// Authenticated client for the `authorize`/`index`/`fetch`/`save` operations.
///
/// Held behind an `Arc` and shared between the sync engine and tool
/// handlers; built once at startup from [`Config`].
pub struct BackendClient {
    http: reqwest::Client,
    auth_base_url: String,
    data_base_url: String,
    app_id: String,
    app_key: String,
    username: String,
    password: String,
    token: RwLock<TokenState>,
}

impl BackendClient {
    pub fn new(config: &Config) -> Result<Arc<Self>> {
        let http = reqwest::Client::builder()
            .timeout(config.api_timeout)
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Arc::new(Self {
            http,
            auth_base_url: config.auth_base_url.clone(),
            data_base_url: config.data_base_url.clone(),
            app_id: config.app_id.clone(),
            app_key: config.app_key.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            token: RwLock::new(TokenState { token: None }),
        }))
    }

    fn current_token(&self) -> Option<String> {
        self.token.read().token.clone()
    }

    fn set_token(&self, token: String) {
        self.token.write().token = Some(token);
    }

    fn clear_token(&self) {
        self.token.write().token = None;
    }

    /// `authorize(username, password) -> token` (§4.1).
    #[tracing::instrument(skip(self), fields(app_id = %self.app_id))]
    pub async fn authorize(&self) -> Result<String> {
        let url = format!("{}/{}/authorize/", self.auth_base_url, self.app_id);
        let body = AuthorizeBody {
            username: &self.username,
            password: &self.password,
        };

        tracing::debug!(url = %url, "authorizing");
        let response = self
            .http
            .post(&url)
            .header("X-App-API-Key", &self.app_key)
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::Auth("Invalid credentials".to_string()));
        }
        if !response.status().is_success() {
            return Err(Error::Auth(format!(
                "authorize failed with status {}",
                response.status()
            )));
        }

        let parsed: AuthorizeResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("malformed authorize response: {e}")))?;
        self.set_token(parsed.access_token.clone());
        Ok(parsed.access_token)
    }

    async fn ensure_token(&self) -> Result<String> {
        match self.current_token() {
            Some(token) => Ok(token),
            None => self.authorize().await,
        }
    }

    /// Execute one data-plane request with the full interceptor contract
    /// (§4.1): 401 single re-auth+replay, bounded 429 retry, and response
    /// classification into [`Error`] variants.
    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        if_match: Option<i64>,
    ) -> Result<reqwest::Response> {
        let mut reauthed_once = false;
        loop {
            let token = self.ensure_token().await?;
            let mut builder = self
                .http
                .request(method.clone(), url)
                .header("X-App-API-Key", &self.app_key)
                .header("Authorization", format!("Bearer {token}"));
            if let Some(version) = if_match {
                builder = builder.header("If-Match", version.to_string());
            }
            if let Some(b) = body {
                builder = builder.json(b);
            }

            match with_retry(builder).await? {
                RetryOutcome::Response(response) => {
                    if response.status() == StatusCode::UNAUTHORIZED && !reauthed_once {
                        reauthed_once = true;
                        tracing::warn!(url = %url, "401 received, re-authorizing and replaying once");
                        self.clear_token();
                        self.authorize().await?;
                        continue;
                    }
                    return Ok(response);
                }
            }
        }
    }

    fn classify_non_2xx(status: StatusCode, body: String) -> Error {
        match status {
            StatusCode::UNAUTHORIZED => Error::Auth("Invalid credentials".to_string()),
            StatusCode::NOT_FOUND => Error::NotFound(body),
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => Error::conflict(body),
            StatusCode::BAD_REQUEST => Error::Backend {
                kind: BackendErrorKind::ValidationError,
                http_status: Some(status.as_u16()),
                message: body,
            },
            StatusCode::TOO_MANY_REQUESTS => Error::Backend {
                kind: BackendErrorKind::RateLimit,
                http_status: Some(status.as_u16()),
                message: body,
            },
            other => Error::Backend {
                kind: BackendErrorKind::Unknown,
                http_status: Some(other.as_u16()),
                message: body,
            },
        }
    }

    async fn parse_json_or_classify<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_non_2xx(status, body));
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Backend {
            kind: BackendErrorKind::Unknown,
            http_status: Some(status.as_u16()),
            message: format!("malformed response body: {e}"),
        })
    }

    /// `index(bucket, since?, mark?, limit, include_data?) -> { entries[], cursor }` (§4.1, §4.3).
    ///
    /// `since` and `mark` are distinct cursor concepts (§9): `since` is the
    /// delta-sync watermark (a change version), `mark` is the full-sync page
    /// token (pagination through the current index, not a change feed).
    pub async fn index(
        &self,
        bucket: &str,
        since: Option<&str>,
        mark: Option<&str>,
        limit: u32,
        include_data: bool,
    ) -> Result<IndexPage> {
        let mut url = format!(
            "{}/{}/index?limit={}&data={}",
            self.data_base_url,
            bucket,
            limit,
            if include_data { "1" } else { "0" }
        );
        if let Some(cursor) = since {
            url.push_str(&format!("&since={cursor}"));
        }
        if let Some(page_token) = mark {
            url.push_str(&format!("&mark={page_token}"));
        }
        let response = self.execute(Method::GET, &url, None, None).await?;
        Self::parse_json_or_classify(response).await
    }

    /// `fetch(bucket, id, version) -> note_data` (§4.1, §4.3).
    pub async fn fetch(&self, bucket: &str, id: &str, version: i64) -> Result<Value> {
        let url = format!("{}/{}/i/{}/v/{}", self.data_base_url, bucket, id, version);
        let response = self.execute(Method::GET, &url, None, None).await?;
        Self::parse_json_or_classify(response).await
    }

    /// `save(bucket, id, payload, base_version?) -> { new_version, echoed_data }` (§4.1, §4.6).
    pub async fn save(
        &self,
        bucket: &str,
        id: &str,
        payload: &Value,
        base_version: Option<i64>,
    ) -> Result<SaveOutcome> {
        let url = match base_version {
            Some(v) => format!("{}/{}/i/{}/v/{}", self.data_base_url, bucket, id, v),
            None => format!("{}/{}/i/{}", self.data_base_url, bucket, id),
        };

        let response = self
            .execute(Method::POST, &url, Some(payload), base_version)
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_non_2xx(status, body));
        }

        let new_version = response
            .headers()
            .get("X-Version")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or_else(|| match base_version {
                Some(v) => v + 1,
                None => {
                    tracing::warn!(id = %id, "save response missing X-Version for new note, defaulting to 0");
                    0
                }
            });

        let echoed_data: Value = response.json().await.unwrap_or(Value::Null);
        Ok(SaveOutcome {
            new_version,
            echoed_data,
        })
    }
}

/// Client timeout floor enforced by [`Config`]; kept here only as a doc
/// anchor for `execute`'s suspension points (§5).
pub const MIN_API_TIMEOUT: Duration = Duration::from_secs(5);
