//! HTTP client for the console backend.

use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use futures::future;
use futures::stream::BoxStream;
use reqwest::RequestBuilder;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::json;
use soc_protocol::Alert;
use soc_protocol::DashboardStats;
use soc_protocol::LogLine;
use soc_protocol::QueryResponse;
use soc_protocol::Schema;
use soc_protocol::User;
use soc_protocol::records::AuditEntry;
use soc_protocol::records::NewSavedSearch;
use soc_protocol::records::PreflightStatus;
use soc_protocol::records::RemediationAck;
use soc_protocol::records::SavedSearch;
use soc_protocol::session::LoginResponse;
use url::Url;

use crate::config_loader::ConsoleConfig;
use crate::error::ApiError;
use crate::error::ApiResult;
use crate::search_spec::SearchSpec;
use crate::session::SessionContext;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FALLBACK_ERROR_DETAIL: &str = "Request failed";

/// Raw `data:` payloads of the live alert channel, one per server event.
pub type AlertMessages = BoxStream<'static, ApiResult<String>>;

/// Decoded lines of the raw log feed.
pub type LogLines = BoxStream<'static, ApiResult<LogLine>>;

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<Value>,
}

/// Talks to the backend on behalf of one [`SessionContext`].
///
/// Requests carry the session's bearer token when one is present. Any 401
/// invalidates the session before [`ApiError::Unauthorized`] is returned.
#[derive(Clone)]
pub struct SiemClient {
    http: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
    session: SessionContext,
}

impl SiemClient {
    pub fn new(base_url: &str, session: SessionContext) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Self::with_client(http, base_url, session)
    }

    pub fn from_config(config: &ConsoleConfig, session: SessionContext) -> ApiResult<Self> {
        let mut client = Self::new(&config.api_base_url, session)?;
        client.request_timeout = config.http.timeout();
        Ok(client)
    }

    /// Use a preconfigured HTTP client. The per-request timeout is applied
    /// to every call except the live stream.
    pub fn with_client(
        http: reqwest::Client,
        base_url: &str,
        session: SessionContext,
    ) -> ApiResult<Self> {
        let mut base_url = Url::parse(base_url.trim())
            .map_err(|e| ApiError::InvalidConfig(format!("base URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidConfig(format!(
                "base URL '{base_url}' cannot carry paths"
            )));
        }
        // `Url::join` replaces the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http,
            base_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            session,
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET /preflight`. Unauthenticated.
    pub async fn preflight(&self) -> ApiResult<PreflightStatus> {
        let response = self
            .http
            .get(self.endpoint("preflight")?)
            .timeout(self.request_timeout)
            .send()
            .await?;
        self.decode(response).await
    }

    /// `POST /login`. On success the session is signed in as `username`.
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<User> {
        let response = self
            .http
            .post(self.endpoint("login")?)
            .timeout(self.request_timeout)
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        let login: LoginResponse = self.decode(response).await?;
        let user = User {
            username: username.to_string(),
            role: login.role,
            access_token: login.token,
        };
        self.session.sign_in(user.clone());
        Ok(user)
    }

    /// `POST /refresh`: trade the current token for a fresh one.
    pub async fn refresh(&self) -> ApiResult<()> {
        let Some(mut user) = self.session.user() else {
            return Err(ApiError::Unauthorized);
        };
        let request = self
            .http
            .post(self.endpoint("refresh")?)
            .json(&json!({ "token": user.access_token }));
        let refreshed: TokenResponse = self.send(request).await?;
        user.access_token = refreshed.token;
        self.session.sign_in(user);
        Ok(())
    }

    /// `POST /logout`, revoking the token server-side. The local session is
    /// signed out whatever the backend answers.
    pub async fn logout(&self) -> ApiResult<()> {
        let token = self.session.access_token().unwrap_or_default();
        let result = match self.endpoint("logout") {
            Ok(url) => {
                let request = self.request(self.http.post(url).json(&json!({ "token": token })));
                match request.send().await {
                    Ok(response) => self.check(response).await.map(|_| ()),
                    Err(err) => Err(err.into()),
                }
            }
            Err(err) => Err(err),
        };
        self.session.sign_out();
        result
    }

    /// `GET /schema?index=`.
    pub async fn schema(&self, index: &str) -> ApiResult<Schema> {
        let request = self
            .http
            .get(self.endpoint("schema")?)
            .query(&[("index", index)]);
        self.send(request).await
    }

    /// `POST /builder` with a validated spec.
    pub async fn execute_search(&self, spec: &SearchSpec) -> ApiResult<QueryResponse> {
        tracing::debug!(
            "executing search on {} ({} {} {})",
            spec.index(),
            spec.field(),
            spec.operator(),
            spec.time_range()
        );
        let request = self.http.post(self.endpoint("builder")?).json(spec);
        self.send(request).await
    }

    /// `POST /chat`: hand a natural-language prompt to the backend's
    /// translator.
    pub async fn chat(&self, prompt: &str, index: &str, size: u32) -> ApiResult<QueryResponse> {
        let request = self
            .http
            .post(self.endpoint("chat")?)
            .json(&json!({ "prompt": prompt, "index": index, "size": size }));
        self.send(request).await
    }

    /// `GET /alerts/recent`, newest first.
    pub async fn recent_alerts(&self, index: &str, min_level: i64) -> ApiResult<Vec<Alert>> {
        let request = self
            .http
            .get(self.endpoint("alerts/recent")?)
            .query(&[("index", index)])
            .query(&[("min_level", min_level)]);
        self.send(request).await
    }

    /// Open `GET /alerts/stream`. Resolves once the backend has accepted the
    /// connection; the returned stream then yields one payload per event and
    /// ends when the connection does.
    pub async fn alert_stream(&self, index: &str, min_level: i64) -> ApiResult<AlertMessages> {
        let request = self
            .http
            .get(self.endpoint("alerts/stream")?)
            .query(&[("index", index)])
            .query(&[("min_level", min_level)]);
        let messages = self.event_stream(request).await?;
        tracing::info!("alert stream open for {index} (min level {min_level})");
        Ok(messages)
    }

    /// `GET /stats?index=`: last-24h dashboard numbers.
    pub async fn stats(&self, index: &str) -> ApiResult<DashboardStats> {
        let request = self
            .http
            .get(self.endpoint("stats")?)
            .query(&[("index", index)]);
        let stats: DashboardStats = self.send(request).await?;
        if let Some(err) = &stats.error {
            tracing::warn!("backend could not compute stats for {index}: {err}");
        }
        Ok(stats)
    }

    /// Open `GET /logs/stream`, the raw per-document feed of `index`.
    /// Payloads that are not a log line are skipped.
    pub async fn log_stream(&self, index: &str) -> ApiResult<LogLines> {
        let request = self
            .http
            .get(self.endpoint("logs/stream")?)
            .query(&[("index", index)]);
        let messages = self.event_stream(request).await?;
        tracing::info!("log stream open for {index}");

        let lines = messages.filter_map(|message| {
            future::ready(match message {
                Ok(data) => match serde_json::from_str::<LogLine>(&data) {
                    Ok(line) => Some(Ok(line)),
                    Err(err) => {
                        tracing::warn!("dropping malformed log line: {err}");
                        None
                    }
                },
                Err(err) => Some(Err(err)),
            })
        });
        Ok(lines.boxed())
    }

    /// `GET /audit`.
    pub async fn audit(&self) -> ApiResult<Vec<AuditEntry>> {
        self.send(self.http.get(self.endpoint("audit")?)).await
    }

    /// `GET /saved`.
    pub async fn saved_searches(&self) -> ApiResult<Vec<SavedSearch>> {
        self.send(self.http.get(self.endpoint("saved")?)).await
    }

    /// `POST /saved`.
    pub async fn create_saved_search(&self, search: &NewSavedSearch) -> ApiResult<SavedSearch> {
        let request = self.http.post(self.endpoint("saved")?).json(search);
        self.send(request).await
    }

    /// `POST /saved/run`.
    pub async fn run_saved_search(&self, id: i64) -> ApiResult<QueryResponse> {
        let request = self
            .http
            .post(self.endpoint("saved/run")?)
            .json(&json!({ "id": id }));
        self.send(request).await
    }

    /// `DELETE /saved?id=`.
    pub async fn delete_saved_search(&self, id: i64) -> ApiResult<()> {
        let request = self
            .http
            .delete(self.endpoint("saved")?)
            .query(&[("id", id)]);
        let response = self.request(request).send().await?;
        self.check(response).await.map(|_| ())
    }

    /// `POST /remediate`.
    pub async fn remediate(&self, action: &str) -> ApiResult<RemediationAck> {
        let request = self
            .http
            .post(self.endpoint("remediate")?)
            .json(&json!({ "action": action }));
        self.send(request).await
    }

    /// Send `request` as a server-sent-event subscription. No request
    /// timeout applies; the stream lives until the connection ends.
    async fn event_stream(&self, request: RequestBuilder) -> ApiResult<AlertMessages> {
        let mut request = request.header(ACCEPT, "text/event-stream");
        if let Some(token) = self.session.access_token() {
            request = request.bearer_auth(token);
        }

        let response = self.check(request.send().await?).await?;
        let messages = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| {
                future::ready(match event {
                    Ok(event) if event.data.trim().is_empty() => None,
                    Ok(event) => Some(Ok(event.data)),
                    Err(err) => Some(Err(ApiError::Stream(err.to_string()))),
                })
            });
        Ok(messages.boxed())
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::InvalidConfig(format!("endpoint '{path}': {e}")))
    }

    /// Timeout plus bearer token, when the session has one.
    fn request(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.timeout(self.request_timeout);
        match self.session.access_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = self.request(request).send().await?;
        self.decode(response).await
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> ApiResult<T> {
        let response = self.check(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Map non-success statuses to errors. A 401 also invalidates the
    /// session.
    async fn check(&self, response: Response) -> ApiResult<Response> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!("{} answered 401", response.url().path());
            self.session.invalidate();
            return Err(ApiError::Unauthorized);
        }
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_detail(&body);
        tracing::error!("request failed ({status}): {message}");
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

impl std::fmt::Debug for SiemClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiemClient")
            .field("base_url", &self.base_url.as_str())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// `detail` from an error body, or a generic message.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body).ok().and_then(|b| b.detail) {
        Some(Value::String(detail)) if !detail.is_empty() => detail,
        Some(Value::Null) | None => FALLBACK_ERROR_DETAIL.to_string(),
        Some(Value::String(_)) => FALLBACK_ERROR_DETAIL.to_string(),
        Some(other) => other.to_string(),
    }
}
