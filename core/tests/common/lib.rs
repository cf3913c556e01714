#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use futures::StreamExt;
use soc_core::ApiError;
use soc_core::ApiResult;
use soc_core::SessionContext;
use soc_core::SiemClient;
use soc_core::alerts::AlertFeedConfig;
use soc_core::alerts::AlertSource;
use soc_core::client::AlertMessages;
use soc_core::retry::ReconnectPolicy;
use soc_protocol::Alert;
use soc_protocol::Role;
use soc_protocol::User;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

pub const TEST_TOKEN: &str = "test-token";

pub fn alert(id: &str) -> Alert {
    Alert {
        id: id.to_string(),
        timestamp: "2026-10-15T08:00:00Z".to_string(),
        description: format!("Rule fired ({id})"),
        level: 12,
        agent: "web-01".to_string(),
    }
}

pub fn alert_json(id: &str) -> String {
    serde_json::to_string(&alert(id)).unwrap()
}

/// `text/event-stream` body with one `data:` event per payload.
pub fn sse_body(payloads: &[String]) -> String {
    payloads
        .iter()
        .map(|payload| format!("data: {payload}\n\n"))
        .collect()
}

pub fn signed_in_session(role: Role) -> SessionContext {
    let session = SessionContext::in_memory();
    session.sign_in(User {
        username: "analyst1".to_string(),
        role,
        access_token: TEST_TOKEN.to_string(),
    });
    session
}

/// Client pointed at `server`'s `/api` root.
pub fn client_for(server: &MockServer, session: SessionContext) -> SiemClient {
    SiemClient::new(&format!("{}/api", server.uri()), session).unwrap()
}

pub async fn mount_alert_stream(server: &MockServer, payloads: &[String]) {
    Mock::given(method("GET"))
        .and(path("/api/alerts/stream"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body(payloads), "text/event-stream"),
        )
        .mount(server)
        .await;
}

pub async fn mount_recent_alerts(server: &MockServer, alerts: &[Alert]) {
    Mock::given(method("GET"))
        .and(path("/api/alerts/recent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(alerts))
        .mount(server)
        .await;
}

/// Feed settings with deterministic, short backoff.
pub fn feed_config(max_attempts: usize) -> AlertFeedConfig {
    AlertFeedConfig {
        reconnect: ReconnectPolicy {
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            backoff_multiplier: 2.0,
            max_attempts,
            jitter: false,
        },
        ..AlertFeedConfig::default()
    }
}

/// A live channel the test writes to. The stream ends when the sender is
/// dropped.
pub fn live_channel() -> (mpsc::UnboundedSender<ApiResult<String>>, AlertMessages) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, UnboundedReceiverStream::new(rx).boxed())
}

enum ScriptedConnect {
    Accept(AlertMessages),
    Refuse(ApiError),
}

/// [`AlertSource`] that replays a script: a fixed seed, then one scripted
/// outcome per `connect` call. Once the script runs out every connect fails
/// with a transport error.
#[derive(Default)]
pub struct ScriptedSource {
    seed: Vec<Alert>,
    connects: Mutex<VecDeque<ScriptedConnect>>,
    connect_calls: AtomicUsize,
    indices: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, alerts: Vec<Alert>) -> Self {
        self.seed = alerts;
        self
    }

    pub fn then_accept(self, messages: AlertMessages) -> Self {
        self.connects
            .lock()
            .unwrap()
            .push_back(ScriptedConnect::Accept(messages));
        self
    }

    pub fn then_refuse(self, err: ApiError) -> Self {
        self.connects
            .lock()
            .unwrap()
            .push_back(ScriptedConnect::Refuse(err));
        self
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Index of every `connect` call, in order.
    pub fn connected_indices(&self) -> Vec<String> {
        self.indices.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSource for ScriptedSource {
    async fn recent_alerts(&self, _index: &str, _min_level: i64) -> ApiResult<Vec<Alert>> {
        Ok(self.seed.clone())
    }

    async fn connect(&self, index: &str, _min_level: i64) -> ApiResult<AlertMessages> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.indices.lock().unwrap().push(index.to_string());
        let next = self.connects.lock().unwrap().pop_front();
        match next {
            Some(ScriptedConnect::Accept(messages)) => Ok(messages),
            Some(ScriptedConnect::Refuse(err)) => Err(err),
            None => Err(ApiError::Stream("connection refused".to_string())),
        }
    }
}
