//! The live alert feed.
//!
//! One background task per active index: it seeds the ring from recent
//! history, opens the live channel, offers each message to the ring and
//! reconnects with bounded backoff when the transport fails.
//!
//! ```text
//! Disconnected -> Connecting -> Streaming -> Error -> Reconnecting -> Connecting
//!                                    \-> Closed(Teardown | Unauthorized | RetriesExhausted)
//! ```

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;
use soc_async_utils::OrCancelExt;
use soc_async_utils::TornDown;
use soc_async_utils::sleep_or_cancel;
use soc_protocol::Alert;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::alerts::notify::NotificationDispatcher;
use crate::alerts::ring::AlertRing;
use crate::alerts::source::AlertSource;
use crate::error::ApiError;
use crate::retry::ReconnectPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertFeedConfig {
    /// Minimum rule level requested on the live channel.
    pub min_level: i64,
    /// Minimum rule level of the historical seed.
    pub seed_min_level: i64,
    /// Queue depth for channel-backed notification sinks.
    pub channel_capacity: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for AlertFeedConfig {
    fn default() -> Self {
        Self {
            min_level: 10,
            seed_min_level: 12,
            channel_capacity: 32,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Index change or shutdown.
    Teardown,
    Unauthorized,
    RetriesExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Streaming,
    Error { message: String },
    Reconnecting { attempt: usize, delay: Duration },
    Closed(CloseReason),
}

impl StreamState {
    /// Nothing more will be published for this connection.
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamState::Closed(_))
    }
}

/// Why a feed task stopped, or why one connection attempt failed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("alert stream rejected our credentials")]
    Unauthorized,

    #[error("gave up after {0} reconnect attempts")]
    RetriesExhausted(usize),

    #[error("alert stream torn down")]
    Closed,
}

impl From<ApiError> for StreamError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => StreamError::Unauthorized,
            other => StreamError::Transport(other.to_string()),
        }
    }
}

impl From<TornDown> for StreamError {
    fn from(_: TornDown) -> Self {
        StreamError::Closed
    }
}

/// Watch channels readers observe, behind a generation gate: only the task
/// of the current generation may publish, so a torn-down connection can
/// never overwrite its successor's state.
struct FeedShared {
    active: Mutex<u64>,
    alerts: watch::Sender<Arc<[Alert]>>,
    state: watch::Sender<StreamState>,
}

impl FeedShared {
    fn publish(&self, generation: u64, f: impl FnOnce(&FeedShared)) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if *active != generation {
            return false;
        }
        f(self);
        true
    }

    /// Retire the current generation and publish the state that replaces it.
    fn advance(&self, state: StreamState) -> u64 {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        *active = active.wrapping_add(1);
        self.state.send_replace(state);
        *active
    }
}

struct Connection {
    index: String,
    cancel: CancellationToken,
    handle: JoinHandle<StreamError>,
}

/// Owns at most one live connection, scoped to one index at a time.
///
/// Dropping the feed cancels its connection.
pub struct AlertFeed {
    source: Arc<dyn AlertSource>,
    dispatcher: NotificationDispatcher,
    config: AlertFeedConfig,
    shared: Arc<FeedShared>,
    connection: Option<Connection>,
}

impl AlertFeed {
    pub fn new(
        source: Arc<dyn AlertSource>,
        dispatcher: NotificationDispatcher,
        config: AlertFeedConfig,
    ) -> Self {
        let (alerts, _) = watch::channel(Arc::<[Alert]>::from(Vec::new()));
        let (state, _) = watch::channel(StreamState::Disconnected);
        Self {
            source,
            dispatcher,
            config,
            shared: Arc::new(FeedShared {
                active: Mutex::new(0),
                alerts,
                state,
            }),
            connection: None,
        }
    }

    /// Newest-first snapshots, republished on every accepted alert.
    pub fn subscribe(&self) -> watch::Receiver<Arc<[Alert]>> {
        self.shared.alerts.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<StreamState> {
        self.shared.state.subscribe()
    }

    pub fn alerts(&self) -> Arc<[Alert]> {
        self.shared.alerts.borrow().clone()
    }

    pub fn state(&self) -> StreamState {
        self.shared.state.borrow().clone()
    }

    pub fn index(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.index.as_str())
    }

    /// Tear down any current connection and start one for `index`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn switch_index(&mut self, index: &str) {
        let generation = self.shared.advance(StreamState::Connecting);
        self.shared.alerts.send_replace(Vec::new().into());
        self.teardown();

        let cancel = CancellationToken::new();
        let worker = FeedWorker {
            generation,
            index: index.to_string(),
            config: self.config.clone(),
            source: Arc::clone(&self.source),
            dispatcher: self.dispatcher.clone(),
            shared: Arc::clone(&self.shared),
            cancel: cancel.clone(),
            ring: AlertRing::new(),
        };
        tracing::info!("starting alert feed for {index}");
        self.connection = Some(Connection {
            index: index.to_string(),
            cancel,
            handle: tokio::spawn(worker.run()),
        });
    }

    /// Close the connection and wait for its task to finish. Returns why the
    /// task stopped, or `None` if nothing was running.
    pub async fn shutdown(&mut self) -> Option<StreamError> {
        self.shared.advance(StreamState::Closed(CloseReason::Teardown));
        let connection = self.connection.take()?;
        connection.cancel.cancel();
        match connection.handle.await {
            Ok(reason) => Some(reason),
            Err(err) => {
                tracing::warn!("alert feed task for {} failed: {err}", connection.index);
                Some(StreamError::Closed)
            }
        }
    }

    fn teardown(&mut self) {
        if let Some(old) = self.connection.take() {
            old.cancel.cancel();
            tracing::debug!("tore down alert feed for {}", old.index);
        }
    }
}

impl Drop for AlertFeed {
    fn drop(&mut self) {
        self.teardown();
    }
}

struct FeedWorker {
    generation: u64,
    index: String,
    config: AlertFeedConfig,
    source: Arc<dyn AlertSource>,
    dispatcher: NotificationDispatcher,
    shared: Arc<FeedShared>,
    cancel: CancellationToken,
    ring: AlertRing,
}

impl FeedWorker {
    async fn run(mut self) -> StreamError {
        let reason = self.drive().await;
        let close = match &reason {
            StreamError::Unauthorized => Some(CloseReason::Unauthorized),
            StreamError::RetriesExhausted(_) => Some(CloseReason::RetriesExhausted),
            StreamError::Transport(_) | StreamError::Closed => None,
        };
        if let Some(close) = close {
            tracing::error!("alert feed for {} closed: {reason}", self.index);
            self.set_state(StreamState::Closed(close));
        }
        reason
    }

    async fn drive(&mut self) -> StreamError {
        if let Err(err) = self.seed().await {
            return err;
        }

        let policy = self.config.reconnect.clone();
        let mut backoff = policy.backoff();
        let mut retries = 0;
        loop {
            if !self.set_state(StreamState::Connecting) {
                return StreamError::Closed;
            }

            let (streamed, err) = self.stream_once().await;
            let message = match err {
                StreamError::Transport(message) => message,
                other => return other,
            };
            tracing::error!("alert stream for {} failed: {message}", self.index);
            if streamed {
                backoff = policy.backoff();
                retries = 0;
            }
            if !self.set_state(StreamState::Error { message }) {
                return StreamError::Closed;
            }

            let Some(delay) = backoff.next() else {
                return StreamError::RetriesExhausted(retries);
            };
            retries += 1;
            if !self.set_state(StreamState::Reconnecting {
                attempt: retries,
                delay,
            }) {
                return StreamError::Closed;
            }
            tracing::info!(
                "reconnecting alert stream for {} in {:?} (attempt {}/{})",
                self.index,
                delay,
                retries,
                policy.max_attempts
            );
            if sleep_or_cancel(delay, &self.cancel).await.is_err() {
                return StreamError::Closed;
            }
        }
    }

    /// Load recent history into the ring. Seeded alerts never notify.
    async fn seed(&mut self) -> Result<(), StreamError> {
        let fetched = self
            .source
            .recent_alerts(&self.index, self.config.seed_min_level)
            .or_cancel(&self.cancel)
            .await?;

        match fetched {
            Ok(alerts) => {
                self.ring.seed(alerts);
                let snapshot = self.ring.snapshot();
                tracing::debug!("seeded {} recent alerts for {}", snapshot.len(), self.index);
                if !self.shared.publish(self.generation, |shared| {
                    shared.alerts.send_replace(snapshot);
                }) {
                    return Err(StreamError::Closed);
                }
                Ok(())
            }
            Err(ApiError::Unauthorized) => Err(StreamError::Unauthorized),
            Err(err) => {
                tracing::warn!("could not load recent alerts for {}: {err}", self.index);
                Ok(())
            }
        }
    }

    /// One connection, from connect to failure. The flag reports whether it
    /// reached `Streaming`.
    async fn stream_once(&mut self) -> (bool, StreamError) {
        let connected = self
            .source
            .connect(&self.index, self.config.min_level)
            .or_cancel(&self.cancel)
            .await;
        let mut messages = match connected {
            Err(torn_down) => return (false, torn_down.into()),
            Ok(Err(err)) => return (false, err.into()),
            Ok(Ok(messages)) => messages,
        };

        if !self.set_state(StreamState::Streaming) {
            return (false, StreamError::Closed);
        }
        tracing::info!("streaming alerts for {}", self.index);

        loop {
            match messages.next().or_cancel(&self.cancel).await {
                Err(torn_down) => return (true, torn_down.into()),
                Ok(None) => {
                    return (true, StreamError::Transport("stream ended".to_string()));
                }
                Ok(Some(Err(err))) => return (true, err.into()),
                Ok(Some(Ok(payload))) => {
                    if !self.handle_message(&payload) {
                        return (true, StreamError::Closed);
                    }
                }
            }
        }
    }

    /// Returns false once this worker has been superseded.
    fn handle_message(&mut self, payload: &str) -> bool {
        let alert: Alert = match serde_json::from_str(payload) {
            Ok(alert) => alert,
            Err(err) => {
                tracing::warn!("dropping malformed alert payload: {err}");
                return true;
            }
        };

        if !self.ring.offer(alert.clone()).accepted {
            return true;
        }
        let snapshot = self.ring.snapshot();
        let dispatcher = &self.dispatcher;
        self.shared.publish(self.generation, |shared| {
            shared.alerts.send_replace(snapshot);
            dispatcher.on_accepted(&alert);
        })
    }

    fn set_state(&self, state: StreamState) -> bool {
        tracing::debug!("alert feed for {} -> {:?}", self.index, state);
        self.shared.publish(self.generation, |shared| {
            shared.state.send_replace(state);
        })
    }
}
