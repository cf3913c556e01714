use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use soc_core::ApiError;
use soc_core::alerts::AlertFeed;
use soc_core::alerts::ChannelSink;
use soc_core::alerts::CloseReason;
use soc_core::alerts::NotificationDispatcher;
use soc_core::alerts::StreamError;
use soc_core::alerts::StreamState;
use soc_core_test_support::ScriptedSource;
use soc_core_test_support::alert;
use soc_core_test_support::alert_json;
use soc_core_test_support::client_for;
use soc_core_test_support::feed_config;
use soc_core_test_support::live_channel;
use soc_core_test_support::mount_alert_stream;
use soc_core_test_support::mount_recent_alerts;
use soc_core_test_support::signed_in_session;
use soc_protocol::Alert;
use soc_protocol::Role;
use tokio::sync::mpsc;
use tokio::sync::watch;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

fn ids(alerts: &[Alert]) -> Vec<&str> {
    alerts.iter().map(|a| a.id.as_str()).collect()
}

fn notifying_dispatcher() -> (
    NotificationDispatcher,
    mpsc::Receiver<soc_core::alerts::AlertNotification>,
) {
    let (sink, rx) = ChannelSink::new(32);
    (NotificationDispatcher::new().with_sink(Arc::new(sink)), rx)
}

async fn wait_for_state(
    state: &mut watch::Receiver<StreamState>,
    wanted: impl Fn(&StreamState) -> bool,
) -> StreamState {
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(wanted))
        .await
        .expect("timed out waiting for stream state")
        .expect("feed dropped")
        .clone()
}

fn drain(rx: &mut mpsc::Receiver<soc_core::alerts::AlertNotification>) -> Vec<String> {
    let mut ids = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        ids.push(notification.alert_id);
    }
    ids
}

#[tokio::test]
async fn duplicate_live_alert_is_dropped_without_notification() {
    let (tx, messages) = live_channel();
    let source = Arc::new(ScriptedSource::new().then_accept(messages));
    let (dispatcher, mut notifications) = notifying_dispatcher();
    let mut feed = AlertFeed::new(source, dispatcher, feed_config(0));
    let mut state = feed.subscribe_state();

    feed.switch_index("wazuh-alerts-*");
    wait_for_state(&mut state, |s| *s == StreamState::Streaming).await;

    for id in ["1", "2", "1"] {
        tx.send(Ok(alert_json(id))).unwrap();
    }
    // Ending the stream flushes every message before the feed reacts.
    drop(tx);
    let closed = wait_for_state(&mut state, StreamState::is_closed).await;

    assert_eq!(closed, StreamState::Closed(CloseReason::RetriesExhausted));
    assert_eq!(ids(&feed.alerts()), vec!["2", "1"]);
    assert_eq!(drain(&mut notifications), vec!["1", "2"]);
}

#[tokio::test]
async fn thirteen_alerts_keep_the_newest_twelve() {
    let (tx, messages) = live_channel();
    let source = Arc::new(ScriptedSource::new().then_accept(messages));
    let mut feed = AlertFeed::new(source, NotificationDispatcher::new(), feed_config(0));
    let mut state = feed.subscribe_state();

    feed.switch_index("wazuh-alerts-*");
    for n in 1..=13 {
        tx.send(Ok(alert_json(&n.to_string()))).unwrap();
    }
    drop(tx);
    wait_for_state(&mut state, StreamState::is_closed).await;

    let expected: Vec<String> = (2..=13).rev().map(|n| n.to_string()).collect();
    assert_eq!(ids(&feed.alerts()), expected);
}

#[tokio::test]
async fn seeded_alerts_never_notify() {
    let (tx, messages) = live_channel();
    let source = Arc::new(
        ScriptedSource::new()
            .with_seed(vec![alert("s2"), alert("s1")])
            .then_accept(messages),
    );
    let (dispatcher, mut notifications) = notifying_dispatcher();
    let mut feed = AlertFeed::new(source, dispatcher, feed_config(0));
    let mut alerts = feed.subscribe();

    feed.switch_index("wazuh-alerts-*");
    tx.send(Ok(alert_json("s1"))).unwrap();
    tx.send(Ok(alert_json("live"))).unwrap();

    let snapshot = tokio::time::timeout(
        Duration::from_secs(5),
        alerts.wait_for(|a| a.len() == 3),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();

    assert_eq!(ids(&snapshot), vec!["live", "s2", "s1"]);
    assert_eq!(drain(&mut notifications), vec!["live"]);
}

#[tokio::test]
async fn malformed_payloads_are_dropped_and_stream_continues() {
    let (tx, messages) = live_channel();
    let source = Arc::new(ScriptedSource::new().then_accept(messages));
    let mut feed = AlertFeed::new(source.clone(), NotificationDispatcher::new(), feed_config(0));
    let mut state = feed.subscribe_state();

    feed.switch_index("wazuh-alerts-*");
    tx.send(Ok("{not json".to_string())).unwrap();
    tx.send(Ok(r#"{"id": "missing-fields"}"#.to_string())).unwrap();
    tx.send(Ok(alert_json("ok"))).unwrap();
    drop(tx);
    wait_for_state(&mut state, StreamState::is_closed).await;

    assert_eq!(ids(&feed.alerts()), vec!["ok"]);
    assert_eq!(source.connect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_failures_reconnect_with_backoff() {
    let (_tx, messages) = live_channel();
    let source = Arc::new(
        ScriptedSource::new()
            .then_refuse(ApiError::Stream("connection reset".to_string()))
            .then_refuse(ApiError::Stream("connection reset".to_string()))
            .then_accept(messages),
    );
    let mut feed = AlertFeed::new(source.clone(), NotificationDispatcher::new(), feed_config(3));
    let mut state = feed.subscribe_state();

    feed.switch_index("wazuh-alerts-*");
    wait_for_state(&mut state, |s| *s == StreamState::Streaming).await;

    assert_eq!(source.connect_calls(), 3);
}

/// Each connection that reached `Streaming` earns a fresh retry budget, so a
/// flapping stream outlives `max_attempts` as long as it keeps connecting.
#[tokio::test(start_paused = true)]
async fn attempt_budget_resets_after_streaming() {
    let (first_tx, first) = live_channel();
    let (second_tx, second) = live_channel();
    let (_third_tx, third) = live_channel();
    drop(first_tx);
    drop(second_tx);
    let source = Arc::new(
        ScriptedSource::new()
            .then_accept(first)
            .then_accept(second)
            .then_accept(third),
    );
    let mut feed = AlertFeed::new(source.clone(), NotificationDispatcher::new(), feed_config(1));
    let mut state = feed.subscribe_state();

    feed.switch_index("wazuh-alerts-*");
    let reached = wait_for_state(&mut state, |s| {
        s.is_closed() || (*s == StreamState::Streaming && source.connect_calls() == 3)
    })
    .await;

    assert_eq!(reached, StreamState::Streaming);
    assert_eq!(source.connect_calls(), 3);
    assert_eq!(feed.shutdown().await, Some(StreamError::Closed));
}

#[tokio::test(start_paused = true)]
async fn refusal_after_streaming_spends_the_fresh_budget() {
    let (first_tx, first) = live_channel();
    drop(first_tx);
    let source = Arc::new(
        ScriptedSource::new()
            .then_accept(first)
            .then_refuse(ApiError::Stream("connection reset".to_string())),
    );
    let mut feed = AlertFeed::new(source.clone(), NotificationDispatcher::new(), feed_config(1));
    let mut state = feed.subscribe_state();

    feed.switch_index("wazuh-alerts-*");
    let closed = wait_for_state(&mut state, StreamState::is_closed).await;

    assert_eq!(closed, StreamState::Closed(CloseReason::RetriesExhausted));
    assert_eq!(source.connect_calls(), 2);
    assert_eq!(feed.shutdown().await, Some(StreamError::RetriesExhausted(1)));
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_bounded_attempts() {
    let source = Arc::new(ScriptedSource::new());
    let mut feed = AlertFeed::new(source.clone(), NotificationDispatcher::new(), feed_config(2));
    let mut state = feed.subscribe_state();

    feed.switch_index("wazuh-alerts-*");
    let closed = wait_for_state(&mut state, StreamState::is_closed).await;

    assert_eq!(closed, StreamState::Closed(CloseReason::RetriesExhausted));
    assert_eq!(source.connect_calls(), 3);
    assert_eq!(feed.shutdown().await, Some(StreamError::RetriesExhausted(2)));
}

#[tokio::test(start_paused = true)]
async fn unauthorized_stream_closes_without_retry() {
    let source = Arc::new(ScriptedSource::new().then_refuse(ApiError::Unauthorized));
    let mut feed = AlertFeed::new(source.clone(), NotificationDispatcher::new(), feed_config(5));
    let mut state = feed.subscribe_state();

    feed.switch_index("wazuh-alerts-*");
    let closed = wait_for_state(&mut state, StreamState::is_closed).await;

    assert_eq!(closed, StreamState::Closed(CloseReason::Unauthorized));
    assert_eq!(source.connect_calls(), 1);
}

#[tokio::test]
async fn index_switch_discards_the_old_connection() {
    let (old_tx, old_messages) = live_channel();
    let (new_tx, new_messages) = live_channel();
    let source = Arc::new(
        ScriptedSource::new()
            .then_accept(old_messages)
            .then_accept(new_messages),
    );
    let mut feed = AlertFeed::new(source.clone(), NotificationDispatcher::new(), feed_config(0));
    let mut alerts = feed.subscribe();
    let mut state = feed.subscribe_state();

    feed.switch_index("wazuh-alerts-*");
    old_tx.send(Ok(alert_json("old"))).unwrap();
    alerts.wait_for(|a| a.len() == 1).await.unwrap();

    feed.switch_index("wazuh-archives-*");
    assert!(feed.alerts().is_empty());
    wait_for_state(&mut state, |s| *s == StreamState::Streaming).await;

    let _ = old_tx.send(Ok(alert_json("late")));
    new_tx.send(Ok(alert_json("fresh"))).unwrap();
    let snapshot = alerts.wait_for(|a| !a.is_empty()).await.unwrap().clone();

    assert_eq!(ids(&snapshot), vec!["fresh"]);
    assert_eq!(feed.index(), Some("wazuh-archives-*"));
    assert_eq!(
        source.connected_indices(),
        vec!["wazuh-alerts-*".to_string(), "wazuh-archives-*".to_string()]
    );

    assert_eq!(feed.shutdown().await, Some(StreamError::Closed));
    assert_eq!(feed.state(), StreamState::Closed(CloseReason::Teardown));
}

#[tokio::test]
async fn streams_alerts_from_backend_event_stream() {
    let server = MockServer::start().await;
    mount_recent_alerts(&server, &[alert("seed")]).await;
    mount_alert_stream(
        &server,
        &[
            alert_json("a"),
            "not-json".to_string(),
            alert_json("b"),
            alert_json("a"),
        ],
    )
    .await;

    let client = client_for(&server, signed_in_session(Role::Analyst));
    let (dispatcher, mut notifications) = notifying_dispatcher();
    let mut feed = AlertFeed::new(Arc::new(client), dispatcher, feed_config(0));
    let mut state = feed.subscribe_state();

    feed.switch_index("wazuh-alerts-*");
    let closed = wait_for_state(&mut state, StreamState::is_closed).await;

    assert_eq!(closed, StreamState::Closed(CloseReason::RetriesExhausted));
    assert_eq!(ids(&feed.alerts()), vec!["b", "a", "seed"]);
    assert_eq!(drain(&mut notifications), vec!["a", "b"]);
}

#[tokio::test]
async fn backend_401_on_stream_invalidates_session() {
    let server = MockServer::start().await;
    mount_recent_alerts(&server, &[]).await;
    Mock::given(method("GET"))
        .and(path("/api/alerts/stream"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let session = signed_in_session(Role::Analyst);
    let client = client_for(&server, session.clone());
    let mut feed = AlertFeed::new(Arc::new(client), NotificationDispatcher::new(), feed_config(3));
    let mut state = feed.subscribe_state();

    feed.switch_index("wazuh-alerts-*");
    let closed = wait_for_state(&mut state, StreamState::is_closed).await;

    assert_eq!(closed, StreamState::Closed(CloseReason::Unauthorized));
    assert!(!session.is_authenticated());
}
