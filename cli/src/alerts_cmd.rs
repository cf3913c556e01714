//! `soc watch`: follow the live alert feed of the selected index.

use std::collections::HashSet;
use std::sync::Arc;

use clap::Parser;
use soc_core::alerts::AlertFeed;
use soc_core::alerts::AlertNotification;
use soc_core::alerts::ChannelSink;
use soc_core::alerts::CloseReason;
use soc_core::alerts::NotificationDispatcher;
use soc_core::alerts::StreamState;
use soc_core::alerts::TracingSink;
use soc_protocol::Alert;

use crate::Console;

#[derive(Debug, Parser)]
pub struct WatchArgs {
    /// Print notifications as JSON lines.
    #[arg(long)]
    pub json: bool,

    /// Also write notifications to the log.
    #[arg(long)]
    pub log_notifications: bool,
}

/// Runs until Ctrl-C or until the feed closes on its own. Exit code 0 on
/// Ctrl-C, 2 when re-authentication is needed, 3 when reconnects ran out.
pub async fn run_watch(console: &Console, args: WatchArgs) -> anyhow::Result<i32> {
    console.require_login()?;
    let index = console.index();

    let (sink, mut notifications) = ChannelSink::new(console.config.alerts.channel_capacity);
    let mut dispatcher = NotificationDispatcher::new().with_sink(Arc::new(sink));
    if args.log_notifications {
        dispatcher = dispatcher.with_sink(Arc::new(TracingSink));
    }
    let mut feed = AlertFeed::new(
        Arc::new(console.client.clone()),
        dispatcher,
        console.config.alerts.clone(),
    );
    let mut state = feed.subscribe_state();
    feed.switch_index(&index);
    eprintln!("Watching {index} (Ctrl-C to stop)");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut seeded = false;
    // Alerts already announced as live before the seed listing is printed.
    let mut notified = HashSet::new();

    let code = loop {
        tokio::select! {
            _ = &mut ctrl_c => break 0,
            Some(notification) = notifications.recv() => {
                if !seeded {
                    notified.insert(notification.alert_id.clone());
                }
                print_notification(&notification, args.json)?;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break 0;
                }
                let current = state.borrow_and_update().clone();
                match current {
                    StreamState::Reconnecting { attempt, delay } => {
                        eprintln!("Connection lost; retry {attempt} in {delay:?}");
                    }
                    StreamState::Streaming if !seeded => {
                        seeded = true;
                        // Live alerts in the snapshot were notified before it
                        // was published, so take it first and then drain.
                        let snapshot = feed.alerts();
                        let mut live = Vec::new();
                        while let Ok(notification) = notifications.try_recv() {
                            notified.insert(notification.alert_id.clone());
                            live.push(notification);
                        }
                        print_seed(&seeded_alerts(&snapshot, &notified));
                        for notification in &live {
                            print_notification(notification, args.json)?;
                        }
                        eprintln!("Live");
                    }
                    StreamState::Streaming => eprintln!("Live"),
                    StreamState::Closed(CloseReason::Unauthorized) => {
                        eprintln!("Session expired; run `soc login` again");
                        break 2;
                    }
                    StreamState::Closed(CloseReason::RetriesExhausted) => {
                        eprintln!("Gave up reconnecting to the alert stream");
                        break 3;
                    }
                    StreamState::Closed(CloseReason::Teardown) => break 0,
                    StreamState::Disconnected
                    | StreamState::Connecting
                    | StreamState::Error { .. } => {}
                }
            }
        }
    };

    if let Some(reason) = feed.shutdown().await {
        tracing::debug!("alert feed stopped: {reason}");
    }
    Ok(code)
}

/// Alerts of `snapshot` that came from the historical seed rather than the
/// live stream.
fn seeded_alerts<'a>(snapshot: &'a [Alert], notified: &HashSet<String>) -> Vec<&'a Alert> {
    snapshot
        .iter()
        .filter(|alert| !notified.contains(&alert.id))
        .collect()
}

fn print_seed(alerts: &[&Alert]) {
    if alerts.is_empty() {
        return;
    }
    println!("{} recent critical alerts:", alerts.len());
    for alert in alerts {
        println!(
            "  [{}] level {} {} ({})",
            alert.timestamp, alert.level, alert.description, alert.agent
        );
    }
}

fn print_notification(notification: &AlertNotification, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(notification)?);
    } else {
        println!(
            "{} | {} -> {}",
            notification.title, notification.body, notification.action.route
        );
    }
    Ok(())
}
