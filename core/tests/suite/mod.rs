mod alert_feed;
mod client;
