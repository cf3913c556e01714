//! Live alert pipeline: source, dedup ring, feed state machine and
//! notifications.

pub mod notify;
pub mod ring;
pub mod source;
pub mod stream;

pub use notify::AlertNotification;
pub use notify::ChannelSink;
pub use notify::NotificationAction;
pub use notify::NotificationDispatcher;
pub use notify::NotificationSink;
pub use notify::NotifyError;
pub use notify::TracingSink;
pub use ring::ALERT_RING_CAPACITY;
pub use ring::AlertRing;
pub use ring::Offer;
pub use source::AlertSource;
pub use stream::AlertFeed;
pub use stream::AlertFeedConfig;
pub use stream::CloseReason;
pub use stream::StreamError;
pub use stream::StreamState;
