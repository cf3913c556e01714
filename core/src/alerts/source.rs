use async_trait::async_trait;
use soc_protocol::Alert;

use crate::client::AlertMessages;
use crate::client::SiemClient;
use crate::error::ApiResult;

/// Where the feed gets alerts from: a one-shot historical batch and a live
/// channel, both scoped to a single index.
#[async_trait]
pub trait AlertSource: Send + Sync + 'static {
    /// Most recent alerts at or above `min_level`, newest first.
    async fn recent_alerts(&self, index: &str, min_level: i64) -> ApiResult<Vec<Alert>>;

    /// Open the live channel. `Ok` means the connection is established;
    /// each item is one raw JSON payload.
    async fn connect(&self, index: &str, min_level: i64) -> ApiResult<AlertMessages>;
}

#[async_trait]
impl AlertSource for SiemClient {
    async fn recent_alerts(&self, index: &str, min_level: i64) -> ApiResult<Vec<Alert>> {
        SiemClient::recent_alerts(self, index, min_level).await
    }

    async fn connect(&self, index: &str, min_level: i64) -> ApiResult<AlertMessages> {
        self.alert_stream(index, min_level).await
    }
}
