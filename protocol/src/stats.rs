//! Dashboard statistics and the raw live-log feed.

use serde::Deserialize;
use serde::Serialize;
use ts_rs::TS;

/// Placeholder the backend reports when no attacker address was seen.
pub const NO_TOP_ATTACKER: &str = "N/A";

/// Last-24h headline numbers for one index, as reported by `GET /stats`.
///
/// When the backend fails to compute them it still answers 200 with zeroed
/// numbers and `error` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    #[serde(default)]
    pub total_alerts: u64,
    /// Alerts at rule level 10 or above.
    #[serde(default)]
    pub high_severity: u64,
    /// Distinct agents that reported.
    #[serde(default)]
    pub active_agents: u64,
    /// Most frequent source address, or [`NO_TOP_ATTACKER`].
    #[serde(default = "no_top_attacker")]
    pub top_attacker: String,
    /// Agents ranked by summed rule level, highest first.
    #[serde(default)]
    pub risk_scoring: Vec<RiskScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DashboardStats {
    pub fn top_attacker(&self) -> Option<&str> {
        Some(self.top_attacker.as_str()).filter(|ip| *ip != NO_TOP_ATTACKER && !ip.is_empty())
    }
}

fn no_top_attacker() -> String {
    NO_TOP_ATTACKER.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, schemars::JsonSchema)]
pub struct RiskScore {
    /// Agent name.
    pub entity: String,
    #[serde(default)]
    pub score: f64,
}

/// One line of `GET /logs/stream`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, schemars::JsonSchema)]
pub struct LogLine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// `[<timestamp>] <agent> -> <rule description>`.
    pub line: String,
}
