//! Audit, saved-search, preflight and remediation records.

use serde::Deserialize;
use serde::Serialize;
use ts_rs::TS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub ts: i64,
    pub user: String,
    pub index: String,
    pub hits: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SavedSearch {
    pub id: i64,
    pub name: String,
    pub index: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_json: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Body of `POST /saved`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewSavedSearch {
    pub name: String,
    pub index: String,
    pub query_json: String,
}

/// Backend readiness as reported by `GET /preflight`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreflightStatus {
    pub es_ok: bool,
    pub creds_ok: bool,
    pub llm_ok: bool,
    pub schema_ok: bool,
    #[serde(default)]
    pub demo_mode: bool,
}

impl PreflightStatus {
    pub fn all_ok(&self) -> bool {
        self.es_ok && self.creds_ok && self.llm_ok && self.schema_ok
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemediationDetails {
    pub timestamp: String,
    pub triggered_by: String,
    #[serde(default)]
    pub webhook_sent: bool,
}

/// `POST /remediate` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, schemars::JsonSchema)]
pub struct RemediationAck {
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<RemediationDetails>,
}
