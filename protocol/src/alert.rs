use serde::Deserialize;
use serde::Serialize;
use ts_rs::TS;

/// A high-severity event produced by the external alert source.
///
/// The console never edits these; it only accepts or rejects them by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, schemars::JsonSchema)]
pub struct Alert {
    pub id: String,
    /// ISO-8601 timestamp as reported by the source.
    pub timestamp: String,
    pub description: String,
    /// Numeric rule level. Unrelated to the qualitative [`crate::Severity`].
    pub level: i64,
    pub agent: String,
}
