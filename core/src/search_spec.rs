//! Assembly of validated criteria into search specifications.

use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use soc_protocol::FieldType;
use soc_protocol::QueryCriterion;
use soc_protocol::QueryOperator;
use soc_protocol::QueryValue;
use soc_protocol::Role;
use soc_protocol::TimeRange;
use thiserror::Error;

use crate::validation::ValidationReport;
use crate::validation::validate_criterion;

/// Smallest result-size cap the backend accepts.
pub const MIN_RESULT_SIZE: u32 = 1;
/// Largest result-size cap the backend accepts.
pub const MAX_RESULT_SIZE: u32 = 500;

/// Timestamp field every query is bounded on.
const TIMESTAMP_FIELD: &str = "@timestamp";

/// Integers up to this magnitude are exact in `f64`.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// The criterion fails validation; nothing was built.
    #[error("criterion failed validation: {0}")]
    Invalid(ValidationReport),

    #[error("no index selected")]
    MissingIndex,
}

/// A validated, read-only search request. Serializes to the body of
/// `POST /builder`: `{field, op, value, timeRange, size, index}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSpec {
    field: String,
    #[serde(skip)]
    field_type: FieldType,
    op: QueryOperator,
    value: QueryValue,
    time_range: TimeRange,
    size: u32,
    index: String,
}

impl SearchSpec {
    /// Build a spec from `criterion`, refusing if any validator rejects it.
    ///
    /// `size` is clamped into `MIN_RESULT_SIZE..=MAX_RESULT_SIZE`.
    pub fn build(
        criterion: QueryCriterion,
        role: Role,
        size: u32,
        index: &str,
    ) -> Result<SearchSpec, BuildError> {
        let report = validate_criterion(&criterion, role);
        if !report.is_empty() {
            tracing::warn!("refusing to build search spec: {report}");
            return Err(BuildError::Invalid(report));
        }

        let index = index.trim();
        if index.is_empty() {
            return Err(BuildError::MissingIndex);
        }

        let clamped = size.clamp(MIN_RESULT_SIZE, MAX_RESULT_SIZE);
        if clamped != size {
            tracing::debug!("result size {size} clamped to {clamped}");
        }

        Ok(SearchSpec {
            field: criterion.field.name,
            field_type: criterion.field.field_type,
            op: criterion.operator,
            value: criterion.value,
            time_range: criterion.time_range,
            size: clamped,
            index: index.to_string(),
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> QueryOperator {
        self.op
    }

    pub fn value(&self) -> &QueryValue {
        &self.value
    }

    pub fn time_range(&self) -> TimeRange {
        self.time_range
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Render the equivalent search-backend query DSL.
    ///
    /// Numeric fields carry their value as a JSON number; everything else is
    /// sent as the string the analyst typed.
    pub fn to_query_dsl(&self) -> Value {
        let value = self
            .numeric_value()
            .unwrap_or_else(|| json!(self.value.to_string()));

        json!({
            "size": self.size,
            "query": {
                "bool": {
                    "must": [
                        { self.op.to_string(): { self.field.clone(): value } },
                        { "range": { TIMESTAMP_FIELD: { "gte": self.time_range.date_math() } } }
                    ]
                }
            }
        })
    }

    /// Integer fields keep the digits as typed so values past 2^53 survive;
    /// float fields go through `f64`.
    fn numeric_value(&self) -> Option<Value> {
        match self.field_type {
            FieldType::Integer | FieldType::Long => {
                if let Some(text) = self.value.numeric_text() {
                    if let Ok(n) = text.parse::<i64>() {
                        return Some(json!(n));
                    }
                    if let Ok(n) = text.parse::<u64>() {
                        return Some(json!(n));
                    }
                }
                let n = self.value.as_number()?;
                if n.fract() == 0.0 && n.abs() <= MAX_EXACT_INTEGER {
                    Some(json!(n as i64))
                } else {
                    Some(json!(n))
                }
            }
            FieldType::Float | FieldType::Double => self.value.as_number().map(|n| json!(n)),
            FieldType::Keyword | FieldType::Text | FieldType::Date => None,
        }
    }
}
