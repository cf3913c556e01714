use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use strum_macros::Display;
use strum_macros::EnumIter;
use strum_macros::EnumString;
use ts_rs::TS;

/// Field types the query builder understands.
///
/// The schema-discovery service may report other backend types (`ip`,
/// `boolean`, `object`, ...); those fields are not queryable from the builder
/// and are dropped when a [`Schema`] is deserialized.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    TS,
    schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FieldType {
    Keyword,
    Text,
    Date,
    Integer,
    Long,
    Float,
    Double,
}

impl FieldType {
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::Long | FieldType::Float | FieldType::Double
        )
    }

    /// Wildcard patterns are only meaningful on string-like fields.
    pub const fn supports_wildcard(self) -> bool {
        matches!(self, FieldType::Keyword | FieldType::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS, schemars::JsonSchema)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Schema-fetch response: `GET /schema?index=<index>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, schemars::JsonSchema)]
pub struct Schema {
    pub index: String,
    #[serde(deserialize_with = "queryable_fields")]
    #[schemars(with = "Vec<SchemaField>")]
    pub fields: Vec<SchemaField>,
}

fn queryable_fields<'de, D>(deserializer: D) -> Result<Vec<SchemaField>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct WireField {
        name: String,
        #[serde(rename = "type")]
        field_type: String,
    }

    let raw = Vec::<WireField>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|wire| match wire.field_type.parse::<FieldType>() {
            Ok(field_type) => Some(SchemaField {
                name: wire.name,
                field_type,
            }),
            Err(_) => {
                tracing::debug!(
                    "skipping field {} with unsupported type {}",
                    wire.name,
                    wire.field_type
                );
                None
            }
        })
        .collect())
}
