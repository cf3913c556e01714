//! Wire and data-model types shared by the console core, the CLI and the
//! generated TypeScript bindings consumed by the presentation layer.

pub mod alert;
pub mod query;
pub mod records;
pub mod response;
pub mod schema;
pub mod session;
pub mod stats;

pub use alert::Alert;
pub use query::QueryCriterion;
pub use query::QueryOperator;
pub use query::QueryValue;
pub use query::TimeRange;
pub use response::QueryResponse;
pub use response::Severity;
pub use schema::FieldType;
pub use schema::Schema;
pub use schema::SchemaField;
pub use session::Role;
pub use session::User;
pub use stats::DashboardStats;
pub use stats::LogLine;
pub use stats::RiskScore;
