//! Root of the `soc-core` library: query validation and assembly, the live
//! alert pipeline, session state and the backend client.

// Library code never writes to stdout/stderr; output goes through tracing
// or through the front end.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod alerts;
pub mod client;
pub mod config_loader;
pub mod error;
pub mod policy;
pub mod retry;
pub mod schema_catalog;
pub mod search_spec;
pub mod session;
pub mod validation;

pub use client::SiemClient;
pub use config_loader::ConfigLoader;
pub use config_loader::ConsoleConfig;
pub use error::ApiError;
pub use error::ApiResult;
pub use policy::RolePolicy;
pub use schema_catalog::SchemaCatalog;
pub use search_spec::SearchSpec;
pub use session::SessionContext;
pub use validation::ValidationReport;
