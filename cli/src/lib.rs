//! Command implementations behind the `soc` binary.

pub mod alerts_cmd;
pub mod auth_cmd;
pub mod query_cmd;
pub mod records_cmd;
pub mod stats_cmd;

use std::sync::Arc;

use clap::Args;
use soc_core::ConfigLoader;
use soc_core::ConsoleConfig;
use soc_core::SessionContext;
use soc_core::SiemClient;
use soc_core::session::FileSessionStore;
use soc_core::session::Session;

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Backend API root. Overrides config.toml and $SOC_API_URL.
    #[arg(long = "api-url", value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Index to work against. Remembered for later runs.
    #[arg(long, short = 'i', value_name = "INDEX", global = true)]
    pub index: Option<String>,
}

/// Loaded configuration, persisted session and a client bound to both.
pub struct Console {
    pub config: ConsoleConfig,
    pub session: SessionContext,
    pub client: SiemClient,
}

impl Console {
    pub fn open(global: &GlobalArgs) -> anyhow::Result<Self> {
        let loader = ConfigLoader::new();
        let home = loader.soc_home()?;
        let mut config = loader.load()?;
        if let Some(url) = &global.api_url {
            config.api_base_url = url.clone();
        }

        let store = FileSessionStore::in_dir(&home)?;
        tracing::debug!("session file at {}", store.path().display());
        let session = SessionContext::load(Arc::new(store));
        if session.snapshot() == Session::default() {
            // First run: start from the configured preferences.
            session.set_selected_index(config.default_index.clone());
            session.set_allowed_indices(config.allowed_indices.clone());
            session.set_max_results(config.max_results);
            session.set_rows_per_page(config.rows_per_page);
        }
        if let Some(index) = &global.index {
            session.set_selected_index(index.clone());
        }

        let client = SiemClient::from_config(&config, session.clone())?;
        Ok(Self {
            config,
            session,
            client,
        })
    }

    /// Selected index, with a warning when the session does not list it.
    pub fn index(&self) -> String {
        let session = self.session.snapshot();
        if !session.allowed_indices.contains(&session.selected_index) {
            tracing::warn!(
                "index {} is not in the allowed list; the backend may refuse it",
                session.selected_index
            );
        }
        session.selected_index
    }

    /// Fail early with a readable message instead of a 401 round trip.
    pub fn require_login(&self) -> anyhow::Result<()> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            anyhow::bail!("not signed in; run `soc login` first")
        }
    }
}
