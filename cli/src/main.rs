use clap::Parser;
use clap::Subcommand;
use soc_cli::Console;
use soc_cli::GlobalArgs;
use soc_cli::alerts_cmd::WatchArgs;
use soc_cli::alerts_cmd::run_watch;
use soc_cli::auth_cmd::LoginArgs;
use soc_cli::auth_cmd::run_login;
use soc_cli::auth_cmd::run_logout;
use soc_cli::auth_cmd::run_refresh;
use soc_cli::query_cmd::ChatArgs;
use soc_cli::query_cmd::QueryArgs;
use soc_cli::query_cmd::SchemaArgs;
use soc_cli::query_cmd::ValidateArgs;
use soc_cli::query_cmd::run_chat;
use soc_cli::query_cmd::run_query;
use soc_cli::query_cmd::run_schema;
use soc_cli::query_cmd::run_validate;
use soc_cli::records_cmd::AuditArgs;
use soc_cli::records_cmd::PreflightArgs;
use soc_cli::records_cmd::RemediateArgs;
use soc_cli::records_cmd::SavedCli;
use soc_cli::records_cmd::run_audit;
use soc_cli::records_cmd::run_preflight;
use soc_cli::records_cmd::run_remediate;
use soc_cli::records_cmd::run_saved;
use soc_cli::stats_cmd::LogsArgs;
use soc_cli::stats_cmd::StatsArgs;
use soc_cli::stats_cmd::run_logs;
use soc_cli::stats_cmd::run_stats;

/// Security-operations console: guided log search and live critical alerts.
#[derive(Debug, Parser)]
#[command(name = "soc", version, subcommand_required = true)]
struct SocCli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List queryable fields of the selected index.
    Schema(SchemaArgs),

    /// Check a criterion without contacting the backend.
    Validate(ValidateArgs),

    /// Run a guided search.
    Query(QueryArgs),

    /// Ask the backend to translate and run a plain-language search.
    Chat(ChatArgs),

    /// Follow live critical alerts.
    Watch(WatchArgs),

    /// Show last-24h dashboard numbers for the selected index.
    Stats(StatsArgs),

    /// Follow the raw log feed of the selected index.
    Logs(LogsArgs),

    /// Manage saved searches.
    Saved(SavedCli),

    /// Show the query audit log.
    Audit(AuditArgs),

    /// Trigger a remediation action (admin only).
    Remediate(RemediateArgs),

    /// Sign in and remember the session.
    Login(LoginArgs),

    /// Revoke the token and forget the signed-in user.
    Logout,

    /// Exchange the current token for a fresh one.
    Refresh,

    /// Check backend readiness.
    Preflight(PreflightArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = SocCli::parse();
    let console = Console::open(&cli.global)?;

    let code = match cli.command {
        Command::Schema(args) => run_schema(&console, args).await?,
        Command::Validate(args) => run_validate(&console, args)?,
        Command::Query(args) => run_query(&console, args).await?,
        Command::Chat(args) => run_chat(&console, args).await?,
        Command::Watch(args) => run_watch(&console, args).await?,
        Command::Stats(args) => run_stats(&console, args).await?,
        Command::Logs(args) => run_logs(&console, args).await?,
        Command::Saved(cli) => run_saved(&console, cli).await?,
        Command::Audit(args) => run_audit(&console, args).await?,
        Command::Remediate(args) => run_remediate(&console, args).await?,
        Command::Login(args) => run_login(&console, args).await?,
        Command::Logout => run_logout(&console).await?,
        Command::Refresh => run_refresh(&console).await?,
        Command::Preflight(args) => run_preflight(&console, args).await?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
