//! Saved searches, audit log, remediation and backend readiness.

use clap::Parser;
use clap::Subcommand;
use soc_protocol::records::NewSavedSearch;

use crate::Console;

#[derive(Debug, Parser)]
pub struct SavedCli {
    #[command(subcommand)]
    pub command: SavedSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum SavedSubcommand {
    /// List saved searches.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Save a query under a name, scoped to the selected index.
    Create {
        #[arg(long)]
        name: String,
        /// Search DSL as JSON, e.g. the output of `soc validate --dsl`.
        #[arg(long = "query-json")]
        query_json: String,
    },
    /// Run a saved search.
    Run {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Delete a saved search.
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Debug, Parser)]
pub struct AuditArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct RemediateArgs {
    /// Action name, e.g. `block_ip`.
    pub action: String,
}

#[derive(Debug, Parser)]
pub struct PreflightArgs {
    #[arg(long)]
    pub json: bool,
}

pub async fn run_saved(console: &Console, cli: SavedCli) -> anyhow::Result<i32> {
    console.require_login()?;
    match cli.command {
        SavedSubcommand::List { json } => {
            let searches = console.client.saved_searches().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&searches)?);
            } else if searches.is_empty() {
                println!("No saved searches");
            } else {
                for search in &searches {
                    println!("{:>5}  {:<32} {}", search.id, search.name, search.index);
                }
            }
        }
        SavedSubcommand::Create { name, query_json } => {
            serde_json::from_str::<serde_json::Value>(&query_json)
                .map_err(|err| anyhow::anyhow!("--query-json is not valid JSON: {err}"))?;
            let saved = console
                .client
                .create_saved_search(&NewSavedSearch {
                    name,
                    index: console.index(),
                    query_json,
                })
                .await?;
            println!("Saved search {} ({})", saved.id, saved.name);
        }
        SavedSubcommand::Run { id, json } => {
            let response = console.client.run_saved_search(id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{} hits", response.results.total_hits);
                for row in &response.results.data {
                    println!("  {row}");
                }
            }
        }
        SavedSubcommand::Delete { id } => {
            console.client.delete_saved_search(id).await?;
            println!("Deleted saved search {id}");
        }
    }
    Ok(0)
}

pub async fn run_audit(console: &Console, args: AuditArgs) -> anyhow::Result<i32> {
    console.require_login()?;
    let entries = console.client.audit().await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(0);
    }
    for entry in &entries {
        println!(
            "{:>13}  {:<16} {:<24} {:>8} hits {:>6} ms",
            entry.ts, entry.user, entry.index, entry.hits, entry.duration_ms
        );
    }
    Ok(0)
}

pub async fn run_remediate(console: &Console, args: RemediateArgs) -> anyhow::Result<i32> {
    console.require_login()?;
    let ack = console.client.remediate(&args.action).await?;
    println!("{}: {}", ack.status, ack.message);
    if let Some(details) = ack.details {
        println!(
            "  triggered by {} at {} (webhook sent: {})",
            details.triggered_by, details.timestamp, details.webhook_sent
        );
    }
    Ok(0)
}

/// Exit code 1 when any backend dependency is down.
pub async fn run_preflight(console: &Console, args: PreflightArgs) -> anyhow::Result<i32> {
    let status = console.client.preflight().await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        for (name, ok) in [
            ("search backend", status.es_ok),
            ("credentials", status.creds_ok),
            ("language model", status.llm_ok),
            ("schema", status.schema_ok),
        ] {
            println!("[{}] {name}", if ok { "PASS" } else { "FAIL" });
        }
        if status.demo_mode {
            println!("Backend is running in demo mode");
        }
    }
    Ok(if status.all_ok() { 0 } else { 1 })
}
