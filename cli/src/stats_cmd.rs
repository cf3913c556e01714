//! `soc stats` and `soc logs`: dashboard numbers and the raw log feed.

use clap::Parser;
use futures::StreamExt;
use soc_protocol::DashboardStats;

use crate::Console;

#[derive(Debug, Parser)]
pub struct StatsArgs {
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct LogsArgs {
    /// Stop after this many lines.
    #[arg(long, short = 'n', value_name = "LINES")]
    pub limit: Option<usize>,
}

pub async fn run_stats(console: &Console, args: StatsArgs) -> anyhow::Result<i32> {
    console.require_login()?;
    let index = console.index();
    let stats = console.client.stats(&index).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(&index, &stats);
    }
    Ok(if stats.error.is_some() { 1 } else { 0 })
}

fn print_stats(index: &str, stats: &DashboardStats) {
    println!("{index}, last 24h");
    println!("  alerts          {}", stats.total_alerts);
    println!("  high severity   {}", stats.high_severity);
    println!("  active agents   {}", stats.active_agents);
    println!("  top attacker    {}", stats.top_attacker().unwrap_or("none"));
    if !stats.risk_scoring.is_empty() {
        println!("  risk by agent");
        for risk in &stats.risk_scoring {
            println!("    {:<24} {:>8.0}", risk.entity, risk.score);
        }
    }
    if let Some(err) = &stats.error {
        eprintln!("Backend reported: {err}");
    }
}

/// Follows the feed until Ctrl-C, the backend closes it, or `--limit` lines
/// were printed.
pub async fn run_logs(console: &Console, args: LogsArgs) -> anyhow::Result<i32> {
    console.require_login()?;
    let index = console.index();
    let mut lines = console.client.log_stream(&index).await?;
    eprintln!("Following logs of {index} (Ctrl-C to stop)");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut printed = 0;

    loop {
        if args.limit.is_some_and(|limit| printed >= limit) {
            break;
        }
        tokio::select! {
            _ = &mut ctrl_c => break,
            next = lines.next() => match next {
                Some(Ok(line)) => {
                    println!("{}", line.line);
                    printed += 1;
                }
                Some(Err(err)) => {
                    tracing::error!("log stream for {index} failed: {err}");
                    return Ok(1);
                }
                None => {
                    eprintln!("Log stream closed by the backend");
                    break;
                }
            },
        }
    }
    Ok(0)
}
